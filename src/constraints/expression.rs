//! Arithmetic expressions for object constraints
//!
//! An object constraint is written as an operator prefix applied to its
//! independent variable, e.g. `"2*"`, `"1 +"` or `"sqrt("` closed by `")"`.
//! The prefix is completed into an expression in `x` and parsed once. The
//! grammar supports `+ - * /`, `^` and `**` for powers, unary minus,
//! parentheses and a handful of functions. Binary operators associate to the
//! left, powers to the right.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, multispace0},
    combinator::recognize,
    multi::many0,
    number::complete::double,
    sequence::{delimited, pair},
    IResult, Parser,
};
use std::fmt;
use thiserror::Error;

/// Error that can occur during expression parsing or evaluation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Failed to parse expression '{input}': {message}")]
    ParseError { input: String, message: String },

    #[error("Undefined variable: {name}")]
    UndefinedVariable { name: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("{name}() takes {expected} argument(s), got {got}")]
    WrongArity {
        name: String,
        expected: &'static str,
        got: usize,
    },

    #[error("Undefined function: {name}")]
    UndefinedFunction { name: String },
}

type ExprResult<T> = Result<T, ExpressionError>;

/// Expression AST node
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Number(f64),
    Variable(String),
    Neg(Box<Expression>),
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
    Function(String, Vec<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
        };
        f.write_str(symbol)
    }
}

/// Source of variable values during evaluation
pub trait EvaluationContext {
    fn get_variable(&self, name: &str) -> ExprResult<f64>;
}

/// Name/value pairs, searched linearly; the usual context for constraints.
impl EvaluationContext for [(&str, f64)] {
    fn get_variable(&self, name: &str) -> ExprResult<f64> {
        self.iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
            .ok_or_else(|| ExpressionError::UndefinedVariable {
                name: name.to_string(),
            })
    }
}

impl Expression {
    /// Parse an expression from a string
    ///
    /// # Examples
    ///
    /// ```
    /// use easycore::constraints::expression::Expression;
    ///
    /// let expr = Expression::parse("10 - 4 - 3").unwrap();
    /// let empty: [(&str, f64); 0] = [];
    /// assert_eq!(expr.evaluate(&empty[..]).unwrap(), 3.0);
    /// ```
    pub fn parse(input: &str) -> ExprResult<Self> {
        let parse_error = |message: String| ExpressionError::ParseError {
            input: input.to_string(),
            message,
        };
        match additive(input) {
            Ok((remainder, expr)) if remainder.trim().is_empty() => Ok(expr),
            Ok((remainder, _)) => Err(parse_error(format!(
                "unexpected trailing characters '{}'",
                remainder.trim()
            ))),
            Err(e) => Err(parse_error(e.to_string())),
        }
    }

    /// Complete an operator prefix applied to `x`, then parse it.
    ///
    /// Open parentheses in the prefix are closed after the variable, so
    /// `"sqrt("` becomes `sqrt(x)`.
    ///
    /// # Examples
    ///
    /// ```
    /// use easycore::constraints::expression::Expression;
    ///
    /// let expr = Expression::from_operator("2*", "x").unwrap();
    /// assert_eq!(expr.evaluate(&[("x", 1.5)][..]).unwrap(), 3.0);
    /// ```
    pub fn from_operator(operator: &str, variable: &str) -> ExprResult<Self> {
        let open = operator.matches('(').count();
        let close = operator.matches(')').count();
        let mut source = format!("{operator} {variable}");
        for _ in close..open {
            source.push(')');
        }
        Self::parse(&source)
    }

    /// Evaluate the expression with the given context
    pub fn evaluate<C: EvaluationContext + ?Sized>(&self, context: &C) -> ExprResult<f64> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Variable(name) => context.get_variable(name),
            Self::Neg(inner) => Ok(-inner.evaluate(context)?),
            Self::Binary(op, left, right) => {
                let lhs = left.evaluate(context)?;
                let rhs = right.evaluate(context)?;
                apply_binary(*op, lhs, rhs)
            }
            Self::Function(name, args) => {
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(context))
                    .collect::<ExprResult<Vec<_>>>()?;
                call_function(name, &values)
            }
        }
    }
}

fn apply_binary(op: BinaryOp, lhs: f64, rhs: f64) -> ExprResult<f64> {
    match op {
        BinaryOp::Add => Ok(lhs + rhs),
        BinaryOp::Sub => Ok(lhs - rhs),
        BinaryOp::Mul => Ok(lhs * rhs),
        BinaryOp::Div if rhs == 0.0 => Err(ExpressionError::DivisionByZero),
        BinaryOp::Div => Ok(lhs / rhs),
        BinaryOp::Pow => Ok(lhs.powf(rhs)),
    }
}

fn call_function(name: &str, args: &[f64]) -> ExprResult<f64> {
    let unary = |f: fn(f64) -> f64| -> ExprResult<f64> {
        match args {
            [x] => Ok(f(*x)),
            _ => Err(ExpressionError::WrongArity {
                name: name.to_string(),
                expected: "1",
                got: args.len(),
            }),
        }
    };
    let variadic = |init: f64, f: fn(f64, f64) -> f64| -> ExprResult<f64> {
        if args.len() < 2 {
            return Err(ExpressionError::WrongArity {
                name: name.to_string(),
                expected: "at least 2",
                got: args.len(),
            });
        }
        Ok(args.iter().copied().fold(init, f))
    };

    match name {
        "sin" => unary(f64::sin),
        "cos" => unary(f64::cos),
        "tan" => unary(f64::tan),
        "exp" => unary(f64::exp),
        "log" | "ln" => unary(f64::ln),
        "log10" => unary(f64::log10),
        "sqrt" => unary(f64::sqrt),
        "abs" => unary(f64::abs),
        "max" => variadic(f64::NEG_INFINITY, f64::max),
        "min" => variadic(f64::INFINITY, f64::min),
        _ => Err(ExpressionError::UndefinedFunction {
            name: name.to_string(),
        }),
    }
}

// Parser functions using nom

fn identifier(input: &str) -> IResult<&str, String> {
    let (input, matched) = recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)?;
    Ok((input, matched.to_string()))
}

fn ws<'a, O, F>(inner: F) -> impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>
where
    F: Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

fn function_call(input: &str) -> IResult<&str, Expression> {
    let (input, name) = identifier(input)?;
    let (mut input, _) = ws(char('(')).parse(input)?;

    let mut args = Vec::new();
    if let Ok((rest, _)) = ws(char::<&str, nom::error::Error<&str>>(')')).parse(input) {
        return Ok((rest, Expression::Function(name, args)));
    }
    loop {
        let (rest, arg) = additive(input)?;
        args.push(arg);
        if let Ok((rest, _)) = ws(char::<&str, nom::error::Error<&str>>(',')).parse(rest) {
            input = rest;
            continue;
        }
        let (rest, _) = ws(char(')')).parse(rest)?;
        return Ok((rest, Expression::Function(name, args)));
    }
}

fn primary(input: &str) -> IResult<&str, Expression> {
    let (input, _) = multispace0(input)?;
    if let Ok(result) = function_call(input) {
        return Ok(result);
    }
    // Identifiers before numbers, so names like `inf` are variables.
    if let Ok((rest, name)) = identifier(input) {
        return Ok((rest, Expression::Variable(name)));
    }
    if let Ok((rest, value)) = double::<&str, nom::error::Error<&str>>(input) {
        return Ok((rest, Expression::Number(value)));
    }
    let (input, _) = char('(').parse(input)?;
    let (input, expr) = additive(input)?;
    let (input, _) = ws(char(')')).parse(input)?;
    Ok((input, expr))
}

fn unary(input: &str) -> IResult<&str, Expression> {
    let (input, _) = multispace0(input)?;
    if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>('-').parse(input) {
        let (rest, operand) = unary(rest)?;
        return Ok((rest, Expression::Neg(Box::new(operand))));
    }
    if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>('+').parse(input) {
        return unary(rest);
    }
    power(input)
}

// `-2^2` is `-(2^2)`; the exponent may itself carry a sign.
fn power(input: &str) -> IResult<&str, Expression> {
    let (input, base) = primary(input)?;
    let (after_ws, _) = multispace0(input)?;
    let caret = alt((tag::<&str, &str, nom::error::Error<&str>>("**"), tag("^"))).parse(after_ws);
    match caret {
        Ok((rest, _)) => {
            let (rest, exponent) = unary(rest)?;
            Ok((
                rest,
                Expression::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)),
            ))
        }
        Err(_) => Ok((input, base)),
    }
}

fn term(input: &str) -> IResult<&str, Expression> {
    let (mut input, mut left) = unary(input)?;
    loop {
        let (after_ws, _) = multispace0(input)?;
        let op = match after_ws.chars().next() {
            Some('*') if !after_ws.starts_with("**") => BinaryOp::Mul,
            Some('/') => BinaryOp::Div,
            _ => return Ok((input, left)),
        };
        let (rest, right) = unary(&after_ws[1..])?;
        left = Expression::Binary(op, Box::new(left), Box::new(right));
        input = rest;
    }
}

fn additive(input: &str) -> IResult<&str, Expression> {
    let (mut input, mut left) = term(input)?;
    loop {
        let (after_ws, _) = multispace0(input)?;
        let op = match after_ws.chars().next() {
            Some('+') => BinaryOp::Add,
            Some('-') => BinaryOp::Sub,
            _ => return Ok((input, left)),
        };
        let (rest, right) = term(&after_ws[1..])?;
        left = Expression::Binary(op, Box::new(left), Box::new(right));
        input = rest;
    }
}
