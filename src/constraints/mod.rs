//! Constraints between variables
//!
//! A constraint computes a value for its *dependent* variable. Numeric and
//! self-bound constraints only look at the dependent itself and restrict it;
//! object, multi-object and functional constraints with independents derive
//! the dependent from other variables and are called *external*.
//!
//! Constraints are plain data. Registering one with a
//! [`Registry`](crate::objects::Registry) makes it act on values: see
//! [`Registry::add_constraint`](crate::objects::Registry::add_constraint) for
//! when constraints are evaluated.

pub mod expression;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::objects::VarId;
use crate::variables::bounds::Bounds;
use expression::Expression;

/// Identifier of a registered constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConstraintId(pub(crate) u64);

impl fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Comparison operator of numeric and self-bound constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl Comparison {
    pub fn as_operator(&self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
        }
    }

    /// Check `lhs op rhs`
    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Equal => lhs == rhs,
            Self::NotEqual => lhs != rhs,
            Self::LessThan => lhs < rhs,
            Self::LessThanOrEqual => lhs <= rhs,
            Self::GreaterThan => lhs > rhs,
            Self::GreaterThanOrEqual => lhs >= rhs,
        }
    }
}

impl FromStr for Comparison {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "==" | "=" => Ok(Self::Equal),
            "!=" => Ok(Self::NotEqual),
            "<" => Ok(Self::LessThan),
            "<=" => Ok(Self::LessThanOrEqual),
            ">" => Ok(Self::GreaterThan),
            ">=" => Ok(Self::GreaterThanOrEqual),
            other => Err(CoreError::InvalidConstraint(format!(
                "unknown comparison operator '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_operator())
    }
}

/// Which limit of the dependent a self-bound constraint compares against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundKind {
    Min,
    Max,
}

impl BoundKind {
    fn of(&self, bounds: Bounds) -> f64 {
        match self {
            BoundKind::Min => bounds.min,
            BoundKind::Max => bounds.max,
        }
    }
}

/// Function of a functional constraint
pub type ConstraintFn = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// The rule a constraint applies
#[derive(Clone, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// Replace the dependent by `value` unless `dependent op value` holds
    Numeric { operator: Comparison, value: f64 },

    /// As `Numeric`, against the dependent's own min or max
    SelfBound {
        operator: Comparison,
        bound: BoundKind,
    },

    /// `dependent = operator x`, with `x` the independent value
    Object {
        operator: String,
        independent: VarId,
    },

    /// `dependent = value - (x0 op0 x1 op1 ... xn)`
    MultiObject {
        independents: Vec<VarId>,
        operators: Vec<String>,
        value: f64,
    },

    /// `dependent = function(values)`, with the independents' values or, when
    /// there are none, the dependent's own value
    #[serde(skip)]
    Functional {
        function: ConstraintFn,
        independents: Vec<VarId>,
    },
}

impl fmt::Debug for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric { operator, value } => f
                .debug_struct("Numeric")
                .field("operator", operator)
                .field("value", value)
                .finish(),
            Self::SelfBound { operator, bound } => f
                .debug_struct("SelfBound")
                .field("operator", operator)
                .field("bound", bound)
                .finish(),
            Self::Object {
                operator,
                independent,
            } => f
                .debug_struct("Object")
                .field("operator", operator)
                .field("independent", independent)
                .finish(),
            Self::MultiObject {
                independents,
                operators,
                value,
            } => f
                .debug_struct("MultiObject")
                .field("independents", independents)
                .field("operators", operators)
                .field("value", value)
                .finish(),
            Self::Functional { independents, .. } => f
                .debug_struct("Functional")
                .field("independents", independents)
                .finish_non_exhaustive(),
        }
    }
}

/// A rule computing the value of a dependent variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    dependent: VarId,
    kind: ConstraintKind,
    enabled: bool,
}

impl Constraint {
    fn build(dependent: VarId, kind: ConstraintKind) -> Result<Self> {
        let constraint = Self {
            dependent,
            kind,
            enabled: true,
        };
        if constraint.independents().contains(&dependent) {
            return Err(CoreError::InvalidConstraint(format!(
                "dependent {dependent} cannot also be an independent variable"
            )));
        }
        Ok(constraint)
    }

    /// Keep the dependent satisfying `dependent op value`
    ///
    /// # Examples
    ///
    /// ```
    /// use easycore::constraints::Constraint;
    /// use easycore::objects::Registry;
    /// use easycore::variables::Parameter;
    ///
    /// let mut registry = Registry::new();
    /// let b = registry.add_parameter(Parameter::new("b", 2.0));
    /// let c = registry.add_constraint(Constraint::numeric(b, "<", 1.5).unwrap()).unwrap();
    /// assert_eq!(registry.apply_constraint(c).unwrap(), Some(1.5));
    /// ```
    pub fn numeric(dependent: VarId, operator: &str, value: f64) -> Result<Self> {
        Self::build(
            dependent,
            ConstraintKind::Numeric {
                operator: operator.parse()?,
                value,
            },
        )
    }

    /// Keep the dependent satisfying `dependent op dependent.min` (or max)
    pub fn self_bound(dependent: VarId, operator: &str, bound: BoundKind) -> Result<Self> {
        Self::build(
            dependent,
            ConstraintKind::SelfBound {
                operator: operator.parse()?,
                bound,
            },
        )
    }

    /// `dependent = operator independent`, e.g. `"2*"` for twice the independent
    pub fn object(dependent: VarId, operator: &str, independent: VarId) -> Result<Self> {
        Expression::from_operator(operator, "x")?;
        Self::build(
            dependent,
            ConstraintKind::Object {
                operator: operator.to_string(),
                independent,
            },
        )
    }

    /// `dependent = value - (x0 op0 x1 op1 ... xn)`
    ///
    /// `operators` joins consecutive independents, so it holds one entry
    /// fewer than `independents`. Each entry may carry a factor, like `"-2*"`.
    pub fn multi_object(
        independents: Vec<VarId>,
        operators: Vec<String>,
        dependent: VarId,
        value: f64,
    ) -> Result<Self> {
        if independents.is_empty() || operators.len() + 1 != independents.len() {
            return Err(CoreError::InvalidConstraint(format!(
                "{} independent variables need {} operators, got {}",
                independents.len(),
                independents.len().saturating_sub(1),
                operators.len()
            )));
        }
        multi_object_expression(&operators)?;
        Self::build(
            dependent,
            ConstraintKind::MultiObject {
                independents,
                operators,
                value,
            },
        )
    }

    /// `dependent = function([dependent])`, an internal constraint
    pub fn functional<F>(dependent: VarId, function: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Self {
            dependent,
            kind: ConstraintKind::Functional {
                function: Arc::new(function),
                independents: Vec::new(),
            },
            enabled: true,
        }
    }

    /// `dependent = function(independent values)`, an external constraint
    pub fn functional_with<F>(dependent: VarId, function: F, independents: Vec<VarId>) -> Result<Self>
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Self::build(
            dependent,
            ConstraintKind::Functional {
                function: Arc::new(function),
                independents,
            },
        )
    }

    pub fn dependent(&self) -> VarId {
        self.dependent
    }

    pub fn kind(&self) -> &ConstraintKind {
        &self.kind
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Variables the dependent is derived from
    pub fn independents(&self) -> Vec<VarId> {
        match &self.kind {
            ConstraintKind::Numeric { .. } | ConstraintKind::SelfBound { .. } => Vec::new(),
            ConstraintKind::Object { independent, .. } => vec![*independent],
            ConstraintKind::MultiObject { independents, .. }
            | ConstraintKind::Functional { independents, .. } => independents.clone(),
        }
    }

    /// `true` when the constraint derives its dependent from other variables
    pub fn is_external(&self) -> bool {
        match &self.kind {
            ConstraintKind::Numeric { .. } | ConstraintKind::SelfBound { .. } => false,
            ConstraintKind::Object { .. } | ConstraintKind::MultiObject { .. } => true,
            ConstraintKind::Functional { independents, .. } => !independents.is_empty(),
        }
    }

    /// Functional constraints hold a closure and cannot be written to JSON
    pub fn is_serializable(&self) -> bool {
        !matches!(self.kind, ConstraintKind::Functional { .. })
    }

    /// Compute the value the dependent should take
    ///
    /// # Arguments
    ///
    /// * `current` - Current value of the dependent
    /// * `bounds` - Bounds of the dependent (unbounded for descriptors)
    /// * `independents` - Values of [`Constraint::independents`], in order
    pub fn compute(&self, current: f64, bounds: Bounds, independents: &[f64]) -> Result<f64> {
        let expected = self.independents().len();
        if independents.len() != expected {
            return Err(CoreError::InvalidConstraint(format!(
                "expected {expected} independent values, got {}",
                independents.len()
            )));
        }
        let value = match &self.kind {
            ConstraintKind::Numeric { operator, value } => {
                if operator.holds(current, *value) {
                    current
                } else {
                    *value
                }
            }
            ConstraintKind::SelfBound { operator, bound } => {
                let limit = bound.of(bounds);
                if operator.holds(current, limit) {
                    current
                } else {
                    limit
                }
            }
            ConstraintKind::Object { operator, .. } => {
                Expression::from_operator(operator, "x")?.evaluate(&[("x", independents[0])][..])?
            }
            ConstraintKind::MultiObject {
                operators, value, ..
            } => {
                let names: Vec<String> = (0..independents.len()).map(|i| format!("x{i}")).collect();
                let context: Vec<(&str, f64)> = names
                    .iter()
                    .map(String::as_str)
                    .zip(independents.iter().copied())
                    .collect();
                value - multi_object_expression(operators)?.evaluate(context.as_slice())?
            }
            ConstraintKind::Functional { function, .. } => {
                if independents.is_empty() {
                    function(&[current])
                } else {
                    function(independents)
                }
            }
        };
        Ok(value)
    }
}

fn multi_object_expression(operators: &[String]) -> Result<Expression> {
    let mut source = String::from("x0");
    for (i, op) in operators.iter().enumerate() {
        source.push_str(&format!(" {op} x{}", i + 1));
    }
    Ok(Expression::parse(&source)?)
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dep = self.dependent;
        match &self.kind {
            ConstraintKind::Numeric { operator, value } => {
                write!(f, "NumericConstraint({dep} {operator} {value})")
            }
            ConstraintKind::SelfBound { operator, bound } => {
                write!(f, "SelfConstraint({dep} {operator} {bound:?})")
            }
            ConstraintKind::Object {
                operator,
                independent,
            } => write!(f, "ObjConstraint({dep} = {operator} {independent})"),
            ConstraintKind::MultiObject {
                independents,
                operators,
                value,
            } => {
                write!(f, "MultiObjConstraint({dep} = {value} - (")?;
                for (i, id) in independents.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", operators[i - 1])?;
                    }
                    write!(f, "{id}")?;
                }
                f.write_str("))")
            }
            ConstraintKind::Functional { independents, .. } => {
                write!(f, "FunctionalConstraint({dep}, {} independents)", independents.len())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ids() -> (VarId, VarId, VarId) {
        (VarId(0), VarId(1), VarId(2))
    }

    #[test]
    fn test_comparison_parse() {
        assert_eq!("==".parse::<Comparison>().unwrap(), Comparison::Equal);
        assert_eq!(" >= ".parse::<Comparison>().unwrap(), Comparison::GreaterThanOrEqual);
        assert!("=>".parse::<Comparison>().is_err());
        assert!(Comparison::LessThan.holds(1.0, 1.5));
        assert!(!Comparison::NotEqual.holds(1.0, 1.0));
    }

    #[test]
    fn test_numeric_compute() {
        let (a, _, _) = ids();
        let unbounded = Bounds::unbounded();
        let eq = Constraint::numeric(a, "==", 1.0).unwrap();
        assert_eq!(eq.compute(1.0, unbounded, &[]).unwrap(), 1.0);
        assert_eq!(eq.compute(2.0, unbounded, &[]).unwrap(), 1.0);

        let gt = Constraint::numeric(a, ">", 1.5).unwrap();
        assert_eq!(gt.compute(1.0, unbounded, &[]).unwrap(), 1.5);
        assert_eq!(gt.compute(2.0, unbounded, &[]).unwrap(), 2.0);

        let lt = Constraint::numeric(a, "<", 1.5).unwrap();
        assert_eq!(lt.compute(1.0, unbounded, &[]).unwrap(), 1.0);
        assert_eq!(lt.compute(2.0, unbounded, &[]).unwrap(), 1.5);
        assert!(!lt.is_external());
    }

    #[test]
    fn test_self_bound_compute() {
        let (a, _, _) = ids();
        let bounds = Bounds::new(0.0, 10.0).unwrap();
        let c = Constraint::self_bound(a, "<=", BoundKind::Max).unwrap();
        assert_eq!(c.compute(12.0, bounds, &[]).unwrap(), 10.0);
        assert_eq!(c.compute(3.0, bounds, &[]).unwrap(), 3.0);
    }

    #[test]
    fn test_object_compute() {
        let (a, b, _) = ids();
        let unbounded = Bounds::unbounded();
        for (op, expected) in [("", 2.0), ("2*", 4.0), ("2/", 1.0), ("1 +", 3.0)] {
            let c = Constraint::object(a, op, b).unwrap();
            assert_eq!(c.compute(0.0, unbounded, &[2.0]).unwrap(), expected);
            assert!(c.is_external());
        }
        assert!(Constraint::object(a, "2*", a).is_err());
        assert!(Constraint::object(a, "*)", b).is_err());
    }

    #[test]
    fn test_multi_object_compute() {
        let (a, b, c) = ids();
        // a + b - 2c = 0
        let con = Constraint::multi_object(vec![b, c], vec!["-2*".to_string()], a, 0.0).unwrap();
        let value = con.compute(0.5, Bounds::unbounded(), &[0.4, 0.1]).unwrap();
        assert_relative_eq!(value, -0.2, epsilon = 1e-12);
        assert_eq!(con.independents(), vec![b, c]);

        assert!(Constraint::multi_object(vec![b, c], vec![], a, 0.0).is_err());
        assert!(Constraint::multi_object(vec![a, b], vec!["+".to_string()], a, 0.0).is_err());
    }

    #[test]
    fn test_multi_object_precedence() {
        let (a, b, c) = ids();
        let d = VarId(3);
        let con = Constraint::multi_object(
            vec![b, c, d],
            vec!["+".to_string(), "*".to_string()],
            a,
            10.0,
        )
        .unwrap();
        // 10 - (1 + 2 * 3)
        assert_eq!(con.compute(0.0, Bounds::unbounded(), &[1.0, 2.0, 3.0]).unwrap(), 3.0);
    }

    #[test]
    fn test_functional_compute() {
        let (a, b, c) = ids();
        let abs = Constraint::functional(a, |v| v[0].abs());
        assert!(!abs.is_external());
        assert_eq!(abs.compute(-0.5, Bounds::unbounded(), &[]).unwrap(), 0.5);
        assert!(!abs.is_serializable());

        let sum = Constraint::functional_with(a, |v| v.iter().sum(), vec![b, c]).unwrap();
        assert!(sum.is_external());
        assert_eq!(sum.compute(0.0, Bounds::unbounded(), &[1.0, 2.0]).unwrap(), 3.0);
        assert!(sum.compute(0.0, Bounds::unbounded(), &[1.0]).is_err());
    }

    #[test]
    fn test_display() {
        let (a, b, _) = ids();
        let c = Constraint::object(a, "2*", b).unwrap();
        assert_eq!(c.to_string(), "ObjConstraint(v0 = 2* v1)");
    }
}
