use thiserror::Error;

use crate::constraints::expression::ExpressionError;
use crate::variables::bounds::BoundsError;
use crate::variables::units::UnitError;

/// Error types for the easycore library.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A variable id that is not registered.
    #[error("Variable not found: {0}")]
    VariableNotFound(String),

    /// An object or collection id that is not registered.
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// A constraint id that is not registered.
    #[error("Constraint not found: {0}")]
    ConstraintNotFound(String),

    /// An operation that needs a `Parameter` was given a `Descriptor`.
    #[error("'{0}' is not a parameter")]
    NotAParameter(String),

    /// An operation that needs a numeric value was given a bool or text descriptor.
    #[error("'{0}' does not hold a numeric value")]
    NotNumeric(String),

    /// The variable is disabled, usually because a constraint drives it.
    #[error("'{0}' is not enabled for changes")]
    NotEnabled(String),

    /// A value rejected by a variable setter.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// A malformed or inapplicable constraint.
    #[error("Invalid constraint: {0}")]
    InvalidConstraint(String),

    /// Constraint application recursed deeper than the configured limit.
    #[error("Constraint cascade exceeded depth {0}; the constraints form a cycle")]
    ConstraintCycle(usize),

    /// An object already holds a component under this key.
    #[error("Component '{0}' already exists")]
    DuplicateComponent(String),

    /// An object holds no component under this key.
    #[error("Component '{0}' not found")]
    ComponentNotFound(String),

    /// Collection index outside `0..len`.
    #[error("Index {index} out of range for collection of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Misuse of the undo stack, such as ending a macro that was never started.
    #[error("Undo stack error: {0}")]
    UndoStack(String),

    /// Bounds errors.
    #[error("Bounds error: {0}")]
    Bounds(#[from] BoundsError),

    /// Expression parsing or evaluation errors.
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    /// Unit conversion errors.
    #[error("Unit error: {0}")]
    Unit(#[from] UnitError),

    /// Fitting errors.
    #[error("Fit error: {0}")]
    Fit(#[from] FitError),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Errors raised while setting up or running a fit.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("Unknown fitting engine '{0}'")]
    UnknownEngine(String),

    #[error("Unknown method '{method}' for engine '{engine}'")]
    UnknownMethod { engine: String, method: String },

    #[error("The fitter has no fit object and fit function")]
    NotInitialized,

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("The fit object has no free parameters")]
    NoFitParameters,

    #[error("Parameter '{0}' needs finite bounds for this engine")]
    UnboundedParameter(String),

    #[error("Fit constraint index {index} out of range ({len} constraints)")]
    ConstraintIndex { index: usize, len: usize },

    #[error("Algorithm failed to converge: {0}")]
    ConvergenceFailure(String),

    #[error("Function evaluation error: {0}")]
    Evaluation(String),
}

/// Result type for easycore operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::NotEnabled("offset".to_string());
        assert_eq!(err.to_string(), "'offset' is not enabled for changes");

        let err = CoreError::IndexOutOfRange { index: 4, len: 2 };
        assert_eq!(
            err.to_string(),
            "Index 4 out of range for collection of length 2"
        );

        let err = CoreError::ConstraintCycle(32);
        assert!(err.to_string().contains("depth 32"));
    }

    #[test]
    fn test_error_conversion() {
        let bounds = BoundsError::InvalidBounds { min: 2.0, max: 1.0 };
        let err: CoreError = bounds.into();
        assert!(matches!(err, CoreError::Bounds(_)));

        let err: CoreError = FitError::NoFitParameters.into();
        assert_eq!(
            err.to_string(),
            "Fit error: The fit object has no free parameters"
        );

        let json_err = serde_json::from_str::<f64>("not json").unwrap_err();
        let err: CoreError = json_err.into();
        assert!(matches!(err, CoreError::JsonError(_)));
    }
}
