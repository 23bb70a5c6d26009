//! # easycore
//!
//! `easycore` is the object model behind scientific fitting applications:
//! variables with units, bounds and uncertainties, objects and collections
//! built from them, constraints linking variables, an undo/redo history of
//! every change, and least-squares fitting of the whole model.
//!
//! The library provides:
//! - [`Descriptor`] and [`Parameter`] variables, held in a [`Registry`]
//! - [`BaseObj`] and [`BaseCollection`] containers sharing variables by id
//! - Numeric, bound, object, multi-object and functional [`Constraint`]s,
//!   evaluated on every value change
//! - An undo stack with macros that groups related changes
//! - A [`fitting`] module with Levenberg-Marquardt and Differential
//!   Evolution engines (feature `fitting`, on by default)
//!
//! ## Basic Usage
//!
//! ```
//! use easycore::constraints::Constraint;
//! use easycore::objects::{Registry, RegistryConfig};
//! use easycore::variables::Parameter;
//!
//! let mut registry = Registry::with_config(RegistryConfig::default().with_undo(true));
//! let width = registry.add_parameter(Parameter::new("width", 1.0));
//! let height = registry.add_parameter(Parameter::new("height", 1.0));
//!
//! // height follows twice the width from now on
//! let tie = registry
//!     .add_constraint(Constraint::object(height, "2*", width).unwrap())
//!     .unwrap();
//! registry.attach_constraint(width, "height", tie).unwrap();
//!
//! registry.set_value(width, 3.0).unwrap();
//! assert_eq!(registry.value(height).unwrap(), 6.0);
//!
//! registry.undo().unwrap();
//! assert_eq!(registry.value(width).unwrap(), 1.0);
//! assert_eq!(registry.value(height).unwrap(), 2.0);
//! ```

pub mod constraints;
pub mod error;
pub mod objects;
pub mod undo;
pub mod variables;

#[cfg(feature = "fitting")]
pub mod fitting;

// Re-exports for convenience
pub use constraints::{Constraint, ConstraintId};
pub use error::{CoreError, Result};
pub use objects::{BaseCollection, BaseObj, NodeRef, ObjId, Registry, RegistryConfig, VarId};
pub use undo::UndoStack;
pub use variables::{Bounds, Descriptor, DescriptorValue, Parameter};

#[cfg(feature = "fitting")]
pub use fitting::{Fitter, FitResults, MultiFitter};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
