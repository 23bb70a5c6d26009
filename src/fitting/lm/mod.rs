//! Levenberg-Marquardt engine.
//!
//! [`LevenbergMarquardt`] minimizes any [`Problem`](crate::fitting::problem::Problem)
//! in the coordinates it is given. The [`Minimizer`](crate::fitting::engine::Minimizer)
//! implementation wraps the problem in the bounds transform first, so bounded
//! parameters never leave their range.

pub mod algorithm;
pub mod config;
pub mod step;

pub use algorithm::{LevenbergMarquardt, LmResult};
pub use config::{DecompositionMethod, LmConfig};
pub use step::LmStep;
