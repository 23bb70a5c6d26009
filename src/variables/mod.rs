//! Value-holding variables: descriptors and parameters.
//!
//! Both carry a name, units and display metadata. A `Descriptor` holds any
//! number, flag or text; a `Parameter` holds a number with an uncertainty and
//! bounds, and is what fits refine.

pub mod bounds;
pub mod descriptor;
pub mod parameter;
pub mod units;

pub use bounds::{Bounds, BoundsError, BoundsTransform};
pub use descriptor::{Descriptor, DescriptorValue};
pub use parameter::Parameter;
pub use units::{Dimension, UnitError};
