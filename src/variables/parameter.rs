//! Parameter definition and implementation
//!
//! A `Parameter` is a numeric variable that a fit may refine. Besides its value
//! it carries an uncertainty (`error`), bounds that act as its builtin
//! constraints, and a `fixed` flag that keeps it out of fits. Constraint
//! evaluation and undo recording happen in [`crate::objects::Registry`], which
//! owns every parameter; the setters here only validate and store.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};
use crate::variables::bounds::Bounds;
use crate::variables::units;

/// A fittable numeric variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Name of the parameter
    pub name: String,

    value: f64,

    /// Standard error, `0.0` until a fit sets it
    error: f64,

    bounds: Bounds,

    /// Excluded from fits when `true`
    fixed: bool,

    /// `false` while a constraint drives the value
    enabled: bool,

    /// Value at construction
    initial_value: f64,

    units: String,
    pub description: String,
    pub url: String,
    display_name: Option<String>,
}

impl Parameter {
    /// Create an unbounded, free parameter
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the parameter
    /// * `value` - Initial value
    ///
    /// # Examples
    ///
    /// ```
    /// use easycore::variables::parameter::Parameter;
    ///
    /// let p = Parameter::new("phase", 3.05);
    /// assert_eq!(p.value(), 3.05);
    /// assert_eq!(p.error(), 0.0);
    /// assert!(!p.fixed());
    /// assert!(p.min().is_infinite());
    /// ```
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            error: 0.0,
            bounds: Bounds::unbounded(),
            fixed: false,
            enabled: true,
            initial_value: value,
            units: String::new(),
            description: String::new(),
            url: String::new(),
            display_name: None,
        }
    }

    /// Create a parameter with bounds
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the parameter
    /// * `value` - Initial value, which must lie inside `[min, max]`
    /// * `min` - Lower limit (`f64::NEG_INFINITY` for none)
    /// * `max` - Upper limit (`f64::INFINITY` for none)
    ///
    /// # Returns
    ///
    /// The parameter, or `InvalidValue` when the value is outside the bounds
    /// and `Bounds` when `min > max`
    ///
    /// # Examples
    ///
    /// ```
    /// use easycore::variables::parameter::Parameter;
    ///
    /// let p = Parameter::with_bounds("scale", 1.0, 0.0, 10.0).unwrap();
    /// assert_eq!(p.max(), 10.0);
    /// assert!(Parameter::with_bounds("scale", 11.0, 0.0, 10.0).is_err());
    /// ```
    pub fn with_bounds(name: &str, value: f64, min: f64, max: f64) -> Result<Self> {
        let bounds = Bounds::new(min, max)?;
        if value.is_nan() {
            return Err(CoreError::InvalidValue(format!("'{name}' cannot be NaN")));
        }
        if value < min {
            return Err(CoreError::InvalidValue(format!(
                "{value} is smaller than the minimum value {min} of '{name}'"
            )));
        }
        if value > max {
            return Err(CoreError::InvalidValue(format!(
                "{value} is greater than the maximum value {max} of '{name}'"
            )));
        }
        let mut parameter = Self::new(name, value);
        parameter.bounds = bounds;
        Ok(parameter)
    }

    /// Set the initial uncertainty; negative errors are rejected
    pub fn with_error(mut self, error: f64) -> Result<Self> {
        self.set_error(error)?;
        Ok(self)
    }

    pub fn with_fixed(mut self, fixed: bool) -> Self {
        self.fixed = fixed;
        self
    }

    pub fn with_units(mut self, units: &str) -> Self {
        self.units = units.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn with_display_name(mut self, display_name: &str) -> Self {
        self.display_name = Some(display_name.to_string());
        self
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    // Stores without any checks. Callers clamp and run constraints first.
    pub(crate) fn store_value(&mut self, value: f64) {
        self.value = value;
    }

    pub fn error(&self) -> f64 {
        self.error
    }

    /// Set the standard error
    ///
    /// # Errors
    ///
    /// `InvalidValue` if `error` is negative or NaN
    pub fn set_error(&mut self, error: f64) -> Result<()> {
        if !(error >= 0.0) {
            return Err(CoreError::InvalidValue(format!(
                "error of '{}' must be non-negative, got {error}",
                self.name
            )));
        }
        self.error = error;
        Ok(())
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn min(&self) -> f64 {
        self.bounds.min
    }

    pub fn max(&self) -> f64 {
        self.bounds.max
    }

    /// Set the lower limit
    ///
    /// # Errors
    ///
    /// `InvalidValue` if the current value is below `min`
    pub fn set_min(&mut self, min: f64) -> Result<()> {
        if min > self.value {
            return Err(CoreError::InvalidValue(format!(
                "the current value ({}) of '{}' is smaller than the desired min value ({min})",
                self.value, self.name
            )));
        }
        self.bounds = Bounds::new(min, self.bounds.max)?;
        Ok(())
    }

    /// Set the upper limit
    ///
    /// # Errors
    ///
    /// `InvalidValue` if the current value is above `max`
    pub fn set_max(&mut self, max: f64) -> Result<()> {
        if max < self.value {
            return Err(CoreError::InvalidValue(format!(
                "the current value ({}) of '{}' is greater than the desired max value ({max})",
                self.value, self.name
            )));
        }
        self.bounds = Bounds::new(self.bounds.min, max)?;
        Ok(())
    }

    /// Replace both limits; a `None` side keeps its current limit.
    ///
    /// Setting bounds frees the parameter: it becomes enabled and not fixed.
    pub fn set_bounds(&mut self, min: Option<f64>, max: Option<f64>) -> Result<()> {
        let bounds = Bounds::new(
            min.unwrap_or(self.bounds.min),
            max.unwrap_or(self.bounds.max),
        )?;
        if !bounds.contains(self.value) {
            return Err(CoreError::InvalidValue(format!(
                "the current value ({}) of '{}' is outside [{}, {}]",
                self.value, self.name, bounds.min, bounds.max
            )));
        }
        self.bounds = bounds;
        self.enabled = true;
        self.fixed = false;
        Ok(())
    }

    pub(crate) fn store_bounds(&mut self, bounds: Bounds) {
        self.bounds = bounds;
    }

    pub fn fixed(&self) -> bool {
        self.fixed
    }

    pub(crate) fn store_fixed(&mut self, fixed: bool) {
        self.fixed = fixed;
    }

    /// Fix or free the parameter
    ///
    /// # Errors
    ///
    /// `NotEnabled` while a constraint drives the parameter
    pub fn set_fixed(&mut self, fixed: bool) -> Result<()> {
        if !self.enabled {
            return Err(CoreError::NotEnabled(self.name.clone()));
        }
        self.fixed = fixed;
        Ok(())
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Enabled and not fixed
    pub fn is_free(&self) -> bool {
        self.enabled && !self.fixed
    }

    pub fn initial_value(&self) -> f64 {
        self.initial_value
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub(crate) fn set_display_name(&mut self, display_name: Option<String>) {
        self.display_name = display_name;
    }

    pub(crate) fn raw_display_name(&self) -> Option<String> {
        self.display_name.clone()
    }

    /// Convert value, error and bounds to `new_units`
    pub fn convert_unit(&mut self, new_units: &str) -> Result<()> {
        let factor = units::conversion_factor(&self.units, new_units)?;
        let (a, b) = (self.bounds.min * factor, self.bounds.max * factor);
        self.bounds = Bounds::new(a.min(b), a.max(b))?;
        self.value *= factor;
        self.error *= factor.abs();
        self.initial_value *= factor;
        self.units = new_units.to_string();
        Ok(())
    }

    pub fn compatible_units(&self) -> Result<Vec<&'static str>> {
        Ok(units::compatible_units(&self.units)?)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Parameter '{}': {}", self.name, self.value)?;
        if self.error > 0.0 {
            write!(f, " ± {}", self.error)?;
        }
        if !self.units.is_empty() {
            write!(f, " {}", self.units)?;
        }
        write!(f, ", bounds=[{}:{}]", self.bounds.min, self.bounds.max)?;
        if self.fixed {
            f.write_str(" (fixed)")?;
        }
        f.write_str(">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parameter_creation() {
        let p = Parameter::new("a", 1.0).with_units("m").with_fixed(true);
        assert_eq!(p.value(), 1.0);
        assert_eq!(p.initial_value(), 1.0);
        assert!(p.fixed());
        assert!(p.enabled());
        assert!(!p.is_free());
        assert_eq!(p.units(), "m");
        assert_eq!(p.to_string(), "<Parameter 'a': 1 m, bounds=[-inf:inf] (fixed)>");
    }

    #[test]
    fn test_creation_validation() {
        assert!(Parameter::with_bounds("a", -1.0, 0.0, 1.0).is_err());
        assert!(Parameter::with_bounds("a", 2.0, 0.0, 1.0).is_err());
        assert!(Parameter::with_bounds("a", 0.5, 1.0, 0.0).is_err());
        assert!(Parameter::with_bounds("a", f64::NAN, 0.0, 1.0).is_err());
        assert!(Parameter::new("a", 1.0).with_error(-0.1).is_err());
        let p = Parameter::new("a", 1.0).with_error(0.1).unwrap();
        assert_eq!(p.error(), 0.1);
    }

    #[test]
    fn test_min_max_setters() {
        let mut p = Parameter::with_bounds("a", 1.0, 0.0, 2.0).unwrap();
        p.set_min(0.5).unwrap();
        assert_eq!(p.min(), 0.5);
        assert!(p.set_min(1.5).is_err());
        assert_eq!(p.min(), 0.5);

        p.set_max(1.0).unwrap();
        assert_eq!(p.max(), 1.0);
        assert!(p.set_max(0.9).is_err());
    }

    #[test]
    fn test_set_bounds_frees_parameter() {
        let mut p = Parameter::new("a", 1.0).with_fixed(true);
        p.set_enabled(false);
        p.set_bounds(Some(0.0), None).unwrap();
        assert_eq!(p.min(), 0.0);
        assert!(p.max().is_infinite());
        assert!(p.enabled());
        assert!(!p.fixed());

        assert!(p.set_bounds(None, Some(0.5)).is_err());
        assert_eq!(p.max(), f64::INFINITY);
    }

    #[test]
    fn test_fixed_requires_enabled() {
        let mut p = Parameter::new("a", 1.0);
        p.set_enabled(false);
        assert!(matches!(p.set_fixed(true), Err(CoreError::NotEnabled(_))));
        assert!(!p.fixed());
    }

    #[test]
    fn test_convert_unit() {
        let mut p = Parameter::with_bounds("d", 2.0, 1.0, 3.0)
            .unwrap()
            .with_units("angstrom")
            .with_error(0.1)
            .unwrap();
        p.convert_unit("nm").unwrap();
        assert_relative_eq!(p.value(), 0.2, epsilon = 1e-12);
        assert_relative_eq!(p.error(), 0.01, epsilon = 1e-12);
        assert_relative_eq!(p.min(), 0.1, epsilon = 1e-12);
        assert_relative_eq!(p.max(), 0.3, epsilon = 1e-12);
        assert_eq!(p.units(), "nm");
    }
}
