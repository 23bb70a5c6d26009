//! Descriptor: a named, unit-carrying value that is never fitted.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};
use crate::variables::units::{self, UnitError};

/// The value a descriptor holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DescriptorValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl DescriptorValue {
    /// The numeric value, if this is a `Number`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DescriptorValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    fn same_kind(&self, other: &DescriptorValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for DescriptorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorValue::Number(v) => write!(f, "{v}"),
            DescriptorValue::Bool(v) => write!(f, "{v}"),
            DescriptorValue::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for DescriptorValue {
    fn from(value: f64) -> Self {
        DescriptorValue::Number(value)
    }
}

impl From<bool> for DescriptorValue {
    fn from(value: bool) -> Self {
        DescriptorValue::Bool(value)
    }
}

impl From<&str> for DescriptorValue {
    fn from(value: &str) -> Self {
        DescriptorValue::Text(value.to_string())
    }
}

impl From<String> for DescriptorValue {
    fn from(value: String) -> Self {
        DescriptorValue::Text(value)
    }
}

/// A named value with units and display metadata.
///
/// Descriptors describe an object (a sample name, a temperature, a flag) but are
/// never refined by a fit. A descriptor built with [`Descriptor::with_options`]
/// only accepts values from its option list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub name: String,
    value: DescriptorValue,
    units: String,
    pub description: String,
    pub url: String,
    display_name: Option<String>,
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    available_options: Option<Vec<DescriptorValue>>,
}

impl Descriptor {
    /// Create a new enabled, dimensionless descriptor
    ///
    /// # Examples
    ///
    /// ```
    /// use easycore::variables::descriptor::Descriptor;
    ///
    /// let d = Descriptor::new("temperature", 300.0).with_units("K");
    /// assert_eq!(d.to_string(), "<Descriptor 'temperature': 300 K>");
    /// ```
    pub fn new(name: &str, value: impl Into<DescriptorValue>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            units: String::new(),
            description: String::new(),
            url: String::new(),
            display_name: None,
            enabled: true,
            available_options: None,
        }
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

    /// Restrict the descriptor to a fixed list of values.
    ///
    /// Fails if the current value is not among `options`.
    pub fn with_options(mut self, options: Vec<DescriptorValue>) -> Result<Self> {
        if !options.contains(&self.value) {
            return Err(CoreError::InvalidValue(format!(
                "{} is not one of the options of '{}'",
                self.value, self.name
            )));
        }
        self.available_options = Some(options);
        Ok(self)
    }

    pub fn value(&self) -> &DescriptorValue {
        &self.value
    }

    /// Set a new value.
    ///
    /// # Errors
    ///
    /// * `NotEnabled` if the descriptor is disabled
    /// * `InvalidValue` if the value changes kind (number to text, ...) or is
    ///   not one of the available options
    pub fn set_value(&mut self, value: DescriptorValue) -> Result<()> {
        if !self.enabled {
            return Err(CoreError::NotEnabled(self.name.clone()));
        }
        self.check_value(&value)?;
        self.value = value;
        Ok(())
    }

    pub(crate) fn check_value(&self, value: &DescriptorValue) -> Result<()> {
        if !self.value.same_kind(value) {
            return Err(CoreError::InvalidValue(format!(
                "'{}' holds {} but was given {}",
                self.name, self.value, value
            )));
        }
        if let Some(options) = &self.available_options {
            if !options.contains(value) {
                return Err(CoreError::InvalidValue(format!(
                    "{} is not one of the options of '{}'",
                    value, self.name
                )));
            }
        }
        Ok(())
    }

    // Skips the enabled check; used by constraints and undo replay.
    pub(crate) fn force_value(&mut self, value: DescriptorValue) {
        self.value = value;
    }

    pub fn available_options(&self) -> Option<&[DescriptorValue]> {
        self.available_options.as_deref()
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

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Convert the value to `new_units`
    ///
    /// # Errors
    ///
    /// Fails for non-numeric values and for unknown or incompatible units.
    pub fn convert_unit(&mut self, new_units: &str) -> Result<()> {
        let value = self.value.as_f64().ok_or(UnitError::NonNumeric)?;
        let factor = units::conversion_factor(&self.units, new_units)?;
        self.value = DescriptorValue::Number(value * factor);
        self.units = new_units.to_string();
        Ok(())
    }

    /// Units the value can be converted to
    pub fn compatible_units(&self) -> Result<Vec<&'static str>> {
        Ok(units::compatible_units(&self.units)?)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Descriptor '{}': {}", self.name, self.value)?;
        if !self.units.is_empty() {
            write!(f, " {}", self.units)?;
        }
        f.write_str(">")
    }
}
