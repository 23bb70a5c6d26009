//! Parameter bounds
//!
//! `Bounds` holds the closed interval a parameter value must stay in. The
//! builtin constraints of a parameter clamp every new value into it, and the
//! Levenberg-Marquardt engine uses `BoundsTransform` to optimize bounded
//! parameters on an unbounded internal scale.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors that can occur when working with parameter bounds
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("Invalid bounds: min ({min}) must not exceed max ({max})")]
    InvalidBounds { min: f64, max: f64 },

    #[error("Value {value} is outside bounds [{min}, {max}]")]
    ValueOutsideBounds { value: f64, min: f64, max: f64 },

    #[error("Bounds cannot be NaN")]
    NotANumber,

    #[error("Infinite parameter value is not allowed")]
    InfiniteValue,
}

/// Closed interval `[min, max]`; either end may be infinite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Lower limit
    pub min: f64,

    /// Upper limit
    pub max: f64,
}

// JSON has no infinity, so an open end is written as `null`.
impl Serialize for Bounds {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let finite = |v: f64| if v.is_finite() { Some(v) } else { None };
        let mut state = serializer.serialize_struct("Bounds", 2)?;
        state.serialize_field("min", &finite(self.min))?;
        state.serialize_field("max", &finite(self.max))?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Bounds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(default)]
            min: Option<f64>,
            #[serde(default)]
            max: Option<f64>,
        }

        let raw = Raw::deserialize(deserializer)?;
        Bounds::new(
            raw.min.unwrap_or(f64::NEG_INFINITY),
            raw.max.unwrap_or(f64::INFINITY),
        )
        .map_err(serde::de::Error::custom)
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl Bounds {
    /// Create bounds from a lower and an upper limit
    ///
    /// # Arguments
    ///
    /// * `min` - Lower limit, `f64::NEG_INFINITY` for none
    /// * `max` - Upper limit, `f64::INFINITY` for none
    ///
    /// # Returns
    ///
    /// The bounds, or an error if `min > max` or either limit is NaN
    ///
    /// # Examples
    ///
    /// ```
    /// use easycore::variables::bounds::Bounds;
    ///
    /// let bounds = Bounds::new(0.0, 10.0).unwrap();
    /// assert!(bounds.contains(3.0));
    /// assert!(Bounds::new(1.0, -1.0).is_err());
    /// ```
    pub fn new(min: f64, max: f64) -> Result<Self, BoundsError> {
        if min.is_nan() || max.is_nan() {
            return Err(BoundsError::NotANumber);
        }
        if min > max {
            return Err(BoundsError::InvalidBounds { min, max });
        }
        Ok(Self { min, max })
    }

    /// Bounds from optional limits; a missing side is open.
    pub fn from_options(min: Option<f64>, max: Option<f64>) -> Result<Self, BoundsError> {
        Self::new(
            min.unwrap_or(f64::NEG_INFINITY),
            max.unwrap_or(f64::INFINITY),
        )
    }

    /// `(-inf, inf)`
    pub fn unbounded() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    /// Check if a value lies inside the interval (ends included)
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// `true` when both limits are finite
    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    pub fn has_lower_bound(&self) -> bool {
        self.min.is_finite()
    }

    pub fn has_upper_bound(&self) -> bool {
        self.max.is_finite()
    }

    /// Clamp a value into the interval.
    ///
    /// NaN is mapped to the lower limit, matching a failed `value >= min` test.
    pub fn clamp(&self, value: f64) -> f64 {
        if !(value >= self.min) {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }

    /// Width of the interval (infinite when either side is open)
    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

/// Minuit-style mapping between an unbounded internal value and a bounded
/// external value.
///
/// | bounds | external(x) |
/// |---|---|
/// | none | `x` |
/// | lower only | `min - 1 + sqrt(x² + 1)` |
/// | upper only | `max + 1 - sqrt(x² + 1)` |
/// | both | `min + (sin x + 1)(max - min) / 2` |
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundsTransform {
    bounds: Bounds,
}

impl BoundsTransform {
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Map an internal (optimizer) value to the bounded external value
    pub fn to_external(&self, internal: f64) -> f64 {
        let b = &self.bounds;
        match (b.has_lower_bound(), b.has_upper_bound()) {
            (false, false) => internal,
            (true, false) => b.min - 1.0 + (internal * internal + 1.0).sqrt(),
            (false, true) => b.max + 1.0 - (internal * internal + 1.0).sqrt(),
            (true, true) => b.min + (internal.sin() + 1.0) * b.width() / 2.0,
        }
    }

    /// Map an external value to the internal scale
    ///
    /// # Returns
    ///
    /// The internal value, or an error if `external` is infinite or out of bounds
    pub fn to_internal(&self, external: f64) -> Result<f64, BoundsError> {
        if !external.is_finite() {
            return Err(BoundsError::InfiniteValue);
        }
        let b = &self.bounds;
        if !b.contains(external) {
            return Err(BoundsError::ValueOutsideBounds {
                value: external,
                min: b.min,
                max: b.max,
            });
        }

        let internal = match (b.has_lower_bound(), b.has_upper_bound()) {
            (false, false) => external,
            (true, false) => ((external - b.min + 1.0).powi(2) - 1.0).sqrt(),
            (false, true) => ((b.max - external + 1.0).powi(2) - 1.0).sqrt(),
            (true, true) => {
                if b.width() == 0.0 {
                    0.0
                } else {
                    (2.0 * (external - b.min) / b.width() - 1.0)
                        .clamp(-1.0, 1.0)
                        .asin()
                }
            }
        };
        Ok(internal)
    }
}
