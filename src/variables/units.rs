//! Unit table for descriptor and parameter unit conversion.
//!
//! Units are plain strings on a variable. Conversion looks both symbols up in a
//! fixed table of (dimension, scale to SI) entries; units of the same dimension
//! convert by the ratio of their scales. Offset scales such as Celsius are not
//! supported.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    #[error("Unknown unit '{0}'")]
    UnknownUnit(String),

    #[error("Cannot convert '{from}' ({from_dim}) to '{to}' ({to_dim})")]
    Incompatible {
        from: String,
        from_dim: Dimension,
        to: String,
        to_dim: Dimension,
    },

    #[error("Only numeric values can be converted between units")]
    NonNumeric,
}

/// Physical dimension of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Dimensionless,
    Length,
    Time,
    Mass,
    Angle,
    Energy,
    Temperature,
    Frequency,
    Wavevector,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dimension::Dimensionless => "dimensionless",
            Dimension::Length => "length",
            Dimension::Time => "time",
            Dimension::Mass => "mass",
            Dimension::Angle => "angle",
            Dimension::Energy => "energy",
            Dimension::Temperature => "temperature",
            Dimension::Frequency => "frequency",
            Dimension::Wavevector => "1/length",
        };
        f.write_str(name)
    }
}

/// One entry of the unit table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unit {
    pub symbol: &'static str,
    pub dimension: Dimension,
    /// Multiplier taking a value in this unit to the SI unit of its dimension
    pub scale: f64,
}

const fn unit(symbol: &'static str, dimension: Dimension, scale: f64) -> Unit {
    Unit {
        symbol,
        dimension,
        scale,
    }
}

const ELECTRON_VOLT: f64 = 1.602_176_634e-19;

static UNITS: &[Unit] = &[
    unit("", Dimension::Dimensionless, 1.0),
    unit("dimensionless", Dimension::Dimensionless, 1.0),
    unit("%", Dimension::Dimensionless, 1e-2),
    unit("m", Dimension::Length, 1.0),
    unit("km", Dimension::Length, 1e3),
    unit("cm", Dimension::Length, 1e-2),
    unit("mm", Dimension::Length, 1e-3),
    unit("um", Dimension::Length, 1e-6),
    unit("nm", Dimension::Length, 1e-9),
    unit("angstrom", Dimension::Length, 1e-10),
    unit("Å", Dimension::Length, 1e-10),
    unit("pm", Dimension::Length, 1e-12),
    unit("1/m", Dimension::Wavevector, 1.0),
    unit("1/nm", Dimension::Wavevector, 1e9),
    unit("1/angstrom", Dimension::Wavevector, 1e10),
    unit("1/Å", Dimension::Wavevector, 1e10),
    unit("s", Dimension::Time, 1.0),
    unit("ms", Dimension::Time, 1e-3),
    unit("us", Dimension::Time, 1e-6),
    unit("ns", Dimension::Time, 1e-9),
    unit("ps", Dimension::Time, 1e-12),
    unit("min", Dimension::Time, 60.0),
    unit("hour", Dimension::Time, 3600.0),
    unit("kg", Dimension::Mass, 1.0),
    unit("g", Dimension::Mass, 1e-3),
    unit("mg", Dimension::Mass, 1e-6),
    unit("rad", Dimension::Angle, 1.0),
    unit("mrad", Dimension::Angle, 1e-3),
    unit("deg", Dimension::Angle, std::f64::consts::PI / 180.0),
    unit("J", Dimension::Energy, 1.0),
    unit("eV", Dimension::Energy, ELECTRON_VOLT),
    unit("meV", Dimension::Energy, ELECTRON_VOLT * 1e-3),
    unit("ueV", Dimension::Energy, ELECTRON_VOLT * 1e-6),
    unit("keV", Dimension::Energy, ELECTRON_VOLT * 1e3),
    unit("K", Dimension::Temperature, 1.0),
    unit("mK", Dimension::Temperature, 1e-3),
    unit("Hz", Dimension::Frequency, 1.0),
    unit("kHz", Dimension::Frequency, 1e3),
    unit("MHz", Dimension::Frequency, 1e6),
    unit("GHz", Dimension::Frequency, 1e9),
    unit("THz", Dimension::Frequency, 1e12),
];

/// Look a unit symbol up in the table
pub fn lookup(symbol: &str) -> Result<Unit, UnitError> {
    let symbol = symbol.trim();
    UNITS
        .iter()
        .find(|u| u.symbol == symbol)
        .copied()
        .ok_or_else(|| UnitError::UnknownUnit(symbol.to_string()))
}

/// Factor `f` such that `value_in_from * f == value_in_to`
///
/// # Examples
///
/// ```
/// use easycore::variables::units::conversion_factor;
///
/// assert_eq!(conversion_factor("m", "cm").unwrap(), 100.0);
/// assert!(conversion_factor("m", "s").is_err());
/// ```
pub fn conversion_factor(from: &str, to: &str) -> Result<f64, UnitError> {
    let source = lookup(from)?;
    let target = lookup(to)?;
    if source.dimension != target.dimension {
        return Err(UnitError::Incompatible {
            from: from.to_string(),
            from_dim: source.dimension,
            to: to.to_string(),
            to_dim: target.dimension,
        });
    }
    Ok(source.scale / target.scale)
}

/// All table symbols sharing the dimension of `symbol`, itself included
pub fn compatible_units(symbol: &str) -> Result<Vec<&'static str>, UnitError> {
    let dimension = lookup(symbol)?.dimension;
    Ok(UNITS
        .iter()
        .filter(|u| u.dimension == dimension)
        .map(|u| u.symbol)
        .collect())
}
