//! Runtime unit handling for the string-keyed `get`/`set` surface.
//!
//! Quantities could be tagged with compile-time unit markers if callers were
//! all known at compile time, but the kernel's external API is a runtime
//! string reflection surface (`get(name, unit) -> f64`), so units here are a
//! small runtime enum rather than a phantom-typed wrapper — a value tagged
//! with a unit, convertible to a canonical base unit, adapted to a
//! reflective surface.

use std::f64::consts::PI;

/// Recognized unit suffixes for [`crate::object::Object::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// Canonical internal unit: per-unit, radians, etc. No conversion.
    Base,
    PerUnit,
    Kv,
    Mw,
    MVar,
    Deg,
    Rad,
}

impl Unit {
    pub fn parse(name: &str) -> Option<Unit> {
        match name {
            "" | "pu" | "base" => Some(Unit::Base),
            "kv" => Some(Unit::Kv),
            "mw" => Some(Unit::Mw),
            "mvar" => Some(Unit::MVar),
            "deg" => Some(Unit::Deg),
            "rad" => Some(Unit::Rad),
            _ => None,
        }
    }

    /// Converts `value`, expressed in `self`, into the object's base unit.
    pub fn to_base(self, value: f64) -> f64 {
        match self {
            Unit::Deg => value * PI / 180.0,
            _ => value,
        }
    }

    /// Converts `value`, expressed in the object's base unit, into `self`.
    pub fn from_base(self, value: f64) -> f64 {
        match self {
            Unit::Deg => value * 180.0 / PI,
            _ => value,
        }
    }
}

/// Bounds on a value, used for voltage limits, generator PQ limits, etc.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Limit<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> Limit<T> {
    pub fn contains(&self, v: T) -> bool {
        v >= self.min && v <= self.max
    }

    pub fn clamp(&self, v: T) -> T
    where
        T: PartialOrd,
    {
        if v < self.min {
            self.min
        } else if v > self.max {
            self.max
        } else {
            v
        }
    }
}
