//! Note versions travel as JSON numbers, and the remote store keeps them as floats.

use serde::Deserializer;
use serde::de::{self, Visitor};
use std::fmt;

/// Accepts `3` or `3.0`; fractional and negative values are rejected.
pub fn integral_version(value: f64) -> Option<i64> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

/// `deserialize_with` helper for version fields.
pub fn deserialize_version<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(VersionVisitor)
}

/// Same as [`deserialize_version`] for optional fields.
pub fn deserialize_optional_version<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_option(OptionalVersionVisitor)
}

struct VersionVisitor;

impl<'de> Visitor<'de> for VersionVisitor {
    type Value = i64;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a non-negative integral version number")
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<i64, E> {
        if value < 0 {
            return Err(E::invalid_value(de::Unexpected::Signed(value), &self));
        }
        Ok(value)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<i64, E> {
        i64::try_from(value).map_err(|_| E::invalid_value(de::Unexpected::Unsigned(value), &self))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<i64, E> {
        integral_version(value).ok_or_else(|| E::invalid_value(de::Unexpected::Float(value), &self))
    }
}

struct OptionalVersionVisitor;

impl<'de> Visitor<'de> for OptionalVersionVisitor {
    type Value = Option<i64>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an optional version number")
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserialize_version(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_floats_are_versions() {
        assert_eq!(integral_version(3.0), Some(3));
        assert_eq!(integral_version(0.0), Some(0));
        assert_eq!(integral_version(2.5), None);
        assert_eq!(integral_version(-1.0), None);
        assert_eq!(integral_version(f64::NAN), None);
    }
}
