//! Construction parameters for built-in nodes.
//!
//! Parameters are a flat name → number map, deserialized straight from a
//! session file's `params` table. Each factory reads the names it knows and
//! range-checks them; unknown names are rejected by the registry before the
//! factory runs.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while reading node parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    /// The value lies outside the accepted range.
    #[error("parameter '{name}' = {value} is outside {min}..={max}")]
    OutOfRange {
        /// Parameter name.
        name: String,
        /// Offending value.
        value: f64,
        /// Smallest accepted value.
        min: f64,
        /// Largest accepted value.
        max: f64,
    },

    /// A count or index was given a fractional value.
    #[error("parameter '{name}' must be a whole number, got {value}")]
    NotAnInteger {
        /// Parameter name.
        name: String,
        /// Offending value.
        value: f64,
    },

    /// The node has no parameter of this name.
    #[error("unknown parameter '{0}'")]
    Unknown(String),
}

/// Named numeric parameters passed to a node factory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeParams(BTreeMap<String, f64>);

impl NodeParams {
    /// Empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a parameter, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    /// Raw value of a parameter.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Parameter names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no parameter is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reads a float, falling back to `default` when absent.
    pub fn float(
        &self,
        name: &str,
        default: f32,
        range: RangeInclusive<f64>,
    ) -> Result<f32, ParamError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => Ok(check_range(name, value, &range)? as f32),
        }
    }

    /// Reads a whole number, falling back to `default` when absent.
    pub fn count(
        &self,
        name: &str,
        default: usize,
        range: RangeInclusive<usize>,
    ) -> Result<usize, ParamError> {
        let Some(value) = self.get(name) else {
            return Ok(default);
        };
        if value.fract() != 0.0 {
            return Err(ParamError::NotAnInteger {
                name: name.to_owned(),
                value,
            });
        }
        let range = (*range.start() as f64)..=(*range.end() as f64);
        Ok(check_range(name, value, &range)? as usize)
    }

    /// Fails on the first parameter not listed in `known`.
    pub fn check_known(&self, known: &[&str]) -> Result<(), ParamError> {
        match self.names().find(|name| !known.contains(name)) {
            Some(name) => Err(ParamError::Unknown(name.to_owned())),
            None => Ok(()),
        }
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for NodeParams {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

fn check_range(name: &str, value: f64, range: &RangeInclusive<f64>) -> Result<f64, ParamError> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ParamError::OutOfRange {
            name: name.to_owned(),
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_absent() {
        let params = NodeParams::new();
        assert_eq!(params.float("gain", 0.5, 0.0..=1.0), Ok(0.5));
        assert_eq!(params.count("channels", 2, 1..=16), Ok(2));
    }

    #[test]
    fn test_range_checks() {
        let params = NodeParams::new().with("gain", 3.0).with("channels", 1.5);
        assert!(matches!(
            params.float("gain", 1.0, 0.0..=2.0),
            Err(ParamError::OutOfRange { max, .. }) if max == 2.0
        ));
        assert!(matches!(
            params.count("channels", 2, 1..=16),
            Err(ParamError::NotAnInteger { .. })
        ));
    }

    #[test]
    fn test_check_known() {
        let params: NodeParams = [("frequency", 440.0), ("phase", 0.0)].into_iter().collect();
        assert_eq!(params.check_known(&["frequency", "phase"]), Ok(()));
        assert_eq!(
            params.check_known(&["frequency"]),
            Err(ParamError::Unknown("phase".into()))
        );
    }

    #[test]
    fn test_deserializes_from_json_map() {
        let params: NodeParams = serde_json::from_str(r#"{"value": 0.25, "channels": 1}"#).unwrap();
        assert_eq!(params.get("value"), Some(0.25));
        assert_eq!(params.count("channels", 2, 1..=16), Ok(1));
    }
}
