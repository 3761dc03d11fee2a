//! Trainer hyperparameters and coercion of submitted form values.
//!
//! Two sets of defaults exist on purpose: the web form seeds its inputs from
//! `config::PARAM_DETAILS` (small, quick-feedback values), while
//! `Hyperparameters::default()` carries the full-scale training defaults
//! used when the user keeps the "library defaults" toggle on.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::config::{ParamDetail, PARAM_DETAILS};

#[derive(Debug, Error)]
pub enum HyperparamError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("unknown hyperparameter: {0}")]
    Unknown(String),
}

/// Full hyperparameter set consumed by the training loop.
#[derive(Debug, Clone)]
pub struct Hyperparameters {
    pub learning_rate: f64,
    pub gamma: f64,
    pub buffer_size: usize,
    pub batch_size: usize,
    pub learning_starts: usize,
    pub exploration_fraction: f64,
    pub exploration_final_eps: f64,
    pub target_update_interval: usize,
    pub train_freq: usize,
    pub gradient_steps: usize,
    pub total_timesteps: usize,
    pub eval_freq: usize,
    pub n_eval_episodes: usize,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            learning_rate: 1e-4,
            gamma: 0.99,
            buffer_size: 100_000,
            batch_size: 32,
            learning_starts: 100_000,
            exploration_fraction: 0.1,
            exploration_final_eps: 0.01,
            target_update_interval: 1_000,
            train_freq: 4,
            gradient_steps: 1,
            total_timesteps: 10_000_000,
            eval_freq: 50_000,
            n_eval_episodes: 10,
        }
    }
}

impl Hyperparameters {
    /// Apply one named override. Names follow `PARAM_DETAILS` keys.
    pub fn apply(&mut self, name: &str, value: ParamValue) -> Result<(), HyperparamError> {
        match name {
            "learning_rate" => self.learning_rate = value.as_float(),
            "gamma" => self.gamma = value.as_float(),
            "exploration_fraction" => self.exploration_fraction = value.as_float(),
            "exploration_final_eps" => self.exploration_final_eps = value.as_float(),
            "learning_starts" => self.learning_starts = value.as_int(),
            "buffer_size" => self.buffer_size = value.as_int(),
            "batch_size" => self.batch_size = value.as_int(),
            "target_update_interval" => self.target_update_interval = value.as_int(),
            other => return Err(HyperparamError::Unknown(other.to_string())),
        }
        Ok(())
    }
}

/// A coerced form value: float or integer per the metadata table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
}

impl ParamValue {
    pub fn as_float(self) -> f64 {
        match self {
            ParamValue::Float(v) => v,
            ParamValue::Int(v) => v as f64,
        }
    }

    pub fn as_int(self) -> usize {
        match self {
            ParamValue::Float(v) => v as usize,
            ParamValue::Int(v) => v.max(0) as usize,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
        }
    }
}

/// One coerced override, keyed by its metadata row.
#[derive(Debug, Clone, Copy)]
pub struct ParamOverride {
    pub name: &'static str,
    pub value: ParamValue,
}

/// Coerce submitted form values against `PARAM_DETAILS`.
///
/// Every table entry produces an override: a missing field falls back to the
/// table default, a present field is parsed as float or integer per its
/// metadata. Malformed input is an error rather than a silent default.
pub fn parse_form_overrides(
    form: &HashMap<String, String>,
) -> Result<Vec<ParamOverride>, HyperparamError> {
    PARAM_DETAILS
        .iter()
        .map(|detail| {
            let value = match form.get(detail.name) {
                Some(raw) => coerce(detail, raw)?,
                None => default_value(detail),
            };
            Ok(ParamOverride {
                name: detail.name,
                value,
            })
        })
        .collect()
}

fn default_value(detail: &ParamDetail) -> ParamValue {
    if detail.is_float {
        ParamValue::Float(detail.default)
    } else {
        ParamValue::Int(detail.default as i64)
    }
}

fn coerce(detail: &ParamDetail, raw: &str) -> Result<ParamValue, HyperparamError> {
    let trimmed = raw.trim();
    if detail.is_float {
        trimmed
            .parse::<f64>()
            .map(ParamValue::Float)
            .map_err(|_| HyperparamError::Invalid {
                name: detail.name,
                value: raw.to_string(),
            })
    } else {
        trimmed
            .parse::<i64>()
            .map(ParamValue::Int)
            .map_err(|_| HyperparamError::Invalid {
                name: detail.name,
                value: raw.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_float_fields_parse_floats() {
        let overrides = parse_form_overrides(&form(&[("learning_rate", "0.005")])).unwrap();
        let lr = overrides.iter().find(|o| o.name == "learning_rate").unwrap();
        assert_eq!(lr.value, ParamValue::Float(0.005));
    }

    #[test]
    fn test_integer_fields_parse_integers() {
        let overrides = parse_form_overrides(&form(&[("batch_size", "64")])).unwrap();
        let bs = overrides.iter().find(|o| o.name == "batch_size").unwrap();
        assert_eq!(bs.value, ParamValue::Int(64));
    }

    #[test]
    fn test_missing_fields_use_table_defaults() {
        let overrides = parse_form_overrides(&form(&[])).unwrap();
        let buffer = overrides.iter().find(|o| o.name == "buffer_size").unwrap();
        assert_eq!(buffer.value, ParamValue::Int(50_000));
        let gamma = overrides.iter().find(|o| o.name == "gamma").unwrap();
        assert_eq!(gamma.value, ParamValue::Float(0.99));
    }

    #[test]
    fn test_malformed_value_is_an_error() {
        assert!(parse_form_overrides(&form(&[("gamma", "fast")])).is_err());
        assert!(parse_form_overrides(&form(&[("batch_size", "31.5")])).is_err());
    }

    #[test]
    fn test_overrides_apply_onto_training_defaults() {
        let mut params = Hyperparameters::default();
        for o in parse_form_overrides(&form(&[("learning_rate", "0.01"), ("buffer_size", "2000")]))
            .unwrap()
        {
            params.apply(o.name, o.value).unwrap();
        }
        assert_eq!(params.learning_rate, 0.01);
        assert_eq!(params.buffer_size, 2000);
        // Untouched fields keep the training defaults
        assert_eq!(params.train_freq, 4);
        assert_eq!(params.total_timesteps, 10_000_000);
    }

    #[test]
    fn test_unknown_override_is_rejected() {
        let mut params = Hyperparameters::default();
        assert!(params.apply("momentum", ParamValue::Float(0.9)).is_err());
    }
}
