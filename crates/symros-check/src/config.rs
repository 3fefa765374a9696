use std::env::VarError;
use std::fmt;

use serde::{Deserialize, Serialize};
use symros_ir::{Constant, Type};
use thiserror::Error;

/// Environment variable consulted by [`ThresholdConfig::from_env`].
pub const THRESHOLD_ENV: &str = "SYMROS_SEMANTIC_THRESHOLD";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingEnv(&'static str),

    #[error("invalid value for env var {var}: {reason}")]
    InvalidEnv { var: &'static str, reason: String },

    #[error("semantic threshold must be a finite, non-negative number (got {0})")]
    InvalidThreshold(f64),

    #[error("semantic threshold {0:?} is not a number")]
    Unparsable(String),
}

/// The "semantic" magnitude bound. Results whose magnitude exceeds it are reported as
/// exceptional values.
///
/// Has no `Default`; a run always states its threshold.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ThresholdConfig {
    semantic_threshold: f64,
}

impl ThresholdConfig {
    pub fn new(semantic_threshold: f64) -> Result<Self, ConfigError> {
        if !semantic_threshold.is_finite() || semantic_threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold(semantic_threshold));
        }
        Ok(Self {
            // Normalise -0.0.
            semantic_threshold: semantic_threshold.abs(),
        })
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let value: f64 = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Unparsable(raw.to_string()))?;
        Self::new(value)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_var(std::env::var(THRESHOLD_ENV))
    }

    fn from_var(var: Result<String, VarError>) -> Result<Self, ConfigError> {
        let raw = match var {
            Ok(raw) => raw,
            Err(VarError::NotPresent) => return Err(ConfigError::MissingEnv(THRESHOLD_ENV)),
            Err(VarError::NotUnicode(_)) => {
                return Err(ConfigError::InvalidEnv {
                    var: THRESHOLD_ENV,
                    reason: "not valid unicode".into(),
                })
            }
        };
        Self::parse(&raw).map_err(|err| ConfigError::InvalidEnv {
            var: THRESHOLD_ENV,
            reason: err.to_string(),
        })
    }

    pub fn value(&self) -> f64 {
        self.semantic_threshold
    }

    /// The threshold as an integer constant of `ty`: truncated toward zero and saturated to the
    /// signed maximum of the width.
    pub fn int_bound(&self, ty: Type) -> Constant {
        let max = Constant::signed_max(ty).as_unsigned();
        let t = self.semantic_threshold.trunc();
        let value = if t >= max as f64 { max } else { t as u64 };
        Constant::int(ty, value as i64)
    }

    /// The threshold as a float constant of `ty`, rounded to the type's precision.
    pub fn float_bound(&self, ty: Type) -> Constant {
        Constant::float(ty, self.semantic_threshold)
    }
}

impl TryFrom<f64> for ThresholdConfig {
    type Error = ConfigError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ThresholdConfig> for f64 {
    fn from(cfg: ThresholdConfig) -> Self {
        cfg.semantic_threshold
    }
}

impl fmt::Display for ThresholdConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.semantic_threshold)
    }
}

/// Which checks the instrumenter inserts and what the pass does around it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentOptions {
    /// Instrument `i32` `add`/`sub`/`mul`/`sdiv`/`udiv`.
    pub int_checks: bool,
    /// Instrument float binary operations.
    pub fp_checks: bool,
    /// Write `symros.check` metadata onto every inserted branch.
    pub emit_metadata: bool,
    /// Run the structural verifier before and after instrumentation.
    pub verify: bool,
}

impl Default for InstrumentOptions {
    fn default() -> Self {
        Self {
            int_checks: true,
            fp_checks: true,
            emit_metadata: true,
            verify: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_and_non_finite_thresholds() {
        assert_eq!(
            ThresholdConfig::new(-1.0),
            Err(ConfigError::InvalidThreshold(-1.0))
        );
        assert!(ThresholdConfig::new(f64::INFINITY).is_err());
        assert!(ThresholdConfig::new(f64::NAN).is_err());
        assert_eq!(ThresholdConfig::new(-0.0).unwrap().value(), 0.0);
    }

    #[test]
    fn parses_trimmed_text() {
        assert_eq!(ThresholdConfig::parse(" 100 ").unwrap().value(), 100.0);
        assert_eq!(ThresholdConfig::parse("1e3").unwrap().value(), 1000.0);
        assert_eq!(
            ThresholdConfig::parse("lots"),
            Err(ConfigError::Unparsable("lots".into()))
        );
    }

    #[test]
    fn env_lookup_distinguishes_missing_and_invalid() {
        assert_eq!(
            ThresholdConfig::from_var(Err(VarError::NotPresent)),
            Err(ConfigError::MissingEnv(THRESHOLD_ENV))
        );
        assert!(matches!(
            ThresholdConfig::from_var(Ok("-3".into())),
            Err(ConfigError::InvalidEnv { var: THRESHOLD_ENV, .. })
        ));
        assert_eq!(
            ThresholdConfig::from_var(Ok("42.5".into())).unwrap().value(),
            42.5
        );
    }

    #[test]
    fn int_bound_truncates_and_saturates() {
        let cfg = ThresholdConfig::new(100.9).unwrap();
        assert_eq!(cfg.int_bound(Type::I32).as_signed(), 100);

        let huge = ThresholdConfig::new(1e30).unwrap();
        assert_eq!(huge.int_bound(Type::I32).as_signed(), i64::from(i32::MAX));
        assert_eq!(huge.int_bound(Type::I8).as_signed(), 127);
        assert_eq!(huge.int_bound(Type::I64).as_signed(), i64::MAX);
    }

    #[test]
    fn float_bound_rounds_to_type() {
        let cfg = ThresholdConfig::new(0.1).unwrap();
        assert_eq!(cfg.float_bound(Type::F32).as_f64(), f64::from(0.1f32));
        assert_eq!(cfg.float_bound(Type::F64).as_f64(), 0.1);
    }

    #[test]
    fn serde_rejects_invalid_thresholds() {
        let cfg: ThresholdConfig = serde_json::from_str("7.5").unwrap();
        assert_eq!(cfg.value(), 7.5);
        assert!(serde_json::from_str::<ThresholdConfig>("-1").is_err());
    }
}
