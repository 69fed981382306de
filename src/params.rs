//! Engine configuration and parameter metadata
//!
//! This module provides the recognized configuration options and metadata about them, enabling:
//! - Construction from a loose `name -> value` map (e.g. a sweep harness)
//! - Grid search over the timing ratios
//! - Serde round trips with the camelCase keys used by callers (`riskAmount`, `waitRatio`, ...)
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use blockslope::params::{EngineConfig, CONFIG_PARAMS};
//!
//! for param in CONFIG_PARAMS {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let mut params = HashMap::new();
//! params.insert("wait_ratio", 0.4);
//! let config = EngineConfig::with_params(&params).unwrap();
//! assert_eq!(config.wait_ratio.get(), 0.4);
//! ```

use std::collections::HashMap;

use crate::{EngineError, Minutes, Ratio, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Ratio value (0.0..=1.0)
  Ratio,
  /// Whole minutes (positive integer)
  Minutes,
  /// Money amount (positive, 0 means "not set")
  Amount,
}

/// Metadata for a single configuration parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "wait_ratio")
  pub name: &'static str,
  /// Parameter type
  pub param_type: ParamType,
  /// Default value
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  /// Human-readable description
  pub description: &'static str,
}

impl ParamMeta {
  /// Create a new ParamMeta for a Ratio parameter
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  /// Create a new ParamMeta for a Minutes parameter
  pub const fn minutes(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Minutes, default, range, description }
  }

  /// Create a new ParamMeta for an Amount parameter
  pub const fn amount(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Amount, default, range, description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    let mut v = min;
    while v <= max + f64::EPSILON {
      values.push(v);
      v += step;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value.is_nan() || value < min || value > max {
      return Err(EngineError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio | ParamType::Amount => Ok(()),
      ParamType::Minutes => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(EngineError::InvalidValue("Minutes must be a positive integer"));
        }
        Ok(())
      },
    }
  }
}

/// Every option the engine recognizes, with its default
pub const CONFIG_PARAMS: &[ParamMeta] = &[
  ParamMeta::amount(
    "risk_amount",
    0.0,
    (0.0, 1_000_000.0, 100.0),
    "Risk per trade; quantity = risk / |trigger - stop| (0 disables sizing)",
  ),
  ParamMeta::ratio(
    "duration_rule_threshold",
    DEFAULT_DURATION_RULE,
    (0.30, 0.70, 0.05),
    "Minimum A->B duration as a share of the C1+C2 observation window",
  ),
  ParamMeta::ratio(
    "wait_ratio",
    DEFAULT_WAIT_RATIO,
    (0.10, 0.60, 0.02),
    "Share of the A->B duration to wait after Point B before a trigger may fire",
  ),
  ParamMeta::ratio(
    "timeout_ratio",
    DEFAULT_TIMEOUT_RATIO,
    (0.80, 1.00, 0.01),
    "Share of the 6th candle after which a pending trigger is cancelled",
  ),
  ParamMeta::minutes(
    "min_pattern_duration_minutes",
    DEFAULT_MIN_PATTERN_MINUTES as f64,
    (1.0, 120.0, 1.0),
    "Shortest A->B duration (minutes) worth timing",
  ),
];

pub const DEFAULT_DURATION_RULE: f64 = 0.50;
pub const DEFAULT_WAIT_RATIO: f64 = 0.34;
pub const DEFAULT_TIMEOUT_RATIO: f64 = 0.98;
pub const DEFAULT_MIN_PATTERN_MINUTES: u32 = 10;

/// Look up the metadata for a parameter by name
pub fn param_meta(name: &str) -> Option<&'static ParamMeta> {
  CONFIG_PARAMS.iter().find(|p| p.name == name)
}

// ============================================================
// ENGINE CONFIG
// ============================================================

/// Engine configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
  /// Risk per trade used for sizing; `None` leaves quantity unset
  pub risk_amount: Option<f64>,
  pub duration_rule_threshold: Ratio,
  pub wait_ratio: Ratio,
  pub timeout_ratio: Ratio,
  pub min_pattern_duration_minutes: Minutes,
  /// Reject batches with invalid, unordered or out-of-session candles
  pub validate_data: bool,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      risk_amount: None,
      duration_rule_threshold: Ratio::new_const(DEFAULT_DURATION_RULE),
      wait_ratio: Ratio::new_const(DEFAULT_WAIT_RATIO),
      timeout_ratio: Ratio::new_const(DEFAULT_TIMEOUT_RATIO),
      min_pattern_duration_minutes: Minutes::new_const(DEFAULT_MIN_PATTERN_MINUTES),
      validate_data: true,
    }
  }
}

impl EngineConfig {
  /// Creates a config from a HashMap
  ///
  /// Missing parameters use their default values; `risk_amount <= 0` leaves sizing off.
  pub fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    for (name, value) in params {
      let meta = param_meta(name)
        .ok_or_else(|| EngineError::InvalidConfig(format!("unknown parameter `{name}`")))?;
      meta.validate(*value)?;
    }

    let risk = params.get("risk_amount").copied().unwrap_or(0.0);
    Ok(Self {
      risk_amount: (risk > 0.0).then_some(risk),
      duration_rule_threshold: get_ratio(params, "duration_rule_threshold", DEFAULT_DURATION_RULE)?,
      wait_ratio: get_ratio(params, "wait_ratio", DEFAULT_WAIT_RATIO)?,
      timeout_ratio: get_ratio(params, "timeout_ratio", DEFAULT_TIMEOUT_RATIO)?,
      min_pattern_duration_minutes: get_minutes(
        params,
        "min_pattern_duration_minutes",
        DEFAULT_MIN_PATTERN_MINUTES,
      )?,
      validate_data: true,
    })
  }

  /// Check cross-field constraints the newtypes cannot express
  pub fn validate(&self) -> Result<()> {
    if let Some(risk) = self.risk_amount {
      if !risk.is_finite() || risk <= 0.0 {
        return Err(EngineError::InvalidConfig(format!("riskAmount must be > 0, got {risk}")));
      }
    }
    if self.timeout_ratio.get() <= 0.0 {
      return Err(EngineError::InvalidConfig("timeoutRatio must be > 0".to_string()));
    }
    Ok(())
  }

  /// Whole units to trade for a trigger/stop pair, `None` without a risk amount or
  /// when the two levels coincide.
  pub fn quantity_for(&self, trigger: f64, stop: f64) -> Option<u64> {
    let risk = self.risk_amount?;
    let distance = (trigger - stop).abs();
    if !distance.is_finite() || distance <= f64::EPSILON {
      return None;
    }
    Some((risk / distance).floor() as u64)
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

/// Helper to get Minutes from params with default fallback
pub fn get_minutes(params: &HashMap<&str, f64>, key: &str, default: u32) -> Result<Minutes> {
  let value = params.get(key).copied().unwrap_or(f64::from(default));
  if value.fract() != 0.0 {
    return Err(EngineError::InvalidValue("Minutes must be a positive integer"));
  }
  let max = f64::from(u32::MAX);
  if !(1.0..=max).contains(&value) {
    return Err(EngineError::OutOfRange { field: "minutes", value, min: 1.0, max });
  }
  Minutes::new(value as u32)
}

// ============================================================
// TESTS
// ============================================================
