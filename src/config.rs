//! Search configuration and parameter metadata
//!
//! [`SearchConfig`] enumerates every option the pipeline recognizes, with its
//! default. It is validated once, when an engine is built or a request brings
//! its own config, and is read-only afterwards.
//!
//! Parameter metadata enables:
//! - Grid search over score weights and barrier thresholds
//! - Loading sparse overrides from a `name -> value` map
//! - Documentation of each option
//!
//! # Example
//!
//! ```rust
//! use shapeseek::config::SearchConfig;
//!
//! let config = SearchConfig::from_toml_str(
//!   r#"
//!   isolation_days = 30
//!   w_dtw = 0.6
//!   faiss_multiplier = 5
//!   "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.isolation_days, 30);
//! assert_eq!(config.coarse_multiplier.get(), 5);
//! assert_eq!(config.w_corr, 0.30);
//! ```

use std::collections::HashMap;
use std::path::Path;

use crate::metrics::MIN_SHAPE_LEN;
use crate::{Period, Ratio, Result, SearchError};

// ============================================================
// SEARCH CONFIG
// ============================================================

/// Every recognized search option
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
  /// Minimum day gap between two accepted matches of the same symbol (0 disables)
  pub isolation_days: u32,
  /// Sakoe-Chiba band half-width
  pub dtw_window: usize,
  pub w_dtw: f64,
  pub w_corr: f64,
  pub w_shape: f64,
  pub w_visual: f64,
  /// Added when trend directions agree, subtracted when they disagree
  pub trend_bonus: f64,
  /// Coarse candidates fetched per requested match
  #[serde(alias = "faiss_multiplier")]
  pub coarse_multiplier: Period,
  /// DTW similarity a candidate needs to count toward the early exit
  pub hq_dtw_threshold: Ratio,
  /// Profit barrier as a fraction of entry; may exceed 1
  pub tb_upper: f64,
  /// Loss barrier as a fraction of entry
  pub tb_lower: f64,
  /// Holding horizon in observations
  pub tb_max_hold: Period,
  /// Length of the sub-windows compared during re-ranking
  pub compare_len: Period,
  /// Score and label candidates on the rayon pool
  pub parallel: bool,
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      isolation_days: 20,
      dtw_window: 5,
      w_dtw: 0.50,
      w_corr: 0.30,
      w_shape: 0.15,
      w_visual: 0.05,
      trend_bonus: 0.08,
      coarse_multiplier: Period::new_const(10),
      hq_dtw_threshold: Ratio::new_const(0.8),
      tb_upper: 0.05,
      tb_lower: 0.03,
      tb_max_hold: Period::new_const(20),
      compare_len: Period::new_const(20),
      parallel: true,
    }
  }
}

/// The composite-score knobs, split out so scoring stays a pure function
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
  pub dtw: f64,
  pub corr: f64,
  pub shape: f64,
  pub visual: f64,
  pub trend_bonus: f64,
}

impl SearchConfig {
  /// Parse a TOML document; absent keys keep their defaults
  pub fn from_toml_str(raw: &str) -> Result<Self> {
    let config: SearchConfig =
      toml::from_str(raw).map_err(|e| SearchError::InvalidConfig(e.to_string()))?;
    config.validate()?;
    Ok(config)
  }

  /// Read and parse a TOML file
  pub fn load(path: &Path) -> Result<Self> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
      SearchError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
    })?;
    Self::from_toml_str(&raw)
  }

  pub fn weights(&self) -> ScoreWeights {
    ScoreWeights {
      dtw: self.w_dtw,
      corr: self.w_corr,
      shape: self.w_shape,
      visual: self.w_visual,
      trend_bonus: self.trend_bonus,
    }
  }

  /// Coarse candidate count for a request of `top_k` matches
  pub fn coarse_k(&self, top_k: usize) -> usize {
    top_k.saturating_mul(self.coarse_multiplier.get())
  }

  /// Check cross-field constraints that the field types cannot express
  pub fn validate(&self) -> Result<()> {
    for (name, value) in [
      ("w_dtw", self.w_dtw),
      ("w_corr", self.w_corr),
      ("w_shape", self.w_shape),
      ("w_visual", self.w_visual),
      ("trend_bonus", self.trend_bonus),
    ] {
      if !value.is_finite() {
        return Err(SearchError::InvalidConfig(format!("{name} must be a finite number")));
      }
      if value < 0.0 {
        return Err(SearchError::InvalidConfig(format!("{name} must be zero or greater")));
      }
    }
    if self.compare_len.get() < MIN_SHAPE_LEN {
      return Err(SearchError::OutOfRange {
        field: "compare_len",
        value: self.compare_len.get() as f64,
        min: MIN_SHAPE_LEN as f64,
        max: f64::INFINITY,
      });
    }
    for (name, value) in [("tb_upper", self.tb_upper), ("tb_lower", self.tb_lower)] {
      if !value.is_finite() || value <= 0.0 {
        return Err(SearchError::InvalidConfig(format!("{name} must be a positive number")));
      }
    }
    Ok(())
  }

  /// Metadata for all numeric options
  pub fn param_meta() -> &'static [ParamMeta] {
    PARAMS
  }

  /// Build a validated config from sparse overrides
  ///
  /// Missing parameters use their default values. Unknown names are rejected.
  pub fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    for name in params.keys() {
      if !PARAMS.iter().any(|p| p.name == *name) {
        return Err(SearchError::InvalidConfig(format!("unknown parameter {name}")));
      }
    }
    for meta in PARAMS {
      if let Some(&value) = params.get(meta.name) {
        meta.validate(value)?;
      }
    }

    let d = Self::default();
    let config = Self {
      isolation_days: get_count(params, "isolation_days", d.isolation_days as usize) as u32,
      dtw_window: get_count(params, "dtw_window", d.dtw_window),
      w_dtw: get_f64(params, "w_dtw", d.w_dtw),
      w_corr: get_f64(params, "w_corr", d.w_corr),
      w_shape: get_f64(params, "w_shape", d.w_shape),
      w_visual: get_f64(params, "w_visual", d.w_visual),
      trend_bonus: get_f64(params, "trend_bonus", d.trend_bonus),
      coarse_multiplier: get_period(params, "coarse_multiplier", d.coarse_multiplier.get())?,
      hq_dtw_threshold: get_ratio(params, "hq_dtw_threshold", d.hq_dtw_threshold.get())?,
      tb_upper: get_f64(params, "tb_upper", d.tb_upper),
      tb_lower: get_f64(params, "tb_lower", d.tb_lower),
      tb_max_hold: get_period(params, "tb_max_hold", d.tb_max_hold.get())?,
      compare_len: get_period(params, "compare_len", d.compare_len.get())?,
      parallel: d.parallel,
    };
    config.validate()?;
    Ok(config)
  }
}

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
  /// Non-negative score weight, not required to sum to 1 with the others
  Weight,
  /// Ratio value (0.0..=1.0)
  Ratio,
  /// Positive fraction of an entry price, may exceed 1
  Barrier,
  /// Positive integer
  Period,
  /// Non-negative integer (0 allowed)
  Count,
}

/// Metadata for a single config parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "w_dtw")
  pub name: &'static str,
  pub kind: ParamKind,
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn weight(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, kind: ParamKind::Weight, default, range, description }
  }

  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, kind: ParamKind::Ratio, default, range, description }
  }

  pub const fn barrier(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, kind: ParamKind::Barrier, default, range, description }
  }

  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, kind: ParamKind::Period, default, range, description }
  }

  pub const fn count(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, kind: ParamKind::Count, default, range, description }
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
    if !value.is_finite() {
      return Err(SearchError::InvalidValue("parameter must be finite"));
    }
    if value < min || value > max {
      return Err(SearchError::OutOfRange { field: self.name, value, min, max });
    }
    match self.kind {
      ParamKind::Weight | ParamKind::Ratio => Ok(()),
      ParamKind::Barrier => {
        if value <= 0.0 {
          return Err(SearchError::InvalidValue("Barrier must be greater than zero"));
        }
        Ok(())
      },
      ParamKind::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(SearchError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
      ParamKind::Count => {
        if value.fract() != 0.0 {
          return Err(SearchError::InvalidValue("Count must be an integer"));
        }
        Ok(())
      },
    }
  }
}

static PARAMS: &[ParamMeta] = &[
  ParamMeta::count("isolation_days", 20.0, (0.0, 120.0, 5.0), "Temporal dedup window in days"),
  ParamMeta::count("dtw_window", 5.0, (0.0, 20.0, 1.0), "DTW band half-width"),
  ParamMeta::weight("w_dtw", 0.50, (0.0, 1.0, 0.05), "Weight of DTW similarity"),
  ParamMeta::weight("w_corr", 0.30, (0.0, 1.0, 0.05), "Weight of Pearson correlation"),
  ParamMeta::weight("w_shape", 0.15, (0.0, 1.0, 0.05), "Weight of shape-feature similarity"),
  ParamMeta::weight("w_visual", 0.05, (0.0, 1.0, 0.05), "Weight of raw index similarity"),
  ParamMeta::weight("trend_bonus", 0.08, (0.0, 0.3, 0.02), "Trend agreement adjustment"),
  ParamMeta::period("coarse_multiplier", 10.0, (1.0, 50.0, 1.0), "Coarse hits per requested match"),
  ParamMeta::ratio("hq_dtw_threshold", 0.8, (0.5, 1.0, 0.05), "Early-exit quality bar"),
  ParamMeta::barrier("tb_upper", 0.05, (0.01, 2.0, 0.01), "Profit barrier"),
  ParamMeta::barrier("tb_lower", 0.03, (0.01, 1.0, 0.01), "Loss barrier"),
  ParamMeta::period("tb_max_hold", 20.0, (1.0, 120.0, 1.0), "Barrier horizon"),
  ParamMeta::period("compare_len", 20.0, (6.0, 120.0, 1.0), "Re-ranking sub-window length"),
];

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

fn get_f64(params: &HashMap<&str, f64>, key: &str, default: f64) -> f64 {
  params.get(key).copied().unwrap_or(default)
}

fn get_count(params: &HashMap<&str, f64>, key: &str, default: usize) -> usize {
  params.get(key).map(|v| *v as usize).unwrap_or(default)
}

fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  Period::new(value as usize)
}

// ============================================================
// TESTS
// ============================================================
