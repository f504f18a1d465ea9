//! mqk-rb-config (ambient)
//!
//! `RebalanceConfig`: the full Configuration surface from spec.md §3
//! (Selection/Bucket/Sizing/Grace/Holding/Whipsaw/Core groups), layered
//! YAML/JSON loading with deep-merge, canonical (sorted-key) serialization
//! with a SHA-256 content hash, and `validate()` raising the Configuration
//! errors in spec.md §7.
//!
//! Grounded directly on `mqk-config::load_layered_yaml`/`deep_merge`/
//! `canonicalize_json` (ported near-verbatim), generalized from a bare
//! `serde_json::Value` merge to a typed `RebalanceConfig` via a
//! merge-then-deserialize step, with `validate()` and a `to_domain()`
//! conversion into each pipeline crate's own config type added on top.

mod domain;
mod merge;

pub use domain::DomainConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use mqk_rb_types::{ResidualStrategy, SizingMode};

/// Selection-stage options (spec.md §3 "Selection").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub max_total_positions: usize,
    pub max_new_positions: usize,
    pub min_score_threshold: f64,
    pub min_score_new_position: f64,
    pub min_trending_confidence: f64,
    pub technical_weight: f64,
    pub fundamental_weight: f64,
    pub enable_technical: bool,
    pub enable_fundamental: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_total_positions: 20,
            max_new_positions: 5,
            min_score_threshold: 0.60,
            min_score_new_position: 0.70,
            min_trending_confidence: 0.5,
            technical_weight: 0.6,
            fundamental_weight: 0.4,
            enable_technical: true,
            enable_fundamental: true,
        }
    }
}

/// Bucket-diversification options (spec.md §3 "Bucket").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketGroupConfig {
    pub enable_bucket_diversification: bool,
    pub max_positions_per_bucket: usize,
    pub max_allocation_per_bucket: f64,
    pub min_buckets_represented: usize,
    pub allow_bucket_overflow: bool,
    /// Accepted but unenforced: spec.md §6 names no correlation-data
    /// collaborator this crate could consult (see DESIGN.md).
    pub correlation_limit: f64,
}

impl Default for BucketGroupConfig {
    fn default() -> Self {
        let d = mqk_rb_buckets::BucketConfig::default();
        Self {
            enable_bucket_diversification: d.enable_bucket_diversification,
            max_positions_per_bucket: d.max_positions_per_bucket,
            max_allocation_per_bucket: d.max_allocation_per_bucket,
            min_buckets_represented: d.min_buckets_represented,
            allow_bucket_overflow: d.allow_bucket_overflow,
            correlation_limit: 0.80,
        }
    }
}

/// Position-sizing options (spec.md §3 "Sizing").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingGroupConfig {
    pub enable_dynamic_sizing: bool,
    pub sizing_mode: SizingMode,
    pub max_single_position: f64,
    pub min_position_size: f64,
    pub target_total_allocation: f64,
    pub residual_strategy: ResidualStrategy,
    pub max_residual_per_asset: f64,
    pub max_residual_multiple: f64,
    pub enable_two_stage_sizing: bool,
    pub max_iterations: usize,
}

impl Default for SizingGroupConfig {
    fn default() -> Self {
        let d = mqk_rb_sizing::SizingConfig::default();
        Self {
            enable_dynamic_sizing: d.enable_dynamic_sizing,
            sizing_mode: d.sizing_mode,
            max_single_position: d.max_single_position,
            min_position_size: d.min_position_size,
            target_total_allocation: d.target_total_allocation,
            residual_strategy: d.residual_strategy,
            max_residual_per_asset: d.max_residual_per_asset,
            max_residual_multiple: d.max_residual_multiple,
            enable_two_stage_sizing: d.enable_two_stage_sizing,
            max_iterations: d.max_iterations,
        }
    }
}

/// Grace-period options (spec.md §3 "Grace").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraceGroupConfig {
    pub enable_grace_periods: bool,
    pub grace_period_days: i64,
    pub grace_decay_rate: f64,
    pub min_decay_factor: f64,
}

impl Default for GraceGroupConfig {
    fn default() -> Self {
        let d = mqk_rb_grace::GraceConfig::default();
        Self {
            enable_grace_periods: d.enable_grace_period,
            grace_period_days: d.grace_period_days,
            grace_decay_rate: d.grace_decay_rate,
            min_decay_factor: d.min_decay_factor,
        }
    }
}

/// Holding-period options (spec.md §3 "Holding").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoldingGroupConfig {
    pub min_holding_period_days: i64,
    pub max_holding_period_days: i64,
    pub enable_regime_overrides: bool,
    pub regime_override_cooldown_days: i64,
    pub regime_severity_threshold: RegimeSeverityWire,
}

impl Default for HoldingGroupConfig {
    fn default() -> Self {
        let d = mqk_rb_holding::HoldingConfig::default();
        Self {
            min_holding_period_days: d.min_holding_period_days,
            max_holding_period_days: d.max_holding_period_days,
            enable_regime_overrides: d.enable_regime_overrides,
            regime_override_cooldown_days: d.override_cooldown_days,
            regime_severity_threshold: d.regime_severity_threshold.into(),
        }
    }
}

/// Whipsaw-protection options (spec.md §3 "Whipsaw").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhipsawGroupConfig {
    pub enable_whipsaw_protection: bool,
    pub max_cycles_per_protection_period: usize,
    pub whipsaw_protection_days: i64,
    pub min_position_duration_hours: i64,
}

impl Default for WhipsawGroupConfig {
    fn default() -> Self {
        let d = mqk_rb_whipsaw::WhipsawConfig::default();
        Self {
            enable_whipsaw_protection: true,
            max_cycles_per_protection_period: d.max_cycles_per_protection_period,
            whipsaw_protection_days: d.whipsaw_protection_days,
            min_position_duration_hours: d.min_position_duration_hours,
        }
    }
}

/// Core-asset options (spec.md §3 "Core").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreGroupConfig {
    pub enable_core_asset_management: bool,
    pub core_asset_override_threshold: f64,
    pub core_asset_expiry_days: i64,
    pub core_asset_underperformance_threshold: f64,
    pub core_asset_underperformance_period: i64,
    pub max_core_assets: usize,
    pub core_asset_extension_limit: u32,
    pub core_asset_performance_check_frequency: i64,
}

impl Default for CoreGroupConfig {
    fn default() -> Self {
        let d = mqk_rb_core_asset::CoreAssetConfig::default();
        Self {
            enable_core_asset_management: true,
            core_asset_override_threshold: d.core_asset_override_threshold,
            core_asset_expiry_days: d.core_asset_expiry_days,
            core_asset_underperformance_threshold: d.core_asset_underperformance_threshold,
            core_asset_underperformance_period: d.core_asset_underperformance_period,
            max_core_assets: d.max_core_assets,
            core_asset_extension_limit: d.core_asset_extension_limit,
            core_asset_performance_check_frequency: d.core_asset_performance_check_frequency,
        }
    }
}

/// Wire mirror of `mqk_rb_regime::RegimeSeverity`, kept distinct from it so
/// this crate's wire format doesn't change shape if the domain enum ever
/// grows a variant the config surface shouldn't expose yet.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeSeverityWire {
    Normal,
    High,
    Critical,
}

impl From<mqk_rb_regime::RegimeSeverity> for RegimeSeverityWire {
    fn from(s: mqk_rb_regime::RegimeSeverity) -> Self {
        match s {
            mqk_rb_regime::RegimeSeverity::Normal => Self::Normal,
            mqk_rb_regime::RegimeSeverity::High => Self::High,
            mqk_rb_regime::RegimeSeverity::Critical => Self::Critical,
        }
    }
}

impl From<RegimeSeverityWire> for mqk_rb_regime::RegimeSeverity {
    fn from(s: RegimeSeverityWire) -> Self {
        match s {
            RegimeSeverityWire::Normal => Self::Normal,
            RegimeSeverityWire::High => Self::High,
            RegimeSeverityWire::Critical => Self::Critical,
        }
    }
}

/// The full configuration surface, grouped exactly as spec.md §3 groups it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RebalanceConfig {
    pub selection: SelectionConfig,
    pub bucket: BucketGroupConfig,
    pub sizing: SizingGroupConfig,
    pub grace: GraceGroupConfig,
    pub holding: HoldingGroupConfig,
    pub whipsaw: WhipsawGroupConfig,
    pub core: CoreGroupConfig,
}

/// Raised by `validate()`: fatal at startup per spec.md §7.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    BothAnalyzerChannelsDisabled,
    NegativeWeight { field: &'static str, value_bits: u64 },
    MaxNewExceedsMaxTotal { max_new: usize, max_total: usize },
    NonPositiveTargetAllocation { value_bits: u64 },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BothAnalyzerChannelsDisabled => {
                write!(f, "configuration error: enable_technical and enable_fundamental cannot both be false")
            }
            Self::NegativeWeight { field, value_bits } => {
                write!(f, "configuration error: {field} must be >= 0, got {}", f64::from_bits(*value_bits))
            }
            Self::MaxNewExceedsMaxTotal { max_new, max_total } => write!(
                f,
                "configuration error: max_new_positions ({max_new}) must not exceed max_total_positions ({max_total})"
            ),
            Self::NonPositiveTargetAllocation { value_bits } => {
                write!(f, "configuration error: target_total_allocation must be > 0, got {}", f64::from_bits(*value_bits))
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl RebalanceConfig {
    /// Validate and normalize in place. Per spec.md §6/§7: both analyzer
    /// channels disabled is fatal; negative weights are fatal;
    /// `max_new_positions > max_total_positions` is fatal; weights that
    /// don't sum to 1 are normalized with a warning rather than rejected.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if !self.selection.enable_technical && !self.selection.enable_fundamental {
            return Err(ConfigError::BothAnalyzerChannelsDisabled);
        }
        if self.selection.technical_weight < 0.0 {
            return Err(ConfigError::NegativeWeight {
                field: "selection.technical_weight",
                value_bits: self.selection.technical_weight.to_bits(),
            });
        }
        if self.selection.fundamental_weight < 0.0 {
            return Err(ConfigError::NegativeWeight {
                field: "selection.fundamental_weight",
                value_bits: self.selection.fundamental_weight.to_bits(),
            });
        }
        if self.selection.max_new_positions > self.selection.max_total_positions {
            return Err(ConfigError::MaxNewExceedsMaxTotal {
                max_new: self.selection.max_new_positions,
                max_total: self.selection.max_total_positions,
            });
        }
        if self.sizing.target_total_allocation <= 0.0 {
            return Err(ConfigError::NonPositiveTargetAllocation {
                value_bits: self.sizing.target_total_allocation.to_bits(),
            });
        }

        let sum = self.selection.technical_weight + self.selection.fundamental_weight;
        if (sum - 1.0).abs() > 1e-9 {
            if sum > 0.0 {
                tracing::warn!(
                    technical_weight = self.selection.technical_weight,
                    fundamental_weight = self.selection.fundamental_weight,
                    "analysis weights do not sum to 1, normalizing"
                );
                self.selection.technical_weight /= sum;
                self.selection.fundamental_weight /= sum;
            } else {
                tracing::warn!("analysis weights both zero, falling back to equal split");
                self.selection.technical_weight = 0.5;
                self.selection.fundamental_weight = 0.5;
            }
        }

        Ok(())
    }

    /// Canonical (sorted-key) JSON rendering used for the content hash and
    /// the round-trip law (spec.md §8).
    pub fn to_canonical_json(&self) -> Result<String> {
        let value = serde_json::to_value(self).context("serialize RebalanceConfig")?;
        Ok(merge::canonicalize(&value))
    }

    pub fn config_hash(&self) -> Result<String> {
        let canonical = self.to_canonical_json()?;
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    /// Round-trip: canonical JSON -> `RebalanceConfig`. Semantically equal
    /// to `self` after normalization (spec.md §8's round-trip law).
    pub fn from_canonical_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).context("parse canonical RebalanceConfig JSON")
    }

    /// Load and deep-merge layered YAML/JSON files (later files override
    /// earlier ones), then deserialize into a typed `RebalanceConfig`.
    /// Grounded on `mqk-config::load_layered_yaml`.
    pub fn load_layered(paths: &[&str]) -> Result<LoadedRebalanceConfig> {
        let mut merged = Value::Object(Default::default());
        for p in paths {
            let text = std::fs::read_to_string(p).with_context(|| format!("read config: {p}"))?;
            let yaml_val: serde_yaml::Value =
                serde_yaml::from_str(&text).with_context(|| format!("parse yaml: {p}"))?;
            let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
            merge::deep_merge(&mut merged, json_val);
        }

        let canonical = merge::canonicalize(&merged);
        let config: RebalanceConfig =
            serde_json::from_str(&canonical).context("deserialize merged RebalanceConfig")?;

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let config_hash = hex::encode(hasher.finalize());

        Ok(LoadedRebalanceConfig {
            config,
            canonical_json: canonical,
            config_hash,
        })
    }
}

/// Result of `RebalanceConfig::load_layered`.
#[derive(Debug, Clone)]
pub struct LoadedRebalanceConfig {
    pub config: RebalanceConfig,
    pub canonical_json: String,
    pub config_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate_cleanly() {
        let mut config = RebalanceConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn both_channels_disabled_is_fatal() {
        let mut config = RebalanceConfig::default();
        config.selection.enable_technical = false;
        config.selection.enable_fundamental = false;
        assert_eq!(config.validate().unwrap_err(), ConfigError::BothAnalyzerChannelsDisabled);
    }

    #[test]
    fn negative_weight_is_fatal() {
        let mut config = RebalanceConfig::default();
        config.selection.technical_weight = -0.1;
        assert!(matches!(config.validate().unwrap_err(), ConfigError::NegativeWeight { .. }));
    }

    #[test]
    fn max_new_over_max_total_is_fatal() {
        let mut config = RebalanceConfig::default();
        config.selection.max_total_positions = 5;
        config.selection.max_new_positions = 10;
        assert!(matches!(config.validate().unwrap_err(), ConfigError::MaxNewExceedsMaxTotal { .. }));
    }

    #[test]
    fn mismatched_weights_are_normalized_not_rejected() {
        let mut config = RebalanceConfig::default();
        config.selection.technical_weight = 0.9;
        config.selection.fundamental_weight = 0.9;
        config.validate().unwrap();
        assert!((config.selection.technical_weight - 0.5).abs() < 1e-9);
        assert!((config.selection.fundamental_weight - 0.5).abs() < 1e-9);
    }

    #[test]
    fn round_trip_law_holds_after_normalization() {
        let mut config = RebalanceConfig::default();
        config.selection.technical_weight = 0.8;
        config.selection.fundamental_weight = 0.8;
        config.validate().unwrap();

        let json = config.to_canonical_json().unwrap();
        let restored = RebalanceConfig::from_canonical_json(&json).unwrap();
        assert_eq!(config, restored);
    }

    #[test]
    fn config_hash_is_deterministic_for_equal_configs() {
        let a = RebalanceConfig::default();
        let b = RebalanceConfig::default();
        assert_eq!(a.config_hash().unwrap(), b.config_hash().unwrap());
    }

    #[test]
    fn layered_load_deep_merges_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.yaml");
        let override_file = dir.path().join("override.yaml");

        let mut f = std::fs::File::create(&base).unwrap();
        writeln!(f, "selection:\n  max_total_positions: 20\n  min_score_threshold: 0.6").unwrap();
        let mut f = std::fs::File::create(&override_file).unwrap();
        writeln!(f, "selection:\n  max_total_positions: 30").unwrap();

        let loaded = RebalanceConfig::load_layered(&[base.to_str().unwrap(), override_file.to_str().unwrap()]).unwrap();
        assert_eq!(loaded.config.selection.max_total_positions, 30);
        assert!((loaded.config.selection.min_score_threshold - 0.6).abs() < 1e-9);
        assert_eq!(loaded.config_hash.len(), 64);
    }
}
