//! Conversion from the serde-facing [`crate::RebalanceConfig`] into each
//! pipeline crate's own (serde-free) config type.

use crate::RebalanceConfig;

/// One converted config value per pipeline stage that needs one, plus the
/// `enable_*` flags the engine uses to decide whether to consult C7/C8 at
/// all (those two crates have no "enabled" concept of their own — running
/// or skipping them is an orchestration decision, per DESIGN.md).
#[derive(Clone, Debug, PartialEq)]
pub struct DomainConfig {
    pub scoring: mqk_rb_scoring::ScoringConfig,
    pub bucket: mqk_rb_buckets::BucketConfig,
    pub sizing: mqk_rb_sizing::SizingConfig,
    pub grace: mqk_rb_grace::GraceConfig,
    pub holding: mqk_rb_holding::HoldingConfig,
    pub whipsaw: mqk_rb_whipsaw::WhipsawConfig,
    pub core_asset: mqk_rb_core_asset::CoreAssetConfig,
    pub protection: mqk_rb_protection::ProtectionConfig,
    pub enable_whipsaw_protection: bool,
    pub enable_core_asset_management: bool,
    pub max_total_positions: usize,
    pub max_new_positions: usize,
    pub min_score_threshold: f64,
    pub min_score_new_position: f64,
    pub min_trending_confidence: f64,
    pub enable_technical: bool,
    pub enable_fundamental: bool,
}

impl RebalanceConfig {
    /// Build the per-stage domain config values this crate's pipeline
    /// crates actually consume. Call after `validate()`.
    pub fn to_domain(&self) -> DomainConfig {
        let mut scoring = mqk_rb_scoring::ScoringConfig {
            technical_weight: self.selection.technical_weight,
            fundamental_weight: self.selection.fundamental_weight,
            ..mqk_rb_scoring::ScoringConfig::default()
        };
        if !self.selection.enable_technical {
            scoring.technical_weight = 0.0;
        }
        if !self.selection.enable_fundamental {
            scoring.fundamental_weight = 0.0;
        }

        let bucket = mqk_rb_buckets::BucketConfig {
            enable_bucket_diversification: self.bucket.enable_bucket_diversification,
            max_positions_per_bucket: self.bucket.max_positions_per_bucket,
            max_allocation_per_bucket: self.bucket.max_allocation_per_bucket,
            min_buckets_represented: self.bucket.min_buckets_represented,
            allow_bucket_overflow: self.bucket.allow_bucket_overflow,
            target_total_allocation: self.sizing.target_total_allocation,
        };

        let sizing = mqk_rb_sizing::SizingConfig {
            enable_dynamic_sizing: self.sizing.enable_dynamic_sizing,
            enable_two_stage_sizing: self.sizing.enable_two_stage_sizing,
            sizing_mode: self.sizing.sizing_mode,
            max_single_position: self.sizing.max_single_position,
            min_position_size: self.sizing.min_position_size,
            target_total_allocation: self.sizing.target_total_allocation,
            residual_strategy: self.sizing.residual_strategy,
            max_residual_per_asset: self.sizing.max_residual_per_asset,
            max_residual_multiple: self.sizing.max_residual_multiple,
            max_iterations: self.sizing.max_iterations,
        };

        let grace = mqk_rb_grace::GraceConfig {
            enable_grace_period: self.grace.enable_grace_periods,
            grace_period_days: self.grace.grace_period_days,
            grace_decay_rate: self.grace.grace_decay_rate,
            min_decay_factor: self.grace.min_decay_factor,
            min_score_threshold: self.selection.min_score_threshold,
        };

        let holding = mqk_rb_holding::HoldingConfig {
            min_holding_period_days: self.holding.min_holding_period_days,
            max_holding_period_days: self.holding.max_holding_period_days,
            enable_regime_overrides: self.holding.enable_regime_overrides,
            regime_severity_threshold: self.holding.regime_severity_threshold.into(),
            override_cooldown_days: self.holding.regime_override_cooldown_days,
        };

        let whipsaw = mqk_rb_whipsaw::WhipsawConfig {
            whipsaw_protection_days: self.whipsaw.whipsaw_protection_days,
            max_cycles_per_protection_period: self.whipsaw.max_cycles_per_protection_period,
            min_position_duration_hours: self.whipsaw.min_position_duration_hours,
        };

        let core_asset = mqk_rb_core_asset::CoreAssetConfig {
            max_core_assets: self.core.max_core_assets,
            core_asset_expiry_days: self.core.core_asset_expiry_days,
            core_asset_extension_limit: self.core.core_asset_extension_limit,
            core_asset_performance_check_frequency: self.core.core_asset_performance_check_frequency,
            core_asset_underperformance_period: self.core.core_asset_underperformance_period,
            core_asset_underperformance_threshold: self.core.core_asset_underperformance_threshold,
            core_asset_override_threshold: self.core.core_asset_override_threshold,
        };

        let protection = mqk_rb_protection::ProtectionConfig {
            enable_regime_overrides: self.holding.enable_regime_overrides,
            regime_severity_threshold: self.holding.regime_severity_threshold.into(),
            override_cooldown_days: self.holding.regime_override_cooldown_days,
        };

        DomainConfig {
            scoring,
            bucket,
            sizing,
            grace,
            holding,
            whipsaw,
            core_asset,
            protection,
            enable_whipsaw_protection: self.whipsaw.enable_whipsaw_protection,
            enable_core_asset_management: self.core.enable_core_asset_management,
            max_total_positions: self.selection.max_total_positions,
            max_new_positions: self.selection.max_new_positions,
            min_score_threshold: self.selection.min_score_threshold,
            min_score_new_position: self.selection.min_score_new_position,
            min_trending_confidence: self.selection.min_trending_confidence,
            enable_technical: self.selection.enable_technical,
            enable_fundamental: self.selection.enable_fundamental,
        }
    }
}
