//! mqk-rb-scoring (C2)
//!
//! Combines the technical and fundamental channels into one `combined ∈
//! [0,1]` score per asset, with effective-weight fallback when a channel is
//! disabled or returns no data for a given asset, a per-regime multiplier,
//! and a portfolio-priority stickiness boost. Per-asset scoring is
//! independent, so it fans out across a bounded `rayon` pool; output order
//! is restored to universe order by relying on `rayon`'s
//! order-preserving `par_iter().map().collect()` over a `Vec` — never on
//! completion order (spec.md §5).

use std::collections::BTreeMap;

use mqk_rb_regime::{Asset, ProviderError, RebalanceDate, Regime, RegimeContext};
use mqk_rb_types::Priority;
use rayon::prelude::*;

/// Optional technical-indicator channel. Returning `Ok(None)` means no data
/// was available for this asset on this date (non-fatal, per-asset).
pub trait TechnicalAnalyzer: Sync {
    fn score(&self, asset: &Asset, date: RebalanceDate) -> Result<Option<f64>, ProviderError>;
}

/// Optional fundamental channel, regime-aware.
pub trait FundamentalAnalyzer: Sync {
    fn score(
        &self,
        asset: &Asset,
        date: RebalanceDate,
        regime: Regime,
    ) -> Result<Option<f64>, ProviderError>;
}

/// Raised at construction when both channels are disabled — a configuration
/// error, rejected before any scoring happens (spec.md §4.2, §7).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScoringError;

impl std::fmt::Display for ScoringError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "both technical and fundamental channels are disabled")
    }
}

impl std::error::Error for ScoringError {}

/// One asset's combined score, with provenance of which channels contributed.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetScore {
    pub asset: Asset,
    pub date: RebalanceDate,
    pub regime: Regime,
    pub technical: Option<f64>,
    pub fundamental: Option<f64>,
    pub combined: f64,
    pub priority: Priority,
    pub is_current_position: bool,
    pub previous_allocation: f64,
}

impl AssetScore {
    /// `true` iff at least one channel contributed no value for this asset
    /// (the other channel's weight absorbed its share).
    pub fn missing_data(&self) -> bool {
        self.technical.is_none() || self.fundamental.is_none()
    }
}

/// A per-asset scoring failure (provider error, not data-absence). Non-fatal:
/// the asset is skipped and the failure logged (spec.md §7).
#[derive(Clone, Debug, PartialEq)]
pub struct AssetScoreError {
    pub asset: Asset,
    pub reason: String,
}

/// Result of scoring a whole universe: the assets that scored successfully,
/// in universe order, plus the assets skipped due to a hard failure (neither
/// channel produced a value, or a channel raised).
#[derive(Clone, Debug, Default)]
pub struct ScoredUniverse {
    pub scores: Vec<AssetScore>,
    pub skipped: Vec<AssetScoreError>,
}

/// Weights and adjustments for C2.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoringConfig {
    /// Configured weight for the technical channel (normalized to sum to 1
    /// with `fundamental_weight` by `mqk-rb-config::validate`).
    pub technical_weight: f64,
    pub fundamental_weight: f64,
    /// Multiplier applied to portfolio-priority assets after the regime
    /// adjustment (Open Question in spec.md §9 — resolved: after).
    pub portfolio_stickiness: f64,
    /// Per-regime-family multiplier; a regime with no entry falls back to
    /// 1.0 (spec.md §4.2's "regime adjustment miss falls back to 1.0").
    pub regime_multipliers: BTreeMap<Regime, f64>,
    /// Caps the worker pool used for the per-asset fan-out. `None` uses
    /// `std::thread::available_parallelism()`.
    pub max_parallelism: Option<usize>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let mut regime_multipliers = BTreeMap::new();
        regime_multipliers.insert(Regime::Goldilocks, 1.00);
        regime_multipliers.insert(Regime::Reflation, 1.01);
        regime_multipliers.insert(Regime::Inflation, 0.99);
        regime_multipliers.insert(Regime::Deflation, 0.97);
        Self {
            technical_weight: 0.6,
            fundamental_weight: 0.4,
            portfolio_stickiness: 1.02,
            regime_multipliers,
            max_parallelism: None,
        }
    }
}

impl ScoringConfig {
    fn regime_multiplier(&self, regime: Regime) -> f64 {
        self.regime_multipliers.get(&regime).copied().unwrap_or(1.0)
    }
}

/// `(technical_weight, fundamental_weight)` in effect for one asset given
/// which channels actually produced a value — spec.md §4.2's fallback rule.
fn effective_weights(cfg: &ScoringConfig, tech_avail: bool, fund_avail: bool) -> (f64, f64) {
    match (tech_avail, fund_avail) {
        (true, true) => (cfg.technical_weight, cfg.fundamental_weight),
        (true, false) => (1.0, 0.0),
        (false, true) => (0.0, 1.0),
        (false, false) => (0.0, 0.0),
    }
}

fn score_one(
    asset: &Asset,
    priority: Priority,
    is_current_position: bool,
    previous_allocation: f64,
    regime_ctx: &RegimeContext,
    technical: Option<&(dyn TechnicalAnalyzer + Sync)>,
    fundamental: Option<&(dyn FundamentalAnalyzer + Sync)>,
    config: &ScoringConfig,
) -> Result<AssetScore, AssetScoreError> {
    let tech = match technical {
        Some(t) => t.score(asset, regime_ctx.date).map_err(|e| AssetScoreError {
            asset: asset.clone(),
            reason: e.to_string(),
        })?,
        None => None,
    };
    let fund = match fundamental {
        Some(f) => f
            .score(asset, regime_ctx.date, regime_ctx.regime)
            .map_err(|e| AssetScoreError {
                asset: asset.clone(),
                reason: e.to_string(),
            })?,
        None => None,
    };

    if tech.is_none() && fund.is_none() {
        return Err(AssetScoreError {
            asset: asset.clone(),
            reason: "missing_data: neither channel produced a score".to_string(),
        });
    }

    let (wt, wf) = effective_weights(config, tech.is_some(), fund.is_some());
    let raw = tech.unwrap_or(0.0) * wt + fund.unwrap_or(0.0) * wf;

    let mut combined = raw * config.regime_multiplier(regime_ctx.regime);
    if priority.is_portfolio() {
        combined *= config.portfolio_stickiness;
    }
    let combined = combined.clamp(0.0, 1.0);

    Ok(AssetScore {
        asset: asset.clone(),
        date: regime_ctx.date,
        regime: regime_ctx.regime,
        technical: tech,
        fundamental: fund,
        combined,
        priority,
        is_current_position,
        previous_allocation,
    })
}

fn build_pool(max_parallelism: Option<usize>) -> rayon::ThreadPool {
    let threads = max_parallelism.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .expect("scoring thread pool build must not fail")
}

/// Score every asset in `universe`, given current `holdings`
/// (identifier -> current allocation).
///
/// Fails only if both channels are absent (a configuration error); per-asset
/// failures are caught, logged, and skipped.
pub fn score_universe(
    universe: &mqk_rb_universe::Universe,
    holdings: &BTreeMap<Asset, f64>,
    technical: Option<&(dyn TechnicalAnalyzer + Sync)>,
    fundamental: Option<&(dyn FundamentalAnalyzer + Sync)>,
    config: &ScoringConfig,
) -> Result<ScoredUniverse, ScoringError> {
    if technical.is_none() && fundamental.is_none() {
        return Err(ScoringError);
    }

    let assets: Vec<&Asset> = universe.assets().collect();
    let pool = build_pool(config.max_parallelism);

    let results: Vec<Result<AssetScore, AssetScoreError>> = pool.install(|| {
        assets
            .par_iter()
            .map(|asset| {
                let priority = universe.priority_of(asset).expect("asset in universe");
                let is_current_position = holdings.contains_key(*asset);
                let previous_allocation = holdings.get(*asset).copied().unwrap_or(0.0);
                score_one(
                    asset,
                    priority,
                    is_current_position,
                    previous_allocation,
                    &universe.regime,
                    technical,
                    fundamental,
                    config,
                )
            })
            .collect()
    });

    let mut scores = Vec::with_capacity(results.len());
    let mut skipped = Vec::new();
    for r in results {
        match r {
            Ok(s) => scores.push(s),
            Err(e) => {
                tracing::warn!(asset = %e.asset, reason = %e.reason, "asset scoring skipped");
                skipped.push(e);
            }
        }
    }

    Ok(ScoredUniverse { scores, skipped })
}
