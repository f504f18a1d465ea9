use std::collections::BTreeMap;

use mqk_rb_regime::{Asset, RebalanceDate, Regime};
use mqk_rb_scoring::ScoringError;
use mqk_rb_types::{Action, Priority};
use serde::Serialize;

/// Inputs to one `rebalance()` call.
pub struct RebalanceRequest<'a> {
    pub date: RebalanceDate,
    /// Current holdings: identifier -> current allocation fraction.
    pub holdings: &'a BTreeMap<Asset, f64>,
    pub bucket_filter: Option<&'a [String]>,
}

/// One asset's (or `CASH_ASSET`'s) outcome for this rebalance date.
#[derive(Clone, Debug, Serialize)]
pub struct RebalancingTarget {
    pub asset: Asset,
    pub action: Action,
    pub current_alloc: f64,
    pub target_alloc: f64,
    pub priority: Priority,
    pub score: f64,
    pub reason: String,
}

/// Everything computed for one rebalance date, prior to wire shaping.
#[derive(Clone, Debug)]
pub struct RebalanceResult {
    pub date: RebalanceDate,
    pub regime: Regime,
    pub universe_size: usize,
    pub targets: Vec<RebalancingTarget>,
}

/// Fatal failures: per spec.md §7, only a provider outage or a configuration
/// defect aborts the whole call; every other failure mode is per-asset and
/// absorbed into a `Hold`/skip with a logged reason.
#[derive(Clone, Debug)]
pub enum RebalanceError {
    Provider(mqk_rb_regime::ProviderError),
    Scoring(ScoringError),
}

impl std::fmt::Display for RebalanceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provider(e) => write!(f, "{e}"),
            Self::Scoring(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RebalanceError {}

impl From<mqk_rb_regime::ProviderError> for RebalanceError {
    fn from(e: mqk_rb_regime::ProviderError) -> Self {
        Self::Provider(e)
    }
}

impl From<ScoringError> for RebalanceError {
    fn from(e: ScoringError) -> Self {
        Self::Scoring(e)
    }
}

/// Collaborators the engine does not own state for — supplied fresh on each
/// call, per spec.md §4 ("the engine is the sole owner of protection-manager
/// state; everything else is a read-only collaborator").
pub struct Collaborators<'a> {
    pub regime_provider: &'a dyn mqk_rb_regime::RegimeProvider,
    pub bucket_catalog: &'a dyn mqk_rb_regime::BucketCatalog,
    pub price_provider: &'a dyn mqk_rb_regime::PriceProvider,
    pub technical: Option<&'a (dyn mqk_rb_scoring::TechnicalAnalyzer + Sync)>,
    pub fundamental: Option<&'a (dyn mqk_rb_scoring::FundamentalAnalyzer + Sync)>,
}
