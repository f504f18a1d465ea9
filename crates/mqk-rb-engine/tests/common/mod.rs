//! Shared fakes for the scenario tests in this directory. Not a test binary
//! itself (the `tests/common/` layout keeps `cargo test` from trying to run
//! it standalone).

use std::collections::{BTreeMap, HashMap};

use mqk_rb_regime::{
    Asset, Bucket, BucketCatalog, PriceProvider, ProviderError, RebalanceDate, Regime, RegimeContext,
    RegimeProvider, RegimeSeverity,
};
use mqk_rb_scoring::{FundamentalAnalyzer, TechnicalAnalyzer};

pub struct FakeRegime {
    pub preferred: Vec<Bucket>,
    pub trending_of: Vec<Asset>,
    /// Severity overrides keyed by day index; falls back to `default_severity`.
    pub severity_by_date: BTreeMap<i64, RegimeSeverity>,
    pub default_severity: RegimeSeverity,
}

impl FakeRegime {
    pub fn new(preferred: Vec<Bucket>, trending_of: Vec<Asset>) -> Self {
        Self {
            preferred,
            trending_of,
            severity_by_date: BTreeMap::new(),
            default_severity: RegimeSeverity::Normal,
        }
    }
}

impl RegimeProvider for FakeRegime {
    fn regime(&self, date: RebalanceDate) -> Result<RegimeContext, ProviderError> {
        let severity = self.severity_by_date.get(&date.index()).copied().unwrap_or(self.default_severity);
        Ok(RegimeContext::new(date, Regime::Goldilocks, 0.8, severity, self.preferred.clone()))
    }

    fn trending(&self, _date: RebalanceDate, candidates: &[Asset], _min_confidence: f64) -> Result<Vec<Asset>, ProviderError> {
        Ok(self.trending_of.iter().filter(|a| candidates.contains(a)).cloned().collect())
    }
}

pub struct FakeCatalog(pub HashMap<Bucket, Vec<Asset>>);

impl BucketCatalog for FakeCatalog {
    fn assets(&self, bucket: &str) -> Vec<Asset> {
        self.0.get(bucket).cloned().unwrap_or_default()
    }

    fn bucket(&self, asset: &Asset) -> Bucket {
        for (bucket, members) in &self.0 {
            if members.contains(asset) {
                return bucket.clone();
            }
        }
        mqk_rb_regime::UNKNOWN_BUCKET.to_string()
    }
}

pub struct FakePrices(pub HashMap<Asset, f64>);

impl PriceProvider for FakePrices {
    fn total_return(&self, asset: &Asset, _from: RebalanceDate, _to: RebalanceDate) -> Result<f64, ProviderError> {
        Ok(self.0.get(asset).copied().unwrap_or(0.0))
    }
}

/// Score table keyed by (asset, day index); `score_on` falls back to the
/// asset's entry at day `-1` (the "default" row) when no exact day matches.
#[derive(Default)]
pub struct FakeScores(pub HashMap<(Asset, i64), f64>);

impl FakeScores {
    pub fn with_defaults(defaults: &[(&str, f64)]) -> Self {
        let mut map = HashMap::new();
        for (asset, score) in defaults {
            map.insert((asset.to_string(), -1), *score);
        }
        Self(map)
    }

    pub fn set(&mut self, asset: &str, date: i64, score: f64) {
        self.0.insert((asset.to_string(), date), score);
    }

    fn score_on(&self, asset: &str, date: i64) -> Option<f64> {
        self.0
            .get(&(asset.to_string(), date))
            .or_else(|| self.0.get(&(asset.to_string(), -1)))
            .copied()
    }
}

pub struct FakeTechnical(pub FakeScores);

impl TechnicalAnalyzer for FakeTechnical {
    fn score(&self, asset: &Asset, date: RebalanceDate) -> Result<Option<f64>, ProviderError> {
        Ok(self.0.score_on(asset, date.index()))
    }
}

pub struct FakeFundamental(pub FakeScores);

impl FundamentalAnalyzer for FakeFundamental {
    fn score(&self, asset: &Asset, date: RebalanceDate, _regime: Regime) -> Result<Option<f64>, ProviderError> {
        Ok(self.0.score_on(asset, date.index()))
    }
}
