//! In-memory example collaborators for `mqk-rb rebalance`: a small fixed
//! universe standing in for the regime engine, bucket catalog, price
//! history, and technical/fundamental analyzers a real deployment would
//! wire up externally (spec.md §1 treats all of these as collaborators
//! outside this crate's scope).

use std::collections::HashMap;

use mqk_rb_regime::{
    Asset, Bucket, BucketCatalog, PriceProvider, ProviderError, RebalanceDate, Regime, RegimeContext,
    RegimeProvider, RegimeSeverity,
};
use mqk_rb_scoring::{FundamentalAnalyzer, TechnicalAnalyzer};

pub struct DemoUniverse {
    buckets: HashMap<Bucket, Vec<Asset>>,
    technical: HashMap<Asset, f64>,
    fundamental: HashMap<Asset, f64>,
}

impl DemoUniverse {
    pub fn new() -> Self {
        let buckets = HashMap::from([
            (
                "Growth Equity".to_string(),
                vec!["AAPL".to_string(), "MSFT".to_string(), "NVDA".to_string()],
            ),
            (
                "Defensive".to_string(),
                vec!["KO".to_string(), "PG".to_string()],
            ),
            (
                "Rates".to_string(),
                vec!["TLT".to_string(), "IEF".to_string()],
            ),
        ]);
        let technical = HashMap::from([
            ("AAPL".to_string(), 0.82),
            ("MSFT".to_string(), 0.78),
            ("NVDA".to_string(), 0.91),
            ("KO".to_string(), 0.40),
            ("PG".to_string(), 0.45),
            ("TLT".to_string(), 0.30),
            ("IEF".to_string(), 0.35),
        ]);
        let fundamental = HashMap::from([
            ("AAPL".to_string(), 0.75),
            ("MSFT".to_string(), 0.80),
            ("NVDA".to_string(), 0.70),
            ("KO".to_string(), 0.60),
            ("PG".to_string(), 0.62),
            ("TLT".to_string(), 0.50),
            ("IEF".to_string(), 0.52),
        ]);
        Self { buckets, technical, fundamental }
    }
}

impl Default for DemoUniverse {
    fn default() -> Self {
        Self::new()
    }
}

impl RegimeProvider for DemoUniverse {
    fn regime(&self, date: RebalanceDate) -> Result<RegimeContext, ProviderError> {
        Ok(RegimeContext::new(
            date,
            Regime::Goldilocks,
            0.75,
            RegimeSeverity::Normal,
            vec!["Growth Equity".to_string(), "Defensive".to_string()],
        ))
    }

    fn trending(&self, _date: RebalanceDate, candidates: &[Asset], min_confidence: f64) -> Result<Vec<Asset>, ProviderError> {
        Ok(candidates
            .iter()
            .filter(|a| self.technical.get(*a).copied().unwrap_or(0.0) >= min_confidence)
            .cloned()
            .collect())
    }
}

impl BucketCatalog for DemoUniverse {
    fn assets(&self, bucket: &str) -> Vec<Asset> {
        self.buckets.get(bucket).cloned().unwrap_or_default()
    }

    fn bucket(&self, asset: &Asset) -> Bucket {
        for (bucket, members) in &self.buckets {
            if members.contains(asset) {
                return bucket.clone();
            }
        }
        mqk_rb_regime::UNKNOWN_BUCKET.to_string()
    }
}

impl PriceProvider for DemoUniverse {
    fn total_return(&self, _asset: &Asset, _from: RebalanceDate, _to: RebalanceDate) -> Result<f64, ProviderError> {
        Ok(0.02)
    }
}

impl TechnicalAnalyzer for DemoUniverse {
    fn score(&self, asset: &Asset, _date: RebalanceDate) -> Result<Option<f64>, ProviderError> {
        Ok(self.technical.get(asset).copied())
    }
}

impl FundamentalAnalyzer for DemoUniverse {
    fn score(&self, asset: &Asset, _date: RebalanceDate, _regime: Regime) -> Result<Option<f64>, ProviderError> {
        Ok(self.fundamental.get(asset).copied())
    }
}
