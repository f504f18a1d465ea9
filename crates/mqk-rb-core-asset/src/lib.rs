//! mqk-rb-core-asset (C8)
//!
//! Core designation lifecycle: mark, expire, extend, and underperformance
//! revocation. Grounded on `mqk-risk::engine::evaluate`'s ordered-guard
//! style, applied per-asset over a `BTreeMap<Asset, CoreAssetInfo>` instead
//! of one global `RiskState`.
//!
//! The "smart diversification" auto-mark described in spec.md §4.8 (marking
//! an asset core when it would otherwise be rejected by bucket limits) is
//! orchestration logic that belongs to the rebalancer engine (C10): it
//! decides *when* to call `mark_as_core`, this crate only enforces the
//! designation's own rules once called.

use std::collections::BTreeMap;

use mqk_rb_regime::{Asset, BucketCatalog, PriceProvider, ProviderError, RebalanceDate};

#[derive(Clone, Debug, PartialEq)]
pub struct CoreAssetConfig {
    pub max_core_assets: usize,
    pub core_asset_expiry_days: i64,
    pub core_asset_extension_limit: u32,
    pub core_asset_performance_check_frequency: i64,
    pub core_asset_underperformance_period: i64,
    pub core_asset_underperformance_threshold: f64,
    pub core_asset_override_threshold: f64,
}

impl Default for CoreAssetConfig {
    fn default() -> Self {
        Self {
            max_core_assets: 3,
            core_asset_expiry_days: 90,
            core_asset_extension_limit: 2,
            core_asset_performance_check_frequency: 20,
            core_asset_underperformance_period: 60,
            core_asset_underperformance_threshold: 0.10,
            core_asset_override_threshold: 0.85,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RevokeReason {
    Expiry,
    Underperformance,
    Manual,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoreAssetError {
    MaxCoreAssetsReached,
    ExtensionLimitReached,
    NotCore,
}

impl std::fmt::Display for CoreAssetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MaxCoreAssetsReached => write!(f, "max_core_assets already reached"),
            Self::ExtensionLimitReached => write!(f, "core_asset_extension_limit already reached"),
            Self::NotCore => write!(f, "asset has no active core designation"),
        }
    }
}

impl std::error::Error for CoreAssetError {}

#[derive(Clone, Debug, PartialEq)]
pub struct CoreAssetInfo {
    pub marked_date: RebalanceDate,
    pub expiry: RebalanceDate,
    pub reason: String,
    pub score_at_mark: f64,
    pub extension_count: u32,
    pub last_check: RebalanceDate,
    pub consecutive_underperformance_warnings: u32,
    pub revoked: Option<RevokeReason>,
}

/// One lifecycle-check outcome worth surfacing as an event.
#[derive(Clone, Debug, PartialEq)]
pub struct LifecycleEvent {
    pub asset: Asset,
    pub revoked: RevokeReason,
}

/// Owns core-asset designations across rebalance calls.
#[derive(Clone, Debug, Default)]
pub struct CoreAssetManager {
    records: BTreeMap<Asset, CoreAssetInfo>,
}

impl CoreAssetManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_count(&self) -> usize {
        self.records.values().filter(|r| r.revoked.is_none()).count()
    }

    pub fn is_core(&self, asset: &str, date: RebalanceDate) -> bool {
        self.records
            .get(asset)
            .is_some_and(|r| r.revoked.is_none() && date <= r.expiry)
    }

    pub fn info(&self, asset: &str) -> Option<&CoreAssetInfo> {
        self.records.get(asset)
    }

    pub fn mark_as_core(
        &mut self,
        asset: &str,
        date: RebalanceDate,
        reason: &str,
        score: f64,
        config: &CoreAssetConfig,
    ) -> Result<(), CoreAssetError> {
        if self.active_count() >= config.max_core_assets {
            return Err(CoreAssetError::MaxCoreAssetsReached);
        }
        self.records.insert(
            asset.to_string(),
            CoreAssetInfo {
                marked_date: date,
                expiry: date.plus_days(config.core_asset_expiry_days),
                reason: reason.to_string(),
                score_at_mark: score,
                extension_count: 0,
                last_check: date,
                consecutive_underperformance_warnings: 0,
                revoked: None,
            },
        );
        Ok(())
    }

    pub fn extend_core_status(
        &mut self,
        asset: &str,
        days: i64,
        config: &CoreAssetConfig,
    ) -> Result<(), CoreAssetError> {
        let record = self.records.get_mut(asset).filter(|r| r.revoked.is_none()).ok_or(CoreAssetError::NotCore)?;
        if record.extension_count >= config.core_asset_extension_limit {
            return Err(CoreAssetError::ExtensionLimitReached);
        }
        record.expiry = record.expiry.plus_days(days);
        record.extension_count += 1;
        Ok(())
    }

    /// Walk every active designation, auto-revoking on expiry or on two
    /// consecutive underperformance checks. Returns the revocations that
    /// fired, for event emission.
    ///
    /// A `PriceProvider` failure for one asset's performance check is
    /// treated as "check skipped this period" (the record's `last_check`
    /// is not advanced, so the next lifecycle pass retries) rather than as
    /// a fatal rebalance error — this diagnostic check is secondary to the
    /// designation's own expiry, which always still applies.
    pub fn perform_lifecycle_check(
        &mut self,
        date: RebalanceDate,
        catalog: &dyn BucketCatalog,
        prices: &dyn PriceProvider,
        config: &CoreAssetConfig,
    ) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        let assets: Vec<Asset> = self
            .records
            .iter()
            .filter(|(_, r)| r.revoked.is_none())
            .map(|(a, _)| a.clone())
            .collect();

        for asset in assets {
            if let Some(reason) = self.check_one(&asset, date, catalog, prices, config) {
                events.push(LifecycleEvent { asset, revoked: reason });
            }
        }
        events
    }

    fn check_one(
        &mut self,
        asset: &str,
        date: RebalanceDate,
        catalog: &dyn BucketCatalog,
        prices: &dyn PriceProvider,
        config: &CoreAssetConfig,
    ) -> Option<RevokeReason> {
        let record = self.records.get_mut(asset)?;

        if date > record.expiry {
            record.revoked = Some(RevokeReason::Expiry);
            return Some(RevokeReason::Expiry);
        }

        if date.days_since(record.last_check) < config.core_asset_performance_check_frequency {
            return None;
        }

        let period_start = date.plus_days(-config.core_asset_underperformance_period);
        let asset_return = match prices.total_return(&asset.to_string(), period_start, date) {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(asset, error = %err, "skipping core-asset underperformance check: price provider error");
                return None;
            }
        };

        let bucket = catalog.bucket(&asset.to_string());
        let peers: Vec<Asset> = catalog.assets(&bucket).into_iter().filter(|a| a.as_str() != asset).collect();
        let peer_returns: Vec<f64> = peers
            .iter()
            .filter_map(|peer| prices.total_return(peer, period_start, date).ok())
            .collect();

        if peer_returns.is_empty() {
            return None;
        }
        let bucket_avg = peer_returns.iter().sum::<f64>() / peer_returns.len() as f64;

        let record = self.records.get_mut(asset)?;
        record.last_check = date;

        if bucket_avg - asset_return > config.core_asset_underperformance_threshold {
            record.consecutive_underperformance_warnings += 1;
            if record.consecutive_underperformance_warnings >= 2 {
                record.revoked = Some(RevokeReason::Underperformance);
                return Some(RevokeReason::Underperformance);
            }
        } else {
            record.consecutive_underperformance_warnings = 0;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeCatalog(HashMap<Asset, Vec<Asset>>);
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
    use mqk_rb_regime::Bucket;

    struct FakePrices(HashMap<Asset, f64>);
    impl PriceProvider for FakePrices {
        fn total_return(&self, asset: &Asset, _from: RebalanceDate, _to: RebalanceDate) -> Result<f64, ProviderError> {
            self.0.get(asset).copied().ok_or_else(|| ProviderError("no data".to_string()))
        }
    }

    fn date(d: i64) -> RebalanceDate {
        RebalanceDate::new(d)
    }

    #[test]
    fn mark_as_core_sets_expiry() {
        let mut mgr = CoreAssetManager::new();
        let config = CoreAssetConfig::default();
        mgr.mark_as_core("A", date(0), "diversification", 0.9, &config).unwrap();
        assert!(mgr.is_core("A", date(config.core_asset_expiry_days)));
        assert!(!mgr.is_core("A", date(config.core_asset_expiry_days + 1)));
    }

    #[test]
    fn max_core_assets_blocks_additional_marks() {
        let mut mgr = CoreAssetManager::new();
        let config = CoreAssetConfig {
            max_core_assets: 1,
            ..CoreAssetConfig::default()
        };
        mgr.mark_as_core("A", date(0), "r", 0.9, &config).unwrap();
        let err = mgr.mark_as_core("B", date(0), "r", 0.9, &config).unwrap_err();
        assert_eq!(err, CoreAssetError::MaxCoreAssetsReached);
    }

    #[test]
    fn expiry_auto_revokes_during_lifecycle_check() {
        let mut mgr = CoreAssetManager::new();
        let config = CoreAssetConfig {
            core_asset_expiry_days: 5,
            ..CoreAssetConfig::default()
        };
        mgr.mark_as_core("A", date(0), "r", 0.9, &config).unwrap();
        let catalog = FakeCatalog(HashMap::new());
        let prices = FakePrices(HashMap::new());
        let events = mgr.perform_lifecycle_check(date(6), &catalog, &prices, &config);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].revoked, RevokeReason::Expiry);
        assert!(!mgr.is_core("A", date(6)));
    }

    #[test]
    fn two_consecutive_underperformance_checks_revoke() {
        let mut mgr = CoreAssetManager::new();
        let config = CoreAssetConfig {
            core_asset_expiry_days: 1000,
            core_asset_performance_check_frequency: 10,
            core_asset_underperformance_period: 30,
            core_asset_underperformance_threshold: 0.05,
            ..CoreAssetConfig::default()
        };
        mgr.mark_as_core("A", date(0), "r", 0.9, &config).unwrap();
        let catalog = FakeCatalog(HashMap::from([("Risk".to_string(), vec!["A".to_string(), "B".to_string()])]));
        let prices = FakePrices(HashMap::from([("A".to_string(), 0.0), ("B".to_string(), 0.10)]));

        let first = mgr.perform_lifecycle_check(date(10), &catalog, &prices, &config);
        assert!(first.is_empty());
        assert_eq!(mgr.info("A").unwrap().consecutive_underperformance_warnings, 1);

        let second = mgr.perform_lifecycle_check(date(20), &catalog, &prices, &config);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].revoked, RevokeReason::Underperformance);
    }

    #[test]
    fn extension_limit_blocks_further_extensions() {
        let mut mgr = CoreAssetManager::new();
        let config = CoreAssetConfig {
            core_asset_extension_limit: 1,
            ..CoreAssetConfig::default()
        };
        mgr.mark_as_core("A", date(0), "r", 0.9, &config).unwrap();
        mgr.extend_core_status("A", 30, &config).unwrap();
        let err = mgr.extend_core_status("A", 30, &config).unwrap_err();
        assert_eq!(err, CoreAssetError::ExtensionLimitReached);
    }

    #[test]
    fn extend_on_non_core_asset_errors() {
        let mut mgr = CoreAssetManager::new();
        let config = CoreAssetConfig::default();
        let err = mgr.extend_core_status("GHOST", 10, &config).unwrap_err();
        assert_eq!(err, CoreAssetError::NotCore);
    }
}
