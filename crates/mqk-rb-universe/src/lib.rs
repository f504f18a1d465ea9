//! mqk-rb-universe (C1)
//!
//! Builds the combined rebalance-date universe: `holdings ∪ trending ∪
//! regime-bucket-members`, each asset tagged with the highest applicable
//! priority. Guarantees every held asset survives into the universe
//! (P1, the "zombie position" invariant) regardless of any bucket filter.
//!
//! Pure aside from the two read-only provider calls; no caching, no retries.

use std::collections::{BTreeMap, BTreeSet};

use mqk_rb_regime::{Asset, Bucket, BucketCatalog, ProviderError, RebalanceDate, RegimeContext, RegimeProvider};
use mqk_rb_types::Priority;

/// Inputs to one universe-build call.
pub struct UniverseRequest<'a> {
    pub date: RebalanceDate,
    /// Current holdings: identifier -> current allocation fraction.
    pub holdings: &'a BTreeMap<Asset, f64>,
    /// Explicit bucket filter; `None` defers to the regime provider's
    /// preferred buckets for `date`.
    pub bucket_filter: Option<&'a [Bucket]>,
    pub min_trending_confidence: f64,
}

/// The combined universe: every candidate asset plus its assigned priority,
/// alongside the regime reading that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct Universe {
    pub regime: RegimeContext,
    /// Deterministic (sorted) asset -> priority map.
    pub entries: BTreeMap<Asset, Priority>,
}

impl Universe {
    pub fn priority_of(&self, asset: &str) -> Option<Priority> {
        self.entries.get(asset).copied()
    }

    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.entries.keys()
    }
}

/// Build the combined universe for one rebalance date.
///
/// Step order (spec.md §4.1):
/// 1. regime provider supplies preferred buckets if `bucket_filter` is `None`
/// 2. enumerate bucket members via the catalog
/// 3. query trending candidates, scanning holdings + bucket members, filtered
///    by `min_trending_confidence`
/// 4. union holdings, trending, and bucket members; tag with the highest
///    applicable priority (holdings > trending > regime > fallback)
pub fn build_universe(
    regime_provider: &dyn RegimeProvider,
    bucket_catalog: &dyn BucketCatalog,
    req: &UniverseRequest,
) -> Result<Universe, ProviderError> {
    let regime = regime_provider.regime(req.date)?;

    let buckets: Vec<Bucket> = match req.bucket_filter {
        Some(explicit) => explicit.to_vec(),
        None => regime.preferred_buckets.clone(),
    };

    let mut bucket_members: BTreeSet<Asset> = BTreeSet::new();
    for bucket in &buckets {
        for asset in bucket_catalog.assets(bucket) {
            bucket_members.insert(asset);
        }
    }

    // Scan pool for trending: current holdings plus whatever the bucket
    // catalog already offered up, so "trending" narrows a known pool rather
    // than inventing assets outside any bucket.
    let mut scan_pool: BTreeSet<Asset> = bucket_members.clone();
    for asset in req.holdings.keys() {
        scan_pool.insert(asset.clone());
    }
    let scan_pool: Vec<Asset> = scan_pool.into_iter().collect();

    let trending: BTreeSet<Asset> = regime_provider
        .trending(req.date, &scan_pool, req.min_trending_confidence)?
        .into_iter()
        .collect();

    let mut entries: BTreeMap<Asset, Priority> = BTreeMap::new();

    // Critical invariant: every held asset is in the universe, full stop.
    for asset in req.holdings.keys() {
        entries.insert(asset.clone(), Priority::Portfolio);
    }

    for asset in trending {
        entries.entry(asset).or_insert(Priority::Trending);
    }

    for asset in bucket_members {
        entries.entry(asset).or_insert(Priority::Regime);
    }

    Ok(Universe { regime, entries })
}
