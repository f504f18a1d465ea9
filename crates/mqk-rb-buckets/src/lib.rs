//! mqk-rb-buckets (C3)
//!
//! Groups the scored universe by bucket and enforces per-bucket position
//! count, per-bucket allocation, and minimum-bucket-representation
//! constraints, in the shape of `mqk-portfolio::constraints`: pure
//! group-then-check-then-report functions returning a violation/rejection
//! list rather than throwing.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use mqk_rb_regime::{Asset, Bucket, BucketCatalog};
use mqk_rb_scoring::AssetScore;
use mqk_rb_types::Priority;

#[derive(Clone, Debug, PartialEq)]
pub struct BucketConfig {
    pub enable_bucket_diversification: bool,
    pub max_positions_per_bucket: usize,
    pub max_allocation_per_bucket: f64,
    pub min_buckets_represented: usize,
    pub allow_bucket_overflow: bool,
    pub target_total_allocation: f64,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            enable_bucket_diversification: true,
            max_positions_per_bucket: 5,
            max_allocation_per_bucket: 0.40,
            min_buckets_represented: 2,
            allow_bucket_overflow: true,
            target_total_allocation: 0.95,
        }
    }
}

/// Why a candidate did not survive bucket-limit enforcement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectionReason {
    /// The bucket's `max_positions_per_bucket` was already filled by
    /// higher-priority / higher-scoring members.
    BucketPositionCapExceeded,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RejectedAsset {
    pub asset: Asset,
    pub bucket: Bucket,
    pub reason: RejectionReason,
}

/// Output of one bucket-enforcement pass.
#[derive(Clone, Debug, Default)]
pub struct BucketResult {
    /// Surviving scores, in the same relative order groups were processed
    /// (bucket name order, then priority/score order within a bucket).
    pub accepted: Vec<AssetScore>,
    pub rejected: Vec<RejectedAsset>,
    /// Per-bucket scale factor in `(0, 1]` applied when a bucket's tentative
    /// allocation exceeds `max_allocation_per_bucket`. A bucket absent from
    /// this map was not scaled (factor 1.0). Consumed by C4 as an additional
    /// per-bucket cap layer on top of `max_single_position`.
    pub bucket_scale: BTreeMap<Bucket, f64>,
}

/// Declaration-order priority, then `combined` descending, then asset id
/// ascending — spec.md §4.3's tie-break rule.
fn cmp_for_bucket_order(a: &AssetScore, b: &AssetScore) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| b.combined.partial_cmp(&a.combined).unwrap_or(Ordering::Equal))
        .then_with(|| a.asset.cmp(&b.asset))
}

/// Apply bucket diversification limits to a scored universe.
///
/// Step order (spec.md §4.3):
/// 1. group by bucket, sort priority-first then score descending
/// 2. `max_positions_per_bucket` (portfolio assets exempt iff
///    `allow_bucket_overflow`)
/// 3. `max_allocation_per_bucket` tentative scale-down
/// 4. `min_buckets_represented` backfill
pub fn apply(scores: &[AssetScore], catalog: &dyn BucketCatalog, config: &BucketConfig) -> BucketResult {
    if !config.enable_bucket_diversification {
        return BucketResult {
            accepted: scores.to_vec(),
            rejected: Vec::new(),
            bucket_scale: BTreeMap::new(),
        };
    }

    let mut groups: BTreeMap<Bucket, Vec<AssetScore>> = BTreeMap::new();
    for s in scores {
        groups.entry(catalog.bucket(&s.asset)).or_default().push(s.clone());
    }

    let mut accepted: Vec<AssetScore> = Vec::new();
    let mut rejected: Vec<RejectedAsset> = Vec::new();

    for (bucket, mut members) in groups.clone() {
        members.sort_by(cmp_for_bucket_order);
        let mut non_exempt_kept = 0usize;
        for m in members {
            let exempt = m.priority.is_portfolio() && config.allow_bucket_overflow;
            if exempt || non_exempt_kept < config.max_positions_per_bucket {
                if !exempt {
                    non_exempt_kept += 1;
                }
                accepted.push(m);
            } else {
                rejected.push(RejectedAsset {
                    asset: m.asset.clone(),
                    bucket: bucket.clone(),
                    reason: RejectionReason::BucketPositionCapExceeded,
                });
            }
        }
    }

    // Step 4: ensure min_buckets_represented by pulling back the top-scoring
    // rejected member of each under-represented bucket.
    let universe_buckets: std::collections::BTreeSet<Bucket> = groups.keys().cloned().collect();
    let required = config.min_buckets_represented.min(universe_buckets.len());
    loop {
        let represented: std::collections::BTreeSet<Bucket> =
            accepted.iter().map(|a| catalog.bucket(&a.asset)).collect();
        if represented.len() >= required {
            break;
        }
        let mut progressed = false;
        for bucket in universe_buckets.difference(&represented).cloned().collect::<Vec<_>>() {
            if let Some(pos) = rejected
                .iter()
                .enumerate()
                .filter(|(_, r)| r.bucket == bucket)
                .map(|(i, _)| i)
                .next()
            {
                let candidate = rejected.remove(pos);
                if let Some(original) = groups
                    .get(&bucket)
                    .and_then(|members| members.iter().find(|m| m.asset == candidate.asset))
                {
                    accepted.push(original.clone());
                    progressed = true;
                }
            }
        }
        if !progressed {
            break; // no rejected candidate to backfill from; cannot reach the minimum
        }
    }

    // Step 3 (scale factor, computed on the final accepted membership so a
    // backfilled asset's bucket is included in its own cap check).
    let total_combined: f64 = accepted.iter().map(|a| a.combined).sum();
    let mut tentative: BTreeMap<Asset, f64> = BTreeMap::new();
    if accepted.is_empty() {
        // nothing to scale
    } else if total_combined > 0.0 {
        for a in &accepted {
            tentative.insert(
                a.asset.clone(),
                a.combined / total_combined * config.target_total_allocation,
            );
        }
    } else {
        let share = config.target_total_allocation / accepted.len() as f64;
        for a in &accepted {
            tentative.insert(a.asset.clone(), share);
        }
    }

    let mut bucket_sums: BTreeMap<Bucket, f64> = BTreeMap::new();
    for a in &accepted {
        let bucket = catalog.bucket(&a.asset);
        *bucket_sums.entry(bucket).or_insert(0.0) += tentative.get(&a.asset).copied().unwrap_or(0.0);
    }

    let mut bucket_scale = BTreeMap::new();
    for (bucket, sum) in bucket_sums {
        if sum > config.max_allocation_per_bucket + 1e-12 {
            bucket_scale.insert(bucket, config.max_allocation_per_bucket / sum);
        }
    }

    BucketResult {
        accepted,
        rejected,
        bucket_scale,
    }
}
