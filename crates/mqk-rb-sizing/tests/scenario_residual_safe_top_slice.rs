//! spec.md §8 scenario 6: after a bucket-level scale-down leaves Stage 2
//! short of `target_total_allocation`, the safe-top-slice residual policy
//! tops up the highest scorers subject to both the per-asset and
//! multiple-of-position caps, and whatever is left over goes to cash.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use mqk_rb_regime::{Asset, Bucket, BucketCatalog, RebalanceDate, Regime};
use mqk_rb_scoring::AssetScore;
use mqk_rb_sizing::{size_positions, SizingConfig};
use mqk_rb_types::{Priority, ResidualStrategy, SizingMode};

struct OneBucketCatalog;

impl BucketCatalog for OneBucketCatalog {
    fn assets(&self, _bucket: &str) -> Vec<Asset> {
        vec!["A".to_string(), "B".to_string(), "C".to_string()]
    }

    fn bucket(&self, _asset: &Asset) -> Bucket {
        "Risk".to_string()
    }
}

fn score(asset: &str, combined: f64) -> AssetScore {
    AssetScore {
        asset: asset.to_string(),
        date: RebalanceDate::new(0),
        regime: Regime::Goldilocks,
        technical: Some(combined),
        fundamental: Some(combined),
        combined,
        priority: Priority::Trending,
        is_current_position: false,
        previous_allocation: 0.0,
    }
}

#[test]
fn safe_top_slice_honors_per_asset_and_multiple_caps_then_cash_absorbs_the_rest() {
    let scores = vec![score("A", 0.7), score("B", 0.2), score("C", 0.1)];

    let config = SizingConfig {
        enable_dynamic_sizing: true,
        enable_two_stage_sizing: true,
        sizing_mode: SizingMode::ScoreWeighted,
        max_single_position: 0.9,
        min_position_size: 0.01,
        target_total_allocation: 0.95,
        residual_strategy: ResidualStrategy::SafeTopSlice,
        max_residual_per_asset: 0.05,
        max_residual_multiple: 0.5,
        max_iterations: 25,
    };

    // A bucket scale of ~0.7895 shrinks the Stage-1 total from 0.95 down to
    // 0.75 before the residual policy ever runs, leaving a 0.20 residual
    // with nothing clamped by max_single_position.
    let mut bucket_scale = BTreeMap::new();
    bucket_scale.insert("Risk".to_string(), 0.75 / 0.95);

    let result = size_positions(&scores, &OneBucketCatalog, &bucket_scale, &BTreeSet::new(), &config);

    assert!(result.capped.is_empty(), "nothing should hit max_single_position in this scenario");

    // A and B each get the full 0.05 * target_total_allocation top-up
    // (max_residual_per_asset binds before max_residual_multiple for them).
    let per_asset_cap = config.max_residual_per_asset * config.target_total_allocation;
    assert!((result.sizes["A"] - (0.525 + per_asset_cap)).abs() < 1e-6);
    assert!((result.sizes["B"] - (0.15 + per_asset_cap)).abs() < 1e-6);

    // C's pre-residual size (0.075) is small enough that max_residual_multiple
    // (half of its own size) binds before the per-asset cap does.
    let multiple_cap_c = config.max_residual_multiple * 0.075;
    assert!(multiple_cap_c < per_asset_cap, "the scenario must exercise the multiple cap, not the per-asset cap, for C");
    assert!((result.sizes["C"] - (0.075 + multiple_cap_c)).abs() < 1e-6);

    let placed: f64 = result.sizes.values().sum();
    assert!(
        (placed + result.cash - config.target_total_allocation).abs() < 1e-6,
        "placed + cash must always reconcile to target_total_allocation"
    );
    assert!(result.cash > 0.0, "the residual left after both caps bind must fall to cash");
}
