//! mqk-rb-sizing (C4)
//!
//! Two-stage dynamic position sizer, grounded on
//! `mqk-portfolio::allocator::Allocator::allocate`'s normalize/clip/rescale
//! shape: Stage 1 assigns base sizes by mode, Stage 2 iteratively clamps
//! oversized positions and redistributes the excess, and a residual policy
//! disposes of whatever Stage 2 leaves under `target_total_allocation`.
//!
//! Pure; no IO. Bucket-level scale factors from C3 and core-asset immunity
//! from C8 are both accepted as plain inputs rather than re-derived here.

use std::collections::{BTreeMap, BTreeSet};

use mqk_rb_regime::{Asset, Bucket, BucketCatalog};
use mqk_rb_scoring::AssetScore;
use mqk_rb_types::{ResidualStrategy, SizingMode};

/// `combined^exponent` floor used so the adaptive mode never raises zero to
/// a fractional power (which would stay zero and starve every low scorer).
const ADAPTIVE_SCORE_FLOOR: f64 = 1e-6;
/// Portfolio-size scale at which the adaptive exponent has decayed halfway
/// from 1.0 toward `ADAPTIVE_MIN_EXPONENT`.
const ADAPTIVE_SCALE_N: f64 = 20.0;
const ADAPTIVE_MIN_EXPONENT: f64 = 0.15;
const CAP_EPSILON: f64 = 1e-9;

#[derive(Clone, Debug, PartialEq)]
pub struct SizingConfig {
    pub enable_dynamic_sizing: bool,
    pub enable_two_stage_sizing: bool,
    pub sizing_mode: SizingMode,
    pub max_single_position: f64,
    pub min_position_size: f64,
    pub target_total_allocation: f64,
    pub residual_strategy: ResidualStrategy,
    pub max_residual_per_asset: f64,
    pub max_residual_multiple: f64,
    /// Bound on the Stage-2 clamp/redistribute loop (spec.md §4.4 requires a
    /// bounded iteration count, not convergence-until-fixpoint).
    pub max_iterations: usize,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            enable_dynamic_sizing: true,
            enable_two_stage_sizing: true,
            sizing_mode: SizingMode::ScoreWeighted,
            max_single_position: 0.15,
            min_position_size: 0.01,
            target_total_allocation: 0.95,
            residual_strategy: ResidualStrategy::SafeTopSlice,
            max_residual_per_asset: 0.05,
            max_residual_multiple: 0.5,
            max_iterations: 25,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SizingResult {
    /// Final non-cash sizes, in `[min_position_size, max_single_position]`
    /// (core-immune assets may exceed the upper bound, per P2).
    pub sizes: BTreeMap<Asset, f64>,
    /// Synthetic `CASH_ASSET` allocation absorbing anything Stage 2 and the
    /// residual policy could not place.
    pub cash: f64,
    /// Assets Stage 2 clamped to `max_single_position` at least once.
    pub capped: BTreeSet<Asset>,
    /// Assets dropped below `min_position_size` and folded back into cash.
    pub sub_minimum: BTreeSet<Asset>,
}

fn base_sizes(scores: &[AssetScore], config: &SizingConfig) -> BTreeMap<Asset, f64> {
    let n = scores.len();
    if n == 0 {
        return BTreeMap::new();
    }
    let t = config.target_total_allocation;

    match config.sizing_mode {
        SizingMode::EqualWeight => {
            let share = t / n as f64;
            scores.iter().map(|s| (s.asset.clone(), share)).collect()
        }
        SizingMode::ScoreWeighted => weight_by(scores, t, |s| s.combined.max(0.0)),
        SizingMode::Adaptive => {
            let exponent = (ADAPTIVE_SCALE_N / (ADAPTIVE_SCALE_N + n as f64)).max(ADAPTIVE_MIN_EXPONENT);
            weight_by(scores, t, |s| s.combined.max(ADAPTIVE_SCORE_FLOOR).powf(exponent))
        }
    }
}

fn weight_by(scores: &[AssetScore], total: f64, weight_fn: impl Fn(&AssetScore) -> f64) -> BTreeMap<Asset, f64> {
    let weights: Vec<f64> = scores.iter().map(&weight_fn).collect();
    let sum: f64 = weights.iter().sum();
    if sum > 0.0 {
        scores
            .iter()
            .zip(weights)
            .map(|(s, w)| (s.asset.clone(), total * w / sum))
            .collect()
    } else {
        let share = total / scores.len() as f64;
        scores.iter().map(|s| (s.asset.clone(), share)).collect()
    }
}

fn apply_bucket_scale(
    sizes: &mut BTreeMap<Asset, f64>,
    catalog: &dyn BucketCatalog,
    bucket_scale: &BTreeMap<Bucket, f64>,
) {
    if bucket_scale.is_empty() {
        return;
    }
    for (asset, size) in sizes.iter_mut() {
        if let Some(scale) = bucket_scale.get(&catalog.bucket(asset)) {
            *size *= scale;
        }
    }
}

/// Stage 2: clamp any non-core size above `max_single_position` and
/// redistribute the excess proportionally among the assets still under cap,
/// repeating until stable or `max_iterations` is exhausted.
fn cap_and_redistribute(
    sizes: &mut BTreeMap<Asset, f64>,
    core_assets: &BTreeSet<Asset>,
    config: &SizingConfig,
) -> BTreeSet<Asset> {
    let mut capped: BTreeSet<Asset> = BTreeSet::new();
    if !config.enable_two_stage_sizing {
        return capped;
    }

    for _ in 0..config.max_iterations {
        let cap = config.max_single_position;
        let mut excess = 0.0;
        let mut newly_capped = Vec::new();
        for (asset, size) in sizes.iter_mut() {
            if core_assets.contains(asset) {
                continue;
            }
            if *size > cap + CAP_EPSILON {
                excess += *size - cap;
                *size = cap;
                newly_capped.push(asset.clone());
            }
        }
        if newly_capped.is_empty() {
            break;
        }
        capped.extend(newly_capped.iter().cloned());

        let uncapped_total: f64 = sizes
            .iter()
            .filter(|(a, _)| !capped.contains(*a))
            .map(|(_, s)| *s)
            .sum();
        if uncapped_total <= 0.0 || excess <= 0.0 {
            break;
        }
        for (asset, size) in sizes.iter_mut() {
            if !capped.contains(asset) {
                *size += excess * (*size / uncapped_total);
            }
        }
    }
    capped
}

/// Distribute `residual` (always `>= 0`) per `config.residual_strategy`.
/// Returns the portion that could not be placed (goes to `CASH_ASSET`).
fn distribute_residual(
    sizes: &mut BTreeMap<Asset, f64>,
    scores: &[AssetScore],
    capped: &BTreeSet<Asset>,
    residual: f64,
    config: &SizingConfig,
) -> f64 {
    if residual <= CAP_EPSILON {
        return residual.max(0.0);
    }

    match config.residual_strategy {
        ResidualStrategy::CashBucket => residual,
        ResidualStrategy::Proportional => {
            let total: f64 = sizes.values().sum();
            if total <= 0.0 {
                return residual;
            }
            let mut leftover = 0.0;
            let shares: Vec<(Asset, f64)> = sizes.iter().map(|(a, s)| (a.clone(), *s / total * residual)).collect();
            for (asset, share) in shares {
                let size = sizes.get_mut(&asset).expect("asset present");
                let room = (config.max_single_position - *size).max(0.0);
                let add = share.min(room);
                *size += add;
                leftover += share - add;
            }
            leftover
        }
        ResidualStrategy::SafeTopSlice => {
            let mut order: Vec<&AssetScore> = scores
                .iter()
                .filter(|s| !capped.contains(&s.asset) && sizes.contains_key(&s.asset))
                .collect();
            order.sort_by(|a, b| b.combined.partial_cmp(&a.combined).unwrap_or(std::cmp::Ordering::Equal));

            let mut remaining = residual;
            for s in order {
                if remaining <= CAP_EPSILON {
                    break;
                }
                let size = sizes.get_mut(&s.asset).expect("asset present");
                let per_asset_cap = config.max_residual_per_asset * config.target_total_allocation;
                let multiple_cap = config.max_residual_multiple * *size;
                let headroom = (config.max_single_position - *size).max(0.0);
                let add = remaining.min(per_asset_cap).min(multiple_cap).min(headroom);
                if add > 0.0 {
                    *size += add;
                    remaining -= add;
                }
            }
            remaining.max(0.0)
        }
    }
}

/// Run the full two-stage sizer.
///
/// `bucket_scale` comes from C3 (`mqk_rb_buckets::BucketResult::bucket_scale`);
/// `core_assets` comes from C8 and exempts a position from the
/// `max_single_position` clamp (P2).
pub fn size_positions(
    scores: &[AssetScore],
    catalog: &dyn BucketCatalog,
    bucket_scale: &BTreeMap<Bucket, f64>,
    core_assets: &BTreeSet<Asset>,
    config: &SizingConfig,
) -> SizingResult {
    if scores.is_empty() {
        return SizingResult::default();
    }

    if !config.enable_dynamic_sizing {
        let share = config.target_total_allocation / scores.len() as f64;
        let mut sizes: BTreeMap<Asset, f64> = scores.iter().map(|s| (s.asset.clone(), share)).collect();
        let mut cash = 0.0;
        for (asset, size) in sizes.iter_mut() {
            if !core_assets.contains(asset) && *size > config.max_single_position {
                cash += *size - config.max_single_position;
                *size = config.max_single_position;
            }
        }
        return finalize(sizes, cash, BTreeSet::new(), config);
    }

    let mut sizes = base_sizes(scores, config);
    apply_bucket_scale(&mut sizes, catalog, bucket_scale);

    let capped = cap_and_redistribute(&mut sizes, core_assets, config);

    let placed: f64 = sizes.values().sum();
    let residual = (config.target_total_allocation - placed).max(0.0);
    let unplaced = distribute_residual(&mut sizes, scores, &capped, residual, config);

    finalize(sizes, unplaced, capped, config)
}

fn finalize(
    mut sizes: BTreeMap<Asset, f64>,
    mut cash: f64,
    capped: BTreeSet<Asset>,
    config: &SizingConfig,
) -> SizingResult {
    let mut sub_minimum = BTreeSet::new();
    sizes.retain(|asset, size| {
        if *size < config.min_position_size {
            cash += *size;
            sub_minimum.insert(asset.clone());
            false
        } else {
            true
        }
    });

    SizingResult {
        sizes,
        cash,
        capped,
        sub_minimum,
    }
}
