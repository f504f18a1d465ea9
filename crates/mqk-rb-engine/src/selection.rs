//! Step 5 of spec.md §4.10: keep portfolio-priority assets that cleared the
//! threshold (or are core-immune), then backfill new-opportunity assets up
//! to the smaller of `max_new_positions` and remaining `max_total_positions`
//! headroom.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use mqk_rb_config::DomainConfig;
use mqk_rb_regime::Asset;
use mqk_rb_scoring::AssetScore;

pub struct Selection {
    /// Kept for C4 sizing: portfolio assets above threshold (or core-immune)
    /// plus admitted new-opportunity assets.
    pub kept: Vec<AssetScore>,
    /// Portfolio assets that did not clear the threshold and are not
    /// core-immune; handled by grace/close rather than C4 sizing.
    pub dropped_portfolio: Vec<AssetScore>,
}

fn by_combined_desc(a: &AssetScore, b: &AssetScore) -> Ordering {
    b.combined.partial_cmp(&a.combined).unwrap_or(Ordering::Equal).then_with(|| a.asset.cmp(&b.asset))
}

pub fn select(pool: &[AssetScore], core_assets: &BTreeSet<Asset>, config: &DomainConfig) -> Selection {
    let mut portfolio_kept = Vec::new();
    let mut dropped_portfolio = Vec::new();
    let mut candidates = Vec::new();

    for s in pool {
        if s.priority.is_portfolio() {
            if s.combined >= config.min_score_threshold || core_assets.contains(&s.asset) {
                portfolio_kept.push(s.clone());
            } else {
                dropped_portfolio.push(s.clone());
            }
        } else {
            candidates.push(s.clone());
        }
    }

    let new_slots = config.max_total_positions.saturating_sub(portfolio_kept.len());
    let new_cap = config.max_new_positions.min(new_slots);

    candidates.sort_by(by_combined_desc);
    let mut new_kept: Vec<AssetScore> = candidates
        .into_iter()
        .filter(|s| s.combined >= config.min_score_new_position)
        .take(new_cap)
        .collect();

    let mut kept = portfolio_kept;
    kept.append(&mut new_kept);

    Selection { kept, dropped_portfolio }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqk_rb_regime::RebalanceDate;
    use mqk_rb_types::Priority;

    fn score(asset: &str, priority: Priority, combined: f64) -> AssetScore {
        AssetScore {
            asset: asset.to_string(),
            date: RebalanceDate::new(0),
            regime: mqk_rb_regime::Regime::Goldilocks,
            technical: Some(combined),
            fundamental: Some(combined),
            combined,
            priority,
            is_current_position: priority.is_portfolio(),
            previous_allocation: 0.0,
        }
    }

    #[test]
    fn portfolio_below_threshold_is_dropped_not_discarded_from_output() {
        let pool = vec![
            score("HELD_GOOD", Priority::Portfolio, 0.9),
            score("HELD_BAD", Priority::Portfolio, 0.1),
        ];
        let config = default_domain_config();
        let sel = select(&pool, &BTreeSet::new(), &config);
        assert_eq!(sel.kept.len(), 1);
        assert_eq!(sel.dropped_portfolio.len(), 1);
        assert_eq!(sel.dropped_portfolio[0].asset, "HELD_BAD");
    }

    #[test]
    fn core_immune_portfolio_asset_survives_low_score() {
        let pool = vec![score("CORE", Priority::Portfolio, 0.05)];
        let config = default_domain_config();
        let mut core = BTreeSet::new();
        core.insert("CORE".to_string());
        let sel = select(&pool, &core, &config);
        assert_eq!(sel.kept.len(), 1);
        assert!(sel.dropped_portfolio.is_empty());
    }

    #[test]
    fn new_positions_capped_by_remaining_headroom() {
        let pool = vec![
            score("HELD1", Priority::Portfolio, 0.9),
            score("NEW1", Priority::Trending, 0.95),
            score("NEW2", Priority::Trending, 0.90),
        ];
        let mut config = default_domain_config();
        config.max_total_positions = 2;
        config.max_new_positions = 5;
        let sel = select(&pool, &BTreeSet::new(), &config);
        assert_eq!(sel.kept.len(), 2);
        assert!(sel.kept.iter().any(|s| s.asset == "NEW1"));
    }

    fn default_domain_config() -> DomainConfig {
        mqk_rb_config::RebalanceConfig::default().to_domain()
    }
}
