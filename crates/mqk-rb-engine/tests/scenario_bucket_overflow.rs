//! spec.md §8 scenario 5: a bucket already holding more positions than its
//! cap keeps every existing holding when overflow is allowed, while new
//! candidates into that same bucket are still capped.

mod common;

use std::collections::BTreeMap;

use common::{FakeCatalog, FakePrices, FakeRegime, FakeScores, FakeTechnical, FakeFundamental};
use mqk_rb_config::RebalanceConfig;
use mqk_rb_engine::{Collaborators, RebalanceRequest, RebalancerEngine};
use mqk_rb_regime::RebalanceDate;
use mqk_rb_types::Action;

#[test]
fn portfolio_assets_exempt_from_bucket_cap_new_candidates_still_capped() {
    let members = vec![
        "A".to_string(), "B".to_string(), "C".to_string(), "D".to_string(), "E".to_string(),
        "F".to_string(), "G".to_string(), "H".to_string(),
    ];
    let catalog = FakeCatalog(std::collections::HashMap::from([("Risk Assets".to_string(), members)]));
    let regime = FakeRegime::new(vec!["Risk Assets".to_string()], vec!["F".to_string(), "G".to_string(), "H".to_string()]);
    let prices = FakePrices(Default::default());

    let technical = FakeTechnical(FakeScores::with_defaults(&[
        ("A", 0.75), ("B", 0.75), ("C", 0.75), ("D", 0.75), ("E", 0.75),
        ("F", 0.90), ("G", 0.85), ("H", 0.80),
    ]));
    let fundamental = FakeFundamental(FakeScores::with_defaults(&[
        ("A", 0.75), ("B", 0.75), ("C", 0.75), ("D", 0.75), ("E", 0.75),
        ("F", 0.90), ("G", 0.85), ("H", 0.80),
    ]));

    let mut config = RebalanceConfig::default().to_domain();
    config.bucket.max_positions_per_bucket = 2;
    config.bucket.allow_bucket_overflow = true;
    config.bucket.min_buckets_represented = 0;

    let mut holdings: BTreeMap<String, f64> = BTreeMap::new();
    for existing in ["A", "B", "C", "D", "E"] {
        holdings.insert(existing.to_string(), 0.10);
    }

    let mut engine = RebalancerEngine::new();
    let sink = mqk_rb_events::NullEventSink;
    let collab = Collaborators {
        regime_provider: &regime,
        bucket_catalog: &catalog,
        price_provider: &prices,
        technical: Some(&technical),
        fundamental: Some(&fundamental),
    };
    let req = RebalanceRequest { date: RebalanceDate::new(0), holdings: &holdings, bucket_filter: None };
    let result = engine.rebalance(&req, &collab, &config, &sink).unwrap();

    for existing in ["A", "B", "C", "D", "E"] {
        assert!(
            result.targets.iter().any(|t| t.asset == existing),
            "{existing} is already held and must never be silently dropped by the bucket cap"
        );
    }

    let new_opens: Vec<_> = ["F", "G", "H"]
        .into_iter()
        .filter(|a| result.targets.iter().any(|t| t.asset == *a && t.action == Action::Open))
        .collect();
    assert!(new_opens.len() <= 2, "no more than max_positions_per_bucket new names may be admitted: got {new_opens:?}");
    assert!(new_opens.contains(&"F"), "the strongest new candidate must be admitted");
    assert!(new_opens.contains(&"G"), "the second-strongest new candidate must be admitted");
    assert!(!new_opens.contains(&"H"), "the weakest new candidate must be capped out");
}
