//! spec.md §8 scenario 2: a sub-threshold holding decays under grace
//! instead of closing immediately, and the eventual forced close overrides
//! a whipsaw denial.

mod common;

use std::collections::BTreeMap;

use common::{FakeCatalog, FakePrices, FakeRegime, FakeScores, FakeTechnical, FakeFundamental};
use mqk_rb_config::RebalanceConfig;
use mqk_rb_engine::{Collaborators, RebalanceRequest, RebalancerEngine};
use mqk_rb_events::{EventKind, VecEventSink};
use mqk_rb_regime::RebalanceDate;
use mqk_rb_types::Action;

#[test]
fn grace_decays_then_force_closes_overriding_whipsaw_denial() {
    let catalog = FakeCatalog(Default::default());
    let regime = FakeRegime::new(vec![], vec![]);
    let prices = FakePrices(Default::default());
    let technical = FakeTechnical(FakeScores::with_defaults(&[("TSLA", 0.40)]));
    let fundamental = FakeFundamental(FakeScores::with_defaults(&[("TSLA", 0.40)]));

    let mut config = RebalanceConfig::default().to_domain();
    config.grace.grace_period_days = 5;
    config.grace.grace_decay_rate = 0.8;
    config.grace.min_decay_factor = 0.1;
    config.holding.min_holding_period_days = 0;
    config.whipsaw.min_position_duration_hours = 200;

    let mut holdings: BTreeMap<String, f64> = BTreeMap::new();
    holdings.insert("TSLA".to_string(), 0.15);

    let mut engine = RebalancerEngine::new();
    let sink = VecEventSink::new();
    let collab = Collaborators {
        regime_provider: &regime,
        bucket_catalog: &catalog,
        price_provider: &prices,
        technical: Some(&technical),
        fundamental: Some(&fundamental),
    };

    let expected_sizes = [0.15, 0.12, 0.096, 0.0768, 0.06144];
    for (day, expected) in expected_sizes.iter().enumerate() {
        let req = RebalanceRequest {
            date: RebalanceDate::new(day as i64),
            holdings: &holdings,
            bucket_filter: None,
        };
        let result = engine.rebalance(&req, &collab, &config, &sink).unwrap();
        let tsla = result.targets.iter().find(|t| t.asset == "TSLA").unwrap();
        assert!(
            (tsla.target_alloc - expected).abs() < 1e-6,
            "day {day}: expected size {expected}, got {}",
            tsla.target_alloc
        );
        holdings.insert("TSLA".to_string(), tsla.target_alloc);
    }

    let req = RebalanceRequest {
        date: RebalanceDate::new(5),
        holdings: &holdings,
        bucket_filter: None,
    };
    let result = engine.rebalance(&req, &collab, &config, &sink).unwrap();
    let tsla = result.targets.iter().find(|t| t.asset == "TSLA").unwrap();
    assert_eq!(tsla.action, Action::Close);

    let events = sink.snapshot();
    let day5_decision = events
        .iter()
        .filter(|e| e.kind == EventKind::ProtectionDecision && e.asset == "TSLA")
        .last()
        .expect("a protection decision must have been recorded for TSLA's close");
    assert_eq!(day5_decision.metadata["approved"], false, "whipsaw should have denied this close on its own");
    assert!(events.iter().any(|e| e.kind == EventKind::GraceForceClose && e.asset == "TSLA"));
}
