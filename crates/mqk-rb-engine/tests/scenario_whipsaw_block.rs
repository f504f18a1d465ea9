//! spec.md §8 scenario 3: a position that completes an open/close cycle
//! cannot reopen inside the protection window, but can once the window
//! elapses.

mod common;

use std::collections::BTreeMap;

use common::{FakeCatalog, FakePrices, FakeRegime, FakeScores, FakeTechnical, FakeFundamental};
use mqk_rb_config::RebalanceConfig;
use mqk_rb_engine::{Collaborators, RebalanceRequest, RebalancerEngine};
use mqk_rb_events::{EventKind, VecEventSink};
use mqk_rb_regime::RebalanceDate;
use mqk_rb_types::Action;

#[test]
fn reopen_denied_inside_window_then_approved_after_it_elapses() {
    let catalog = FakeCatalog(std::collections::HashMap::from([(
        "Risk Assets".to_string(),
        vec!["AAPL".to_string()],
    )]));
    let regime = FakeRegime::new(vec!["Risk Assets".to_string()], vec!["AAPL".to_string()]);
    let prices = FakePrices(Default::default());

    let mut technical_scores = FakeScores::default();
    let mut fundamental_scores = FakeScores::default();
    for (day, score) in [(0, 0.90), (1, 0.10), (2, 0.10), (3, 0.90), (17, 0.90)] {
        technical_scores.set("AAPL", day, score);
        fundamental_scores.set("AAPL", day, score);
    }
    let technical = FakeTechnical(technical_scores);
    let fundamental = FakeFundamental(fundamental_scores);

    let mut config = RebalanceConfig::default().to_domain();
    config.grace.grace_period_days = 1;
    config.whipsaw.whipsaw_protection_days = 14;
    config.whipsaw.max_cycles_per_protection_period = 1;
    config.whipsaw.min_position_duration_hours = 0;
    config.holding.min_holding_period_days = 0;
    config.protection.enable_regime_overrides = false;

    let mut holdings: BTreeMap<String, f64> = BTreeMap::new();

    let mut engine = RebalancerEngine::new();
    let sink = VecEventSink::new();
    let collab = Collaborators {
        regime_provider: &regime,
        bucket_catalog: &catalog,
        price_provider: &prices,
        technical: Some(&technical),
        fundamental: Some(&fundamental),
    };

    // Day 0: strong score opens the position.
    let result = run(&mut engine, &collab, &config, &sink, &holdings, 0);
    let aapl = result.targets.iter().find(|t| t.asset == "AAPL").expect("AAPL should open");
    assert_eq!(aapl.action, Action::Open);
    holdings.insert("AAPL".to_string(), aapl.target_alloc);

    // Day 1: score collapses, grace starts (position held, not yet closed).
    let result = run(&mut engine, &collab, &config, &sink, &holdings, 1);
    let aapl = result.targets.iter().find(|t| t.asset == "AAPL").unwrap();
    assert_eq!(aapl.action, Action::Hold);
    holdings.insert("AAPL".to_string(), aapl.target_alloc);

    // Day 2: grace_period_days == 1 has elapsed; force close completes the cycle.
    let result = run(&mut engine, &collab, &config, &sink, &holdings, 2);
    let aapl = result.targets.iter().find(|t| t.asset == "AAPL").unwrap();
    assert_eq!(aapl.action, Action::Close);
    holdings.remove("AAPL");

    // Day 3: only one day after the close; reopening is still inside the
    // 14-day protection window with max_cycles_per_protection_period == 1.
    let result = run(&mut engine, &collab, &config, &sink, &holdings, 3);
    assert!(
        result.targets.iter().all(|t| t.asset != "AAPL"),
        "a denied open must never appear in the target list"
    );

    let events = sink.snapshot();
    let day3_decision = events
        .iter()
        .filter(|e| e.kind == EventKind::ProtectionDecision && e.asset == "AAPL")
        .last()
        .expect("a protection decision must have been recorded for the denied reopen");
    assert_eq!(day3_decision.metadata["approved"], false);
    assert!(day3_decision.metadata["blocking_systems"]
        .as_array()
        .unwrap()
        .iter()
        .any(|v| v.as_str() == Some("Whipsaw")));

    // Day 17: 15 days after the close, outside the protection window; the
    // completed cycle no longer counts and the reopen is approved.
    let result = run(&mut engine, &collab, &config, &sink, &holdings, 17);
    let aapl = result.targets.iter().find(|t| t.asset == "AAPL").expect("AAPL should reopen once the window elapses");
    assert_eq!(aapl.action, Action::Open);
}

fn run<'a>(
    engine: &mut RebalancerEngine,
    collab: &Collaborators<'a>,
    config: &mqk_rb_config::DomainConfig,
    sink: &VecEventSink,
    holdings: &BTreeMap<String, f64>,
    day: i64,
) -> mqk_rb_engine::RebalanceResult {
    let req = RebalanceRequest {
        date: RebalanceDate::new(day),
        holdings,
        bucket_filter: None,
    };
    engine.rebalance(&req, collab, config, sink).unwrap()
}
