//! mqk-rb-engine (C10)
//!
//! `RebalancerEngine` is the sole public entry point and the sole owner of
//! cross-call protection-manager state (grace, holding, whipsaw, core-asset,
//! and the orchestrator's own override cooldown). `rebalance()` clones that
//! state, computes the whole target list against the clones, and assigns
//! them back to `self` only once every per-asset decision has succeeded —
//! grounded on `mqk_backtest::engine::BacktestEngine::run`'s single
//! end-of-run commit-or-discard model (spec.md §5).

mod output;
mod selection;
mod types;

pub use output::targets_to_json;
pub use types::{Collaborators, RebalanceError, RebalanceRequest, RebalanceResult, RebalancingTarget};

use std::collections::{BTreeMap, BTreeSet};

use serde_json::json;
use uuid::Uuid;

use mqk_rb_config::DomainConfig;
use mqk_rb_core_asset::CoreAssetManager;
use mqk_rb_events::{Event, EventKind, EventSink};
use mqk_rb_grace::{GraceAction, GraceManager};
use mqk_rb_holding::HoldingManager;
use mqk_rb_protection::{ProtectionOrchestrator, ProtectionRequest};
use mqk_rb_regime::{Asset, RebalanceDate};
use mqk_rb_scoring::AssetScore;
use mqk_rb_types::{Action, Priority, CASH_ASSET};
use mqk_rb_whipsaw::{PositionEventKind, WhipsawManager};

/// Band within which a sizing change is left as `hold` rather than an
/// explicit `increase`/`decrease` (spec.md §4.10 step 7).
const REBALANCE_BAND: f64 = 0.05;
const EPS: f64 = 1e-9;

/// Owns the lifecycle-manager state that must survive across rebalance
/// calls. One instance per portfolio (spec.md §5: "no cross-portfolio
/// sharing").
#[derive(Clone, Debug, Default)]
pub struct RebalancerEngine {
    grace: GraceManager,
    holding: HoldingManager,
    whipsaw: WhipsawManager,
    core_asset: CoreAssetManager,
    protection: ProtectionOrchestrator,
    session_id: Uuid,
}

impl RebalancerEngine {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            ..Self::default()
        }
    }

    pub fn core_asset_manager(&self) -> &CoreAssetManager {
        &self.core_asset
    }

    pub fn holding_manager(&self) -> &HoldingManager {
        &self.holding
    }

    /// Run one rebalance date end to end. On `Err`, no manager state changes
    /// (the clone-then-commit discipline above); on `Ok`, `self` now reflects
    /// every approved mutation from this call.
    pub fn rebalance(
        &mut self,
        req: &RebalanceRequest,
        collab: &Collaborators,
        config: &DomainConfig,
        sink: &dyn EventSink,
    ) -> Result<RebalanceResult, RebalanceError> {
        let mut grace = self.grace.clone();
        let mut holding = self.holding.clone();
        let mut whipsaw = self.whipsaw.clone();
        let mut core_asset = self.core_asset.clone();
        let mut protection = self.protection.clone();

        // Backfill holding-age tracking for holdings inherited from outside
        // this engine's own open/close history (e.g. the first call after
        // loading a portfolio). Treated as opened on `req.date`, per
        // DESIGN.md.
        for (asset, size) in req.holdings {
            if holding.position_age(asset).is_none() {
                holding.record_open(asset, req.date, *size);
            }
        }

        let universe = mqk_rb_universe::build_universe(
            collab.regime_provider,
            collab.bucket_catalog,
            &mqk_rb_universe::UniverseRequest {
                date: req.date,
                holdings: req.holdings,
                bucket_filter: req.bucket_filter,
                min_trending_confidence: config.min_trending_confidence,
            },
        )?;

        let technical = if config.enable_technical { collab.technical } else { None };
        let fundamental = if config.enable_fundamental { collab.fundamental } else { None };
        let scored = mqk_rb_scoring::score_universe(
            &universe,
            req.holdings,
            technical,
            fundamental,
            &config.scoring,
        )?;

        let bucket_result = if config.bucket.enable_bucket_diversification {
            mqk_rb_buckets::apply(&scored.scores, collab.bucket_catalog, &config.bucket)
        } else {
            mqk_rb_buckets::BucketResult {
                accepted: scored.scores.clone(),
                rejected: Vec::new(),
                bucket_scale: BTreeMap::new(),
            }
        };

        let mut pool = bucket_result.accepted.clone();
        if config.enable_core_asset_management {
            self.auto_mark_smart_diversification(&bucket_result, &scored.scores, &mut core_asset, req.date, config, sink, &mut pool);
            let events = core_asset.perform_lifecycle_check(req.date, collab.bucket_catalog, collab.price_provider, &config.core_asset);
            for event in events {
                sink.emit(
                    Event::new(EventKind::CoreRevoked, self.session_id, &event.asset, format!("{:?}", event.revoked))
                        .with_metadata(json!({"reason": format!("{:?}", event.revoked)})),
                );
            }
        }

        let core_set: BTreeSet<Asset> = scored
            .scores
            .iter()
            .map(|s| s.asset.clone())
            .filter(|a| core_asset.is_core(a, req.date))
            .collect();

        let selection = selection::select(&pool, &core_set, config);

        let sizing_result = mqk_rb_sizing::size_positions(
            &selection.kept,
            collab.bucket_catalog,
            &bucket_result.bucket_scale,
            &core_set,
            &config.sizing,
        );

        let mut targets = Vec::new();

        for s in &selection.kept {
            self.apply_kept(s, &sizing_result.sizes, req, &universe, config, sink, &mut grace, &mut holding, &mut whipsaw, &core_asset, &mut protection, &mut targets);
        }

        for s in &selection.dropped_portfolio {
            self.apply_grace_managed(s, req, &universe, config, sink, &mut grace, &mut holding, &mut whipsaw, &core_asset, &mut protection, &mut targets);
        }

        for skipped in &scored.skipped {
            if let Some(current) = req.holdings.get(&skipped.asset) {
                targets.push(RebalancingTarget {
                    asset: skipped.asset.clone(),
                    action: Action::Hold,
                    current_alloc: *current,
                    target_alloc: *current,
                    priority: Priority::Portfolio,
                    score: 0.0,
                    reason: format!("missing data, holding retained: {}", skipped.reason),
                });
            }
        }

        if sizing_result.cash > EPS {
            targets.push(RebalancingTarget {
                asset: CASH_ASSET.to_string(),
                action: Action::Hold,
                current_alloc: 0.0,
                target_alloc: sizing_result.cash,
                priority: Priority::Fallback,
                score: 0.0,
                reason: "unallocated residual".to_string(),
            });
        }

        targets.sort_by(|a, b| a.asset.cmp(&b.asset));

        self.grace = grace;
        self.holding = holding;
        self.whipsaw = whipsaw;
        self.core_asset = core_asset;
        self.protection = protection;

        Ok(RebalanceResult {
            date: req.date,
            regime: universe.regime.regime,
            universe_size: universe.entries.len(),
            targets,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn auto_mark_smart_diversification(
        &self,
        bucket_result: &mqk_rb_buckets::BucketResult,
        all_scores: &[AssetScore],
        core_asset: &mut CoreAssetManager,
        date: RebalanceDate,
        config: &DomainConfig,
        sink: &dyn EventSink,
        pool: &mut Vec<AssetScore>,
    ) {
        for rejected in &bucket_result.rejected {
            let Some(score) = all_scores.iter().find(|s| s.asset == rejected.asset) else {
                continue;
            };

            // Bucket enforcement has no notion of core immunity; an asset
            // already core from an earlier date must stay in the pipeline
            // even if this date's bucket ranking would have rejected it.
            if core_asset.is_core(&rejected.asset, date) {
                pool.push(score.clone());
                continue;
            }

            if score.combined < config.core_asset.core_asset_override_threshold {
                continue;
            }
            if core_asset
                .mark_as_core(&rejected.asset, date, "smart_diversification", score.combined, &config.core_asset)
                .is_ok()
            {
                pool.push(score.clone());
                sink.emit(
                    Event::new(EventKind::CoreMarked, self.session_id, &rejected.asset, "smart diversification override")
                        .with_after(json!({"score": score.combined, "bucket": rejected.bucket})),
                );
            }
        }
    }

    /// Normal C4-sized path: selected assets compared against their current
    /// allocation with the 5% rebalance band, then routed through C9.
    #[allow(clippy::too_many_arguments)]
    fn apply_kept(
        &self,
        s: &AssetScore,
        sizes: &BTreeMap<Asset, f64>,
        req: &RebalanceRequest,
        universe: &mqk_rb_universe::Universe,
        config: &DomainConfig,
        sink: &dyn EventSink,
        grace: &mut GraceManager,
        holding: &mut HoldingManager,
        whipsaw: &mut WhipsawManager,
        core_asset: &CoreAssetManager,
        protection: &mut ProtectionOrchestrator,
        targets: &mut Vec<RebalancingTarget>,
    ) {
        let current = req.holdings.get(&s.asset).copied().unwrap_or(0.0);
        let target = sizes.get(&s.asset).copied().unwrap_or(0.0);
        let action = derive_action(current, target);

        if !action.is_mutating() {
            targets.push(RebalancingTarget {
                asset: s.asset.clone(),
                action,
                current_alloc: current,
                target_alloc: current,
                priority: s.priority,
                score: s.combined,
                reason: "within rebalance band".to_string(),
            });
            return;
        }

        let request = ProtectionRequest {
            asset: s.asset.clone(),
            action,
            date: req.date,
            current_size: current,
            target_size: target,
            reason: "sizing update".to_string(),
            regime: &universe.regime,
        };
        let decision = protection.decide(
            &request,
            core_asset,
            grace,
            holding,
            whipsaw,
            &config.protection,
            &config.holding,
            &config.whipsaw,
        );
        self.emit_protection_decision(&request, &decision, sink);

        let (final_action, final_target) = if decision.approved {
            (action, target)
        } else {
            match action {
                Action::Open => return, // dropped entirely; never a holding
                Action::Close | Action::Decrease | Action::Increase => (Action::Hold, current),
                Action::Hold => unreachable!("non-mutating actions return above"),
            }
        };

        self.commit_mutation(&s.asset, final_action, final_target, req.date, config, sink, grace, holding, whipsaw);

        targets.push(RebalancingTarget {
            asset: s.asset.clone(),
            action: final_action,
            current_alloc: current,
            target_alloc: final_target,
            priority: s.priority,
            score: s.combined,
            reason: decision.reason,
        });
    }

    /// Portfolio assets that fell below `min_score_threshold` (and are not
    /// core-immune): handled by C5's state machine rather than C4 sizing.
    #[allow(clippy::too_many_arguments)]
    fn apply_grace_managed(
        &self,
        s: &AssetScore,
        req: &RebalanceRequest,
        universe: &mqk_rb_universe::Universe,
        config: &DomainConfig,
        sink: &dyn EventSink,
        grace: &mut GraceManager,
        holding: &mut HoldingManager,
        whipsaw: &mut WhipsawManager,
        core_asset: &CoreAssetManager,
        protection: &mut ProtectionOrchestrator,
        targets: &mut Vec<RebalancingTarget>,
    ) {
        let current = req.holdings.get(&s.asset).copied().unwrap_or(0.0);
        let outcome = grace.evaluate(&s.asset, req.date, s.combined, current, &config.grace);

        if let Some(kind) = grace_event_kind(outcome.action) {
            sink.emit(
                Event::new(kind, self.session_id, &s.asset, outcome.reason.clone())
                    .with_before(json!({"size": current}))
                    .with_after(json!({"size": outcome.recommended_size})),
            );
        }

        let forced_close = matches!(outcome.action, GraceAction::ForceClose);
        let (action, target) = match outcome.action {
            GraceAction::Hold | GraceAction::GraceStart => (Action::Hold, current),
            GraceAction::GraceDecay => {
                if outcome.recommended_size + EPS < current {
                    (Action::Decrease, outcome.recommended_size)
                } else {
                    (Action::Hold, current)
                }
            }
            GraceAction::GraceRecovery => {
                if outcome.recommended_size > current + EPS {
                    (Action::Increase, outcome.recommended_size)
                } else {
                    (Action::Hold, current)
                }
            }
            GraceAction::ForceClose => (Action::Close, 0.0),
        };

        if !action.is_mutating() {
            targets.push(RebalancingTarget {
                asset: s.asset.clone(),
                action,
                current_alloc: current,
                target_alloc: current,
                priority: s.priority,
                score: s.combined,
                reason: outcome.reason,
            });
            return;
        }

        let request = ProtectionRequest {
            asset: s.asset.clone(),
            action,
            date: req.date,
            current_size: current,
            target_size: target,
            reason: outcome.reason.clone(),
            regime: &universe.regime,
        };
        let decision = protection.decide(
            &request,
            core_asset,
            grace,
            holding,
            whipsaw,
            &config.protection,
            &config.holding,
            &config.whipsaw,
        );
        self.emit_protection_decision(&request, &decision, sink);

        let (final_action, final_target) = if decision.approved || forced_close {
            (action, target)
        } else {
            (Action::Hold, current)
        };

        self.commit_mutation(&s.asset, final_action, final_target, req.date, config, sink, grace, holding, whipsaw);
        if final_action == Action::Close {
            grace.clear(&s.asset);
        }

        targets.push(RebalancingTarget {
            asset: s.asset.clone(),
            action: final_action,
            current_alloc: current,
            target_alloc: final_target,
            priority: s.priority,
            score: s.combined,
            reason: outcome.reason,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn commit_mutation(
        &self,
        asset: &str,
        action: Action,
        target: f64,
        date: RebalanceDate,
        config: &DomainConfig,
        sink: &dyn EventSink,
        grace: &mut GraceManager,
        holding: &mut HoldingManager,
        whipsaw: &mut WhipsawManager,
    ) {
        match action {
            Action::Open => {
                holding.record_open(asset, date, target);
                if config.enable_whipsaw_protection {
                    whipsaw.record(asset, PositionEventKind::Open, date);
                }
                sink.emit(Event::new(EventKind::PositionOpen, self.session_id, asset, "rebalance").with_after(json!({"size": target})));
            }
            Action::Close => {
                holding.record_close(asset);
                if config.enable_whipsaw_protection {
                    whipsaw.record(asset, PositionEventKind::Close, date);
                }
                grace.clear(asset);
                sink.emit(Event::new(EventKind::PositionClose, self.session_id, asset, "rebalance").with_before(json!({"size": target})));
            }
            Action::Increase | Action::Decrease => {
                holding.record_adjust(asset, date);
                sink.emit(
                    Event::new(EventKind::PositionAdjust, self.session_id, asset, "rebalance").with_after(json!({"size": target})),
                );
            }
            Action::Hold => {}
        }
    }

    fn emit_protection_decision(&self, request: &ProtectionRequest, decision: &mqk_rb_protection::ProtectionDecision, sink: &dyn EventSink) {
        sink.emit(
            Event::new(EventKind::ProtectionDecision, self.session_id, &request.asset, decision.reason.clone()).with_metadata(json!({
                "action": request.action.as_str(),
                "approved": decision.approved,
                "blocking_systems": decision.blocking_systems.iter().map(|b| format!("{b:?}")).collect::<Vec<_>>(),
                "overriding_system": decision.overriding_system.map(|o| format!("{o:?}")),
                "timing_ms": decision.timing_ms,
            })),
        );
    }
}

fn derive_action(current: f64, target: f64) -> Action {
    if current <= EPS && target > EPS {
        Action::Open
    } else if target <= EPS && current > EPS {
        Action::Close
    } else if (target - current).abs() > REBALANCE_BAND {
        if target > current {
            Action::Increase
        } else {
            Action::Decrease
        }
    } else {
        Action::Hold
    }
}

fn grace_event_kind(action: GraceAction) -> Option<EventKind> {
    match action {
        GraceAction::Hold => None,
        GraceAction::GraceStart => Some(EventKind::GraceStart),
        GraceAction::GraceDecay => Some(EventKind::GraceDecay),
        GraceAction::GraceRecovery => Some(EventKind::GraceRecovery),
        GraceAction::ForceClose => Some(EventKind::GraceForceClose),
    }
}
