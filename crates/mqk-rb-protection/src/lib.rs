//! mqk-rb-protection (C9)
//!
//! Sole authority for approving any position-mutating action. Consults the
//! four protection managers in a fixed priority order and short-circuits on
//! the first denial. Grounded directly on `mqk_risk::engine::evaluate`'s
//! ordered-guard-chain: early-return `Decision`s, a sticky override that can
//! bypass lower-priority checks, and "treat a failure as the conservative
//! outcome".
//!
//! Every manager consulted here (`mqk-rb-grace`, `mqk-rb-holding`,
//! `mqk-rb-whipsaw`, `mqk-rb-core-asset`) is a pure, IO-free function over
//! already-computed local state, so none of them can actually raise —
//! spec.md §7's "protection manager error" conservative-deny fallback has no
//! live trigger in this crate today; if a future manager gains an external
//! collaborator, its error path should deny the same way a real denial does.

use std::time::Instant;

use mqk_rb_core_asset::CoreAssetManager;
use mqk_rb_grace::{GraceManager, GraceState};
use mqk_rb_holding::{HoldingConfig, HoldingManager};
use mqk_rb_regime::{Asset, RebalanceDate, RegimeContext, RegimeSeverity};
use mqk_rb_types::Action;
use mqk_rb_whipsaw::{WhipsawConfig, WhipsawManager};

#[derive(Clone, Debug, PartialEq)]
pub struct ProtectionConfig {
    pub enable_regime_overrides: bool,
    pub regime_severity_threshold: RegimeSeverity,
    pub override_cooldown_days: i64,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            enable_regime_overrides: true,
            regime_severity_threshold: RegimeSeverity::Critical,
            override_cooldown_days: 10,
        }
    }
}

pub struct ProtectionRequest<'a> {
    pub asset: Asset,
    pub action: Action,
    pub date: RebalanceDate,
    pub current_size: f64,
    pub target_size: f64,
    pub reason: String,
    pub regime: &'a RegimeContext,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlockingSystem {
    CoreAsset,
    Grace,
    Holding,
    Whipsaw,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OverridingSystem {
    RegimeOverride,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProtectionDecision {
    pub approved: bool,
    pub reason: String,
    pub blocking_systems: Vec<BlockingSystem>,
    pub overriding_system: Option<OverridingSystem>,
    pub timing_ms: f64,
}

/// Owns the orchestrator-level regime-override cooldown, separate from any
/// cooldown `mqk-rb-holding` tracks for its own internal override path —
/// the two operate at different priority levels (C9 priority 2 bypasses
/// priorities 3-5 wholesale; C6's own override only affects its own check).
#[derive(Clone, Debug, Default)]
pub struct ProtectionOrchestrator {
    last_override: std::collections::BTreeMap<Asset, RebalanceDate>,
}

impl ProtectionOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn decide(
        &mut self,
        request: &ProtectionRequest,
        core: &CoreAssetManager,
        grace: &GraceManager,
        holding: &mut HoldingManager,
        whipsaw: &WhipsawManager,
        config: &ProtectionConfig,
        holding_config: &HoldingConfig,
        whipsaw_config: &WhipsawConfig,
    ) -> ProtectionDecision {
        let started = Instant::now();
        let mut blocking_systems = Vec::new();

        // 1. Core Asset Immunity.
        let is_core = core.is_core(&request.asset, request.date);
        let restricts_core = matches!(request.action, Action::Close | Action::Decrease);
        if is_core && restricts_core {
            if config.enable_regime_overrides && request.regime.severity == RegimeSeverity::Critical {
                return self.finish(
                    true,
                    "regime critical override of core-asset immunity".to_string(),
                    blocking_systems,
                    Some(OverridingSystem::RegimeOverride),
                    started,
                );
            }
            blocking_systems.push(BlockingSystem::CoreAsset);
            return self.finish(false, "core_immunity".to_string(), blocking_systems, None, started);
        }

        // 2. Regime Override: eligible to bypass priorities 3-5 collectively.
        let override_eligible = config.enable_regime_overrides
            && request.regime.severity.meets(config.regime_severity_threshold)
            && self
                .last_override
                .get(&request.asset)
                .map_or(true, |last| request.date.days_since(*last) >= config.override_cooldown_days);

        if override_eligible {
            self.last_override.insert(request.asset.clone(), request.date);
            return self.finish(
                true,
                "regime severity override bypassed grace/holding/whipsaw".to_string(),
                blocking_systems,
                Some(OverridingSystem::RegimeOverride),
                started,
            );
        }

        // 3. Grace Period.
        let restricts_grace = matches!(request.action, Action::Close | Action::Decrease);
        if restricts_grace && grace.state_of(&request.asset) == Some(GraceState::Grace) {
            blocking_systems.push(BlockingSystem::Grace);
            return self.finish(false, "grace_active".to_string(), blocking_systems, None, started);
        }

        // 4. Holding Period.
        let holding_decision =
            holding.can_adjust(&request.asset, request.date, request.action, request.regime, holding_config);
        if !holding_decision.allowed {
            blocking_systems.push(BlockingSystem::Holding);
            return self.finish(false, holding_decision.reason, blocking_systems, None, started);
        }

        // 5. Whipsaw.
        let whipsaw_decision = match request.action {
            Action::Open => Some(whipsaw.can_open(&request.asset, request.date, whipsaw_config)),
            Action::Close => holding.position_age(&request.asset).map(|age| {
                whipsaw.can_close(age.entry_date, request.date, whipsaw_config)
            }),
            _ => None,
        };
        if let Some(decision) = whipsaw_decision {
            if !decision.allowed {
                blocking_systems.push(BlockingSystem::Whipsaw);
                return self.finish(false, decision.reason, blocking_systems, None, started);
            }
        }

        self.finish(true, "all protections satisfied".to_string(), blocking_systems, None, started)
    }

    fn finish(
        &self,
        approved: bool,
        reason: String,
        blocking_systems: Vec<BlockingSystem>,
        overriding_system: Option<OverridingSystem>,
        started: Instant,
    ) -> ProtectionDecision {
        let timing_ms = started.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(event = "protection_decision", approved, reason = %reason, "protection orchestrator decision");
        ProtectionDecision {
            approved,
            reason,
            blocking_systems,
            overriding_system,
            timing_ms,
        }
    }
}
