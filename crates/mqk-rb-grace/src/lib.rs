//! mqk-rb-grace (C5)
//!
//! Per-asset grace-period state machine: an under-scoring position is given
//! a decaying, bounded runway instead of an immediate close. Grounded on
//! `mqk-risk::types::RiskState` + `mqk-risk::engine::tick`/`evaluate` — sticky
//! state carried in a plain struct field, mutated by a pure evaluator that
//! returns a decision rather than acting on anything itself — generalized
//! from one global `RiskState` to one `GracePosition` per asset.

use std::collections::BTreeMap;

use mqk_rb_regime::{Asset, RebalanceDate};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq)]
pub struct GraceConfig {
    pub enable_grace_period: bool,
    pub grace_period_days: i64,
    /// Multiplicative daily decay applied to `current_size`, e.g. `0.9`.
    pub grace_decay_rate: f64,
    /// Floor on `current_size` as a fraction of `original_size`, e.g. `0.3`.
    pub min_decay_factor: f64,
    pub min_score_threshold: f64,
}

impl Default for GraceConfig {
    fn default() -> Self {
        Self {
            enable_grace_period: true,
            grace_period_days: 10,
            grace_decay_rate: 0.9,
            min_decay_factor: 0.3,
            min_score_threshold: 0.4,
        }
    }
}

/// The decision kind a grace evaluation resolves to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraceAction {
    GraceStart,
    GraceDecay,
    GraceRecovery,
    ForceClose,
    Hold,
}

/// Whether an asset currently has an open grace record, and which kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GraceState {
    Grace,
    ForceClosed,
}

#[derive(Clone, Debug, PartialEq)]
struct GracePosition {
    original_size: f64,
    original_score: f64,
    current_size: f64,
    entered: RebalanceDate,
    force_closed: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GraceOutcome {
    pub action: GraceAction,
    pub recommended_size: f64,
    pub reason: String,
}

/// Owns grace-period state across rebalance calls, one record per asset.
#[derive(Clone, Debug, Default)]
pub struct GraceManager {
    positions: BTreeMap<Asset, GracePosition>,
}

impl GraceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state_of(&self, asset: &str) -> Option<GraceState> {
        self.positions.get(asset).map(|p| {
            if p.force_closed {
                GraceState::ForceClosed
            } else {
                GraceState::Grace
            }
        })
    }

    /// Drop the grace record once the position is actually closed.
    pub fn clear(&mut self, asset: &str) {
        self.positions.remove(asset);
    }

    /// One rebalance-date evaluation for `asset`. Assumes at most one call
    /// per asset per date (the rebalancer's C10 loop).
    pub fn evaluate(
        &mut self,
        asset: &str,
        date: RebalanceDate,
        score: f64,
        current_size: f64,
        config: &GraceConfig,
    ) -> GraceOutcome {
        match self.positions.get(asset).cloned() {
            None => self.evaluate_active(asset, date, score, current_size, config),
            Some(position) => self.evaluate_grace(asset, date, score, position, config),
        }
    }

    fn evaluate_active(
        &mut self,
        asset: &str,
        date: RebalanceDate,
        score: f64,
        current_size: f64,
        config: &GraceConfig,
    ) -> GraceOutcome {
        if score >= config.min_score_threshold {
            return GraceOutcome {
                action: GraceAction::Hold,
                recommended_size: current_size,
                reason: "score above threshold, no grace record".to_string(),
            };
        }
        if !config.enable_grace_period {
            return GraceOutcome {
                action: GraceAction::Hold,
                recommended_size: current_size,
                reason: "score below threshold but grace period disabled".to_string(),
            };
        }
        self.positions.insert(
            asset.to_string(),
            GracePosition {
                original_size: current_size,
                original_score: score,
                current_size,
                entered: date,
                force_closed: false,
            },
        );
        GraceOutcome {
            action: GraceAction::GraceStart,
            recommended_size: current_size,
            reason: format!("score {score:.4} below threshold {:.4}", config.min_score_threshold),
        }
    }

    fn evaluate_grace(
        &mut self,
        asset: &str,
        date: RebalanceDate,
        score: f64,
        mut position: GracePosition,
        config: &GraceConfig,
    ) -> GraceOutcome {
        if position.force_closed {
            return GraceOutcome {
                action: GraceAction::ForceClose,
                recommended_size: 0.0,
                reason: "already forced closed, awaiting position close".to_string(),
            };
        }

        if score >= config.min_score_threshold {
            let recovered_size = position.original_size;
            self.positions.remove(asset);
            return GraceOutcome {
                action: GraceAction::GraceRecovery,
                recommended_size: recovered_size,
                reason: format!("score {score:.4} recovered above threshold"),
            };
        }

        let decayed = (position.current_size * config.grace_decay_rate)
            .max(config.min_decay_factor * position.original_size);
        position.current_size = decayed;

        let days_elapsed = date.days_since(position.entered);
        if days_elapsed >= config.grace_period_days {
            position.force_closed = true;
            self.positions.insert(asset.to_string(), position);
            return GraceOutcome {
                action: GraceAction::ForceClose,
                recommended_size: 0.0,
                reason: format!("grace period of {} days elapsed", config.grace_period_days),
            };
        }

        self.positions.insert(asset.to_string(), position.clone());
        GraceOutcome {
            action: GraceAction::GraceDecay,
            recommended_size: position.current_size,
            reason: format!("day {days_elapsed} of grace, size decayed to {:.6}", position.current_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: i64) -> RebalanceDate {
        RebalanceDate::new(d)
    }

    #[test]
    fn score_above_threshold_stays_active() {
        let mut mgr = GraceManager::new();
        let config = GraceConfig::default();
        let outcome = mgr.evaluate("A", date(0), 0.8, 0.1, &config);
        assert_eq!(outcome.action, GraceAction::Hold);
        assert!(mgr.state_of("A").is_none());
    }

    #[test]
    fn dropping_below_threshold_starts_grace() {
        let mut mgr = GraceManager::new();
        let config = GraceConfig::default();
        let outcome = mgr.evaluate("A", date(0), 0.1, 0.1, &config);
        assert_eq!(outcome.action, GraceAction::GraceStart);
        assert_eq!(mgr.state_of("A"), Some(GraceState::Grace));
    }

    #[test]
    fn disabled_grace_holds_without_record() {
        let mut mgr = GraceManager::new();
        let config = GraceConfig {
            enable_grace_period: false,
            ..GraceConfig::default()
        };
        let outcome = mgr.evaluate("A", date(0), 0.1, 0.1, &config);
        assert_eq!(outcome.action, GraceAction::Hold);
        assert!(mgr.state_of("A").is_none());
    }

    #[test]
    fn grace_decays_toward_floor_each_call() {
        let mut mgr = GraceManager::new();
        let config = GraceConfig {
            grace_decay_rate: 0.5,
            min_decay_factor: 0.1,
            grace_period_days: 100,
            ..GraceConfig::default()
        };
        mgr.evaluate("A", date(0), 0.1, 1.0, &config);
        let day1 = mgr.evaluate("A", date(1), 0.1, 1.0, &config);
        assert_eq!(day1.action, GraceAction::GraceDecay);
        assert!((day1.recommended_size - 0.5).abs() < 1e-9);
        let day2 = mgr.evaluate("A", date(2), 0.1, 1.0, &config);
        assert!((day2.recommended_size - 0.25).abs() < 1e-9);
    }

    #[test]
    fn recovery_restores_original_size_and_clears_record() {
        let mut mgr = GraceManager::new();
        let config = GraceConfig::default();
        mgr.evaluate("A", date(0), 0.1, 0.5, &config);
        let outcome = mgr.evaluate("A", date(1), 0.9, 0.5, &config);
        assert_eq!(outcome.action, GraceAction::GraceRecovery);
        assert_eq!(outcome.recommended_size, 0.5);
        assert!(mgr.state_of("A").is_none());
    }

    #[test]
    fn expiry_forces_close_and_sticks() {
        let mut mgr = GraceManager::new();
        let config = GraceConfig {
            grace_period_days: 2,
            ..GraceConfig::default()
        };
        mgr.evaluate("A", date(0), 0.1, 1.0, &config);
        let outcome = mgr.evaluate("A", date(2), 0.1, 1.0, &config);
        assert_eq!(outcome.action, GraceAction::ForceClose);
        assert_eq!(mgr.state_of("A"), Some(GraceState::ForceClosed));
        // Subsequent evaluations keep reporting force_close until cleared.
        let again = mgr.evaluate("A", date(3), 0.9, 1.0, &config);
        assert_eq!(again.action, GraceAction::ForceClose);
    }

    #[test]
    fn clear_removes_record_after_close() {
        let mut mgr = GraceManager::new();
        let config = GraceConfig::default();
        mgr.evaluate("A", date(0), 0.1, 0.5, &config);
        mgr.clear("A");
        assert!(mgr.state_of("A").is_none());
    }
}
