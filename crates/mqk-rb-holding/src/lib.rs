//! mqk-rb-holding (C6)
//!
//! Per-asset minimum/maximum holding-period enforcement with a
//! regime-severity-gated, cooldown-limited override. Grounded on
//! `mqk-risk::pdt`: a policy struct plus a `BTreeMap`-keyed rolling state,
//! consulted by a pure decision function rather than acting directly.

use std::collections::BTreeMap;

use mqk_rb_regime::{Asset, RebalanceDate, RegimeContext, RegimeSeverity};
use mqk_rb_types::Action;

#[derive(Clone, Debug, PartialEq)]
pub struct HoldingConfig {
    pub min_holding_period_days: i64,
    pub max_holding_period_days: i64,
    pub enable_regime_overrides: bool,
    pub regime_severity_threshold: RegimeSeverity,
    pub override_cooldown_days: i64,
}

impl Default for HoldingConfig {
    fn default() -> Self {
        Self {
            min_holding_period_days: 5,
            max_holding_period_days: 180,
            enable_regime_overrides: true,
            regime_severity_threshold: RegimeSeverity::High,
            override_cooldown_days: 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PositionAge {
    pub entry_date: RebalanceDate,
    pub entry_size: f64,
    pub last_adjustment: Option<RebalanceDate>,
    pub adjustment_count: u32,
}

/// Extra signal alongside the allow/deny verdict.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HoldingSignal {
    /// Ordinary allow/deny, no special circumstance.
    Normal,
    /// Allowed specifically because a regime override fired.
    RegimeOverride,
    /// Allowed because `age >= max_holding_period_days`; caller should
    /// treat this as a forced review even though the action is permitted.
    MaxAgeReview,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HoldingDecision {
    pub allowed: bool,
    pub signal: HoldingSignal,
    pub reason: String,
}

/// Owns per-asset holding-age state and override cooldowns across calls.
#[derive(Clone, Debug, Default)]
pub struct HoldingManager {
    positions: BTreeMap<Asset, PositionAge>,
    last_override: BTreeMap<Asset, RebalanceDate>,
}

impl HoldingManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position_age(&self, asset: &str) -> Option<&PositionAge> {
        self.positions.get(asset)
    }

    pub fn record_open(&mut self, asset: &str, date: RebalanceDate, size: f64) {
        self.positions.insert(
            asset.to_string(),
            PositionAge {
                entry_date: date,
                entry_size: size,
                last_adjustment: None,
                adjustment_count: 0,
            },
        );
    }

    pub fn record_adjust(&mut self, asset: &str, date: RebalanceDate) {
        if let Some(p) = self.positions.get_mut(asset) {
            p.last_adjustment = Some(date);
            p.adjustment_count += 1;
        }
    }

    pub fn record_close(&mut self, asset: &str) {
        self.positions.remove(asset);
        self.last_override.remove(asset);
    }

    /// `action` is the mutating action under consideration: `open` always
    /// succeeds here (a brand-new position has no age to restrict); `close`/
    /// `decrease` are the ones a minimum holding period can deny;
    /// `increase`/`hold` are unrestricted by this manager.
    pub fn can_adjust(
        &mut self,
        asset: &str,
        date: RebalanceDate,
        action: Action,
        regime: &RegimeContext,
        config: &HoldingConfig,
    ) -> HoldingDecision {
        let Some(position) = self.positions.get(asset).cloned() else {
            return HoldingDecision {
                allowed: true,
                signal: HoldingSignal::Normal,
                reason: "no holding record (new open)".to_string(),
            };
        };

        let age = date.days_since(position.entry_date);
        let restrictable = matches!(action, Action::Close | Action::Decrease);

        if restrictable && age < config.min_holding_period_days {
            if config.enable_regime_overrides && self.override_available(asset, date, regime, config) {
                self.last_override.insert(asset.to_string(), date);
                return HoldingDecision {
                    allowed: true,
                    signal: HoldingSignal::RegimeOverride,
                    reason: format!(
                        "regime severity {:?} met {:?} threshold, cooldown elapsed",
                        regime.severity, config.regime_severity_threshold
                    ),
                };
            }
            return HoldingDecision {
                allowed: false,
                signal: HoldingSignal::Normal,
                reason: format!(
                    "age {age} below minimum holding period {}",
                    config.min_holding_period_days
                ),
            };
        }

        if age >= config.max_holding_period_days {
            return HoldingDecision {
                allowed: true,
                signal: HoldingSignal::MaxAgeReview,
                reason: format!("age {age} reached maximum holding period, forced review"),
            };
        }

        HoldingDecision {
            allowed: true,
            signal: HoldingSignal::Normal,
            reason: "within holding period bounds".to_string(),
        }
    }

    fn override_available(
        &self,
        asset: &str,
        date: RebalanceDate,
        regime: &RegimeContext,
        config: &HoldingConfig,
    ) -> bool {
        if !regime.severity.meets(config.regime_severity_threshold) {
            return false;
        }
        match self.last_override.get(asset) {
            None => true,
            Some(last) => date.days_since(*last) >= config.override_cooldown_days,
        }
    }
}
