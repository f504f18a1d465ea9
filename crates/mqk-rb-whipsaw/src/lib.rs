//! mqk-rb-whipsaw (C7)
//!
//! Per-asset append-only open/close event history, bounding how many
//! full open-close cycles an asset may complete within a rolling window
//! and how quickly a freshly opened position may be closed. Grounded on
//! `mqk-audit::AuditWriter`'s append-only log shape (minus persistence —
//! this history lives in memory only) and `mqk-portfolio::ordering`'s
//! canonical ordering-by-timestamp discipline.

use std::collections::BTreeMap;

use mqk_rb_regime::{Asset, RebalanceDate};

#[derive(Clone, Debug, PartialEq)]
pub struct WhipsawConfig {
    pub whipsaw_protection_days: i64,
    pub max_cycles_per_protection_period: usize,
    pub min_position_duration_hours: i64,
}

impl Default for WhipsawConfig {
    fn default() -> Self {
        Self {
            whipsaw_protection_days: 30,
            max_cycles_per_protection_period: 3,
            min_position_duration_hours: 24,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PositionEventKind {
    Open,
    Close,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PositionEvent {
    pub kind: PositionEventKind,
    pub date: RebalanceDate,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WhipsawDecision {
    pub allowed: bool,
    pub reason: String,
}

/// Owns per-asset append-only position-event history.
#[derive(Clone, Debug, Default)]
pub struct WhipsawManager {
    history: BTreeMap<Asset, Vec<PositionEvent>>,
}

impl WhipsawManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self, asset: &str) -> &[PositionEvent] {
        self.history.get(asset).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Record an event. Callers must only record *approved* actions — a
    /// rejected action must never mutate history (spec.md §4.7).
    pub fn record(&mut self, asset: &str, kind: PositionEventKind, date: RebalanceDate) {
        self.history
            .entry(asset.to_string())
            .or_default()
            .push(PositionEvent { kind, date });
    }

    /// Completed open→close cycles whose `close` falls within the protection
    /// window ending at `date`.
    fn completed_cycles_in_window(&self, asset: &str, date: RebalanceDate, config: &WhipsawConfig) -> usize {
        let events = self.history(asset);
        let cutoff = date.plus_days(-config.whipsaw_protection_days);
        let mut cycles = 0usize;
        let mut open_pending = false;
        for event in events {
            match event.kind {
                PositionEventKind::Open => open_pending = true,
                PositionEventKind::Close => {
                    if open_pending && event.date >= cutoff {
                        cycles += 1;
                    }
                    open_pending = false;
                }
            }
        }
        cycles
    }

    pub fn can_open(&self, asset: &str, date: RebalanceDate, config: &WhipsawConfig) -> WhipsawDecision {
        let cycles = self.completed_cycles_in_window(asset, date, config);
        if cycles < config.max_cycles_per_protection_period {
            WhipsawDecision {
                allowed: true,
                reason: format!(
                    "{cycles} of {} cycles used in last {} days",
                    config.max_cycles_per_protection_period, config.whipsaw_protection_days
                ),
            }
        } else {
            WhipsawDecision {
                allowed: false,
                reason: format!(
                    "{cycles} cycles already completed within the {}-day protection window",
                    config.whipsaw_protection_days
                ),
            }
        }
    }

    pub fn can_close(
        &self,
        open_date: RebalanceDate,
        date: RebalanceDate,
        config: &WhipsawConfig,
    ) -> WhipsawDecision {
        let elapsed_hours = date.days_since(open_date) * 24;
        if elapsed_hours >= config.min_position_duration_hours {
            WhipsawDecision {
                allowed: true,
                reason: format!("held for {elapsed_hours}h, minimum {}h met", config.min_position_duration_hours),
            }
        } else {
            WhipsawDecision {
                allowed: false,
                reason: format!(
                    "held for {elapsed_hours}h, below minimum {}h",
                    config.min_position_duration_hours
                ),
            }
        }
    }
}
