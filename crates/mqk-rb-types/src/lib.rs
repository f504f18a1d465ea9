//! mqk-rb-types
//!
//! Cross-cutting closed sum types shared by every pipeline stage (C1-C10).
//! Kept in one pure, dependency-free-but-`serde`-aware crate so universe
//! building, scoring, sizing, and the engine all agree on the same wire
//! vocabulary — "enums everywhere", per spec.md §9: exhaustive `match`es are
//! a correctness requirement, not a style preference.

use serde::{Deserialize, Serialize};

/// Why an asset entered the universe / how strongly to prefer it.
///
/// Declaration order doubles as priority order (`Portfolio` is the
/// highest-priority / first-kept variant) so a derived `Ord` sorts
/// portfolio assets first, exactly as C1 and C3 require.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Portfolio,
    Trending,
    Regime,
    Fallback,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Portfolio => "portfolio",
            Priority::Trending => "trending",
            Priority::Regime => "regime",
            Priority::Fallback => "fallback",
        }
    }

    pub fn is_portfolio(self) -> bool {
        matches!(self, Priority::Portfolio)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The action a rebalancing target represents.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Open,
    Increase,
    Decrease,
    Close,
    Hold,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Open => "open",
            Action::Increase => "increase",
            Action::Decrease => "decrease",
            Action::Close => "close",
            Action::Hold => "hold",
        }
    }

    /// `true` for the actions the Protection Orchestrator must approve.
    pub fn is_mutating(self) -> bool {
        !matches!(self, Action::Hold)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// C4 Stage-1 base-sizing mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMode {
    EqualWeight,
    ScoreWeighted,
    Adaptive,
}

/// C4 residual-distribution policy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualStrategy {
    SafeTopSlice,
    Proportional,
    CashBucket,
}

/// Synthetic asset identifier for unallocated residual cash (C4).
pub const CASH_ASSET: &str = "CASH";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_order_is_portfolio_first() {
        let mut v = vec![
            Priority::Fallback,
            Priority::Portfolio,
            Priority::Regime,
            Priority::Trending,
        ];
        v.sort();
        assert_eq!(
            v,
            vec![
                Priority::Portfolio,
                Priority::Trending,
                Priority::Regime,
                Priority::Fallback
            ]
        );
    }

    #[test]
    fn action_mutating() {
        assert!(!Action::Hold.is_mutating());
        assert!(Action::Open.is_mutating());
        assert!(Action::Close.is_mutating());
    }

    #[test]
    fn serde_round_trip_lowercase() {
        let s = serde_json::to_string(&Action::Open).unwrap();
        assert_eq!(s, "\"open\"");
        let p = serde_json::to_string(&Priority::Fallback).unwrap();
        assert_eq!(p, "\"fallback\"");
    }
}
