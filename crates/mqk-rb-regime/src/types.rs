use crate::RebalanceDate;
use serde::{Deserialize, Serialize};

/// Asset identifier. An opaque handle; the engine never interprets it.
pub type Asset = String;

/// Bucket identifier. The reserved value `"Unknown"` is used for assets with
/// no classification in a `BucketCatalog`.
pub type Bucket = String;

/// Reserved bucket name for unclassified assets.
pub const UNKNOWN_BUCKET: &str = "Unknown";

/// Macro market regime classification.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Goldilocks,
    Reflation,
    Inflation,
    Deflation,
}

impl Regime {
    pub fn as_str(self) -> &'static str {
        match self {
            Regime::Goldilocks => "goldilocks",
            Regime::Reflation => "reflation",
            Regime::Inflation => "inflation",
            Regime::Deflation => "deflation",
        }
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derived severity tag for a regime reading.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeSeverity {
    Normal,
    High,
    Critical,
}

impl RegimeSeverity {
    /// `true` iff `self` meets or exceeds `threshold` on the Normal < High <
    /// Critical ordering.
    pub fn meets(self, threshold: RegimeSeverity) -> bool {
        self >= threshold
    }
}

/// One regime reading for a given rebalance date.
#[derive(Clone, Debug, PartialEq)]
pub struct RegimeContext {
    pub date: RebalanceDate,
    pub regime: Regime,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    pub severity: RegimeSeverity,
    /// Buckets the regime provider recommends emphasizing this date.
    pub preferred_buckets: Vec<Bucket>,
}

impl RegimeContext {
    pub fn new(
        date: RebalanceDate,
        regime: Regime,
        confidence: f64,
        severity: RegimeSeverity,
        preferred_buckets: Vec<Bucket>,
    ) -> Self {
        Self {
            date,
            regime,
            confidence: confidence.clamp(0.0, 1.0),
            severity,
            preferred_buckets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_meets_threshold() {
        assert!(RegimeSeverity::Critical.meets(RegimeSeverity::High));
        assert!(RegimeSeverity::High.meets(RegimeSeverity::High));
        assert!(!RegimeSeverity::Normal.meets(RegimeSeverity::High));
    }

    #[test]
    fn regime_context_clamps_confidence() {
        let ctx = RegimeContext::new(
            RebalanceDate::new(0),
            Regime::Goldilocks,
            1.5,
            RegimeSeverity::Normal,
            vec![],
        );
        assert_eq!(ctx.confidence, 1.0);
    }

    #[test]
    fn regime_display() {
        assert_eq!(Regime::Inflation.to_string(), "inflation");
    }
}
