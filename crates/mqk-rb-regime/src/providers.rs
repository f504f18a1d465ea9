use crate::{Asset, Bucket, RebalanceDate, RegimeContext};

/// Raised by a provider when it cannot answer at all (not a per-asset
/// data-absence — that is handled by the scoring layer). Per spec.md §7,
/// an unrecoverable provider error fails the whole `rebalance` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderError(pub String);

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "provider error: {}", self.0)
    }
}

impl std::error::Error for ProviderError {}

/// Supplies the regime reading for a date and trending-candidate scans.
/// Read-only; queried once per rebalance date before the core runs.
pub trait RegimeProvider {
    /// The regime reading in effect on `date`.
    fn regime(&self, date: RebalanceDate) -> Result<RegimeContext, ProviderError>;

    /// Candidates from `universe` whose trending confidence is at least
    /// `min_confidence`, in provider-defined order (the caller re-sorts).
    fn trending(
        &self,
        date: RebalanceDate,
        candidates: &[Asset],
        min_confidence: f64,
    ) -> Result<Vec<Asset>, ProviderError>;
}

/// Bucket membership: a total function `asset -> bucket`, with the reserved
/// bucket [`crate::UNKNOWN_BUCKET`] for anything the catalog does not
/// classify.
pub trait BucketCatalog {
    /// All assets known to belong to `bucket`.
    fn assets(&self, bucket: &str) -> Vec<Asset>;

    /// The bucket for `asset`; [`crate::UNKNOWN_BUCKET`] if unclassified.
    fn bucket(&self, asset: &Asset) -> Bucket;
}

/// Reads historical total return for performance checks (C8).
pub trait PriceProvider {
    /// Total return of `asset` from `from` to `to`, as a fraction (0.05 = 5%).
    fn total_return(
        &self,
        asset: &Asset,
        from: RebalanceDate,
        to: RebalanceDate,
    ) -> Result<f64, ProviderError>;
}
