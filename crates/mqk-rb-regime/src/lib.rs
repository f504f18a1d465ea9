//! mqk-rb-regime
//!
//! Regime/severity data model and the read-only provider traits external
//! collaborators implement (regime detection, bucket classification, price
//! history). Pure: no IO, no time, no broker wiring — mirrors the teacher's
//! `mqk-risk`/`mqk-strategy` pure-core crates.

mod date;
mod providers;
mod types;

pub use date::RebalanceDate;
pub use providers::{BucketCatalog, PriceProvider, ProviderError, RegimeProvider};
pub use types::{Asset, Bucket, Regime, RegimeContext, RegimeSeverity, UNKNOWN_BUCKET};
