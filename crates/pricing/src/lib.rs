// In crates/pricing/src/lib.rs

pub mod cache;
pub mod error;
pub mod source;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export public types
pub use cache::{CachedRate, FxRateCache};
pub use error::{Error, Result};
pub use source::{FxRate, PriceQuote, PriceSource, RateQuality};
