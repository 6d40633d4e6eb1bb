// In crates/pricing/src/error.rs

use core_types::Symbol;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The quote feed could not be reached, timed out, or returned something unusable.
    #[error("Price feed unavailable for {symbol}: {reason}")]
    UpstreamUnavailable { symbol: Symbol, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
