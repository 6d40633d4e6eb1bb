// In crates/pricing/src/cache.rs

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// A rate remembered by the cache, with the moment it was fetched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedRate {
    pub rate: Decimal,
    pub fetched_at: Instant,
}

/// An exchange-rate cache keyed by `(base, quote)` currency pair.
///
/// Entries are never evicted: an expired entry is still returned by [`FxRateCache::get`]
/// so that callers can fall back to the last good rate when the feed is down.
#[derive(Debug)]
pub struct FxRateCache {
    ttl: Duration,
    entries: Mutex<HashMap<(String, String), CachedRate>>,
}

impl FxRateCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the last rate stored for the pair, expired or not.
    pub fn get(&self, base: &str, quote: &str) -> Option<CachedRate> {
        let entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.get(&(base.to_string(), quote.to_string())).copied()
    }

    /// Stores a freshly fetched rate for the pair.
    pub fn set(&self, base: &str, quote: &str, rate: Decimal) {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(
            (base.to_string(), quote.to_string()),
            CachedRate {
                rate,
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn is_expired(&self, entry: &CachedRate) -> bool {
        entry.fetched_at.elapsed() >= self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = FxRateCache::new(Duration::from_secs(3600));
        assert!(cache.get("USD", "INR").is_none());

        cache.set("USD", "INR", dec!(83.12));
        let entry = cache.get("USD", "INR").unwrap();
        assert_eq!(entry.rate, dec!(83.12));
        assert!(!cache.is_expired(&entry));

        tokio::time::advance(Duration::from_secs(3599)).await;
        assert!(!cache.is_expired(&entry));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.is_expired(&entry));
        // Still readable once expired.
        assert_eq!(cache.get("USD", "INR").unwrap().rate, dec!(83.12));
    }

    #[tokio::test(start_paused = true)]
    async fn pairs_are_independent() {
        let cache = FxRateCache::new(Duration::from_secs(60));
        cache.set("USD", "INR", dec!(83));
        cache.set("USD", "EUR", dec!(0.92));
        assert_eq!(cache.get("USD", "EUR").unwrap().rate, dec!(0.92));
        assert!(cache.get("EUR", "USD").is_none());
    }
}
