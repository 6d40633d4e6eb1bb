// In crates/pricing/src/source.rs

use crate::cache::FxRateCache;
use crate::{Error, Result};
use api_client::MarketData;
use app_config::types::PriceFeedSettings;
use chrono::{DateTime, Utc};
use core_types::Symbol;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// How trustworthy an exchange rate is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateQuality {
    /// Just fetched from the feed.
    Fresh,
    /// Served from a cache entry younger than the TTL.
    Cached,
    /// The feed failed; an expired cache entry was used.
    Stale,
    /// The feed failed and nothing was cached; the configured default was used.
    Fallback,
}

impl RateQuality {
    pub fn is_degraded(&self) -> bool {
        matches!(self, RateQuality::Stale | RateQuality::Fallback)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FxRate {
    pub base: String,
    pub quote: String,
    pub rate: Decimal,
    pub quality: RateQuality,
}

/// A security price in both the feed currency and the display currency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceQuote {
    pub symbol: Symbol,
    pub price_in_base: Decimal,
    pub price_in_display: Decimal,
    pub fx_rate: Decimal,
    pub fx_quality: RateQuality,
    pub base_currency: String,
    pub display_currency: String,
    pub timestamp: DateTime<Utc>,
}

/// Fetches quotes and converts them into the display currency.
pub struct PriceSource {
    feed: Arc<dyn MarketData>,
    fx_cache: Arc<FxRateCache>,
    base_currency: String,
    display_currency: String,
    fallback_rate: Decimal,
    request_timeout: Duration,
    request_delay: Duration,
}

impl PriceSource {
    pub fn new(
        feed: Arc<dyn MarketData>,
        fx_cache: Arc<FxRateCache>,
        settings: &PriceFeedSettings,
    ) -> Self {
        Self {
            feed,
            fx_cache,
            base_currency: settings.base_currency.clone(),
            display_currency: settings.display_currency.clone(),
            fallback_rate: settings.fallback_fx_rate,
            request_timeout: settings.request_timeout(),
            request_delay: settings.request_delay(),
        }
    }

    pub fn display_currency(&self) -> &str {
        &self.display_currency
    }

    /// Returns the base→display rate.
    ///
    /// Never fails: when the feed is down the last cached rate, or failing that the
    /// configured default, is returned with a degraded [`RateQuality`].
    pub async fn fx_rate(&self) -> FxRate {
        let (base, quote) = (self.base_currency.as_str(), self.display_currency.as_str());
        let rate = |rate, quality| FxRate {
            base: base.to_string(),
            quote: quote.to_string(),
            rate,
            quality,
        };

        if base == quote {
            return rate(Decimal::ONE, RateQuality::Fresh);
        }

        let cached = self.fx_cache.get(base, quote);
        if let Some(entry) = cached {
            if !self.fx_cache.is_expired(&entry) {
                tracing::debug!(base, quote, rate = %entry.rate, "Using cached exchange rate.");
                return rate(entry.rate, RateQuality::Cached);
            }
        }

        let failure = match timeout(self.request_timeout, self.feed.fx_rate(base, quote)).await {
            Ok(Ok(fresh)) => {
                self.fx_cache.set(base, quote, fresh);
                tracing::info!(base, quote, rate = %fresh, "Fetched fresh exchange rate.");
                return rate(fresh, RateQuality::Fresh);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", self.request_timeout),
        };

        match cached {
            Some(entry) => {
                tracing::warn!(
                    base, quote, rate = %entry.rate, error = %failure,
                    "Exchange rate feed failed; using expired cached rate. Prices are degraded."
                );
                rate(entry.rate, RateQuality::Stale)
            }
            None => {
                tracing::warn!(
                    base, quote, rate = %self.fallback_rate, error = %failure,
                    "Exchange rate feed failed and nothing is cached; using default rate. Prices are degraded."
                );
                rate(self.fallback_rate, RateQuality::Fallback)
            }
        }
    }

    /// Fetches the current price of one symbol.
    pub async fn price(&self, symbol: &Symbol) -> Result<PriceQuote> {
        let unavailable = |reason: String| Error::UpstreamUnavailable {
            symbol: symbol.clone(),
            reason,
        };

        let price_in_base = match timeout(self.request_timeout, self.feed.quote(symbol)).await {
            Ok(Ok(price)) => price,
            Ok(Err(e)) => return Err(unavailable(e.to_string())),
            Err(_) => return Err(unavailable(format!("timed out after {:?}", self.request_timeout))),
        };

        let fx = self.fx_rate().await;
        let price_in_display = (price_in_base * fx.rate).round_dp(2);

        tracing::debug!(
            symbol = %symbol,
            base = %price_in_base,
            rate = %fx.rate,
            display = %price_in_display,
            "Converted quote."
        );

        Ok(PriceQuote {
            symbol: symbol.clone(),
            price_in_base: price_in_base.round_dp(2),
            price_in_display,
            fx_rate: fx.rate,
            fx_quality: fx.quality,
            base_currency: self.base_currency.clone(),
            display_currency: self.display_currency.clone(),
            timestamp: Utc::now(),
        })
    }

    /// Fetches several symbols one after another, pausing between upstream calls.
    ///
    /// Duplicates are fetched once. A symbol whose fetch fails maps to `None`;
    /// the rest of the batch still runs.
    pub async fn prices<'a, I>(&self, symbols: I) -> BTreeMap<Symbol, Option<PriceQuote>>
    where
        I: IntoIterator<Item = &'a Symbol>,
    {
        let unique: BTreeSet<&Symbol> = symbols.into_iter().collect();
        let mut prices = BTreeMap::new();

        for (i, symbol) in unique.into_iter().enumerate() {
            if i > 0 && !self.request_delay.is_zero() {
                sleep(self.request_delay).await;
            }

            let quote = match self.price(symbol).await {
                Ok(quote) => Some(quote),
                Err(e) => {
                    tracing::error!(symbol = %symbol, error = %e, "Failed to fetch price.");
                    None
                }
            };
            prices.insert(symbol.clone(), quote);
        }

        let fetched = prices.values().filter(|q| q.is_some()).count();
        tracing::debug!(fetched, requested = prices.len(), "Batch price fetch finished.");

        prices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedFeed;
    use rust_decimal_macros::dec;

    fn settings() -> PriceFeedSettings {
        PriceFeedSettings {
            quote_base_url: String::new(),
            quote_api_key: String::new(),
            fx_base_url: String::new(),
            fx_api_key: String::new(),
            base_currency: "USD".into(),
            display_currency: "INR".into(),
            request_timeout_secs: 10,
            request_delay_ms: 500,
            fx_cache_ttl_secs: 3600,
            fallback_fx_rate: dec!(83),
        }
    }

    fn source(feed: Arc<ScriptedFeed>) -> PriceSource {
        let cache = Arc::new(FxRateCache::new(Duration::from_secs(3600)));
        PriceSource::new(feed, cache, &settings())
    }

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn converts_quote_into_display_currency() {
        let feed = Arc::new(ScriptedFeed::new());
        feed.set_price("ACME", dec!(10.005));
        feed.set_fx_rate(dec!(83.5));

        let quote = source(feed).price(&sym("ACME")).await.unwrap();

        assert_eq!(quote.price_in_display, dec!(835.42));
        assert_eq!(quote.price_in_base, dec!(10.00));
        assert_eq!(quote.fx_rate, dec!(83.5));
        assert_eq!(quote.fx_quality, RateQuality::Fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn feed_error_is_upstream_unavailable() {
        let feed = Arc::new(ScriptedFeed::new());
        feed.set_fx_rate(dec!(83));

        let result = source(feed).price(&sym("NOPE")).await;
        assert!(matches!(result, Err(Error::UpstreamUnavailable { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn reuses_rate_within_ttl() {
        let feed = Arc::new(ScriptedFeed::new());
        feed.set_fx_rate(dec!(83));
        let source = source(feed.clone());

        assert_eq!(source.fx_rate().await.quality, RateQuality::Fresh);
        feed.set_fx_rate(dec!(90));
        let second = source.fx_rate().await;
        assert_eq!(second.quality, RateQuality::Cached);
        assert_eq!(second.rate, dec!(83));
        assert_eq!(feed.fx_calls(), 1);

        tokio::time::advance(Duration::from_secs(3600)).await;
        let third = source.fx_rate().await;
        assert_eq!(third.quality, RateQuality::Fresh);
        assert_eq!(third.rate, dec!(90));
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_expired_rate_then_default() {
        let feed = Arc::new(ScriptedFeed::new());
        let source = source(feed.clone());

        // Nothing cached yet: hardcoded default.
        let fallback = source.fx_rate().await;
        assert_eq!(fallback.quality, RateQuality::Fallback);
        assert_eq!(fallback.rate, dec!(83));
        assert!(fallback.quality.is_degraded());

        feed.set_fx_rate(dec!(84));
        assert_eq!(source.fx_rate().await.rate, dec!(84));

        feed.fail_fx();
        tokio::time::advance(Duration::from_secs(7200)).await;
        let stale = source.fx_rate().await;
        assert_eq!(stale.quality, RateQuality::Stale);
        assert_eq!(stale.rate, dec!(84));
    }

    #[tokio::test(start_paused = true)]
    async fn same_currency_needs_no_rate() {
        let feed = Arc::new(ScriptedFeed::new());
        let mut settings = settings();
        settings.display_currency = "USD".into();
        let source = PriceSource::new(
            feed.clone(),
            Arc::new(FxRateCache::new(Duration::from_secs(60))),
            &settings,
        );

        let fx = source.fx_rate().await;
        assert_eq!(fx.rate, Decimal::ONE);
        assert_eq!(feed.fx_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_isolates_failures_and_deduplicates() {
        let feed = Arc::new(ScriptedFeed::new());
        feed.set_fx_rate(dec!(1));
        feed.set_price("AAA", dec!(10));
        feed.set_price("CCC", dec!(30));

        let symbols = vec![sym("CCC"), sym("AAA"), sym("BBB"), sym("AAA")];
        let prices = source(feed.clone()).prices(&symbols).await;

        assert_eq!(prices.len(), 3);
        assert_eq!(prices[&sym("AAA")].as_ref().unwrap().price_in_display, dec!(10));
        assert!(prices[&sym("BBB")].is_none());
        assert_eq!(prices[&sym("CCC")].as_ref().unwrap().price_in_display, dec!(30));
        assert_eq!(feed.quote_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_feed_times_out() {
        let feed = Arc::new(ScriptedFeed::new());
        feed.set_price("SLOW", dec!(5));
        feed.set_delay(Duration::from_secs(30));

        let result = source(feed).price(&sym("SLOW")).await;
        match result {
            Err(Error::UpstreamUnavailable { reason, .. }) => assert!(reason.contains("timed out")),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
