// In crates/pricing/src/testing.rs

use api_client::{Error, MarketData, Result};
use async_trait::async_trait;
use core_types::Symbol;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A `MarketData` whose answers are set by the test.
///
/// Symbols without a scripted price fail like an unreachable feed.
#[derive(Debug, Default)]
pub struct ScriptedFeed {
    prices: Mutex<HashMap<String, Decimal>>,
    fx_rate: Mutex<Option<Decimal>>,
    delay: Mutex<Option<Duration>>,
    quote_calls: AtomicUsize,
    fx_calls: AtomicUsize,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(symbol.to_ascii_uppercase(), price);
    }

    pub fn remove_price(&self, symbol: &str) {
        self.prices.lock().unwrap().remove(&symbol.to_ascii_uppercase());
    }

    pub fn set_fx_rate(&self, rate: Decimal) {
        *self.fx_rate.lock().unwrap() = Some(rate);
    }

    pub fn fail_fx(&self) {
        *self.fx_rate.lock().unwrap() = None;
    }

    /// Makes every call wait before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn fx_calls(&self) -> usize {
        self.fx_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl MarketData for ScriptedFeed {
    async fn quote(&self, symbol: &Symbol) -> Result<Decimal> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let price = self.prices.lock().unwrap().get(symbol.as_str()).copied();
        price.ok_or_else(|| Error::ApiError { status: 503, msg: format!("no quote for {}", symbol) })
    }

    async fn fx_rate(&self, _base: &str, _quote: &str) -> Result<Decimal> {
        self.fx_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let rate = *self.fx_rate.lock().unwrap();
        rate.ok_or_else(|| Error::ApiError { status: 503, msg: "fx feed down".into() })
    }
}
