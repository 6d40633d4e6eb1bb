// In crates/api-client/src/lib.rs

use app_config::types::PriceFeedSettings;
use async_trait::async_trait;
use core_types::Symbol;
use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

pub mod error;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use types::ApiClient;

/// The header the quote feed reads its API key from.
pub const QUOTE_TOKEN_HEADER: &str = "X-Finnhub-Token";

/// The upstream market data a price source depends on.
///
/// Both calls are fallible, latent and rate-limited; callers decide how to
/// degrade when they fail.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// The latest trade price of `symbol`, in the feed's base currency.
    async fn quote(&self, symbol: &Symbol) -> Result<Decimal>;

    /// How many units of `quote` one unit of `base` buys.
    async fn fx_rate(&self, base: &str, quote: &str) -> Result<Decimal>;
}

impl ApiClient {
    /// Constructs a new ApiClient from the price feed settings.
    pub fn new(settings: &PriceFeedSettings) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| Error::ClientBuildError(e.to_string()))?;

        Ok(ApiClient {
            http_client,
            quote_base_url: settings.quote_base_url.trim_end_matches('/').to_string(),
            quote_api_key: settings.quote_api_key.clone(),
            fx_base_url: settings.fx_base_url.trim_end_matches('/').to_string(),
            fx_api_key: settings.fx_api_key.clone(),
        })
    }

    /// Sends a GET request and returns the decoded JSON body.
    async fn get_json(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request.send().await.map_err(Error::request)?;

        let status = response.status();
        let text = response.text().await.map_err(Error::request)?;

        if !status.is_success() {
            return Err(Error::ApiError { status: status.as_u16(), msg: text });
        }

        serde_json::from_str(&text).map_err(Error::DeserializationFailed)
    }
}

#[async_trait]
impl MarketData for ApiClient {
    /// Fetches the current price of a symbol.
    ///
    /// This corresponds to the `GET /quote?symbol=...` endpoint. The key travels
    /// in a header so it never appears in the URL.
    async fn quote(&self, symbol: &Symbol) -> Result<Decimal> {
        let request = self
            .http_client
            .get(format!("{}/quote", self.quote_base_url))
            .query(&[("symbol", symbol.as_str())])
            .header(QUOTE_TOKEN_HEADER, &self.quote_api_key);
        tracing::debug!(symbol = %symbol, "Fetching quote.");

        let value = self.get_json(request).await?;
        parse_quote(&value)
    }

    /// Fetches the latest conversion rates for `base` and picks out `quote`.
    ///
    /// This corresponds to the `GET /v6/{key}/latest/{base}` endpoint.
    async fn fx_rate(&self, base: &str, quote: &str) -> Result<Decimal> {
        let url = format!("{}/v6/{}/latest/{}", self.fx_base_url, self.fx_api_key, base);
        tracing::debug!(base, quote, "Fetching exchange rate.");

        let value = self.get_json(self.http_client.get(url)).await?;
        parse_fx_rate(&value, quote)
    }
}

/// Free function to allow `api_client::new` usage.
pub fn new(settings: &PriceFeedSettings) -> Result<ApiClient> {
    ApiClient::new(settings)
}

/// Extracts the current price (`c`) from a quote response body.
pub fn parse_quote(value: &Value) -> Result<Decimal> {
    // The feed reports failures as `{"error": "..."}` with a 200 status.
    if let Some(msg) = value.get("error").and_then(Value::as_str) {
        return Err(Error::ApiError { status: 200, msg: msg.to_string() });
    }

    let price = value
        .get("c")
        .ok_or_else(|| Error::MalformedResponse("quote has no `c` field".into()))
        .and_then(json_number_to_decimal)?;

    // Unknown symbols come back as an all-zero quote.
    if price <= Decimal::ZERO {
        return Err(Error::MalformedResponse(format!("non-positive quote {}", price)));
    }

    Ok(price)
}

/// Extracts `conversion_rates[quote]` from an exchange-rate response body.
pub fn parse_fx_rate(value: &Value, quote: &str) -> Result<Decimal> {
    if let Some(result) = value.get("result").and_then(Value::as_str) {
        if result != "success" {
            let msg = value
                .get("error-type")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error")
                .to_string();
            return Err(Error::ApiError { status: 200, msg });
        }
    }

    let rate = value
        .get("conversion_rates")
        .and_then(|rates| rates.get(quote))
        .ok_or_else(|| Error::MalformedResponse(format!("no conversion rate for {}", quote)))
        .and_then(json_number_to_decimal)?;

    if rate <= Decimal::ZERO {
        return Err(Error::MalformedResponse(format!("non-positive rate {}", rate)));
    }

    Ok(rate)
}

/// Converts a JSON number without going through a lossy binary float when possible.
fn json_number_to_decimal(value: &Value) -> Result<Decimal> {
    let number = match value {
        Value::Number(number) => number,
        other => {
            return Err(Error::MalformedResponse(format!("expected a number, got {}", other)));
        }
    };

    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
        .or_else(|| number.as_f64().and_then(Decimal::from_f64))
        .ok_or_else(|| Error::MalformedResponse(format!("unrepresentable number {}", text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn parses_quote_price() {
        let body = json!({ "c": 261.74, "h": 263.31, "l": 260.68, "o": 261.07, "pc": 259.45 });
        assert_eq!(parse_quote(&body).unwrap(), dec!(261.74));
    }

    #[test]
    fn zero_quote_is_malformed() {
        let body = json!({ "c": 0, "d": null, "dp": null });
        assert!(matches!(parse_quote(&body), Err(Error::MalformedResponse(_))));
    }

    #[test]
    fn non_numeric_quote_is_malformed() {
        let body = json!({ "c": "n/a" });
        assert!(matches!(parse_quote(&body), Err(Error::MalformedResponse(_))));
        assert!(matches!(parse_quote(&json!({})), Err(Error::MalformedResponse(_))));
    }

    #[test]
    fn quote_error_body_is_an_api_error() {
        let body = json!({ "error": "Invalid API key." });
        assert!(matches!(parse_quote(&body), Err(Error::ApiError { .. })));
    }

    #[test]
    fn parses_fx_rate() {
        let body = json!({
            "result": "success",
            "base_code": "USD",
            "conversion_rates": { "USD": 1, "INR": 83.1245, "EUR": 0.92 }
        });
        assert_eq!(parse_fx_rate(&body, "INR").unwrap(), dec!(83.1245));
        assert!(matches!(parse_fx_rate(&body, "JPY"), Err(Error::MalformedResponse(_))));
    }

    #[test]
    fn fx_error_result_is_an_api_error() {
        let body = json!({ "result": "error", "error-type": "invalid-key" });
        match parse_fx_rate(&body, "INR") {
            Err(Error::ApiError { msg, .. }) => assert_eq!(msg, "invalid-key"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn failed_requests_never_reveal_api_keys() {
        let settings = PriceFeedSettings {
            quote_base_url: "http://127.0.0.1:1".into(),
            quote_api_key: "QUOTE_SECRET_123".into(),
            fx_base_url: "http://127.0.0.1:1/".into(),
            fx_api_key: "FX_SECRET_456".into(),
            base_currency: "USD".into(),
            display_currency: "INR".into(),
            request_timeout_secs: 2,
            request_delay_ms: 0,
            fx_cache_ttl_secs: 3600,
            fallback_fx_rate: dec!(83),
        };
        let client = ApiClient::new(&settings).unwrap();

        let quote_err = client.quote(&Symbol::new("AAPL").unwrap()).await.unwrap_err();
        let fx_err = client.fx_rate("USD", "INR").await.unwrap_err();

        let debug = format!("{:?}", client);
        assert!(!debug.contains("QUOTE_SECRET_123") && !debug.contains("FX_SECRET_456"));

        for err in [quote_err, fx_err] {
            assert!(matches!(err, Error::RequestFailed(_)));
            for text in [err.to_string(), format!("{:?}", err)] {
                assert!(!text.contains("QUOTE_SECRET_123"), "{}", text);
                assert!(!text.contains("FX_SECRET_456"), "{}", text);
            }
        }
    }
}
