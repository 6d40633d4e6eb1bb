// In crates/api-client/src/types.rs

use reqwest::Client;
use std::fmt;

/// The HTTP client for the upstream quote and exchange-rate feeds.
#[derive(Clone)]
pub struct ApiClient {
    /// The persistent HTTP client, built with the configured request timeout.
    pub http_client: Client,
    /// Base URL of the quote feed (e.g. `https://finnhub.io/api/v1`).
    pub quote_base_url: String,
    pub quote_api_key: String,
    /// Base URL of the exchange-rate feed (e.g. `https://v6.exchangerate-api.com`).
    pub fx_base_url: String,
    pub fx_api_key: String,
}

// Keys are left out so the client can be logged.
impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("quote_base_url", &self.quote_base_url)
            .field("fx_base_url", &self.fx_base_url)
            .finish_non_exhaustive()
    }
}
