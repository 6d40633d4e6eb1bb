// In crates/web-server/src/lib.rs

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    Router,
};
use app_config::types::ServerSettings;
use core_types::{
    Account, Fill, Holding, Order, OrderId, Symbol, Transaction, TransactionId, UserId,
    WatchlistEntry,
};
use events::{EventBus, LedgerEvent};
use execution::{PortfolioOverview, TradeRequest, TradingService, TransactionStats, WatchedSymbol};
use futures::{sink::SinkExt, stream::StreamExt};
use pricing::{FxRate, PriceQuote};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use types::{
    AmountRequest, BatchPriceRequest, OpenAccountRequest, OrdersQuery, StatsQuery, TradeResponse,
    WatchRequest,
};

pub mod error;
pub mod types;

pub use error::{Error, Result};

// WebSocket message replay cache type
type WsCache = Arc<Mutex<VecDeque<LedgerEvent>>>;

/// The maximum number of events kept for replay to newly connected clients.
pub const WS_CACHE_SIZE: usize = 200;

/// The shared application state that is available to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TradingService>,
    pub events: EventBus,
    pub ws_cache: WsCache,
}

impl AppState {
    pub fn new(service: Arc<TradingService>, events: EventBus) -> Self {
        Self {
            service,
            events,
            ws_cache: Arc::new(Mutex::new(VecDeque::with_capacity(WS_CACHE_SIZE))),
        }
    }

    fn replay(&self) -> Vec<LedgerEvent> {
        let cache = self.ws_cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.iter().cloned().collect()
    }
}

/// Copies every published event into the replay cache, dropping the oldest past capacity.
pub fn record_events(state: &AppState) -> JoinHandle<()> {
    let mut rx = state.events.subscribe();
    let cache = state.ws_cache.clone();

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let mut cache = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    if cache.len() == WS_CACHE_SIZE {
                        cache.pop_front();
                    }
                    cache.push_back(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Replay cache fell behind the event bus.");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Creates the main application router with all routes and middleware.
pub fn create_router(app_state: AppState) -> Router {
    let cors = tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    let user_router = Router::new()
        .route("/account", get(get_account_handler).post(open_account_handler))
        .route("/deposits", post(deposit_handler))
        .route("/withdrawals", post(withdraw_handler))
        .route("/orders", get(get_orders_handler))
        .route("/orders/buy", post(buy_handler))
        .route("/orders/sell", post(sell_handler))
        .route("/orders/{order_id}", delete(cancel_order_handler))
        .route("/holdings", get(get_holdings_handler))
        .route("/fills", get(get_fills_handler))
        .route("/transactions", get(get_transactions_handler))
        .route("/transactions/stats", get(transaction_stats_handler))
        .route("/transactions/{transaction_id}", get(get_transaction_handler))
        .route("/watchlist", get(get_watchlist_handler).post(watch_handler))
        .route("/watchlist/{symbol}", delete(unwatch_handler))
        .route("/overview", get(get_overview_handler));

    let api_router = Router::new()
        .nest("/users/{user_id}", user_router)
        .route("/prices", post(batch_prices_handler))
        .route("/prices/{symbol}", get(price_handler))
        .route("/fx-rate", get(fx_rate_handler));

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check_handler))
        .nest("/api", api_router)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

async fn health_check_handler() -> &'static str {
    "OK"
}

/// Handler for `POST /api/users/{user_id}/account`. Idempotent.
async fn open_account_handler(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(body): Json<OpenAccountRequest>,
) -> Result<Json<Account>> {
    let account = state.service.open_account(user_id, &body.username).await?;
    Ok(Json(account))
}

async fn get_account_handler(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Account>> {
    Ok(Json(state.service.account(user_id).await?))
}

async fn deposit_handler(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(body): Json<AmountRequest>,
) -> Result<Json<Transaction>> {
    Ok(Json(state.service.deposit(user_id, body.amount).await?))
}

async fn withdraw_handler(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(body): Json<AmountRequest>,
) -> Result<Json<Transaction>> {
    Ok(Json(state.service.withdraw(user_id, body.amount).await?))
}

/// Handler for `POST /api/users/{user_id}/orders/buy`.
async fn buy_handler(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(request): Json<TradeRequest>,
) -> Result<Json<TradeResponse>> {
    let outcome = state.service.buy(user_id, request).await?;
    Ok(Json(outcome.into()))
}

/// Handler for `POST /api/users/{user_id}/orders/sell`.
async fn sell_handler(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(request): Json<TradeRequest>,
) -> Result<Json<TradeResponse>> {
    let outcome = state.service.sell(user_id, request).await?;
    Ok(Json(outcome.into()))
}

/// Handler for `DELETE /api/users/{user_id}/orders/{order_id}`.
async fn cancel_order_handler(
    State(state): State<AppState>,
    Path((user_id, order_id)): Path<(UserId, OrderId)>,
) -> Result<Json<Order>> {
    Ok(Json(state.service.cancel_order(user_id, order_id).await?))
}

/// Handler for `GET /api/users/{user_id}/orders?status=pending`.
async fn get_orders_handler(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(query): Query<OrdersQuery>,
) -> Result<Json<Vec<Order>>> {
    let status = query.status().map_err(Error::BadRequest)?;
    Ok(Json(state.service.orders(user_id, status).await?))
}

async fn get_holdings_handler(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Vec<Holding>>> {
    Ok(Json(state.service.holdings(user_id).await?))
}

async fn get_fills_handler(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Vec<Fill>>> {
    Ok(Json(state.service.fills(user_id).await?))
}

async fn get_transactions_handler(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Vec<Transaction>>> {
    Ok(Json(state.service.transactions(user_id).await?))
}

async fn get_transaction_handler(
    State(state): State<AppState>,
    Path((user_id, transaction_id)): Path<(UserId, TransactionId)>,
) -> Result<Json<Transaction>> {
    Ok(Json(state.service.transaction(user_id, transaction_id).await?))
}

/// Handler for `GET /api/users/{user_id}/transactions/stats?period=week`.
async fn transaction_stats_handler(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<TransactionStats>> {
    let period = query.period().map_err(Error::BadRequest)?;
    Ok(Json(state.service.transaction_stats(user_id, period).await?))
}

async fn get_watchlist_handler(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Vec<WatchedSymbol>>> {
    Ok(Json(state.service.watchlist(user_id).await?))
}

async fn watch_handler(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(body): Json<WatchRequest>,
) -> Result<Json<WatchlistEntry>> {
    Ok(Json(state.service.watch(user_id, &body.symbol).await?))
}

/// Handler for `DELETE /api/users/{user_id}/watchlist/{symbol}`.
async fn unwatch_handler(
    State(state): State<AppState>,
    Path((user_id, symbol)): Path<(UserId, String)>,
) -> Result<StatusCode> {
    state.service.unwatch(user_id, &symbol).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_overview_handler(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<PortfolioOverview>> {
    Ok(Json(state.service.overview(user_id).await?))
}

/// Handler for `GET /api/prices/{symbol}`.
async fn price_handler(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<PriceQuote>> {
    let symbol = Symbol::new(&symbol)?;
    Ok(Json(state.service.prices().price(&symbol).await?))
}

/// Handler for `POST /api/prices`. Symbols whose fetch failed map to `null`.
async fn batch_prices_handler(
    State(state): State<AppState>,
    Json(body): Json<BatchPriceRequest>,
) -> Result<Json<BTreeMap<Symbol, Option<PriceQuote>>>> {
    let symbols = body
        .symbols
        .iter()
        .map(|raw| Symbol::new(raw))
        .collect::<core_types::Result<Vec<_>>>()?;
    Ok(Json(state.service.prices().prices(&symbols).await))
}

async fn fx_rate_handler(State(state): State<AppState>) -> Json<FxRate> {
    Json(state.service.prices().fx_rate().await)
}

/// The handler for `GET /ws`.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Replays the cached events, then streams live ones until the client leaves.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    tracing::info!("New WebSocket client connected.");

    // Subscribe before reading the cache so nothing published in between is lost.
    let mut rx = state.events.subscribe();

    for event in state.replay() {
        if send_event(&mut socket, &event).await.is_err() {
            tracing::info!("WebSocket client disconnected during replay.");
            return;
        }
    }

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(event) => {
                    if send_event(&mut socket, &event).await.is_err() {
                        tracing::info!("WebSocket client disconnected.");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "WebSocket client lagged; events dropped.");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::info!("WebSocket client connection closed.");
}

async fn send_event(socket: &mut WebSocket, event: &LedgerEvent) -> std::result::Result<(), ()> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize event.");
            return Ok(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

/// Serves the API until the process is terminated.
pub async fn run(settings: ServerSettings, state: AppState) -> Result<()> {
    let _recorder = record_events(&state);
    let app = create_router(state);

    let address = format!("{}:{}", settings.host, settings.port);
    tracing::info!("Web server listening on {}", address);

    let listener = TcpListener::bind(&address).await.map_err(Error::ServerBindError)?;

    axum::serve(listener, app.into_make_service())
        .await
        .map_err(Error::ServeError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use app_config::types::{PriceFeedSettings, TradingSettings};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use database::{LedgerStore, MemoryLedger};
    use execution::{KeyedLocks, LedgerExecutor};
    use pricing::testing::ScriptedFeed;
    use pricing::{FxRateCache, PriceSource};
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn state(feed: Arc<ScriptedFeed>) -> AppState {
        let settings = PriceFeedSettings {
            quote_base_url: String::new(),
            quote_api_key: String::new(),
            fx_base_url: String::new(),
            fx_api_key: String::new(),
            base_currency: "USD".into(),
            display_currency: "INR".into(),
            request_timeout_secs: 10,
            request_delay_ms: 0,
            fx_cache_ttl_secs: 3600,
            fallback_fx_rate: dec!(83),
        };
        let prices = Arc::new(PriceSource::new(
            feed,
            Arc::new(FxRateCache::new(Duration::from_secs(3600))),
            &settings,
        ));
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedger::new());
        let locks = Arc::new(KeyedLocks::new());
        let events = EventBus::default();
        let executor = Arc::new(LedgerExecutor::new(store.clone(), locks.clone(), events.clone()));
        let service = Arc::new(TradingService::new(
            store,
            prices,
            executor,
            locks,
            events.clone(),
            TradingSettings::default(),
        ));
        AppState::new(service, events)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_check_responds() {
        let app = create_router(state(Arc::new(ScriptedFeed::new())));
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String("OK".into()));
    }

    #[tokio::test]
    async fn market_buy_creates_a_holding() {
        let app = create_router(state(Arc::new(ScriptedFeed::new())));
        let user = UserId::new();
        let base = format!("/api/users/{}", user);

        let (status, _) = call(&app, "POST", &format!("{base}/account"), Some(json!({"username": "ana"}))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, "POST", &format!("{base}/deposits"), Some(json!({"amount": "10000"}))).await;
        assert_eq!(status, StatusCode::OK);

        let order = json!({"symbol": "ACME", "quantity": 10, "mode": "MARKET", "price": "100"});
        let (status, body) = call(&app, "POST", &format!("{base}/orders/buy"), Some(order)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "executed");
        assert_eq!(body["balance"], "9000");

        let (status, holdings) = call(&app, "GET", &format!("{base}/holdings"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(holdings.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn rejections_are_json_errors() {
        let app = create_router(state(Arc::new(ScriptedFeed::new())));
        let user = UserId::new();
        let base = format!("/api/users/{}", user);
        call(&app, "POST", &format!("{base}/account"), Some(json!({"username": "ana"}))).await;

        let order = json!({"symbol": "ACME", "quantity": 10, "mode": "MARKET", "price": "100"});
        let (status, body) = call(&app, "POST", &format!("{base}/orders/buy"), Some(order)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "insufficient_balance");

        let (status, body) = call(&app, "DELETE", &format!("{base}/orders/{}", OrderId::new()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "order_not_found");

        let (status, body) = call(&app, "GET", &format!("{base}/orders?status=bogus"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
    }

    #[tokio::test]
    async fn price_failures_are_bad_gateway() {
        let feed = Arc::new(ScriptedFeed::new());
        feed.set_fx_rate(dec!(1));
        feed.set_price("ACME", dec!(12.5));
        let app = create_router(state(feed));

        let (status, body) = call(&app, "GET", "/api/prices/ACME", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["price_in_display"], "12.5");

        let (status, body) = call(&app, "GET", "/api/prices/NOPE", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "upstream_unavailable");

        let (status, body) = call(&app, "POST", "/api/prices", Some(json!({"symbols": ["ACME", "NOPE"]}))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["NOPE"].is_null());
        assert_eq!(body["ACME"]["symbol"], "ACME");
    }

    #[tokio::test]
    async fn recorder_keeps_the_most_recent_events() {
        let state = state(Arc::new(ScriptedFeed::new()));
        let recorder = record_events(&state);
        tokio::task::yield_now().await;

        for _ in 0..WS_CACHE_SIZE + 5 {
            state.events.publish(LedgerEvent::CycleCompleted(Default::default()));
        }
        // Let the recorder drain the channel.
        for _ in 0..50 {
            if state.replay().len() == WS_CACHE_SIZE {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(state.replay().len(), WS_CACHE_SIZE);
        recorder.abort();
    }

    #[tokio::test]
    async fn out_of_range_input_is_a_client_error() {
        let app = create_router(state(Arc::new(ScriptedFeed::new())));
        let user = UserId::new();
        let base = format!("/api/users/{}", user);
        call(&app, "POST", &format!("{base}/account"), Some(json!({"username": "ana"}))).await;
        call(&app, "POST", &format!("{base}/deposits"), Some(json!({"amount": "1000"}))).await;

        let order = json!({
            "symbol": "ACME",
            "quantity": i64::MAX,
            "mode": "LIMIT",
            "limit_price": "100000000000"
        });
        let (status, body) = call(&app, "POST", &format!("{base}/orders/buy"), Some(order)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_order");

        let (status, body) = call(&app, "GET", "/api/prices/A%23", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");

        let (status, _) = call(&app, "POST", "/api/prices", Some(json!({"symbols": ["ACME&token=x"]}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn transaction_routes_find_and_summarize() {
        let app = create_router(state(Arc::new(ScriptedFeed::new())));
        let user = UserId::new();
        let base = format!("/api/users/{}", user);
        call(&app, "POST", &format!("{base}/account"), Some(json!({"username": "ana"}))).await;
        let (_, deposit) = call(&app, "POST", &format!("{base}/deposits"), Some(json!({"amount": "1000"}))).await;
        call(&app, "POST", &format!("{base}/withdrawals"), Some(json!({"amount": "250"}))).await;

        let id = deposit["id"].as_str().unwrap();
        let (status, found) = call(&app, "GET", &format!("{base}/transactions/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found["amount"], "1000");

        let (status, body) = call(&app, "GET", &format!("{base}/transactions/{}", TransactionId::new()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "transaction_not_found");

        let (status, stats) = call(&app, "GET", &format!("{base}/transactions/stats?period=week"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["period"], "week");
        assert_eq!(stats["net_flow"], "750");
        assert_eq!(stats["by_kind"][0]["count"], 1);

        let (status, stats) = call(&app, "GET", &format!("{base}/transactions/stats"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["period"], "month");

        let (status, _) = call(&app, "GET", &format!("{base}/transactions/stats?period=decade"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn watchlist_routes_round_trip() {
        let feed = Arc::new(ScriptedFeed::new());
        feed.set_fx_rate(dec!(1));
        feed.set_price("ACME", dec!(12.5));
        let app = create_router(state(feed));
        let user = UserId::new();
        let base = format!("/api/users/{}", user);
        call(&app, "POST", &format!("{base}/account"), Some(json!({"username": "ana"}))).await;

        let (status, entry) = call(&app, "POST", &format!("{base}/watchlist"), Some(json!({"symbol": "acme"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(entry["symbol"], "ACME");
        let (status, body) = call(&app, "POST", &format!("{base}/watchlist"), Some(json!({"symbol": "ACME"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "already_watched");

        let (status, watched) = call(&app, "GET", &format!("{base}/watchlist"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(watched[0]["quote"]["price_in_display"], "12.5");

        let (status, _) = call(&app, "DELETE", &format!("{base}/watchlist/ACME"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = call(&app, "DELETE", &format!("{base}/watchlist/ACME"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_watched");
    }
}
