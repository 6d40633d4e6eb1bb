// In app/src/main.rs

use anyhow::Result;
use app_config::Settings;
use clap::{Parser, Subcommand};
use core_types::Symbol;
use database::LedgerStore;
use engine::Engine;
use events::EventBus;
use execution::{Executor, KeyedLocks, LedgerExecutor, TradingService};
use pricing::{FxRateCache, PriceSource};
use std::sync::Arc;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::prelude::*;

mod tracing_layer;
use self::tracing_layer::EventBusLayer;

// --- Command-Line Interface Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = "A virtual stock-trading simulator.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the order execution engine and the HTTP API.
    Run,

    /// Runs a single engine cycle and prints its report.
    Cycle,

    /// Fetches the current price of a symbol in the display currency.
    Quote {
        /// The ticker symbol (e.g., "AAPL").
        #[arg(short, long)]
        symbol: String,
    },
}

/// Everything the commands share, wired once.
struct Components {
    store: Arc<dyn LedgerStore>,
    prices: Arc<PriceSource>,
    executor: Arc<dyn Executor>,
    locks: Arc<KeyedLocks>,
}

// --- Main Application Entry Point ---

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from a .env file, if it exists.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = app_config::load_settings()?;

    let events = EventBus::default();
    init_tracing(&settings, events.clone());
    tracing::info!(environment = %settings.app.environment, "Application settings loaded successfully.");

    match cli.command {
        Commands::Run => run_app(settings, events).await?,
        Commands::Cycle => handle_cycle(settings, events).await?,
        Commands::Quote { symbol } => handle_quote(settings, symbol).await?,
    }

    tracing::info!("Application has finished successfully.");
    Ok(())
}

fn init_tracing(settings: &Settings, events: EventBus) {
    let level = settings
        .app
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(
        Targets::new()
            .with_target("sqlx::query", tracing::Level::WARN) // Disable sqlx query debug logs
            .with_default(level),
    );
    let bus_layer = EventBusLayer::new(events).with_filter(LevelFilter::WARN);

    tracing_subscriber::registry().with(fmt_layer).with(bus_layer).init();
}

async fn build_components(settings: &Settings, events: &EventBus) -> Result<Components> {
    let store = database::open(&settings.database).await?;

    let api_client = api_client::new(&settings.price_feed)?;
    let fx_cache = Arc::new(FxRateCache::new(settings.price_feed.fx_cache_ttl()));
    let prices = Arc::new(PriceSource::new(Arc::new(api_client), fx_cache, &settings.price_feed));

    let locks = Arc::new(KeyedLocks::new());
    let executor: Arc<dyn Executor> =
        Arc::new(LedgerExecutor::new(store.clone(), locks.clone(), events.clone()));

    Ok(Components { store, prices, executor, locks })
}

fn build_engine(settings: &Settings, components: &Components, events: &EventBus) -> Engine {
    Engine::new(
        components.store.clone(),
        components.prices.clone(),
        components.executor.clone(),
        components.locks.clone(),
        events.clone(),
        settings.engine.clone(),
    )
}

// --- "Run" Subcommand Logic ---

/// Starts the engine loop (when enabled) next to the web server and runs until
/// either stops or the process is interrupted.
async fn run_app(settings: Settings, events: EventBus) -> Result<()> {
    let components = build_components(&settings, &events).await?;

    let service = Arc::new(TradingService::new(
        components.store.clone(),
        components.prices.clone(),
        components.executor.clone(),
        components.locks.clone(),
        events.clone(),
        settings.trading.clone(),
    ));

    let engine_handle = if settings.engine.enabled {
        let engine = build_engine(&settings, &components, &events);
        Some(tokio::spawn(async move { engine.run().await }))
    } else {
        tracing::warn!("Order execution engine is disabled; pending orders will not fill.");
        None
    };

    let state = web_server::AppState::new(service, events);
    let server_handle = tokio::spawn(web_server::run(settings.server.clone(), state));

    let engine_done = async {
        match engine_handle {
            Some(handle) => handle.await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = server_handle => {
            result??;
            tracing::warn!("Web server stopped.");
        }
        result = engine_done => {
            result??;
            tracing::warn!("Order execution engine stopped.");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received.");
        }
    }

    Ok(())
}

// --- "Cycle" Subcommand Logic ---

async fn handle_cycle(settings: Settings, events: EventBus) -> Result<()> {
    let components = build_components(&settings, &events).await?;
    let engine = build_engine(&settings, &components, &events);

    let report = engine.run_cycle().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

// --- "Quote" Subcommand Logic ---

async fn handle_quote(settings: Settings, symbol: String) -> Result<()> {
    let symbol = Symbol::new(&symbol)?;
    let api_client = api_client::new(&settings.price_feed)?;
    let fx_cache = Arc::new(FxRateCache::new(settings.price_feed.fx_cache_ttl()));
    let prices = PriceSource::new(Arc::new(api_client), fx_cache, &settings.price_feed);

    let quote = prices.price(&symbol).await?;
    println!("{}", serde_json::to_string_pretty(&quote)?);
    Ok(())
}
