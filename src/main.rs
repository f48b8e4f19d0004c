use clap::Parser;
use scalpbot::config::Config;
use scalpbot::db::TradeStore;
use scalpbot::exchange::upbit::UpbitClient;
use scalpbot::mirror::TradeMirror;
use scalpbot::oracle::openai::OpenAiOracle;
use scalpbot::scheduler::CycleScheduler;
use scalpbot::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// LLM-driven scalping bot for Upbit spot markets
#[derive(Parser, Debug)]
#[command(name = "scalpbot", version)]
struct Cli {
    /// Capital per trade in quote currency (overrides SCALP_CAPITAL)
    capital: Option<f64>,

    /// Cycle length in minutes (overrides SCALP_CYCLE_MINUTES)
    cycle_minutes: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();

    let mut cfg = Config::from_env();
    if let Some(capital) = cli.capital {
        cfg.capital = capital;
    }
    if let Some(minutes) = cli.cycle_minutes {
        cfg.cycle_duration = Duration::from_secs(minutes * 60);
    }

    tracing::info!(
        capital = cfg.capital,
        cycle_minutes = cfg.cycle_duration.as_secs() / 60,
        quote = %cfg.quote_currency,
        "Scalpbot starting"
    );

    let access_key =
        std::env::var("UPBIT_ACCESS_KEY").map_err(|_| "UPBIT_ACCESS_KEY not set")?;
    let secret_key =
        std::env::var("UPBIT_SECRET_KEY").map_err(|_| "UPBIT_SECRET_KEY not set")?;
    let openai_key = std::env::var("OPENAI_API_KEY").map_err(|_| "OPENAI_API_KEY not set")?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/scalpbot".to_string());
    // The store is the source of truth; refuse to trade without it
    let store = Arc::new(TradeStore::new(&database_url).await?);

    let mirror = connect_mirror().await;

    let exchange = Arc::new(UpbitClient::new(access_key, secret_key));
    let oracle = Arc::new(OpenAiOracle::new(
        openai_key,
        std::env::var("OPENAI_MODEL").ok(),
    ));

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown requested, finishing current cycle");
                running.store(false, Ordering::SeqCst);
            }
        });
    }

    let mut scheduler =
        CycleScheduler::new(exchange, oracle, Some(store), mirror, cfg, running);
    scheduler.run().await;

    tracing::info!("Scalpbot stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "scalpbot=info".to_string()),
        )
        .init();
}

async fn connect_mirror() -> Option<TradeMirror> {
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    match TradeMirror::new(&redis_url).await {
        Ok(mirror) => Some(mirror),
        Err(e) => {
            tracing::warn!(error = %e, "Redis mirror unavailable, continuing without it");
            None
        }
    }
}
