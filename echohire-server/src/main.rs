use std::sync::Arc;

use clap::Parser;
use echohire_core::config::StoreBackend;
use echohire_core::{DocumentStore, EchoHireConfig, MemoryStore, PgStore};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use echohire_server::services::Services;
use echohire_server::subsystems::dialogue::run_session_sweeper;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "echohire.toml")]
    config: String,

    /// Check the configured store and exit.
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match EchoHireConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    let default_level = config
        .service
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .init();

    let (store, pool): (Arc<dyn DocumentStore>, _) = match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            (Arc::new(MemoryStore::new()), None)
        }
        StoreBackend::Postgres => {
            let pool = match echohire_core::db::create_pool(&config.store).await {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("Failed to connect to database: {}", e);
                    std::process::exit(1);
                }
            };
            if let Err(e) = echohire_core::db::ensure_schema(&pool).await {
                eprintln!("Failed to prepare database schema: {}", e);
                std::process::exit(1);
            }
            (Arc::new(PgStore::new(pool.clone())), Some(pool))
        }
    };

    if args.health {
        match &pool {
            Some(pool) => match echohire_core::db::health_check(pool).await {
                Ok(v) => println!("✅ PostgreSQL connected: {}", v),
                Err(e) => {
                    println!("❌ PostgreSQL connection failed: {}", e);
                    std::process::exit(1);
                }
            },
            None => println!("✅ In-memory store ready"),
        }
        println!("✅ EchoHire health check passed");
        return Ok(());
    }

    let calls = echohire_core::create_call_provider(&config.call_provider, None);
    let analysis = echohire_core::create_analysis_provider(&config.analysis, None);
    let services = Services::build(
        config.clone(),
        store,
        calls,
        analysis,
        EchoHireConfig::webhook_secret(),
    );

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let sweeper = tokio::spawn(run_session_sweeper(
        services.sessions.clone(),
        config.dialogue.clone(),
        tx.subscribe(),
    ));

    if config.http.enabled {
        if let Err(e) = echohire_server::http::start_http_server(
            services,
            pool,
            config.http.clone(),
            tx.subscribe(),
        )
        .await
        {
            tracing::error!("HTTP server error: {}", e);
        }
    } else {
        tracing::warn!("HTTP API disabled; waiting for shutdown");
        let mut shutdown = tx.subscribe();
        let _ = shutdown.recv().await;
    }

    // Stops the sweeper when the server exited on its own.
    let _ = tx.send(());
    let _ = sweeper.await;
    Ok(())
}
