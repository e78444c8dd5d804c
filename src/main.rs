//! SeersLeague backend server
//!
//! Serves reconciled player statistics, upcoming matches and league
//! standings read live from the SeersLeague contract.

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::{net::TcpListener, time::interval};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seersleague_backend::{
    api::{create_router, AppState},
    config::ServerConfig,
    guard::ActionGuard,
    ledger::{BasenameResolver, JsonRpcClient, NameResolver, NoNameResolver, RpcLedger},
    middleware::ClientRateLimiter,
    notifications::{JobQueue, NotificationStore, NotificationWorker},
    stats::StatsReader,
};

#[derive(Parser, Debug)]
#[command(name = "seersleague")]
#[command(about = "SeersLeague reconciled prediction ledger API")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "SEERS_CONFIG")]
    config: Option<PathBuf>,

    /// Listen port (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    let args = Args::parse();
    init_tracing();

    let mut config = ServerConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.port = port;
    }

    let contract = config.contract()?;
    info!(
        contract = %contract,
        rpc_url = %config.rpc_url,
        deployment_block = ?config.deployment_block,
        "starting seersleague backend"
    );

    if let Some(port) = config.metrics_port {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], port));
        PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!("Prometheus metrics on {}", metrics_addr);
    }

    let http = reqwest::Client::builder()
        .timeout(config.upstream_timeout())
        .build()
        .context("failed to build HTTP client")?;

    let ledger = Arc::new(RpcLedger::new(
        JsonRpcClient::new(http.clone(), config.rpc_url.clone()),
        contract,
    ));
    let names: Arc<dyn NameResolver> = match config.resolver()? {
        Some(resolver) => Arc::new(BasenameResolver::new(
            JsonRpcClient::new(http.clone(), config.rpc_url.clone()),
            resolver,
        )),
        None => {
            warn!("basename resolver disabled, names will be null");
            Arc::new(NoNameResolver)
        }
    };
    let reader = Arc::new(StatsReader::new(ledger, names, config.scan_settings()));

    let store = Arc::new(
        NotificationStore::new(&config.notifications_db_path)
            .context("failed to open notifications database")?,
    );
    info!(subscriptions = store.count()?, "notification subscriptions loaded");
    let (jobs, job_rx) = JobQueue::new(config.webhook_queue_size);
    NotificationWorker::new(store, http, config.app_url.clone())
        .spawn_workers(job_rx, config.webhook_workers);

    if config.admin_secret.is_none() {
        warn!("ADMIN_SECRET not set, leaderboard refresh is disabled");
    }
    let guard = ActionGuard::new(Duration::from_secs(config.admin_cooldown_secs));
    let state = AppState::new(reader, guard, jobs, config.admin_secret.clone());

    let limiter = ClientRateLimiter::new(config.rate_limit_config());
    spawn_limiter_cleanup(limiter.clone());

    let app = create_router(state, limiter);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("Server error")?;

    Ok(())
}

fn spawn_limiter_cleanup(limiter: ClientRateLimiter) {
    tokio::spawn(async move {
        let mut ticker = interval(limiter.window());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            limiter.prune();
        }
    });
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seersleague_backend=debug,seersleague=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
