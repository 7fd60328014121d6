use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, Level};

mod alloc;
mod catalog;
mod config;
mod db;
mod eventlog;
mod exchange;
mod hub;
mod outbound;
mod outfit;
mod registry;
mod tasks;

use config::Config;
use db::Db;
use eventlog::{EventLog, Stream};
use exchange::ExchangeEngine;
use hub::Hub;
use outbound::Outbound;
use registry::Registry;
use tasks::TaskQueue;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fleetd=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::INFO)
        .init();

    let cfg = Config::load();

    let log = Arc::new(EventLog::new(cfg.log_dir.clone())?);

    let db = match &cfg.db_dsn {
        Some(dsn) => Db::connect(dsn).await?,
        None => Db::disabled(),
    };

    let outbound = Outbound::new();
    let registry = Arc::new(Registry::new(log.clone()));
    let tasks = Arc::new(TaskQueue::new(outbound.clone(), registry.clone(), log.clone()));
    let exchange = Arc::new(ExchangeEngine::new(
        db.clone(),
        outbound.clone(),
        registry.clone(),
        log.clone(),
    ));
    let hub = Hub::new(outbound, registry, tasks, exchange, db.clone(), log.clone());

    let listener = TcpListener::bind(cfg.listen_addr()).await?;
    info!(
        addr = %cfg.listen_addr(),
        env = %cfg.env,
        persistence = db.is_enabled(),
        "fleetd listening"
    );
    log.log(Stream::Connection, &format!("listening on {}", cfg.listen_addr()));

    hub.spawn_broadcast();

    // Periodic eventlog flush.
    {
        let log = log.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(30));
            loop {
                ticker.tick().await;
                log.flush_all();
            }
        });
    }

    tokio::select! {
        _ = hub.run(listener) => {}
        _ = tokio::signal::ctrl_c() => {}
    }

    log.log(Stream::Connection, "server shutdown");
    log.flush_all();
    Ok(())
}
