//! spool-engine: print worker service
//!
//! ```text
//! spool-engine                 run the worker until Ctrl-C
//! spool-engine reprint <data>  re-queue failed jobs for a reference
//! spool-engine stats           print job counts per status
//! ```

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;

use spool_engine::logger::init_logger_with_file;
use spool_engine::{
    Config, ConnectionManager, Dispatcher, EnvSettings, HttpRenderer, JobStore, PgJobStore,
    PgLeaseLock, PgSubjectSource, PrintWorker,
};

enum Command {
    Run,
    Reprint(String),
    Stats,
}

fn parse_args() -> anyhow::Result<Command> {
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None | Some("run") => Ok(Command::Run),
        Some("reprint") => {
            let data = args.next().context("usage: spool-engine reprint <data>")?;
            Ok(Command::Reprint(data))
        }
        Some("stats") => Ok(Command::Stats),
        Some(other) => anyhow::bail!("unknown command: {other}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let command = parse_args()?;
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;
    init_logger_with_file(
        &config.log_filter(),
        config.json_logs(),
        config.log_dir.as_deref(),
    )?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    let store = Arc::new(PgJobStore::new(pool.clone()));
    store.ensure_schema().await?;

    match command {
        Command::Reprint(data) => {
            let count = store.reprint_failed(&data).await?;
            tracing::info!(data = %data, count, "Failed jobs re-queued");
            println!("{count} job(s) re-queued");
            Ok(())
        }
        Command::Stats => {
            let stats = store.stats().await?;
            println!(
                "pending={} printing={} printed={} failed={} total={}",
                stats.pending,
                stats.printing,
                stats.printed,
                stats.failed,
                stats.total()
            );
            Ok(())
        }
        Command::Run => run(config, pool, store).await,
    }
}

async fn run(config: Config, pool: sqlx::PgPool, store: Arc<PgJobStore>) -> anyhow::Result<()> {
    tracing::info!("Starting spool-engine (env: {})", config.environment);

    let locks = PgLeaseLock::new(pool.clone(), config.lock_retry());
    locks.ensure_schema().await?;

    let connections = Arc::new(ConnectionManager::new(config.connection()));
    let renderer = HttpRenderer::new(&config.render_url, config.render_timeout())?;
    let dispatcher = Dispatcher::new(
        Arc::new(PgSubjectSource::new(pool)),
        Arc::new(renderer),
        connections.clone(),
    )
    .with_label(config.label());

    let worker = PrintWorker::new(
        store,
        Arc::new(locks),
        dispatcher,
        Arc::new(EnvSettings),
        config.worker(),
    );

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(worker.run(shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    shutdown.cancel();

    if let Err(e) = handle.await {
        tracing::error!(error = %e, "Print worker task panicked");
    }
    connections.close_all().await;
    tracing::info!("spool-engine stopped");
    Ok(())
}
