use clap::Parser;
use config::Config;
use dccache::clock::SystemClock;
use dccache::notify::LogSink;
use dccache::persistence::{NoopRepository, SqliteRepository, TimerRepository};
use dccache::{ConfigCache, Services};
use dccached::{
    cli::Cli,
    rows::RowsFile,
    signals::{SignalEvent, wait_for_signal},
};
use flume::bounded;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Re-read the rows file and bring the cache up to date with it.
async fn sync_pass(cache: &ConfigCache, rows: &RowsFile) -> anyhow::Result<()> {
    rows.reload().await?;
    let report = cache.sync(rows)?;
    let status = cache.refresh_status();
    info!(
        revision = report.revision,
        changed = report.changed,
        rejected = report.rejected(),
        elapsed = ?report.elapsed,
        hosts = status.hosts(),
        items = status.items(),
        problems = status.triggers.enabled_problem,
        "configuration synchronized"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(cli.verbosity.tracing_level_filter().into())
                .from_env_lossy(),
        )
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    debug!(config = ?cli);

    let config = match &cli.conffile {
        Some(path) => Config::load(path)?,
        _ => Config::new(),
    };

    let repo: Box<dyn TimerRepository> = match &config.persistence.timer_queue_path {
        Some(path) => Box::new(SqliteRepository::new(path.clone()).await?),
        None => Box::new(NoopRepository),
    };
    let services = Services {
        repo,
        clock: Arc::new(SystemClock),
        sink: Arc::new(LogSink),
        secrets: None,
    };
    let cache = ConfigCache::init(&config, services);
    let rows = RowsFile::new(&cli.rows);

    sync_pass(&cache, &rows).await?;
    cache.restore_timers().await?;

    if !cli.once {
        let (events_tx, events_rx) = bounded(8);
        let signals = tokio::spawn(async move { wait_for_signal(&events_tx).await });

        let mut ticker = tokio::time::interval(config.timing.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = sync_pass(&cache, &rows).await {
                        warn!(error = %err, "synchronization pass failed");
                    }
                }
                res = events_rx.recv_async() => {
                    let Ok(event) = res else {
                        error!("signal listener stopped");
                        break;
                    };
                    debug!(?event, "Received signal event");
                    match event {
                        SignalEvent::DumpCache => cache.dump(),
                        SignalEvent::FullResync => {
                            rows.reset();
                            if let Err(err) = sync_pass(&cache, &rows).await {
                                warn!(error = %err, "full resynchronization failed");
                            }
                        }
                        SignalEvent::Shutdown => break,
                    }
                }
            }
        }

        if signals.is_finished() {
            if let Ok(Err(err)) = signals.await {
                error!(error = ?err, "Error while waiting for signal");
            }
        } else {
            signals.abort();
        }
    }

    cache.shutdown(config.persistence.save_on_shutdown).await?;
    Ok(())
}
