use std::time::Duration;

use clap::Parser;
use kvtap::{feed, Replicator, ReplicatorConfig, DEFAULT_WORKERS};
use tokio::signal::ctrl_c;
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;

/// Replicate write commands seen on a source store to a target store.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct App {
    /// Store whose MONITOR feed is replicated.
    #[clap(long, alias = "sourceHost", default_value = "localhost:6379")]
    source: String,

    /// Store receiving the replicated writes.
    #[clap(long, alias = "targetHost", default_value = "localhost:6380")]
    target: String,

    /// Shorthand for `--log-level debug`.
    #[clap(long)]
    debug: bool,

    #[clap(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    #[clap(long, default_value = "1")]
    poll_interval_ms: u64,

    #[clap(long, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    stats_interval_ms: u64,

    /// Time left to in-flight forwards after a fatal error.
    #[clap(long, default_value = "5000")]
    drain_timeout_ms: u64,

    /// Forward immediately instead of waiting for the target to become master.
    #[clap(long)]
    skip_readiness: bool,

    /// Exit if the write commands of the source cannot be discovered.
    #[clap(long)]
    require_write_commands: bool,

    #[clap(long, default_value = "info", env = "KVTAP_LOG")]
    log_level: LevelFilter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app = App::parse();

    let level = if app.debug {
        LevelFilter::DEBUG
    } else {
        app.log_level
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    info!(
        source = %app.source,
        target = %app.target,
        "kvtap version: {}",
        env!("CARGO_PKG_VERSION"),
    );

    let config = ReplicatorConfig {
        source: app.source,
        target: app.target,
        workers: app.workers,
        poll_interval: Duration::from_millis(app.poll_interval_ms),
        stats_interval: Duration::from_millis(app.stats_interval_ms),
        drain_timeout: Duration::from_millis(app.drain_timeout_ms),
        skip_readiness: app.skip_readiness,
        require_write_commands: app.require_write_commands,
    };

    let replicator = Replicator::connect(config.clone()).await?;
    let feed = feed::subscribe(config.source.as_str()).await?;
    replicator
        .run(feed, async {
            if let Err(e) = ctrl_c().await {
                error!("Error receiving Ctrl-C: {e}");
                futures::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
