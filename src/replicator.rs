//! Supervisor wiring the feed reader, the forwarding workers, the readiness
//! gate and the stats ticker together.
//!
//! The first fatal error from the feed reader or the readiness gate stops
//! every other task and is returned to the caller. Workers get a bounded
//! grace period to finish their forwards in that case, while a shutdown
//! signal lets them drain completely.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncBufRead;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::classifier::WriteCommands;
use crate::client::{Destination, RespClient};
use crate::feed::FeedReader;
use crate::gate::{Readiness, ReadinessGate};
use crate::pipeline::Pipeline;
use crate::stats::CommandStats;
use crate::{Result, TapError, DEFAULT_WORKERS};

#[derive(Debug, Clone)]
pub struct ReplicatorConfig {
    /// Address of the store whose feed is replicated.
    pub source: String,

    /// Address of the store receiving the writes.
    pub target: String,

    pub workers: usize,

    /// Delay between two readiness polls of the target.
    pub poll_interval: Duration,

    pub stats_interval: Duration,

    /// How long in-flight forwards may take once a fatal error stopped the
    /// feed.
    pub drain_timeout: Duration,

    /// Forward from the start without waiting for the target to be master.
    pub skip_readiness: bool,

    /// Fail startup when no write command could be discovered.
    pub require_write_commands: bool,
}

impl Default for ReplicatorConfig {
    fn default() -> Self {
        Self {
            source: "localhost:6379".to_string(),
            target: "localhost:6380".to_string(),
            workers: DEFAULT_WORKERS,
            poll_interval: Duration::from_millis(1),
            stats_interval: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(5),
            skip_readiness: false,
            require_write_commands: false,
        }
    }
}

pub struct Replicator<D> {
    config: ReplicatorConfig,
    destination: Arc<D>,
    write_commands: Arc<WriteCommands>,
    stats: Arc<CommandStats>,
    readiness: Readiness,
}

impl Replicator<RespClient> {
    /// Discover the write commands of the source and prepare a client for the
    /// target.
    pub async fn connect(config: ReplicatorConfig) -> Result<Self> {
        let catalog_client = RespClient::with_max_idle(config.source.as_str(), 1);
        let write_commands = match WriteCommands::fetch(&catalog_client).await {
            Ok(commands) => commands,
            Err(e) if config.require_write_commands => return Err(e),
            Err(e) => {
                error!(error = %e, source = %config.source, "Unable to load the command catalog");
                WriteCommands::default()
            }
        };

        if write_commands.is_empty() {
            if config.require_write_commands {
                return Err(TapError::EmptyCatalog);
            }
            warn!("No write commands known, nothing will be replicated");
        }

        let destination = RespClient::with_max_idle(config.target.as_str(), config.workers);
        Ok(Self::new(config, destination, write_commands))
    }
}

impl<D: Destination> Replicator<D> {
    pub fn new(config: ReplicatorConfig, destination: D, write_commands: WriteCommands) -> Self {
        Self {
            config,
            destination: Arc::new(destination),
            write_commands: Arc::new(write_commands),
            stats: Arc::new(CommandStats::new()),
            readiness: Readiness::new(),
        }
    }

    pub fn stats(&self) -> Arc<CommandStats> {
        self.stats.clone()
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness.clone()
    }

    pub fn write_commands(&self) -> &WriteCommands {
        &self.write_commands
    }

    /// Replicate `feed` until it fails, a background task fails, or
    /// `shutdown` completes.
    pub async fn run<R, F>(self, feed: R, shutdown: F) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        F: Future,
    {
        let pipeline = Pipeline::start(
            self.config.workers,
            self.destination.clone(),
            self.write_commands.clone(),
            self.stats.clone(),
        );

        let mut background: JoinSet<Result<()>> = JoinSet::new();
        if self.config.skip_readiness {
            info!("Skipping readiness check, forwarding immediately");
            self.readiness.mark_ready();
        } else {
            let gate = ReadinessGate::new(
                self.destination.clone(),
                self.readiness.clone(),
                self.config.poll_interval,
            );
            background.spawn(gate.run());
        }

        let stats = self.stats.clone();
        let interval = self.config.stats_interval;
        background.spawn(async move {
            stats.run(interval).await;
            Ok(())
        });

        let outcome = {
            let reader = FeedReader::new(feed, self.readiness.clone());
            let feed = reader.run(&pipeline);
            tokio::pin!(feed);
            tokio::pin!(shutdown);

            loop {
                tokio::select! {
                    res = &mut feed => break res,
                    Some(res) = background.join_next() => match res {
                        Ok(Ok(())) => continue,
                        Ok(Err(e)) => break Err(e),
                        Err(e) => break Err(e.into()),
                    },
                    _ = &mut shutdown => {
                        info!("Received shutdown signal");
                        break Ok(());
                    }
                }
            }
        };

        background.abort_all();
        match &outcome {
            Ok(()) => pipeline.shutdown().await?,
            Err(_) => pipeline.shutdown_within(self.config.drain_timeout).await?,
        }
        info!("Replication stopped");
        outcome
    }
}
