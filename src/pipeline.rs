//! Fan-out of feed lines to a fixed pool of forwarding workers.
//!
//! All workers drain one shared handoff channel, so two commands observed
//! back to back on the source may reach the destination in either order
//! unless the pool has a single worker.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::classifier::WriteCommands;
use crate::client::Destination;
use crate::command::ParsedCommand;
use crate::stats::CommandStats;
use crate::{Result, TapError};

type SharedReceiver = Arc<Mutex<mpsc::Receiver<String>>>;

/// Handle to a running pool of workers.
pub struct Pipeline {
    sender: mpsc::Sender<String>,
    workers: JoinSet<()>,
}

impl Pipeline {
    /// Spawn `workers` forwarders sharing `destination`.
    pub fn start<D: Destination>(
        workers: usize,
        destination: Arc<D>,
        write_commands: Arc<WriteCommands>,
        stats: Arc<CommandStats>,
    ) -> Pipeline {
        // Capacity 1 is the closest tokio offers to a rendezvous handoff.
        let (sender, receiver) = mpsc::channel(1);
        let receiver: SharedReceiver = Arc::new(Mutex::new(receiver));

        let mut set = JoinSet::new();
        for id in 0..workers.max(1) {
            let worker = Worker {
                id,
                receiver: receiver.clone(),
                destination: destination.clone(),
                write_commands: write_commands.clone(),
                stats: stats.clone(),
            };
            set.spawn(worker.run());
        }
        debug!(workers = set.len(), "Started forwarding workers");

        Pipeline {
            sender,
            workers: set,
        }
    }

    /// Hand a raw feed line to the next free worker.
    pub async fn dispatch(&self, line: String) -> Result<()> {
        self.sender
            .send(line)
            .await
            .map_err(|_| TapError::PipelineClosed)
    }

    /// Close the handoff channel and wait for the workers to drain it.
    pub async fn shutdown(self) -> Result<()> {
        let Pipeline {
            sender,
            mut workers,
        } = self;
        drop(sender);
        while let Some(res) = workers.join_next().await {
            res?;
        }
        Ok(())
    }

    /// Like [`Pipeline::shutdown`], but abort the workers still busy after
    /// `grace`. A destination that stopped answering cannot hold it up.
    pub async fn shutdown_within(self, grace: Duration) -> Result<()> {
        let Pipeline {
            sender,
            mut workers,
        } = self;
        drop(sender);

        let drained = tokio::time::timeout(grace, async {
            while let Some(res) = workers.join_next().await {
                res?;
            }
            Ok::<(), TapError>(())
        })
        .await;

        match drained {
            Ok(res) => res,
            Err(_) => {
                warn!(workers = workers.len(), "Workers still busy, aborting them");
                workers.abort_all();
                while workers.join_next().await.is_some() {}
                Ok(())
            }
        }
    }
}

struct Worker<D> {
    id: usize,
    receiver: SharedReceiver,
    destination: Arc<D>,
    write_commands: Arc<WriteCommands>,
    stats: Arc<CommandStats>,
}

impl<D: Destination> Worker<D> {
    async fn run(self) {
        loop {
            // The lock is only held while waiting for the next line.
            let line = match self.receiver.lock().await.recv().await {
                Some(line) => line,
                None => break,
            };
            self.forward(&line).await;
        }
        debug!(worker = self.id, "Worker stopped");
    }

    async fn forward(&self, line: &str) {
        let Some(command) = ParsedCommand::from_line(line) else {
            return;
        };
        if !self.write_commands.is_write(command.name()) {
            return;
        }

        // Failures are not retried, only the attempt is counted.
        if let Err(e) = self.destination.call(command.invocation()).await {
            debug!(worker = self.id, command = command.name(), error = %e, "Forward failed");
        }
        self.stats.increment(&command.name_lowercase());
    }
}
