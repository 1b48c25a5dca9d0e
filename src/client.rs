use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::connection::Connection;
use crate::frame::Frame;
use crate::{Result, TapError};

/// A store which accepts generic command invocations.
///
/// This is the seam between the replication core and the network, the
/// workers and the readiness gate only ever see a [`Destination`].
pub trait Destination: Send + Sync + 'static {
    /// Issue a single command, `args[0]` being the command name.
    fn call(&self, args: Vec<String>) -> impl Future<Output = Result<Frame>> + Send;

    /// Fetch a section of the `INFO` report as text.
    fn info(&self, section: &str) -> impl Future<Output = Result<String>> + Send {
        let args = vec!["INFO".to_string(), section.to_string()];
        async move {
            let reply = self.call(args).await?;
            reply.as_text().ok_or_else(|| TapError::UnexpectedReply {
                command: "INFO".to_string(),
                reply: reply.to_string(),
            })
        }
    }
}

impl<D: Destination> Destination for Arc<D> {
    fn call(&self, args: Vec<String>) -> impl Future<Output = Result<Frame>> + Send {
        (**self).call(args)
    }
}

/// RESP client backed by a small pool of idle connections, so that many
/// workers can share a single destination.
#[derive(Clone, Debug)]
pub struct RespClient {
    addr: String,
    idle: Arc<Mutex<Vec<Connection>>>,
    max_idle: usize,
}

impl RespClient {
    pub fn new<A: Into<String>>(addr: A) -> Self {
        Self::with_max_idle(addr, crate::DEFAULT_WORKERS)
    }

    pub fn with_max_idle<A: Into<String>>(addr: A, max_idle: usize) -> Self {
        Self {
            addr: addr.into(),
            idle: Arc::new(Mutex::new(Vec::new())),
            max_idle,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn checkout(&self) -> Result<Connection> {
        if let Some(conn) = self.idle.lock().await.pop() {
            return Ok(conn);
        }
        debug!(addr = %self.addr, "Opening new connection");
        Connection::connect(self.addr.as_str()).await
    }

    async fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock().await;
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }
}

impl Destination for RespClient {
    fn call(&self, args: Vec<String>) -> impl Future<Output = Result<Frame>> + Send {
        async move {
            let mut conn = self.checkout().await?;
            // A connection which failed mid-request is dropped rather than reused.
            let reply = conn.request(&Frame::command(&args)).await?;
            self.checkin(conn).await;
            match reply {
                Frame::Error(msg) => Err(TapError::ErrorReply(msg)),
                frame => Ok(frame),
            }
        }
    }
}
