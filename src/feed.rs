use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info};

use crate::gate::Readiness;
use crate::pipeline::Pipeline;
use crate::{Result, TapError};

const STATUS_OK: &str = "+OK";

/// Connect to the source and start its `MONITOR` feed.
///
/// The returned reader is positioned after the `+OK` status line.
pub async fn subscribe<A: ToSocketAddrs>(addr: A) -> Result<BufReader<TcpStream>> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(b"MONITOR\r\n").await?;
    stream.flush().await?;

    let mut reader = BufReader::new(stream);
    let mut status = String::new();
    if reader.read_line(&mut status).await? == 0 {
        return Err(TapError::SourceClosed);
    }
    let status = status.trim_end();
    match status.strip_prefix('-') {
        Some(err) => Err(TapError::ErrorReply(err.to_string())),
        None => {
            debug!(status, "Source feed started");
            Ok(reader)
        }
    }
}

/// Reads the source feed line by line and hands lines to the pipeline.
pub struct FeedReader<R> {
    reader: R,
    readiness: Readiness,
}

impl<R: AsyncBufRead + Unpin> FeedReader<R> {
    pub fn new(reader: R, readiness: Readiness) -> Self {
        Self { reader, readiness }
    }

    /// Run until the feed fails or ends, both of which are errors.
    ///
    /// Lines read while the destination is not ready are dropped for good.
    pub async fn run(mut self, pipeline: &Pipeline) -> Result<()> {
        let mut buf = Vec::with_capacity(1024);
        let mut discarded: u64 = 0;
        let mut forwarding = false;

        loop {
            buf.clear();
            if self.reader.read_until(b'\n', &mut buf).await? == 0 {
                return Err(TapError::SourceClosed);
            }

            if !self.readiness.is_ready() {
                discarded += 1;
                continue;
            }
            if !forwarding {
                forwarding = true;
                info!(discarded, "Destination ready, forwarding feed");
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }
            if line == STATUS_OK {
                debug!("OK");
                continue;
            }
            pipeline.dispatch(line.to_string()).await?;
        }
    }
}
