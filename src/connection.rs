use std::io::Cursor;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::frame::{self, Frame};
use crate::{Result, TapError};

/// A single RESP connection to a store.
#[derive(Debug)]
pub struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
}

impl Connection {
    pub fn new(socket: TcpStream) -> Connection {
        Connection {
            stream: BufWriter::new(socket),
            buffer: BytesMut::with_capacity(4 * 1024),
        }
    }

    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Connection> {
        let socket = TcpStream::connect(addr).await?;
        socket.set_nodelay(true)?;
        Ok(Connection::new(socket))
    }

    /// Read a single frame, returning `None` when the peer closed the
    /// connection cleanly between frames.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.parse_frame()? {
                return Ok(Some(frame));
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                if self.buffer.is_empty() {
                    return Ok(None);
                } else {
                    return Err(TapError::ConnectionClosed);
                }
            }
        }
    }

    fn parse_frame(&mut self) -> Result<Option<Frame>> {
        let mut buf = Cursor::new(&self.buffer[..]);

        match Frame::check(&mut buf) {
            Ok(_) => {
                let len = buf.position() as usize;
                buf.set_position(0);

                let frame =
                    Frame::parse(&mut buf).map_err(|e| TapError::Protocol(e.to_string()))?;
                self.buffer.advance(len);

                Ok(Some(frame))
            }
            Err(frame::Error::Incomplete) => Ok(None),
            Err(e) => Err(TapError::Protocol(e.to_string())),
        }
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mut out = Vec::new();
        frame.encode(&mut out);
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Send a command and wait for its reply.
    pub async fn request(&mut self, frame: &Frame) -> Result<Frame> {
        self.write_frame(frame).await?;
        self.read_frame().await?.ok_or(TapError::ConnectionClosed)
    }
}
