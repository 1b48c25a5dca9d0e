//! RESP frames exchanged with the source and destination stores.
use std::fmt;
use std::io::Cursor;

use bytes::{Buf, Bytes};

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Simple(String),    // +
    Error(String),     // -
    Integer(i64),      // :
    Bulk(Bytes),       // $
    Null,              // $-1 / *-1
    Array(Vec<Frame>), // *
}

#[derive(Debug)]
pub enum Error {
    /// Not enough data buffered to parse a full frame.
    Incomplete,
    Other(String),
}

impl Frame {
    /// Build a command invocation, an array of bulk strings.
    pub fn command<I, S>(args: I) -> Frame
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Frame::Array(
            args.into_iter()
                .map(|arg| Frame::Bulk(Bytes::copy_from_slice(arg.as_ref().as_bytes())))
                .collect(),
        )
    }

    /// Textual content of simple and bulk frames.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Frame::Simple(s) => Some(s.clone()),
            Frame::Bulk(b) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }

    pub fn check(src: &mut Cursor<&[u8]>) -> Result<(), Error> {
        match get_u8(src)? {
            b'+' | b'-' | b':' => {
                get_line(src)?;
                Ok(())
            }
            b'$' => {
                let len = get_signed(src)?;
                if len < 0 {
                    return Ok(());
                }
                // skip that number of bytes + 2 (\r\n).
                skip(src, len as usize + 2)
            }
            b'*' => {
                let len = get_signed(src)?;
                for _ in 0..len.max(0) {
                    Frame::check(src)?;
                }
                Ok(())
            }
            actual => Err(Error::Other(format!(
                "protocol error; invalid frame type byte `{actual}`"
            ))),
        }
    }

    /// Parse a frame which has already been validated with [`Frame::check`].
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Frame, Error> {
        match get_u8(src)? {
            b'+' => Ok(Frame::Simple(get_string(src)?)),
            b'-' => Ok(Frame::Error(get_string(src)?)),
            b':' => Ok(Frame::Integer(get_signed(src)?)),
            b'$' => {
                let len = get_signed(src)?;
                if len < 0 {
                    return Ok(Frame::Null);
                }
                let len = len as usize;
                let n = len + 2;

                if src.remaining() < n {
                    return Err(Error::Incomplete);
                }

                let data = Bytes::copy_from_slice(&src.chunk()[..len]);
                skip(src, n)?;

                Ok(Frame::Bulk(data))
            }
            b'*' => {
                let len = get_signed(src)?;
                if len < 0 {
                    return Ok(Frame::Null);
                }
                let mut array = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    array.push(Frame::parse(src)?);
                }
                Ok(Frame::Array(array))
            }
            actual => Err(Error::Other(format!(
                "protocol error; invalid frame type byte `{actual}`"
            ))),
        }
    }

    /// Serialize the frame to its wire form.
    pub fn encode(&self, dst: &mut Vec<u8>) {
        match self {
            Frame::Simple(s) => {
                dst.push(b'+');
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(b"\r\n");
            }
            Frame::Error(s) => {
                dst.push(b'-');
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(b"\r\n");
            }
            Frame::Integer(i) => {
                dst.extend_from_slice(format!(":{i}\r\n").as_bytes());
            }
            Frame::Bulk(b) => {
                dst.extend_from_slice(format!("${}\r\n", b.len()).as_bytes());
                dst.extend_from_slice(b);
                dst.extend_from_slice(b"\r\n");
            }
            Frame::Null => dst.extend_from_slice(b"$-1\r\n"),
            Frame::Array(items) => {
                dst.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    item.encode(dst);
                }
            }
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => s.fmt(f),
            Frame::Error(s) => write!(f, "error: {s}"),
            Frame::Integer(i) => i.fmt(f),
            Frame::Bulk(b) => String::from_utf8_lossy(b).fmt(f),
            Frame::Null => "(nil)".fmt(f),
            Frame::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    item.fmt(f)?;
                }
                Ok(())
            }
        }
    }
}

fn get_u8(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }
    Ok(src.get_u8())
}

/// A "line" is a sequence of bytes terminated by `\r\n`.
fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf = *src.get_ref();
    if buf.len() < 2 {
        return Err(Error::Incomplete);
    }

    for i in start..buf.len() - 1 {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            src.set_position((i + 2) as u64);
            return Ok(&buf[start..i]);
        }
    }

    Err(Error::Incomplete)
}

fn get_string(src: &mut Cursor<&[u8]>) -> Result<String, Error> {
    let line = get_line(src)?;
    Ok(String::from_utf8_lossy(line).into_owned())
}

fn get_signed(src: &mut Cursor<&[u8]>) -> Result<i64, Error> {
    let line = get_line(src)?;
    atoi::atoi::<i64>(line)
        .ok_or_else(|| Error::Other("protocol error; invalid frame format".to_string()))
}

fn skip(src: &mut Cursor<&[u8]>, n: usize) -> Result<(), Error> {
    if src.remaining() < n {
        return Err(Error::Incomplete);
    }
    src.advance(n);
    Ok(())
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Incomplete => "stream ended early".fmt(fmt),
            Error::Other(err) => err.fmt(fmt),
        }
    }
}

impl std::error::Error for Error {}
