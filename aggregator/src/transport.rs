//! Transport adapter (spec §4.1) — a thin wrapper over [`TcpListener`] and a
//! split stream, giving the rest of the crate line- and length-delimited
//! reads/writes instead of raw bytes.

use crate::config::ACCEPT_POLL_TIMEOUT;
use crate::error::AggError;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

/// A single accepted connection, split into buffered read/write halves so a
/// handler can read a request and then write exactly one response line
/// before closing (spec §2: "writes ... reads ... writes ... closes").
pub struct Connection<S> {
    reader: BufReader<tokio::io::ReadHalf<S>>,
    writer: BufWriter<tokio::io::WriteHalf<S>>,
}

impl<S> Connection<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite,
{
    pub fn new(stream: S) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
        }
    }

    /// Writes `line` followed by `\n` and flushes (spec §4.1 `writeLine`).
    pub async fn write_line(&mut self, line: &str) -> Result<(), AggError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Reads one `\r\n`-terminated header line, without the terminator.
    /// Used both for the start line and each `Key: value` header.
    pub async fn read_line(&mut self) -> Result<Option<String>, AggError> {
        let mut buf = Vec::new();
        let n = self.reader.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
            buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    /// Reads exactly `len` body bytes, failing with a transport error on
    /// premature EOF (spec §4.1: "Errors with IoError on premature EOF
    /// while a length was promised").
    pub async fn read_exact_body(&mut self, len: usize) -> Result<Vec<u8>, AggError> {
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf).await?;
        Ok(buf)
    }
}

/// A bound listener, wrapping [`TcpListener`] but bounding `accept` with a
/// fixed poll timeout so the acceptor loop can observe cancellation (spec
/// §4.1, §5).
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    pub async fn bind<A: ToSocketAddrs>(addr: A, port: u16) -> Result<Self, AggError> {
        let inner = TcpListener::bind(addr)
            .await
            .map_err(|source| AggError::FatalBind { port, source })?;
        Ok(Self { inner })
    }

    /// Blocks up to [`ACCEPT_POLL_TIMEOUT`]; returns `Ok(None)` on timeout
    /// (the distinguished sentinel from spec §4.1), never an error for a
    /// timeout by itself.
    pub async fn accept(&self) -> Result<Option<Connection<TcpStream>>, AggError> {
        match tokio::time::timeout(ACCEPT_POLL_TIMEOUT, self.inner.accept()).await {
            Ok(Ok((stream, _addr))) => Ok(Some(Connection::new(stream))),
            Ok(Err(e)) => Err(AggError::Transport(e)),
            Err(_timeout) => Ok(None),
        }
    }
}

/// Applies [`crate::config::REQUEST_READ_TIMEOUT`] around an async read,
/// converting a timeout into a transport error (spec §5: "implementers
/// should apply one (>=10s) to avoid slow-loris starvation").
pub async fn with_read_timeout<F, T>(fut: F) -> Result<T, AggError>
where
    F: std::future::Future<Output = Result<T, AggError>>,
{
    tokio::time::timeout(crate::config::REQUEST_READ_TIMEOUT, fut)
        .await
        .unwrap_or_else(|_| {
            Err(AggError::Transport(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "request read timed out",
            )))
        })
}

/// Sleeps for `d`; split out so the acceptor/worker/checkpointer loops read
/// the same way regardless of which bounded wait they're doing.
pub async fn sleep(d: Duration) {
    tokio::time::sleep(d).await;
}
