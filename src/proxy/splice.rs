//! Moves whatever bytes one endpoint has ready over to another endpoint.
//!
//! Nothing here knows about SMTP. The only hook is the `inspect` closure given
//! to [`try_forward_with`], which sees each chunk between the read and the
//! write.

use std::{future::Future, io};

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};

use crate::error::{TransportError, TransportResult};

const CHUNK_SIZE: usize = 8192;

/// A byte stream that can be polled for readiness and read without blocking.
pub trait Endpoint: AsyncWrite + Unpin + Send {
    /// Wait until the endpoint may have data (or end-of-stream) to read.
    ///
    /// Wake ups can be spurious, a following [`Endpoint::try_read`] may still
    /// report [`io::ErrorKind::WouldBlock`].
    fn readable(&self) -> impl Future<Output = io::Result<()>> + Send;

    /// Read whatever is immediately available into `buf`.
    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize>;
}

impl Endpoint for TcpStream {
    fn readable(&self) -> impl Future<Output = io::Result<()>> + Send {
        Self::readable(self)
    }

    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        Self::try_read(self, buf)
    }
}

/// What a single forward attempt did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    /// Bytes taken from the source.
    pub read: usize,
    /// Bytes written (and flushed) to the sink.
    pub written: usize,
    /// The source reached end-of-stream.
    pub eof: bool,
}

/// Forward the bytes `source` has ready to `sink`, unmodified.
///
/// # Errors
///
/// Returns a [`TransportError`] if reading or writing fails.
pub async fn try_forward<S: Endpoint, D: Endpoint>(
    source: &S,
    sink: &mut D,
) -> TransportResult<Transfer> {
    try_forward_with(source, sink, |chunk| chunk).await
}

/// Forward the bytes `source` has ready to `sink`, passing them through
/// `inspect` first.
///
/// When nothing is ready this returns immediately without touching `sink`.
/// An empty chunk from `inspect` means there is nothing to write (yet).
///
/// # Errors
///
/// Returns a [`TransportError`] if reading or writing fails.
pub async fn try_forward_with<S, D, F>(
    source: &S,
    sink: &mut D,
    inspect: F,
) -> TransportResult<Transfer>
where
    S: Endpoint,
    D: Endpoint,
    F: FnOnce(Vec<u8>) -> Vec<u8> + Send,
{
    let (chunk, eof) = read_available(source)?;

    if chunk.is_empty() {
        return Ok(Transfer {
            read: 0,
            written: 0,
            eof,
        });
    }

    let read = chunk.len();
    let chunk = inspect(chunk);
    forward(sink, &chunk).await?;

    Ok(Transfer {
        read,
        written: chunk.len(),
        eof,
    })
}

/// Write `chunk` to `sink` and flush it.
///
/// # Errors
///
/// Returns [`TransportError::Write`] if the write or flush fails.
pub async fn forward<D: Endpoint>(sink: &mut D, chunk: &[u8]) -> TransportResult<()> {
    if chunk.is_empty() {
        return Ok(());
    }

    sink.write_all(chunk).await.map_err(TransportError::Write)?;
    sink.flush().await.map_err(TransportError::Write)
}

/// Drain everything `source` can hand over without blocking.
fn read_available<S: Endpoint>(source: &S) -> TransportResult<(Vec<u8>, bool)> {
    let mut chunk = Vec::new();
    let mut buf = [0; CHUNK_SIZE];

    loop {
        match source.try_read(&mut buf) {
            Ok(0) => return Ok((chunk, true)),
            Ok(n) => chunk.extend_from_slice(&buf[..n]),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok((chunk, false)),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(TransportError::Read(err)),
        }
    }
}
