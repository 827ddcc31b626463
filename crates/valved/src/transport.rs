//! Frame transport over TCP
//!
//! Each connection carries newline-delimited frames:
//!
//! ```text
//! sensors/valves/v1\t{"id":1,"valve_id":"v1","value":"closed","timestamp":100.0}\n
//! ```
//!
//! The topic and the tab are optional; a frame without a tab is a bare
//! payload with no topic hint. Every connection task forwards frames into
//! the same channel, which has a single consumer (the ingestor).

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use valve_common::RawPayload;

/// Largest accepted frame, excluding the newline
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame exceeds {0} bytes")]
    TooLong(usize),

    #[error("Topic is not valid UTF-8")]
    InvalidTopic,
}

/// Split one line into topic and payload. Blank lines yield `None`.
pub fn parse_frame(line: &[u8]) -> Result<Option<RawPayload>, FrameError> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    if line.len() > MAX_FRAME_BYTES {
        return Err(FrameError::TooLong(line.len()));
    }
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let (topic, payload) = match line.iter().position(|b| *b == b'\t') {
        Some(tab) => {
            let topic = std::str::from_utf8(&line[..tab]).map_err(|_| FrameError::InvalidTopic)?;
            (topic.trim().to_string(), &line[tab + 1..])
        }
        None => (String::new(), line),
    };

    Ok(Some(RawPayload::new(topic, payload)))
}

/// Bind the frame listener
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding frame listener on {}", addr))?;
    info!("Listening for valve frames on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accept connections forever, one task per connection
pub async fn listen(listener: TcpListener, tx: mpsc::Sender<RawPayload>) -> Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Accept failed: {}", e);
                continue;
            }
        };

        let tx = tx.clone();
        tokio::spawn(async move {
            let peer = peer.to_string();
            match handle_connection(stream, &peer, tx).await {
                Ok(frames) => info!("Connection {} closed after {} frames", peer, frames),
                Err(e) => warn!("Connection {} failed: {:#}", peer, e),
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, peer: &str, tx: mpsc::Sender<RawPayload>) -> Result<u64> {
    info!("Connection from {}", peer);
    read_frames(stream, peer, &tx).await
}

/// Forward frames from `reader` to `tx` until EOF. Returns the number of
/// frames forwarded. Stops early if the consumer has gone away.
pub async fn read_frames<R>(reader: R, peer: &str, tx: &mpsc::Sender<RawPayload>) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(1024);
    // Room for the longest frame plus a `\r\n` ending
    let limit = MAX_FRAME_BYTES as u64 + 2;
    let mut forwarded = 0;

    loop {
        buf.clear();
        let n = (&mut reader)
            .take(limit)
            .read_until(b'\n', &mut buf)
            .await
            .with_context(|| format!("reading from {}", peer))?;
        if n == 0 {
            break;
        }

        if buf.len() as u64 >= limit && buf.last() != Some(&b'\n') {
            warn!("Dropping oversized frame from {}", peer);
            skip_line(&mut reader, limit).await?;
            continue;
        }

        match parse_frame(&buf) {
            Ok(Some(raw)) => {
                if tx.send(raw).await.is_err() {
                    debug!("Consumer gone, closing {}", peer);
                    break;
                }
                forwarded += 1;
            }
            Ok(None) => {}
            Err(e) => warn!("Bad frame from {}: {}", peer, e),
        }
    }

    Ok(forwarded)
}

/// Discard input up to and including the next newline
async fn skip_line<R>(reader: &mut BufReader<R>, limit: u64) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut scratch = Vec::new();
    loop {
        scratch.clear();
        let n = (&mut *reader).take(limit).read_until(b'\n', &mut scratch).await?;
        if n == 0 || scratch.last() == Some(&b'\n') {
            return Ok(());
        }
    }
}
