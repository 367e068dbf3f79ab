//! Per-session outbound queue.
//!
//! Every session owns one bounded queue of encoded lines and one writer task
//! that drains it into the socket. Other sessions never touch that socket:
//! fan-out only enqueues, so holding the registry or directory lock while
//! delivering costs a channel push per recipient, never a network write.
//!
//! A queue that is full (the peer stopped reading) or closed (the writer
//! gave up) refuses further lines. The sender logs and moves on.

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc::{self, error::TrySendError},
};

/// Why a line could not be queued for a session.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The queue is at capacity
    #[error("outbound queue is full")]
    QueueFull,

    /// The writer task has stopped
    #[error("session is closed")]
    Closed,
}

/// Sending half of a session's outbound queue.
///
/// Clones share the queue. The writer task exits once every clone is dropped
/// and the queue is drained.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Bytes>,
}

impl Outbox {
    /// Create a queue holding at most `capacity` lines.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue a line without waiting. Used for deliveries from other sessions.
    pub fn try_deliver(&self, text: &str) -> Result<(), DeliveryError> {
        self.tx.try_send(Bytes::copy_from_slice(text.as_bytes())).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::QueueFull,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Queue a line, waiting for room. Used by a session for its own replies.
    pub async fn send(&self, text: String) -> Result<(), DeliveryError> {
        self.tx.send(Bytes::from(text)).await.map_err(|_| DeliveryError::Closed)
    }

    /// Whether the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the writer task has stopped.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}

/// Drain `rx` into `writer` until every [`Outbox`] is dropped.
///
/// Each write must finish within `write_timeout`. A write that fails or times
/// out ends the task; dropping the receiver closes the queue for every
/// sender.
///
/// # Errors
///
/// Returns the I/O error (or `TimedOut`) that stopped the writer.
pub async fn run_writer<W>(
    mut rx: mpsc::Receiver<Bytes>,
    mut writer: W,
    write_timeout: Duration,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        match tokio::time::timeout(write_timeout, writer.write_all(&line)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("write stalled for {write_timeout:?}"),
                ));
            },
        }
    }

    writer.shutdown().await
}
