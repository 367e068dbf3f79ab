//! TCP transport.
//!
//! Plain TCP listener plus the bounded line reader sessions read from. Each
//! accepted stream is split: the read half feeds a [`LineReader`], the write
//! half is owned by the session's writer task (see [`crate::outbox`]).

use std::net::SocketAddr;

use bytes::BytesMut;
use huddle_proto::{
    ProtocolError,
    line::{decode_eof, decode_line},
    limits::MESSAGE_LINE_LIMIT,
};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    net::{TcpListener, TcpStream},
};

use crate::error::ServerError;

/// TCP transport.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Create and bind a new transport.
    ///
    /// # Errors
    ///
    /// - `ServerError::Config` if `address` is not a socket address
    /// - `ServerError::Transport` if the bind fails
    pub async fn bind(address: &str) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))?;

        tracing::info!("TCP transport bound to {}", addr);

        Ok(Self { listener })
    }

    /// Accept a new connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ServerError> {
        self.listener
            .accept()
            .await
            .map_err(|e| ServerError::Transport(format!("accept failed: {e}")))
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}

/// Why no line could be read.
#[derive(Error, Debug)]
pub enum ReadError {
    /// The peer sent an oversized or undecodable line
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The socket failed
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads bounded lines from a byte stream.
pub struct LineReader<R> {
    reader: R,
    buf: BytesMut,
    eof: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Wrap a reader.
    pub fn new(reader: R) -> Self {
        Self { reader, buf: BytesMut::with_capacity(MESSAGE_LINE_LIMIT), eof: false }
    }

    /// Next line of at most `limit` bytes, or `None` once the peer closed
    /// its side and everything buffered has been returned.
    ///
    /// Cancel safe: bytes read before cancellation stay buffered.
    pub async fn next_line(&mut self, limit: usize) -> Result<Option<String>, ReadError> {
        loop {
            if let Some(line) = decode_line(&mut self.buf, limit)? {
                return Ok(Some(line));
            }

            if self.eof {
                return Ok(decode_eof(&mut self.buf, limit)?);
            }

            self.buf.reserve(1024);
            if self.reader.read_buf(&mut self.buf).await? == 0 {
                self.eof = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[tokio::test]
    async fn transport_binds_ephemeral_port() {
        let transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();
        assert_ne!(addr.port(), 0, "Should have assigned a port");
    }

    #[tokio::test]
    async fn transport_rejects_invalid_address() {
        let result = TcpTransport::bind("invalid:address:format").await;
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn reads_lines_split_across_writes() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut lines = LineReader::new(server);

        client.write_all(b"R\nali").await.unwrap();
        assert_eq!(lines.next_line(32).await.unwrap(), Some("R".to_string()));

        client.write_all(b"ce\nexit").await.unwrap();
        drop(client);

        assert_eq!(lines.next_line(32).await.unwrap(), Some("alice".to_string()));
        assert_eq!(lines.next_line(32).await.unwrap(), Some("exit".to_string()));
        assert_eq!(lines.next_line(32).await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_line_is_a_protocol_error() {
        let (mut client, server) = tokio::io::duplex(128);
        let mut lines = LineReader::new(server);

        client.write_all(&[b'x'; 40]).await.unwrap();

        let err = lines.next_line(32).await.unwrap_err();
        assert!(matches!(err, ReadError::Protocol(ProtocolError::LineTooLong { limit: 32 })));
    }
}
