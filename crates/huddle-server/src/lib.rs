//! Huddle chat server.
//!
//! Line-oriented chat server with registration, contacts, admin-owned groups
//! and a durable record store that mirrors every identity change.
//!
//! # Architecture
//!
//! Each accepted TCP connection runs one Tokio task. The task feeds decoded
//! lines into a [`SessionMachine`] (Sans-IO, see [`session`]) and executes
//! the [`SessionAction`]s it returns. Sessions share state only through the
//! [`Hub`]:
//!
//! - [`ConnectionRegistry`]: live sessions, uid allocation, broadcast
//! - [`GroupDirectory`]: groups and live rosters
//! - [`Router`]: personal, group and broadcast delivery
//! - [`RecordStore`]: durable users and groups
//!
//! Output never goes to a socket directly. Every session owns an [`Outbox`]
//! drained by its own writer task, so fan-out is a queue push per recipient
//! and one stalled peer cannot hold up anyone else.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod directory;
mod error;
mod hub;
mod outbox;
mod registry;
mod router;
pub mod session;
pub mod store;
mod transport;

use std::{net::SocketAddr, sync::Arc, time::Duration};

pub use config::{Limits, ServerConfig, StoreBackend};
pub use directory::{DirectoryError, Enrollment, Group, GroupDirectory, JoinOutcome};
pub use error::ServerError;
pub use hub::Hub;
pub use outbox::{DeliveryError, Outbox, run_writer};
pub use registry::{Admission, ConnectionRegistry, FIRST_UID, SessionHandle};
pub use router::{RouteError, Router};
pub use session::{CloseReason, SessionAction, SessionMachine, SessionState};
pub use store::{
    ChaoticStore, FileStore, GroupRecord, MemoryStore, RecordStore, RedbStore, StoreError,
    UserRecord,
};
use tokio::{net::TcpStream, sync::Semaphore};
use tracing::{debug, error, info, warn};
pub use transport::{LineReader, ReadError, TcpTransport};

/// Production Huddle server.
///
/// Owns the listener and the shared state; [`Server::run`] accepts forever.
pub struct Server<S: RecordStore> {
    transport: TcpTransport,
    hub: Hub<S>,
    config: ServerConfig,
    /// One permit per connection, authenticating ones included
    admission: Arc<Semaphore>,
}

impl<S: RecordStore> Server<S> {
    /// Bind the listener and restore shared state from `store`.
    ///
    /// # Errors
    ///
    /// - `ServerError::Config` / `ServerError::Transport` if the bind fails
    /// - `ServerError::Store` if the group table cannot be loaded
    pub async fn bind(config: ServerConfig, store: S) -> Result<Self, ServerError> {
        let transport = TcpTransport::bind(&config.bind_address).await?;
        let hub = Hub::restore(store, config.limits)?;
        let admission = Arc::new(Semaphore::new(config.limits.max_sessions));

        Ok(Self { transport, hub, config, admission })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Shared state, for inspection.
    pub fn hub(&self) -> &Hub<S> {
        &self.hub
    }

    /// Run the server, accepting connections until the process exits.
    ///
    /// Connections past `max_sessions` are closed right away. The acceptor
    /// pauses `accept_interval` after every accept.
    pub async fn run(self) -> Result<(), ServerError> {
        info!("Server starting on {}", self.transport.local_addr()?);

        loop {
            match self.transport.accept().await {
                Ok((stream, peer)) => match Arc::clone(&self.admission).try_acquire_owned() {
                    Ok(permit) => {
                        let hub = self.hub.clone();
                        let write_timeout = self.config.write_timeout;

                        tokio::spawn(async move {
                            handle_connection(stream, peer, hub, write_timeout).await;
                            drop(permit);
                        });
                    },
                    Err(_) => {
                        warn!(%peer, "connection refused: session limit reached");
                        drop(stream);
                    },
                },
                Err(e) => {
                    error!("Accept error: {}", e);
                },
            }

            if !self.config.accept_interval.is_zero() {
                tokio::time::sleep(self.config.accept_interval).await;
            }
        }
    }
}

/// Drive one connection from accept to close.
async fn handle_connection<S: RecordStore>(
    stream: TcpStream,
    peer: SocketAddr,
    hub: Hub<S>,
    write_timeout: Duration,
) {
    let uid = hub.registry.allocate_uid();
    info!(uid, %peer, "connection accepted");

    let (reader, writer) = stream.into_split();
    let (outbox, rx) = Outbox::channel(hub.limits.outbox_capacity);

    let writer_task = tokio::spawn(async move {
        if let Err(e) = run_writer(rx, writer, write_timeout).await {
            debug!(uid, "writer stopped: {}", e);
        }
    });

    let mut session = SessionMachine::new(hub, uid, outbox.clone());
    session.start();
    let mut lines = LineReader::new(reader);

    loop {
        let read = tokio::select! {
            read = lines.next_line(session.line_limit()) => read,
            () = outbox.closed() => {
                session.handle_disconnect();
                break;
            },
        };

        let actions = match read {
            Ok(Some(line)) => {
                debug!(uid, len = line.len(), "line received");
                session.handle_line(&line)
            },
            Ok(None) => session.handle_disconnect(),
            Err(ReadError::Protocol(e)) => session.handle_protocol_error(e),
            Err(ReadError::Io(e)) => {
                debug!(uid, "read failed: {}", e);
                session.handle_disconnect()
            },
        };

        if !execute_actions(&outbox, actions).await {
            session.handle_disconnect();
            break;
        }

        if session.state() == SessionState::Closed {
            break;
        }
    }

    drop(session);
    drop(outbox);

    if let Err(e) = writer_task.await {
        warn!(uid, "writer task failed: {}", e);
    }
    info!(uid, %peer, "connection closed");
}

/// Execute session actions. Returns `false` if the peer can no longer be
/// written to.
async fn execute_actions(outbox: &Outbox, actions: Vec<SessionAction>) -> bool {
    for action in actions {
        match action {
            SessionAction::Send(text) => {
                if outbox.send(text).await.is_err() {
                    return false;
                }
            },
            SessionAction::Close { reason } => {
                debug!("closing connection: {}", reason);
            },
        }
    }

    true
}
