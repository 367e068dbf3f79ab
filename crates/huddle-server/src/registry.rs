//! Connection registry for live, authenticated sessions.
//!
//! The registry maps uid → session handle (for broadcast and snapshots) and
//! user name → uid (for personal message routing). Both maps live behind one
//! lock, so every mutation and every iteration is serialized.
//!
//! Broadcast only enqueues on each recipient's [`Outbox`]; it never writes a
//! socket, so holding the lock across the fan-out cannot stall on a slow
//! peer.

#![allow(clippy::disallowed_types, reason = "Lock is never held across an await")]

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::warn;

use crate::outbox::{DeliveryError, Outbox};

/// First uid handed out.
pub const FIRST_UID: u64 = 10;

/// A live session as seen by other sessions.
///
/// Cheap to clone: the outbox is a channel sender.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Unique session id
    pub uid: u64,
    /// Authenticated user name
    pub name: String,
    /// Outbound queue of the session
    pub outbox: Outbox,
}

impl SessionHandle {
    /// Create a handle.
    pub fn new(uid: u64, name: impl Into<String>, outbox: Outbox) -> Self {
        Self { uid, name: name.into(), outbox }
    }

    /// Queue `text` for this session.
    pub fn deliver(&self, text: &str) -> Result<(), DeliveryError> {
        self.outbox.try_deliver(text)
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    /// uid → session
    sessions: BTreeMap<u64, SessionHandle>,
    /// user name → uid. Enforces one session per user
    by_name: HashMap<String, u64>,
}

/// Result of [`ConnectionRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The session is now registered
    Admitted,
    /// Another session is logged in under the same name
    NameInUse,
    /// The registry is at capacity
    Full,
    /// The uid is already registered
    UidInUse,
}

impl Admission {
    /// Whether the session was registered.
    pub fn is_admitted(self) -> bool {
        self == Self::Admitted
    }
}

/// Registry of live sessions, bounded by a capacity.
#[derive(Debug)]
pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
    next_uid: AtomicU64,
    capacity: usize,
}

impl ConnectionRegistry {
    /// Create an empty registry holding at most `capacity` sessions.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            next_uid: AtomicU64::new(FIRST_UID),
            capacity,
        }
    }

    /// Allocate a fresh uid. Strictly increasing, never reused.
    pub fn allocate_uid(&self) -> u64 {
        self.next_uid.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a session.
    ///
    /// A name clash is reported before capacity, so a second login of an
    /// online user is told so even when the registry is full.
    pub fn register(&self, handle: SessionHandle) -> Admission {
        let mut inner = self.lock();

        if inner.by_name.contains_key(&handle.name) {
            return Admission::NameInUse;
        }
        if inner.sessions.contains_key(&handle.uid) {
            return Admission::UidInUse;
        }
        if inner.sessions.len() >= self.capacity {
            return Admission::Full;
        }

        inner.by_name.insert(handle.name.clone(), handle.uid);
        inner.sessions.insert(handle.uid, handle);
        Admission::Admitted
    }

    /// Remove a session. Returns its handle if it was registered.
    pub fn deregister(&self, uid: u64) -> Option<SessionHandle> {
        let mut inner = self.lock();
        let handle = inner.sessions.remove(&uid)?;

        if inner.by_name.get(&handle.name) == Some(&uid) {
            inner.by_name.remove(&handle.name);
        }

        Some(handle)
    }

    /// Live session logged in as `name`.
    pub fn find_by_name(&self, name: &str) -> Option<SessionHandle> {
        let inner = self.lock();
        let uid = inner.by_name.get(name)?;
        inner.sessions.get(uid).cloned()
    }

    /// Queue `text` for every session except `exclude_uid`.
    ///
    /// Best effort: a recipient whose queue is full or closed is logged and
    /// skipped. Returns the number of sessions the text was queued for.
    pub fn broadcast(&self, exclude_uid: u64, text: &str) -> usize {
        let inner = self.lock();
        let mut delivered = 0;

        for handle in inner.sessions.values().filter(|h| h.uid != exclude_uid) {
            match handle.deliver(text) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(uid = handle.uid, name = %handle.name, "broadcast skipped: {e}"),
            }
        }

        delivered
    }

    /// Snapshot of all registered uids, ascending.
    pub fn all_uids(&self) -> Vec<u64> {
        self.lock().sessions.keys().copied().collect()
    }

    /// Snapshot of all registered names, in uid order.
    pub fn all_names(&self) -> Vec<String> {
        self.lock().sessions.values().map(|h| h.name.clone()).collect()
    }

    /// Total number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Maximum number of sessions.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
