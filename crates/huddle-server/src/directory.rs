//! Group directory.
//!
//! Bounded table of groups in creation order, each with a roster of live
//! sessions. Every operation runs under the directory lock; operations that
//! also persist take the store's writer lock inside it (directory → store,
//! never the reverse), and the registry lock is never taken while the
//! directory lock is held.
//!
//! A roster holds references to live sessions. A session that closes is
//! released from every roster; logging in again re-joins the groups listed
//! in the user's record.

#![allow(clippy::disallowed_types, reason = "Lock guards synchronous store calls only")]

use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{info, warn};

use crate::{
    config::Limits,
    registry::SessionHandle,
    store::{GroupRecord, RecordStore, StoreError, UserRecord},
};

/// Errors from group directory operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The caller already administers a group of that name
    #[error("group {name} administered by {admin} already exists")]
    DuplicateNameAdmin {
        /// Group name
        name: String,
        /// Admin name
        admin: String,
    },

    /// No group of that name is administered by the requester
    #[error("group {0} not found or requester is not its admin")]
    NotFoundOrNotAdmin(String),

    /// The session is already on the roster
    #[error("already a member of {0}")]
    AlreadyMember(String),

    /// No group of that name
    #[error("group {0} not found")]
    NotFound(String),

    /// The roster is at capacity
    #[error("roster is full ({limit} members)")]
    RosterFull {
        /// Roster capacity
        limit: usize,
    },

    /// The group table is at capacity
    #[error("group limit reached ({limit} groups)")]
    CapacityReached {
        /// Group capacity
        limit: usize,
    },

    /// The record store failed; nothing changed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Successful roster join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The session was added to the roster
    Added,
    /// The session was already on the roster
    AlreadyMember,
}

/// Groups a new account was and was not placed in by [`GroupDirectory::enroll`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrollment {
    /// Groups joined and recorded in the new user record, in request order
    pub joined: Vec<String>,
    /// Requested groups that were missing or full
    pub not_joined: Vec<String>,
}

/// A group and its live roster.
#[derive(Debug, Clone)]
pub struct Group {
    /// Group name
    pub name: String,
    /// Name of the user allowed to delete the group
    pub admin: String,
    /// Live members, in join order
    pub roster: Vec<SessionHandle>,
}

impl Group {
    fn new(record: GroupRecord) -> Self {
        Self { name: record.name, admin: record.admin, roster: Vec::new() }
    }

    /// Whether a session logged in as `name` is on the roster.
    pub fn has_member(&self, name: &str) -> bool {
        self.roster.iter().any(|m| m.name == name)
    }
}

/// Group table shared by all sessions.
pub struct GroupDirectory<S: RecordStore> {
    groups: Mutex<Vec<Group>>,
    store: S,
    limits: Limits,
}

impl<S: RecordStore> GroupDirectory<S> {
    /// Empty directory.
    pub fn new(store: S, limits: Limits) -> Self {
        Self { groups: Mutex::new(Vec::new()), store, limits }
    }

    /// Directory populated from the group table, in table order.
    ///
    /// Records past `limits.max_groups` are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns the store error if the group table cannot be loaded.
    pub fn restore(store: S, limits: Limits) -> Result<Self, StoreError> {
        let records = store.load_groups()?;
        let total = records.len();

        let groups: Vec<Group> =
            records.into_iter().take(limits.max_groups).map(Group::new).collect();

        if total > groups.len() {
            warn!(
                restored = groups.len(),
                skipped = total - groups.len(),
                "max groups reached, rejecting the rest"
            );
        }
        info!(count = groups.len(), "groups restored");

        Ok(Self { groups: Mutex::new(groups), store, limits })
    }

    /// Create a group administered by `admin`.
    ///
    /// The `(name, admin)` check runs against the durable table, not only
    /// memory. The admin is not added to the roster.
    ///
    /// # Errors
    ///
    /// - `CapacityReached` if the table is full
    /// - `DuplicateNameAdmin` if the pair exists
    /// - `Store` if the append failed
    pub fn create(&self, name: &str, admin: &str) -> Result<(), DirectoryError> {
        let mut groups = self.lock();

        if groups.len() >= self.limits.max_groups {
            return Err(DirectoryError::CapacityReached { limit: self.limits.max_groups });
        }

        let duplicate =
            || DirectoryError::DuplicateNameAdmin { name: name.to_string(), admin: admin.to_string() };

        if self.store.find_group(name, admin)? {
            return Err(duplicate());
        }

        let record = GroupRecord::new(name, admin);
        match self.store.append_group(&record) {
            Ok(()) => {},
            Err(e) if e.is_duplicate() => return Err(duplicate()),
            Err(e) => return Err(e.into()),
        }

        groups.push(Group::new(record));
        info!(group = name, admin, "group created");
        Ok(())
    }

    /// Delete the group `name` administered by `requester`.
    ///
    /// Strips the group name from user records, then removes the group
    /// record, then the in-memory group. A store failure at either step
    /// leaves memory intact.
    ///
    /// User records name groups only by name. When no other group of that
    /// name remains, the name is stripped from every record. When a namesake
    /// remains, only the deleted group's roster members lose it, since every
    /// other holder of the name now resolves to the namesake.
    ///
    /// # Errors
    ///
    /// - `NotFoundOrNotAdmin` if `requester` administers no group called `name`
    /// - `Store` if a rewrite failed
    pub fn delete(&self, name: &str, requester: &str) -> Result<Group, DirectoryError> {
        let mut groups = self.lock();

        let index = groups
            .iter()
            .position(|g| g.name == name && g.admin == requester)
            .ok_or_else(|| DirectoryError::NotFoundOrNotAdmin(name.to_string()))?;

        let name_still_used =
            groups.iter().enumerate().any(|(i, g)| i != index && g.name == name);
        let members: Vec<String> = groups[index]
            .roster
            .iter()
            .filter(|m| {
                !groups
                    .iter()
                    .enumerate()
                    .any(|(i, g)| i != index && g.name == name && g.has_member(&m.name))
            })
            .map(|m| m.name.clone())
            .collect();

        if !name_still_used || !members.is_empty() {
            self.store.rewrite_users(&|mut users| {
                for user in &mut users {
                    if !name_still_used || members.contains(&user.name) {
                        user.groups.retain(|g| g != name);
                    }
                }
                users
            })?;
        }

        self.store.rewrite_groups(&|mut records| {
            records.retain(|r| !(r.name == name && r.admin == requester));
            records
        })?;

        let group = groups.remove(index);
        info!(group = name, admin = requester, members = group.roster.len(), "group deleted");
        Ok(group)
    }

    /// Place a newly registered account in `requested` groups and append its
    /// user record, under one hold of the directory lock.
    ///
    /// The record lists exactly the groups joined, so it never names a group
    /// that a concurrent delete removed. Nothing is persisted when no group
    /// could be joined. Roster entries are rolled back if the append fails.
    ///
    /// # Errors
    ///
    /// Returns the store error of the append, `DuplicateUser` included.
    pub fn enroll(
        &self,
        member: &SessionHandle,
        password: &str,
        requested: &[String],
    ) -> Result<Enrollment, StoreError> {
        let mut groups = self.lock();
        let mut enrollment = Enrollment::default();

        for name in requested {
            match self.join_locked(&mut groups, member, name) {
                Ok(_) => enrollment.joined.push(name.clone()),
                Err(e) => {
                    warn!(uid = member.uid, name = %member.name, group = %name, "group not joined: {e}");
                    enrollment.not_joined.push(name.clone());
                },
            }
        }

        if enrollment.joined.is_empty() {
            return Ok(enrollment);
        }

        let record = UserRecord::new(member.name.as_str(), password, enrollment.joined.clone());
        if let Err(e) = self.store.append_user(&record) {
            for group in groups.iter_mut() {
                group.roster.retain(|m| m.uid != member.uid);
            }
            return Err(e);
        }

        Ok(enrollment)
    }

    /// Add `member` to the roster of the first group called `name`.
    ///
    /// Memory only; see [`Self::enter`] for the persisted variant.
    ///
    /// # Errors
    ///
    /// - `NotFound` if there is no such group
    /// - `RosterFull` if the roster is at capacity
    pub fn join(&self, member: &SessionHandle, name: &str) -> Result<JoinOutcome, DirectoryError> {
        let mut groups = self.lock();
        self.join_locked(&mut groups, member, name)
    }

    /// Join a group and record the membership in the member's user record.
    ///
    /// The roster entry is rolled back if the store rejects the update.
    ///
    /// # Errors
    ///
    /// As [`Self::join`], plus `AlreadyMember` and `Store`.
    pub fn enter(&self, member: &SessionHandle, name: &str) -> Result<(), DirectoryError> {
        let mut groups = self.lock();

        if self.join_locked(&mut groups, member, name)? == JoinOutcome::AlreadyMember {
            return Err(DirectoryError::AlreadyMember(name.to_string()));
        }

        let persisted = self.store.update_user(&member.name, &|user| {
            if !user.groups.iter().any(|g| g == name) {
                user.groups.push(name.to_string());
            }
        });

        if let Err(e) = persisted {
            if let Some(group) = groups.iter_mut().find(|g| g.name == name) {
                group.roster.retain(|m| m.uid != member.uid);
            }
            return Err(e.into());
        }

        Ok(())
    }

    /// Group names in creation order.
    pub fn list(&self) -> Vec<String> {
        self.lock().iter().map(|g| g.name.clone()).collect()
    }

    /// Whether a group called `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.lock().iter().any(|g| g.name == name)
    }

    /// Names of the groups whose roster lists `member`, in creation order.
    pub fn memberships(&self, member: &str) -> Vec<String> {
        self.lock().iter().filter(|g| g.has_member(member)).map(|g| g.name.clone()).collect()
    }

    /// Snapshot of the roster of the first group called `name`.
    pub fn roster(&self, name: &str) -> Option<Vec<SessionHandle>> {
        self.lock().iter().find(|g| g.name == name).map(|g| g.roster.clone())
    }

    /// Remove session `uid` from every roster.
    pub fn release(&self, uid: u64) {
        for group in self.lock().iter_mut() {
            group.roster.retain(|m| m.uid != uid);
        }
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether there are no groups.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn join_locked(
        &self,
        groups: &mut [Group],
        member: &SessionHandle,
        name: &str,
    ) -> Result<JoinOutcome, DirectoryError> {
        let group = groups
            .iter_mut()
            .find(|g| g.name == name)
            .ok_or_else(|| DirectoryError::NotFound(name.to_string()))?;

        if group.has_member(&member.name) {
            return Ok(JoinOutcome::AlreadyMember);
        }

        if group.roster.len() >= self.limits.max_roster {
            return Err(DirectoryError::RosterFull { limit: self.limits.max_roster });
        }

        group.roster.push(member.clone());
        Ok(JoinOutcome::Added)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Group>> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
