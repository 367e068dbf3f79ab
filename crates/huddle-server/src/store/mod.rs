//! Record store abstraction.
//!
//! Two logical tables hold the durable identity state of the server: users
//! (name, password, contacts, groups) and groups (name, admin). The trait is
//! synchronous (no async) and every backend serializes its writers
//! internally, so callers never coordinate around the store.
//!
//! # Atomicity
//!
//! Appends add one record. Every other mutation is a rewrite: read the whole
//! table, apply a pure transform, write the result to a new location and swap
//! it in for the original. A reader observes either the old table or the new
//! one, never a mix, and a failed rewrite leaves the old table in place.
//! Appends give the same guarantee: a failed append never leaves a partial
//! record behind.

mod chaotic;
mod error;
mod file;
mod layout;
mod memory;
mod redb;

pub use chaotic::ChaoticStore;
pub use error::StoreError;
pub use file::FileStore;
pub use memory::MemoryStore;
use serde::{Deserialize, Serialize};

pub use self::redb::RedbStore;

/// Durable counterpart of a session's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Unique user name
    pub name: String,
    /// Password, compared verbatim on login
    pub password: String,
    /// Contact names, in insertion order
    pub contacts: Vec<String>,
    /// Names of the groups the user has joined, in join order
    pub groups: Vec<String>,
}

impl UserRecord {
    /// A fresh account with no contacts.
    pub fn new(name: impl Into<String>, password: impl Into<String>, groups: Vec<String>) -> Self {
        Self { name: name.into(), password: password.into(), contacts: Vec::new(), groups }
    }
}

/// Durable group definition. `(name, admin)` is unique across the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    /// Group name
    pub name: String,
    /// Name of the user allowed to delete the group
    pub admin: String,
}

impl GroupRecord {
    /// Create a group record.
    pub fn new(name: impl Into<String>, admin: impl Into<String>) -> Self {
        Self { name: name.into(), admin: admin.into() }
    }
}

/// Pure transform over the user table.
pub type UserTransform<'a> = &'a dyn Fn(Vec<UserRecord>) -> Vec<UserRecord>;

/// Pure transform over the group table.
pub type GroupTransform<'a> = &'a dyn Fn(Vec<GroupRecord>) -> Vec<GroupRecord>;

/// Transactional store for user and group records.
///
/// Must be Clone (shared by every session), Send + Sync and synchronous.
/// Implementations share their state via Arc, so clones access the same
/// underlying tables.
///
/// Lookups have default implementations that scan the loaded table
/// linearly; the server keeps tens of records, not millions.
pub trait RecordStore: Clone + Send + Sync + 'static {
    /// All user records, in table order.
    fn load_users(&self) -> Result<Vec<UserRecord>, StoreError>;

    /// All group records, in table order.
    fn load_groups(&self) -> Result<Vec<GroupRecord>, StoreError>;

    /// Append a user record.
    ///
    /// # Errors
    ///
    /// `StoreError::DuplicateUser` if a record with the same name exists. The
    /// check and the append happen under the writer lock, so two concurrent
    /// registrations of one name cannot both succeed.
    fn append_user(&self, record: &UserRecord) -> Result<(), StoreError>;

    /// Append a group record.
    ///
    /// # Errors
    ///
    /// `StoreError::DuplicateGroup` if the `(name, admin)` pair exists.
    fn append_group(&self, record: &GroupRecord) -> Result<(), StoreError>;

    /// Replace the user table with `transform(current)`, atomically.
    fn rewrite_users(&self, transform: UserTransform<'_>) -> Result<(), StoreError>;

    /// Replace the group table with `transform(current)`, atomically.
    fn rewrite_groups(&self, transform: GroupTransform<'_>) -> Result<(), StoreError>;

    /// User record by name.
    fn find_user(&self, name: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.load_users()?.into_iter().find(|u| u.name == name))
    }

    /// User record matching both name and password exactly.
    fn find_user_by_credentials(
        &self,
        name: &str,
        password: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.find_user(name)?.filter(|u| u.password == password))
    }

    /// Whether a group record with this `(name, admin)` pair exists.
    fn find_group(&self, name: &str, admin: &str) -> Result<bool, StoreError> {
        Ok(self.load_groups()?.iter().any(|g| g.name == name && g.admin == admin))
    }

    /// Rewrite the single record named `name` with `edit`. Other records pass
    /// through unchanged; a missing user leaves the table as it was.
    fn update_user(&self, name: &str, edit: &dyn Fn(&mut UserRecord)) -> Result<(), StoreError> {
        self.rewrite_users(&|mut users| {
            for user in users.iter_mut().filter(|u| u.name == name) {
                edit(user);
            }
            users
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lookups_scan_tables() {
        let store = MemoryStore::new();
        store.append_user(&UserRecord::new("alice", "pw1234", vec!["eng".into()])).unwrap();
        store.append_group(&GroupRecord::new("eng", "bob")).unwrap();

        assert!(store.find_user("alice").unwrap().is_some());
        assert!(store.find_user("bob").unwrap().is_none());
        assert!(store.find_user_by_credentials("alice", "pw1234").unwrap().is_some());
        assert!(store.find_user_by_credentials("alice", "wrong").unwrap().is_none());
        assert!(store.find_group("eng", "bob").unwrap());
        assert!(!store.find_group("eng", "alice").unwrap());
    }

    #[test]
    fn update_user_touches_only_named_record() {
        let store = MemoryStore::new();
        store.append_user(&UserRecord::new("alice", "pw", vec![])).unwrap();
        store.append_user(&UserRecord::new("bob", "pw", vec![])).unwrap();

        store.update_user("alice", &|u| u.contacts.push("bob".into())).unwrap();

        assert_eq!(store.find_user("alice").unwrap().unwrap().contacts, vec!["bob"]);
        assert!(store.find_user("bob").unwrap().unwrap().contacts.is_empty());
    }
}
