#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{GroupRecord, GroupTransform, RecordStore, StoreError, UserRecord, UserTransform};

/// In-memory record store for testing and simulation
///
/// Both tables live behind one `Arc<Mutex<>>`, so clones share state and a
/// rewrite swaps the whole table under the lock. Nothing survives the
/// process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    users: Vec<UserRecord>,
    groups: Vec<GroupRecord>,
}

impl MemoryStore {
    /// Create a new empty `MemoryStore`
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records.
    pub fn with_records(users: Vec<UserRecord>, groups: Vec<GroupRecord>) -> Self {
        Self { inner: Arc::new(Mutex::new(MemoryStoreInner { users, groups })) }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordStore for MemoryStore {
    fn load_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        Ok(self.lock().users.clone())
    }

    fn load_groups(&self) -> Result<Vec<GroupRecord>, StoreError> {
        Ok(self.lock().groups.clone())
    }

    fn append_user(&self, record: &UserRecord) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.users.iter().any(|u| u.name == record.name) {
            return Err(StoreError::DuplicateUser(record.name.clone()));
        }
        inner.users.push(record.clone());
        Ok(())
    }

    fn append_group(&self, record: &GroupRecord) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.groups.contains(record) {
            return Err(StoreError::DuplicateGroup {
                name: record.name.clone(),
                admin: record.admin.clone(),
            });
        }
        inner.groups.push(record.clone());
        Ok(())
    }

    fn rewrite_users(&self, transform: UserTransform<'_>) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let users = transform(inner.users.clone());
        inner.users = users;
        Ok(())
    }

    fn rewrite_groups(&self, transform: GroupTransform<'_>) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let groups = transform(inner.groups.clone());
        inner.groups = groups;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_tables() {
        let store = MemoryStore::new();
        let clone = store.clone();

        store.append_group(&GroupRecord::new("eng", "alice")).unwrap();
        assert_eq!(clone.load_groups().unwrap().len(), 1);
    }

    #[test]
    fn rewrite_replaces_whole_table() {
        let store = MemoryStore::with_records(
            vec![UserRecord::new("alice", "pw", vec!["eng".into()])],
            vec![GroupRecord::new("eng", "alice")],
        );

        store.rewrite_users(&|_| Vec::new()).unwrap();
        assert!(store.load_users().unwrap().is_empty());
        assert_eq!(store.load_groups().unwrap().len(), 1);
    }
}
