//! Redb-backed record store.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. Every
//! mutation, rewrites included, is a single write transaction: it commits
//! completely or not at all, and Redb admits one writer at a time.

use std::{fmt::Display, path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};

use super::{GroupRecord, GroupTransform, RecordStore, StoreError, UserRecord, UserTransform};

/// Table: users
/// Key: user name
/// Value: CBOR-encoded `UserRecord`
const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Table: groups
/// Key: insertion sequence number (preserves table order)
/// Value: CBOR-encoded `GroupRecord`
const GROUPS: TableDefinition<u64, &[u8]> = TableDefinition::new("groups");

/// Durable record store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates both tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        let txn = db.begin_write().map_err(io)?;
        {
            let _ = txn.open_table(USERS).map_err(io)?;
            let _ = txn.open_table(GROUPS).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl RecordStore for RedbStore {
    fn load_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(USERS).map_err(io)?;
        read_users(&table)
    }

    fn load_groups(&self) -> Result<Vec<GroupRecord>, StoreError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(GROUPS).map_err(io)?;
        read_groups(&table)
    }

    fn append_user(&self, record: &UserRecord) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(USERS).map_err(io)?;

            if table.get(record.name.as_str()).map_err(io)?.is_some() {
                return Err(StoreError::DuplicateUser(record.name.clone()));
            }

            let bytes = encode(record)?;
            table.insert(record.name.as_str(), bytes.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn append_group(&self, record: &GroupRecord) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(GROUPS).map_err(io)?;

            if read_groups(&table)?.contains(record) {
                return Err(StoreError::DuplicateGroup {
                    name: record.name.clone(),
                    admin: record.admin.clone(),
                });
            }

            let next = match table.last().map_err(io)? {
                Some((key, _)) => key.value() + 1,
                None => 0,
            };

            let bytes = encode(record)?;
            table.insert(next, bytes.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn rewrite_users(&self, transform: UserTransform<'_>) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(io)?;

        let current = {
            let table = txn.open_table(USERS).map_err(io)?;
            read_users(&table)?
        };
        let users = transform(current);

        txn.delete_table(USERS).map_err(io)?;
        {
            let mut table = txn.open_table(USERS).map_err(io)?;
            for user in &users {
                let bytes = encode(user)?;
                table.insert(user.name.as_str(), bytes.as_slice()).map_err(io)?;
            }
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn rewrite_groups(&self, transform: GroupTransform<'_>) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(io)?;

        let current = {
            let table = txn.open_table(GROUPS).map_err(io)?;
            read_groups(&table)?
        };
        let groups = transform(current);

        txn.delete_table(GROUPS).map_err(io)?;
        {
            let mut table = txn.open_table(GROUPS).map_err(io)?;
            for (seq, group) in groups.iter().enumerate() {
                let bytes = encode(group)?;
                table.insert(seq as u64, bytes.as_slice()).map_err(io)?;
            }
        }
        txn.commit().map_err(io)?;

        Ok(())
    }
}

fn read_users<T: ReadableTable<&'static str, &'static [u8]>>(
    table: &T,
) -> Result<Vec<UserRecord>, StoreError> {
    let mut users = Vec::new();
    for (index, entry) in table.iter().map_err(io)?.enumerate() {
        let (_, value) = entry.map_err(io)?;
        users.push(decode("users", index, value.value())?);
    }
    Ok(users)
}

fn read_groups<T: ReadableTable<u64, &'static [u8]>>(
    table: &T,
) -> Result<Vec<GroupRecord>, StoreError> {
    let mut groups = Vec::new();
    for (index, entry) in table.iter().map_err(io)?.enumerate() {
        let (_, value) = entry.map_err(io)?;
        groups.push(decode("groups", index, value.value())?);
    }
    Ok(groups)
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).map_err(io)?;
    Ok(bytes)
}

fn decode<T: serde::de::DeserializeOwned>(
    table: &'static str,
    index: usize,
    bytes: &[u8],
) -> Result<T, StoreError> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Corrupt {
        table,
        record: index + 1,
        reason: e.to_string(),
    })
}

fn io(err: impl Display) -> StoreError {
    StoreError::Io(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_and_rewrites_in_one_database() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("huddle.redb")).unwrap();

        store.append_user(&UserRecord::new("alice", "pw1234", vec!["eng".into()])).unwrap();
        store.append_group(&GroupRecord::new("eng", "alice")).unwrap();
        store.append_group(&GroupRecord::new("ops", "alice")).unwrap();

        assert!(store.append_user(&UserRecord::new("alice", "x", vec![])).unwrap_err().is_duplicate());
        assert!(store.append_group(&GroupRecord::new("eng", "alice")).unwrap_err().is_duplicate());

        store.update_user("alice", &|u| u.contacts.push("bob".into())).unwrap();
        store.rewrite_groups(&|groups| groups.into_iter().filter(|g| g.name != "eng").collect()).unwrap();

        assert_eq!(store.find_user("alice").unwrap().unwrap().contacts, vec!["bob"]);
        assert_eq!(store.load_groups().unwrap(), vec![GroupRecord::new("ops", "alice")]);

        store.append_group(&GroupRecord::new("qa", "bob")).unwrap();
        let names: Vec<_> = store.load_groups().unwrap().into_iter().map(|g| g.name).collect();
        assert_eq!(names, vec!["ops", "qa"]);
    }
}
