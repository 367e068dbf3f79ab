//! Flat-file record store.
//!
//! Keeps the two tables as text files (`users.txt`, `groups.txt`) in one
//! directory, in the layout described in [`super::layout`]. Every mutation,
//! appends included, writes the whole table to a temporary file in the same
//! directory which is synced and then renamed over the table, so the swap is
//! atomic on every platform `rename(2)` is. The live table is never written
//! in place.

#![allow(clippy::disallowed_types, reason = "Writer lock guards synchronous file I/O only")]

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tempfile::NamedTempFile;

use super::{
    GroupRecord, GroupTransform, RecordStore, StoreError, UserRecord, UserTransform, layout,
};

/// File name of the user table.
pub const USERS_FILE: &str = "users.txt";

/// File name of the group table.
pub const GROUPS_FILE: &str = "groups.txt";

/// Record store backed by two text files.
///
/// All mutations take one writer lock, so appends and rewrites never
/// interleave on the temporary-file/rename step. Reads take no lock: a table
/// only ever changes by rename, so a reader sees it either before or after a
/// mutation. Clone is cheap (Arc).
#[derive(Clone, Debug)]
pub struct FileStore {
    inner: Arc<FileStoreInner>,
}

#[derive(Debug)]
struct FileStoreInner {
    dir: PathBuf,
    users: PathBuf,
    groups: PathBuf,
    writer: Mutex<()>,
}

impl FileStore {
    /// Open the tables in `dir`, creating the directory and empty tables if
    /// they don't exist.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the directory or files cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let users = dir.join(USERS_FILE);
        let groups = dir.join(GROUPS_FILE);
        for path in [&users, &groups] {
            OpenOptions::new().create(true).append(true).open(path)?;
        }

        Ok(Self { inner: Arc::new(FileStoreInner { dir, users, groups, writer: Mutex::new(()) }) })
    }

    /// Directory holding the tables.
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.inner.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write `text` next to `path` and atomically rename it into place.
    fn replace(&self, path: &Path, text: &str) -> Result<(), StoreError> {
        let mut tmp = NamedTempFile::new_in(&self.inner.dir)?;
        tmp.write_all(text.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StoreError::Io(e.error.to_string()))?;
        Ok(())
    }
}

impl RecordStore for FileStore {
    fn load_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        layout::parse_users(&fs::read_to_string(&self.inner.users)?)
    }

    fn load_groups(&self) -> Result<Vec<GroupRecord>, StoreError> {
        layout::parse_groups(&fs::read_to_string(&self.inner.groups)?)
    }

    fn append_user(&self, record: &UserRecord) -> Result<(), StoreError> {
        let _writer = self.lock_writer();

        let mut users = self.load_users()?;
        if users.iter().any(|u| u.name == record.name) {
            return Err(StoreError::DuplicateUser(record.name.clone()));
        }

        users.push(record.clone());
        self.replace(&self.inner.users, &layout::encode_users(&users))
    }

    fn append_group(&self, record: &GroupRecord) -> Result<(), StoreError> {
        let _writer = self.lock_writer();

        let mut groups = self.load_groups()?;
        if groups.contains(record) {
            return Err(StoreError::DuplicateGroup {
                name: record.name.clone(),
                admin: record.admin.clone(),
            });
        }

        groups.push(record.clone());
        self.replace(&self.inner.groups, &layout::encode_groups(&groups))
    }

    fn rewrite_users(&self, transform: UserTransform<'_>) -> Result<(), StoreError> {
        let _writer = self.lock_writer();

        let users = transform(self.load_users()?);
        self.replace(&self.inner.users, &layout::encode_users(&users))
    }

    fn rewrite_groups(&self, transform: GroupTransform<'_>) -> Result<(), StoreError> {
        let _writer = self.lock_writer();

        let groups = transform(self.load_groups()?);
        self.replace(&self.inner.groups, &layout::encode_groups(&groups))
    }
}
