//! Record store errors.

use thiserror::Error;

/// Errors from record store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing medium failed (open, read, write, rename, commit).
    ///
    /// The table is unchanged; the mutation did not take effect.
    #[error("store I/O error: {0}")]
    Io(String),

    /// A table could not be parsed or decoded.
    #[error("corrupt {table} table at record {record}: {reason}")]
    Corrupt {
        /// Table name
        table: &'static str,
        /// 1-based line or record number
        record: usize,
        /// What was wrong
        reason: String,
    },

    /// A user record with this name already exists.
    #[error("user already exists: {0}")]
    DuplicateUser(String),

    /// A group record with this name and admin already exists.
    #[error("group {name} administered by {admin} already exists")]
    DuplicateGroup {
        /// Group name
        name: String,
        /// Admin name
        admin: String,
    },
}

impl StoreError {
    /// Whether the error reports an existing record rather than a failure of
    /// the store itself.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateUser(_) | Self::DuplicateGroup { .. })
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
