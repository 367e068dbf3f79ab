//! Field and line limits.
//!
//! Sized after the classic fixed protocol buffers: identity tokens
//! live in 32-byte fields, the group selection of a registration in a
//! 1024-byte buffer and everything else in 2048-byte message buffers.

/// Size of an identity or status field, terminator included.
pub const TOKEN_FIELD_SIZE: usize = 32;

/// Longest accepted name, password, contact or group name.
pub const MAX_TOKEN_LEN: usize = TOKEN_FIELD_SIZE - 1;

/// Line limit while reading the action code, a name or a password.
pub const TOKEN_LINE_LIMIT: usize = TOKEN_FIELD_SIZE;

/// Line limit for the comma-separated group selection sent during
/// registration.
pub const GROUP_LIST_LINE_LIMIT: usize = 1024;

/// Line limit for commands and chat text once a session is active.
pub const MESSAGE_LINE_LIMIT: usize = 2048;
