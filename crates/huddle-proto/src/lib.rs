//! Huddle line protocol.
//!
//! Pure protocol vocabulary shared by the server and any peer that speaks to
//! it: field limits, the bounded line decoder, field validation, the command
//! grammar of an authenticated session and every reply the server sends.
//!
//! Nothing in this crate performs I/O. The server feeds bytes from its sockets
//! into [`line::decode_line`] and interprets the resulting lines with
//! [`Action::parse`] and [`Command::parse`].
//!
//! # Wire format
//!
//! Every unit sent by a peer is one line of text. A line ends at `\n` or at a
//! NUL byte (peers that send fixed-size, NUL-padded frames are accepted), a
//! trailing `\r` is dropped and leading NUL padding is skipped. Each protocol
//! step has its own byte limit, see [`limits`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod command;
mod errors;
pub mod field;
pub mod limits;
pub mod line;
pub mod reply;

pub use action::Action;
pub use command::{Command, CommandError};
pub use errors::{ProtocolError, Result};
