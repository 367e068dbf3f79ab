//! Fuzz target for the command grammar
//!
//! Arbitrary command lines must parse into a command, a usage error or chat
//! text, never a panic.
//!
//! # Invariants
//!
//! - Every name argument that parses is a valid name
//! - Message text of `pm` and `mgroup` is never empty
//! - Usage errors always carry the usage line of a known command

#![no_main]

use huddle_proto::{Command, field::validate_name};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|line: &str| {
    match Command::parse(line) {
        Ok(
            Command::CreateGroup(name)
            | Command::DeleteGroup(name)
            | Command::EnterGroup(name)
            | Command::AddContact(name)
            | Command::DeleteContact(name),
        ) => {
            assert!(validate_name("name", name).is_ok(), "invalid name {name:?} accepted");
        },
        Ok(Command::PersonalMessage { contact: name, message })
        | Ok(Command::GroupMessage { group: name, message }) => {
            assert!(validate_name("name", name).is_ok(), "invalid name {name:?} accepted");
            assert!(!message.is_empty());
        },
        Ok(_) => {},
        Err(e) => {
            let keyword = e.usage().split_whitespace().next().unwrap_or_default();
            assert!(line.trim_start().starts_with(keyword), "{keyword} usage for {line:?}");
        },
    }
});
