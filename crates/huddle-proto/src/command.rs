//! Commands of an authenticated session.
//!
//! A command line is matched on its first whitespace-delimited word. Lines
//! whose first word is not a command keyword are chat text for everyone.

use thiserror::Error;

use crate::{errors::ProtocolError, field::validate_name};

/// One parsed command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// `cgroup <name>`: create a group administered by the caller
    CreateGroup(&'a str),
    /// `dgroup <name>`: delete a group the caller administers
    DeleteGroup(&'a str),
    /// `egroup <name>`: join a group
    EnterGroup(&'a str),
    /// `sgroups`: list all groups
    ShowGroups,
    /// `acontact <name>`: add a contact
    AddContact(&'a str),
    /// `dcontact <name>`: remove a contact
    DeleteContact(&'a str),
    /// `clist`: list the caller's contacts
    ContactList,
    /// `pm <contact> <message>`
    PersonalMessage {
        /// Recipient, must be one of the caller's contacts
        contact: &'a str,
        /// Message text
        message: &'a str,
    },
    /// `mgroup <group> <message>`
    GroupMessage {
        /// Target group
        group: &'a str,
        /// Message text
        message: &'a str,
    },
    /// `exit`: leave the server
    Exit,
    /// A blank line, ignored
    Empty,
    /// Anything else: chat text broadcast to every other session
    Chat(&'a str),
}

/// A recognized command with missing or invalid arguments.
///
/// Not a protocol violation: the session replies with [`CommandError::usage`]
/// and keeps going.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Wrong number of arguments
    #[error("usage: {usage}")]
    Usage {
        /// Usage line of the command
        usage: &'static str,
    },

    /// An argument failed validation
    #[error("invalid argument: {source}")]
    InvalidArgument {
        /// Usage line of the command
        usage: &'static str,
        /// Validation failure
        source: ProtocolError,
    },
}

impl CommandError {
    /// Usage line of the offending command.
    pub fn usage(&self) -> &'static str {
        match self {
            Self::Usage { usage } | Self::InvalidArgument { usage, .. } => usage,
        }
    }
}

impl<'a> Command<'a> {
    /// Parse one command line.
    pub fn parse(line: &'a str) -> Result<Self, CommandError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Self::Empty);
        }

        let (keyword, rest) = split_word(trimmed);

        match keyword {
            "cgroup" => single_name(rest, "group name", "cgroup <name>").map(Self::CreateGroup),
            "dgroup" => single_name(rest, "group name", "dgroup <name>").map(Self::DeleteGroup),
            "egroup" => single_name(rest, "group name", "egroup <name>").map(Self::EnterGroup),
            "acontact" => {
                single_name(rest, "contact name", "acontact <name>").map(Self::AddContact)
            },
            "dcontact" => {
                single_name(rest, "contact name", "dcontact <name>").map(Self::DeleteContact)
            },
            "sgroups" => no_arguments(rest, "sgroups").map(|()| Self::ShowGroups),
            "clist" => no_arguments(rest, "clist").map(|()| Self::ContactList),
            "exit" if rest.is_empty() => Ok(Self::Exit),
            "pm" => {
                let (contact, message) =
                    name_and_message(rest, "contact name", "pm <contact> <message>")?;
                Ok(Self::PersonalMessage { contact, message })
            },
            "mgroup" => {
                let (group, message) =
                    name_and_message(rest, "group name", "mgroup <group> <message>")?;
                Ok(Self::GroupMessage { group, message })
            },
            _ => Ok(Self::Chat(line)),
        }
    }
}

fn split_word(text: &str) -> (&str, &str) {
    match text.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (text, ""),
    }
}

fn single_name<'a>(
    rest: &'a str,
    field: &'static str,
    usage: &'static str,
) -> Result<&'a str, CommandError> {
    let (name, extra) = split_word(rest);
    if name.is_empty() || !extra.is_empty() {
        return Err(CommandError::Usage { usage });
    }
    validate_name(field, name).map_err(|source| CommandError::InvalidArgument { usage, source })
}

fn no_arguments(rest: &str, usage: &'static str) -> Result<(), CommandError> {
    if rest.is_empty() { Ok(()) } else { Err(CommandError::Usage { usage }) }
}

fn name_and_message<'a>(
    rest: &'a str,
    field: &'static str,
    usage: &'static str,
) -> Result<(&'a str, &'a str), CommandError> {
    let (name, message) = split_word(rest);
    if name.is_empty() || message.is_empty() {
        return Err(CommandError::Usage { usage });
    }
    let name =
        validate_name(field, name).map_err(|source| CommandError::InvalidArgument { usage, source })?;
    Ok((name, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_group_commands() {
        assert_eq!(Command::parse("cgroup eng"), Ok(Command::CreateGroup("eng")));
        assert_eq!(Command::parse("dgroup  eng "), Ok(Command::DeleteGroup("eng")));
        assert_eq!(Command::parse("egroup eng\n"), Ok(Command::EnterGroup("eng")));
        assert_eq!(Command::parse("sgroups"), Ok(Command::ShowGroups));
    }

    #[test]
    fn parses_contact_commands() {
        assert_eq!(Command::parse("acontact bob"), Ok(Command::AddContact("bob")));
        assert_eq!(Command::parse("dcontact bob"), Ok(Command::DeleteContact("bob")));
        assert_eq!(Command::parse("clist"), Ok(Command::ContactList));
    }

    #[test]
    fn message_keeps_inner_spacing() {
        assert_eq!(
            Command::parse("pm bob hello  there"),
            Ok(Command::PersonalMessage { contact: "bob", message: "hello  there" })
        );
        assert_eq!(
            Command::parse("mgroup eng ship it"),
            Ok(Command::GroupMessage { group: "eng", message: "ship it" })
        );
    }

    #[test]
    fn missing_arguments_are_usage_errors() {
        assert_eq!(Command::parse("cgroup"), Err(CommandError::Usage { usage: "cgroup <name>" }));
        assert_eq!(
            Command::parse("pm bob"),
            Err(CommandError::Usage { usage: "pm <contact> <message>" })
        );
        assert_eq!(Command::parse("clist now"), Err(CommandError::Usage { usage: "clist" }));
        assert!(Command::parse("egroup a b").is_err());
    }

    #[test]
    fn invalid_names_are_rejected() {
        let err = Command::parse("acontact a:b").unwrap_err();
        assert_eq!(err.usage(), "acontact <name>");
        assert!(matches!(err, CommandError::InvalidArgument { .. }));
    }

    #[test]
    fn keyword_must_be_a_whole_word() {
        assert_eq!(Command::parse("cgroupies rock"), Ok(Command::Chat("cgroupies rock")));
        assert_eq!(Command::parse("exit now"), Ok(Command::Chat("exit now")));
        assert_eq!(Command::parse("hello all"), Ok(Command::Chat("hello all")));
    }

    #[test]
    fn blank_lines_and_exit() {
        assert_eq!(Command::parse("   "), Ok(Command::Empty));
        assert_eq!(Command::parse(""), Ok(Command::Empty));
        assert_eq!(Command::parse("exit"), Ok(Command::Exit));
    }
}
