//! Field validation.
//!
//! Names (user, contact and group names) are single tokens: they are split on
//! whitespace in commands, on `,` in the registration group selection and on
//! `:` in the persisted record layout, so none of those may appear inside
//! one. Passwords only exclude whitespace; the record layout splits the
//! `name:password` line at its first colon.

use crate::{
    errors::{ProtocolError, Result},
    limits::MAX_TOKEN_LEN,
};

/// Characters that may never appear in a name.
pub const RESERVED_NAME_CHARS: [char; 2] = [':', ','];

/// Validate a user, contact or group name.
///
/// `field` names the field in the returned error.
pub fn validate_name<'a>(field: &'static str, value: &'a str) -> Result<&'a str> {
    check_length(field, value)?;

    if let Some(ch) =
        value.chars().find(|c| c.is_whitespace() || c.is_control() || RESERVED_NAME_CHARS.contains(c))
    {
        return Err(ProtocolError::IllegalCharacter { field, ch });
    }

    Ok(value)
}

/// Validate a password.
pub fn validate_password(value: &str) -> Result<&str> {
    check_length("password", value)?;

    if let Some(ch) = value.chars().find(|c| c.is_whitespace() || c.is_control()) {
        return Err(ProtocolError::IllegalCharacter { field: "password", ch });
    }

    Ok(value)
}

/// Split the comma-separated group selection of a registration.
///
/// Candidates are trimmed and empty segments dropped. Validation of each
/// candidate is left to the caller: an invalid name simply never matches an
/// existing group.
pub fn parse_group_candidates(line: &str) -> Vec<&str> {
    line.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
}

fn check_length(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ProtocolError::EmptyField { field });
    }

    if value.len() > MAX_TOKEN_LEN {
        return Err(ProtocolError::FieldTooLong { field, limit: MAX_TOKEN_LEN });
    }

    Ok(())
}
