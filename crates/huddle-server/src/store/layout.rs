//! Flat-file table layout.
//!
//! User table: repeating three-line records
//!
//! ```text
//! alice:pw1234
//! contacts:bob:carol
//! groups:eng:sales
//! ```
//!
//! Group table: one `name:admin` line per group.
//!
//! An empty list is written as a bare `contacts:` or `groups:` line. Parsing
//! is tolerant of blank lines, empty list segments (older tables were written
//! as `groups::eng`) and a missing trailing colon; encoding always emits the
//! canonical form.

use super::{GroupRecord, StoreError, UserRecord};

const USERS: &str = "users";
const GROUPS: &str = "groups";
const CONTACTS_PREFIX: &str = "contacts";
const GROUPS_PREFIX: &str = "groups";

pub(crate) fn encode_user(record: &UserRecord) -> String {
    format!(
        "{}:{}\n{CONTACTS_PREFIX}:{}\n{GROUPS_PREFIX}:{}\n",
        record.name,
        record.password,
        record.contacts.join(":"),
        record.groups.join(":"),
    )
}

pub(crate) fn encode_users(records: &[UserRecord]) -> String {
    records.iter().map(encode_user).collect()
}

pub(crate) fn encode_group(record: &GroupRecord) -> String {
    format!("{}:{}\n", record.name, record.admin)
}

pub(crate) fn encode_groups(records: &[GroupRecord]) -> String {
    records.iter().map(encode_group).collect()
}

pub(crate) fn parse_users(text: &str) -> Result<Vec<UserRecord>, StoreError> {
    let lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim_end_matches('\r')))
        .filter(|(_, l)| !l.trim().is_empty())
        .collect();

    let mut records = Vec::with_capacity(lines.len() / 3);
    for chunk in lines.chunks(3) {
        let [(line_no, identity), (contacts_no, contacts), (groups_no, groups)] = chunk else {
            return Err(corrupt(USERS, chunk[0].0, "truncated user record"));
        };

        let (name, password) = identity
            .split_once(':')
            .ok_or_else(|| corrupt(USERS, *line_no, "expected name:password"))?;
        if name.is_empty() {
            return Err(corrupt(USERS, *line_no, "empty user name"));
        }

        records.push(UserRecord {
            name: name.to_string(),
            password: password.to_string(),
            contacts: parse_list(contacts, CONTACTS_PREFIX, *contacts_no)?,
            groups: parse_list(groups, GROUPS_PREFIX, *groups_no)?,
        });
    }

    Ok(records)
}

pub(crate) fn parse_groups(text: &str) -> Result<Vec<GroupRecord>, StoreError> {
    text.lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim_end_matches('\r')))
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(line_no, line)| match line.split_once(':') {
            Some((name, admin)) if !name.is_empty() && !admin.is_empty() => {
                Ok(GroupRecord::new(name, admin))
            },
            _ => Err(corrupt(GROUPS, line_no, "expected name:admin")),
        })
        .collect()
}

fn parse_list(line: &str, prefix: &str, line_no: usize) -> Result<Vec<String>, StoreError> {
    let mut segments = line.split(':');
    if segments.next() != Some(prefix) {
        return Err(corrupt(USERS, line_no, &format!("expected {prefix}: line")));
    }
    Ok(segments.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
}

fn corrupt(table: &'static str, record: usize, reason: &str) -> StoreError {
    StoreError::Corrupt { table, record, reason: reason.to_string() }
}
