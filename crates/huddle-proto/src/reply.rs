//! Replies and notices sent by the server.
//!
//! Every text ends with `\n`. Fixed replies are constants; replies that carry
//! names are built by the functions below.

/// Registration refused: the name is taken.
pub const USERNAME_TAKEN: &str = "Username already exists.\n";
/// Registration accepted.
pub const REGISTER_SUCCESS: &str = "Registered successfully.\n";
/// Login refused.
pub const LOGIN_FAILED: &str = "Log in failed.\n";
/// Login refused: the user already has a live session.
pub const ALREADY_ONLINE: &str = "User is already logged in.\n";
/// Login accepted.
pub const LOGIN_SUCCESS: &str = "Logged in successfully.\n";
/// Registration refused: none of the selected groups exist.
pub const NO_VALID_GROUPS: &str = "No valid group names found.\n";
/// Every session slot is taken.
pub const SERVER_FULL: &str = "Server is full. Try again later.\n";
/// A record store failure prevented the request.
pub const STORE_FAILURE: &str = "Request failed. Please try again later.\n";
/// Terminates the group listing sent during registration.
pub const GROUP_SELECTION_PROMPT: &str = "Enter groups to join (comma separated):\n";

/// `cgroup` succeeded.
pub const GROUP_CREATED: &str = "Group successfully created.You are its admin, but not yet a member.\n";
/// `cgroup` refused: the caller already administers a group of that name.
pub const GROUP_DUPLICATE: &str = "Group not created.Duplicate name-admin combo.\n";
/// `cgroup` refused: the group table is full.
pub const GROUP_LIMIT_REACHED: &str = "Group not created.Maximum number of groups reached.\n";
/// `cgroup` failed in the record store.
pub const GROUP_CREATE_FAILED: &str = "Group not created.Unknown error.\n";

/// `dgroup` succeeded.
pub const GROUP_DELETED: &str = "Group successfully deleted.\n";
/// `dgroup` refused.
pub const GROUP_NOT_DELETED: &str = "Group not deleted.Wrong group name or user is not admin.\n";
/// `dgroup` failed in the record store.
pub const GROUP_DELETE_FAILED: &str = "Group not deleted.Unknown error.\n";

/// `egroup` succeeded.
pub const GROUP_ENTERED: &str = "Entered group successfully.\n";
/// `egroup` refused: already on the roster.
pub const ALREADY_MEMBER: &str = "You are already a member.\n";
/// `egroup` refused: no such group.
pub const GROUP_NOT_FOUND: &str = "Group name not found.\n";
/// `egroup` refused: the roster is full.
pub const GROUP_FULL: &str = "Group is full.\n";
/// `egroup` failed in the record store.
pub const GROUP_ENTER_FAILED: &str = "Group not entered.Unknown error.\n";

/// `dcontact` succeeded.
pub const CONTACT_DELETED: &str = "Contact deleted.\n";
/// `dcontact` refused.
pub const CONTACT_MISSING: &str = "Contact does not exist.\n";
/// `acontact` refused: the contact list is full.
pub const CONTACT_LIST_FULL: &str = "Contact list is full.\n";
/// A contact change failed in the record store.
pub const CONTACT_UPDATE_FAILED: &str = "Contact list not updated.Unknown error.\n";

/// `mgroup` refused: no such group.
pub const GROUP_MISSING: &str = "Group does not exist.\n";
/// `mgroup` refused: the caller is not on the roster.
pub const NOT_A_MEMBER: &str = "You are not a member of the group.\n";

/// Header of the group listing.
pub const GROUP_LIST_HEADER: &str = "Groups List:\n";
/// Header of the contact listing.
pub const CONTACT_LIST_HEADER: &str = "Your Contact List:\n";

/// Registration succeeded but some selected groups were not joined.
pub fn register_success(not_joined: &[String]) -> String {
    let mut reply = REGISTER_SUCCESS.to_string();
    if !not_joined.is_empty() {
        reply.push_str("Groups not joined: ");
        reply.push_str(&not_joined.join(", "));
        reply.push('\n');
    }
    reply
}

/// `acontact` succeeded.
pub fn contact_added(name: &str) -> String {
    format!("Contact {name} was added to your list.\n")
}

/// `acontact` refused: already a contact.
pub fn contact_exists(name: &str) -> String {
    format!("Contact {name} already exists.\n")
}

/// `pm` refused: the recipient is not a contact of the sender.
pub fn not_in_contacts(name: &str) -> String {
    format!("User {name} is not in your contact list. Message not sent.\n")
}

/// `pm` refused: the recipient has no live session.
pub fn contact_offline(name: &str) -> String {
    format!("{name} is offline. Message not sent.\n")
}

/// `pm` accepted but the recipient's session would not take it.
pub fn delivery_failed(name: &str) -> String {
    format!("Message to {name} could not be delivered.\n")
}

/// A recognized command with bad arguments.
pub fn usage(usage: &str) -> String {
    format!("Usage: {usage}\n")
}

/// Numbered listing under a header: `1. first`, `2. second`, ...
pub fn listing<S: AsRef<str>>(header: &str, items: &[S]) -> String {
    let mut out = header.to_string();
    for (i, item) in items.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, item.as_ref()));
    }
    out
}

/// Personal message as delivered to its recipient.
pub fn personal_message(sender: &str, message: &str) -> String {
    format!("[PM]{sender}: {message}\n")
}

/// Group message as delivered to the other roster members.
pub fn group_message(group: &str, sender: &str, message: &str) -> String {
    format!("[{group}]{sender}: {message}\n")
}

/// Chat text as broadcast to every other session.
pub fn chat(sender: &str, text: &str) -> String {
    format!("{sender}: {text}\n")
}

/// Broadcast when a session leaves.
pub fn departure(name: &str) -> String {
    format!("{name} has left\n")
}
