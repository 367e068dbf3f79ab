//! Per-connection protocol state machine.
//!
//! Sans-IO: the runtime feeds decoded lines in and executes the returned
//! [`SessionAction`]s (replies to this peer, closing the connection). The
//! machine itself only touches shared state: the registry, the group
//! directory, the record store and, through the router, other sessions'
//! outboxes.
//!
//! ```text
//! Connecting → AwaitingAction ─┬─ "R" → Registering ─┐
//!                              └─ "L" → LoggingIn ───┴→ Active → Closed
//! ```
//!
//! Any step may go straight to `Closed`. Dropping a machine releases its
//! registry slot and roster entries, so a panicking or cancelled session task
//! never leaves stale references behind.

use huddle_proto::{
    Action, Command, ProtocolError,
    field::{parse_group_candidates, validate_name, validate_password},
    limits::{GROUP_LIST_LINE_LIMIT, MESSAGE_LINE_LIMIT, TOKEN_LINE_LIMIT},
    reply,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    directory::DirectoryError,
    hub::Hub,
    outbox::Outbox,
    registry::{Admission, SessionHandle},
    router::RouteError,
    store::{RecordStore, StoreError},
};

/// Why a session ended.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent `exit`
    #[error("peer exited")]
    Exit,

    /// The peer closed the connection or the socket failed
    #[error("peer disconnected")]
    Disconnected,

    /// Malformed, oversized or otherwise invalid input
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    /// The first line was not a recognized action code
    #[error("unknown action {0:?}")]
    UnknownAction(String),

    /// No user record matches the credentials
    #[error("authentication failed")]
    AuthFailure,

    /// Registration of a name that is already taken
    #[error("user name already taken")]
    DuplicateUser,

    /// Login of a user that already has a live session
    #[error("user already logged in")]
    AlreadyOnline,

    /// None of the selected groups could be joined
    #[error("no valid groups selected")]
    NoValidGroups,

    /// Every session slot is taken
    #[error("server full")]
    ServerFull,

    /// The record store failed during authentication
    #[error("store failure: {0}")]
    Store(StoreError),
}

/// What the runtime must do after a line was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Send text to this session's peer
    Send(String),
    /// Flush pending output and close the connection
    Close {
        /// Why the session ended
        reason: CloseReason,
    },
}

/// Coarse session state, as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, not yet started
    Connecting,
    /// Waiting for the action code
    AwaitingAction,
    /// Reading registration fields
    Registering,
    /// Reading login fields
    LoggingIn,
    /// Authenticated, reading commands
    Active,
    /// Terminal
    Closed,
}

#[derive(Debug)]
enum Phase {
    Connecting,
    AwaitingAction,
    RegisterName,
    RegisterPassword { name: String },
    RegisterGroups { name: String, password: String },
    LoginName,
    LoginPassword { name: String },
    Active,
    Closed,
}

/// Protocol state machine of one connection.
pub struct SessionMachine<S: RecordStore> {
    hub: Hub<S>,
    uid: u64,
    outbox: Outbox,
    phase: Phase,
    /// Authenticated user name, empty before authentication
    name: String,
    /// Contact names, in insertion order
    contacts: Vec<String>,
    /// Whether the session holds a registry slot
    registered: bool,
}

impl<S: RecordStore> SessionMachine<S> {
    /// Create a machine for a freshly accepted connection.
    ///
    /// `outbox` is the session's own outbound queue; other sessions reach it
    /// through the registry and rosters once the session authenticates.
    pub fn new(hub: Hub<S>, uid: u64, outbox: Outbox) -> Self {
        Self {
            hub,
            uid,
            outbox,
            phase: Phase::Connecting,
            name: String::new(),
            contacts: Vec::new(),
            registered: false,
        }
    }

    /// Begin the exchange: wait for the action code.
    pub fn start(&mut self) {
        if matches!(self.phase, Phase::Connecting) {
            self.phase = Phase::AwaitingAction;
        }
    }

    /// Session id.
    pub fn uid(&self) -> u64 {
        self.uid
    }

    /// Authenticated user name, `None` before authentication.
    pub fn name(&self) -> Option<&str> {
        (!self.name.is_empty()).then_some(self.name.as_str())
    }

    /// In-memory contact list.
    pub fn contacts(&self) -> &[String] {
        &self.contacts
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        match self.phase {
            Phase::Connecting => SessionState::Connecting,
            Phase::AwaitingAction => SessionState::AwaitingAction,
            Phase::RegisterName | Phase::RegisterPassword { .. } | Phase::RegisterGroups { .. } => {
                SessionState::Registering
            },
            Phase::LoginName | Phase::LoginPassword { .. } => SessionState::LoggingIn,
            Phase::Active => SessionState::Active,
            Phase::Closed => SessionState::Closed,
        }
    }

    /// Byte limit for the next line.
    pub fn line_limit(&self) -> usize {
        match self.phase {
            Phase::RegisterGroups { .. } => GROUP_LIST_LINE_LIMIT,
            Phase::Active => MESSAGE_LINE_LIMIT,
            _ => TOKEN_LINE_LIMIT,
        }
    }

    /// Handle one decoded line.
    pub fn handle_line(&mut self, line: &str) -> Vec<SessionAction> {
        match std::mem::replace(&mut self.phase, Phase::Closed) {
            Phase::Connecting | Phase::AwaitingAction => self.on_action(line),
            Phase::RegisterName => self.on_register_name(line),
            Phase::RegisterPassword { name } => self.on_register_password(name, line),
            Phase::RegisterGroups { name, password } => self.on_register_groups(name, password, line),
            Phase::LoginName => self.on_login_name(line),
            Phase::LoginPassword { name } => self.on_login_password(name, line),
            Phase::Active => {
                self.phase = Phase::Active;
                self.on_command(line)
            },
            Phase::Closed => Vec::new(),
        }
    }

    /// The peer sent input that cannot be decoded.
    pub fn handle_protocol_error(&mut self, err: ProtocolError) -> Vec<SessionAction> {
        if matches!(self.phase, Phase::Closed) {
            return Vec::new();
        }
        self.violation(err)
    }

    /// The peer closed the connection or the socket failed.
    pub fn handle_disconnect(&mut self) -> Vec<SessionAction> {
        if matches!(self.phase, Phase::Closed) {
            return Vec::new();
        }
        self.finish(None, CloseReason::Disconnected)
    }

    fn violation(&mut self, err: ProtocolError) -> Vec<SessionAction> {
        warn!(uid = self.uid, name = %self.name, "protocol violation: {err}");
        self.finish(None, CloseReason::Protocol(err))
    }

    fn on_action(&mut self, line: &str) -> Vec<SessionAction> {
        match Action::parse(line) {
            Some(Action::Register) => {
                debug!(uid = self.uid, "registering");
                self.phase = Phase::RegisterName;
                Vec::new()
            },
            Some(Action::Login) => {
                debug!(uid = self.uid, "logging in");
                self.phase = Phase::LoginName;
                Vec::new()
            },
            None => {
                warn!(uid = self.uid, action = line, "unknown action");
                self.finish(None, CloseReason::UnknownAction(line.to_string()))
            },
        }
    }

    fn on_register_name(&mut self, line: &str) -> Vec<SessionAction> {
        let name = match validate_name("name", line.trim()) {
            Ok(name) => name.to_string(),
            Err(e) => return self.violation(e),
        };

        match self.hub.store.find_user(&name) {
            Ok(None) => {
                self.phase = Phase::RegisterPassword { name };
                Vec::new()
            },
            Ok(Some(_)) => {
                info!(uid = self.uid, %name, "registration refused: name taken");
                self.finish(Some(reply::USERNAME_TAKEN), CloseReason::DuplicateUser)
            },
            Err(e) => self.store_failure(e),
        }
    }

    fn on_register_password(&mut self, name: String, line: &str) -> Vec<SessionAction> {
        let password = match validate_password(line.trim()) {
            Ok(password) => password.to_string(),
            Err(e) => return self.violation(e),
        };

        let mut listing = reply::listing(reply::GROUP_LIST_HEADER, &self.hub.directory.list());
        listing.push_str(reply::GROUP_SELECTION_PROMPT);

        self.phase = Phase::RegisterGroups { name, password };
        vec![SessionAction::Send(listing)]
    }

    fn on_register_groups(
        &mut self,
        name: String,
        password: String,
        line: &str,
    ) -> Vec<SessionAction> {
        let mut found: Vec<String> = Vec::new();
        let mut not_joined: Vec<String> = Vec::new();

        for candidate in parse_group_candidates(line) {
            if found.iter().chain(&not_joined).any(|c| c == candidate) {
                continue;
            }
            if self.hub.directory.contains(candidate) {
                found.push(candidate.to_string());
            } else {
                not_joined.push(candidate.to_string());
            }
        }

        if found.is_empty() {
            info!(uid = self.uid, %name, "registration refused: no valid groups");
            return self.finish(Some(reply::NO_VALID_GROUPS), CloseReason::NoValidGroups);
        }

        let handle = SessionHandle::new(self.uid, name.as_str(), self.outbox.clone());
        match self.hub.registry.register(handle.clone()) {
            Admission::Admitted => {},
            Admission::NameInUse => {
                info!(uid = self.uid, %name, "registration refused: name taken");
                return self.finish(Some(reply::USERNAME_TAKEN), CloseReason::DuplicateUser);
            },
            Admission::Full | Admission::UidInUse => {
                warn!(uid = self.uid, %name, "registration refused: server full");
                return self.finish(Some(reply::SERVER_FULL), CloseReason::ServerFull);
            },
        }
        self.registered = true;
        self.name = name;

        let enrollment = match self.hub.directory.enroll(&handle, &password, &found) {
            Ok(enrollment) => enrollment,
            Err(e) if e.is_duplicate() => {
                info!(uid = self.uid, name = %self.name, "registration refused: name taken");
                return self.finish(Some(reply::USERNAME_TAKEN), CloseReason::DuplicateUser);
            },
            Err(e) => return self.store_failure(e),
        };

        if enrollment.joined.is_empty() {
            return self.finish(Some(reply::NO_VALID_GROUPS), CloseReason::NoValidGroups);
        }
        not_joined.extend(enrollment.not_joined);
        let joined = enrollment.joined;

        info!(uid = self.uid, name = %self.name, groups = ?joined, "registered");
        self.phase = Phase::Active;
        vec![SessionAction::Send(reply::register_success(&not_joined))]
    }

    fn on_login_name(&mut self, line: &str) -> Vec<SessionAction> {
        match validate_name("name", line.trim()) {
            Ok(name) => {
                self.phase = Phase::LoginPassword { name: name.to_string() };
                Vec::new()
            },
            Err(e) => self.violation(e),
        }
    }

    fn on_login_password(&mut self, name: String, line: &str) -> Vec<SessionAction> {
        let password = match validate_password(line.trim()) {
            Ok(password) => password,
            Err(e) => return self.violation(e),
        };

        let record = match self.hub.store.find_user_by_credentials(&name, password) {
            Ok(Some(record)) => record,
            Ok(None) => {
                info!(uid = self.uid, %name, "login failed");
                return self.finish(Some(reply::LOGIN_FAILED), CloseReason::AuthFailure);
            },
            Err(e) => return self.store_failure(e),
        };

        let handle = SessionHandle::new(self.uid, name.as_str(), self.outbox.clone());
        match self.hub.registry.register(handle.clone()) {
            Admission::Admitted => {},
            Admission::NameInUse => {
                info!(uid = self.uid, %name, "login refused: already online");
                return self.finish(Some(reply::ALREADY_ONLINE), CloseReason::AlreadyOnline);
            },
            Admission::Full | Admission::UidInUse => {
                warn!(uid = self.uid, %name, "login refused: server full");
                return self.finish(Some(reply::SERVER_FULL), CloseReason::ServerFull);
            },
        }
        self.registered = true;
        self.name = name;
        self.contacts = record.contacts;

        for group in &record.groups {
            if let Err(e) = self.hub.directory.join(&handle, group) {
                warn!(uid = self.uid, name = %self.name, %group, "membership not restored: {e}");
            }
        }

        info!(uid = self.uid, name = %self.name, "logged in");
        self.phase = Phase::Active;
        vec![SessionAction::Send(reply::LOGIN_SUCCESS.to_string())]
    }

    fn on_command(&mut self, line: &str) -> Vec<SessionAction> {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                debug!(uid = self.uid, "rejected command: {e}");
                return vec![SessionAction::Send(reply::usage(e.usage()))];
            },
        };

        debug!(uid = self.uid, name = %self.name, ?command, "command");

        let reply = match command {
            Command::CreateGroup(group) => Some(self.create_group(group)),
            Command::DeleteGroup(group) => Some(self.delete_group(group)),
            Command::EnterGroup(group) => Some(self.enter_group(group)),
            Command::ShowGroups => {
                Some(reply::listing(reply::GROUP_LIST_HEADER, &self.hub.directory.list()))
            },
            Command::AddContact(contact) => Some(self.add_contact(contact)),
            Command::DeleteContact(contact) => Some(self.delete_contact(contact)),
            Command::ContactList => Some(reply::listing(reply::CONTACT_LIST_HEADER, &self.contacts)),
            Command::PersonalMessage { contact, message } => self
                .hub
                .router
                .send_personal(&self.name, &self.contacts, contact, message)
                .err()
                .map(route_reply),
            Command::GroupMessage { group, message } => self
                .hub
                .router
                .send_group(self.uid, &self.name, group, message)
                .err()
                .map(route_reply),
            Command::Chat(text) => {
                self.hub.router.broadcast(self.uid, &reply::chat(&self.name, text));
                None
            },
            Command::Empty => None,
            Command::Exit => return self.finish(None, CloseReason::Exit),
        };

        reply.map(SessionAction::Send).into_iter().collect()
    }

    fn create_group(&self, group: &str) -> String {
        let text = match self.hub.directory.create(group, &self.name) {
            Ok(()) => reply::GROUP_CREATED,
            Err(DirectoryError::DuplicateNameAdmin { .. }) => reply::GROUP_DUPLICATE,
            Err(DirectoryError::CapacityReached { .. }) => reply::GROUP_LIMIT_REACHED,
            Err(e) => {
                error!(uid = self.uid, %group, "group not created: {e}");
                reply::GROUP_CREATE_FAILED
            },
        };
        text.to_string()
    }

    fn delete_group(&self, group: &str) -> String {
        let text = match self.hub.directory.delete(group, &self.name) {
            Ok(_) => reply::GROUP_DELETED,
            Err(DirectoryError::NotFoundOrNotAdmin(_)) => reply::GROUP_NOT_DELETED,
            Err(e) => {
                error!(uid = self.uid, %group, "group not deleted: {e}");
                reply::GROUP_DELETE_FAILED
            },
        };
        text.to_string()
    }

    fn enter_group(&self, group: &str) -> String {
        let text = match self.hub.directory.enter(&self.handle(), group) {
            Ok(()) => reply::GROUP_ENTERED,
            Err(DirectoryError::AlreadyMember(_)) => reply::ALREADY_MEMBER,
            Err(DirectoryError::NotFound(_)) => reply::GROUP_NOT_FOUND,
            Err(DirectoryError::RosterFull { .. }) => reply::GROUP_FULL,
            Err(e) => {
                error!(uid = self.uid, %group, "group not entered: {e}");
                reply::GROUP_ENTER_FAILED
            },
        };
        text.to_string()
    }

    fn add_contact(&mut self, contact: &str) -> String {
        if self.contacts.iter().any(|c| c == contact) {
            return reply::contact_exists(contact);
        }
        if self.contacts.len() >= self.hub.limits.max_contacts {
            return reply::CONTACT_LIST_FULL.to_string();
        }

        let persisted = self.hub.store.update_user(&self.name, &|user| {
            if !user.contacts.iter().any(|c| c == contact) {
                user.contacts.push(contact.to_string());
            }
        });

        match persisted {
            Ok(()) => {
                self.contacts.push(contact.to_string());
                reply::contact_added(contact)
            },
            Err(e) => {
                error!(uid = self.uid, %contact, "contact not added: {e}");
                reply::CONTACT_UPDATE_FAILED.to_string()
            },
        }
    }

    fn delete_contact(&mut self, contact: &str) -> String {
        if !self.contacts.iter().any(|c| c == contact) {
            return reply::CONTACT_MISSING.to_string();
        }

        let persisted =
            self.hub.store.update_user(&self.name, &|user| user.contacts.retain(|c| c != contact));

        match persisted {
            Ok(()) => {
                self.contacts.retain(|c| c != contact);
                reply::CONTACT_DELETED.to_string()
            },
            Err(e) => {
                error!(uid = self.uid, %contact, "contact not deleted: {e}");
                reply::CONTACT_UPDATE_FAILED.to_string()
            },
        }
    }

    fn handle(&self) -> SessionHandle {
        SessionHandle::new(self.uid, self.name.as_str(), self.outbox.clone())
    }

    fn store_failure(&mut self, err: StoreError) -> Vec<SessionAction> {
        error!(uid = self.uid, "record store failure: {err}");
        self.finish(Some(reply::STORE_FAILURE), CloseReason::Store(err))
    }

    /// Close the session: optional last reply, departure notice if it was
    /// active, release of shared state.
    fn finish(&mut self, last: Option<&str>, reason: CloseReason) -> Vec<SessionAction> {
        let mut actions = Vec::with_capacity(2);
        if let Some(text) = last {
            actions.push(SessionAction::Send(text.to_string()));
        }

        if matches!(self.phase, Phase::Active) {
            self.hub.router.broadcast(self.uid, &reply::departure(&self.name));
        }

        self.release();
        self.phase = Phase::Closed;
        info!(uid = self.uid, name = %self.name, "session closed: {reason}");

        actions.push(SessionAction::Close { reason });
        actions
    }

    fn release(&mut self) {
        if std::mem::take(&mut self.registered) {
            self.hub.registry.deregister(self.uid);
            self.hub.directory.release(self.uid);
        }
    }
}

impl<S: RecordStore> Drop for SessionMachine<S> {
    fn drop(&mut self) {
        self.release();
    }
}

fn route_reply(err: RouteError) -> String {
    match err {
        RouteError::NotInContacts(name) => reply::not_in_contacts(&name),
        RouteError::Offline(name) => reply::contact_offline(&name),
        RouteError::GroupNotFound(_) => reply::GROUP_MISSING.to_string(),
        RouteError::NotAMember(_) => reply::NOT_A_MEMBER.to_string(),
        RouteError::DeliveryFailed(name) => reply::delivery_failed(&name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Limits,
        store::{GroupRecord, MemoryStore, UserRecord},
    };

    fn hub() -> Hub<MemoryStore> {
        let store = MemoryStore::with_records(
            vec![UserRecord::new("bob", "secret", vec!["eng".into()])],
            vec![GroupRecord::new("eng", "bob")],
        );
        Hub::restore(store, Limits::default()).unwrap()
    }

    fn machine(hub: &Hub<MemoryStore>) -> SessionMachine<MemoryStore> {
        let (outbox, _rx) = Outbox::channel(8);
        let mut machine = SessionMachine::new(hub.clone(), hub.registry.allocate_uid(), outbox);
        machine.start();
        machine
    }

    fn sent(actions: &[SessionAction]) -> String {
        actions
            .iter()
            .filter_map(|a| match a {
                SessionAction::Send(text) => Some(text.as_str()),
                SessionAction::Close { .. } => None,
            })
            .collect()
    }

    fn closed_with(actions: &[SessionAction]) -> Option<&CloseReason> {
        actions.iter().find_map(|a| match a {
            SessionAction::Close { reason } => Some(reason),
            SessionAction::Send(_) => None,
        })
    }

    #[test]
    fn line_limits_follow_state() {
        let hub = hub();
        let mut session = machine(&hub);
        assert_eq!(session.line_limit(), TOKEN_LINE_LIMIT);

        session.handle_line("R");
        session.handle_line("alice");
        session.handle_line("pw1234");
        assert_eq!(session.state(), SessionState::Registering);
        assert_eq!(session.line_limit(), GROUP_LIST_LINE_LIMIT);

        session.handle_line("eng");
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.line_limit(), MESSAGE_LINE_LIMIT);
    }

    #[test]
    fn unknown_action_closes() {
        let hub = hub();
        let mut session = machine(&hub);

        let actions = session.handle_line("X");

        assert_eq!(closed_with(&actions), Some(&CloseReason::UnknownAction("X".into())));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.handle_line("R").is_empty());
    }

    #[test]
    fn registration_lists_groups_then_prompts() {
        let hub = hub();
        let mut session = machine(&hub);

        session.handle_line("R");
        session.handle_line("alice");
        let actions = session.handle_line("pw1234");

        assert_eq!(
            sent(&actions),
            "Groups List:\n1. eng\nEnter groups to join (comma separated):\n"
        );
    }

    #[test]
    fn invalid_name_is_a_protocol_violation() {
        let hub = hub();
        let mut session = machine(&hub);

        session.handle_line("L");
        let actions = session.handle_line("bo:b");

        assert!(matches!(closed_with(&actions), Some(CloseReason::Protocol(_))));
    }

    #[test]
    fn login_restores_contacts_and_rosters() {
        let hub = hub();
        hub.store.update_user("bob", &|u| u.contacts.push("alice".into())).unwrap();
        let mut session = machine(&hub);

        session.handle_line("L");
        session.handle_line("bob");
        let actions = session.handle_line("secret");

        assert_eq!(sent(&actions), reply::LOGIN_SUCCESS);
        assert_eq!(session.contacts(), vec!["alice".to_string()]);
        assert_eq!(hub.directory.memberships("bob"), vec!["eng"]);
        assert!(hub.registry.find_by_name("bob").is_some());
    }

    #[test]
    fn second_login_of_live_user_is_refused() {
        let hub = hub();
        let mut first = machine(&hub);
        for line in ["L", "bob", "secret"] {
            first.handle_line(line);
        }

        let mut second = machine(&hub);
        second.handle_line("L");
        second.handle_line("bob");
        let actions = second.handle_line("secret");

        assert_eq!(closed_with(&actions), Some(&CloseReason::AlreadyOnline));
        assert_eq!(hub.registry.find_by_name("bob").map(|h| h.uid), Some(first.uid()));
    }

    #[test]
    fn second_login_on_full_server_is_told_user_is_online() {
        let store = MemoryStore::with_records(
            vec![UserRecord::new("bob", "secret", vec![])],
            vec![GroupRecord::new("eng", "bob")],
        );
        let limits = Limits { max_sessions: 1, ..Limits::default() };
        let hub = Hub::restore(store, limits).unwrap();
        let mut first = machine(&hub);
        for line in ["L", "bob", "secret"] {
            first.handle_line(line);
        }

        let mut second = machine(&hub);
        second.handle_line("L");
        second.handle_line("bob");
        let actions = second.handle_line("secret");

        assert_eq!(sent(&actions), reply::ALREADY_ONLINE);
        assert_eq!(closed_with(&actions), Some(&CloseReason::AlreadyOnline));
    }

    #[test]
    fn bad_arguments_get_usage_and_session_continues() {
        let hub = hub();
        let mut session = machine(&hub);
        for line in ["L", "bob", "secret"] {
            session.handle_line(line);
        }

        let actions = session.handle_line("acontact");

        assert_eq!(actions, vec![SessionAction::Send("Usage: acontact <name>\n".into())]);
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn drop_releases_shared_state() {
        let hub = hub();
        {
            let mut session = machine(&hub);
            for line in ["L", "bob", "secret"] {
                session.handle_line(line);
            }
            assert_eq!(hub.registry.session_count(), 1);
        }

        assert_eq!(hub.registry.session_count(), 0);
        assert!(hub.directory.memberships("bob").is_empty());
    }
}
