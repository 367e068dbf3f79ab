//! Property tests for session-level state.
//!
//! These tests verify that what a session holds in memory and what the record
//! store holds never drift apart:
//! - Contact lists match the persisted record after every command
//! - Persisted group memberships match the live rosters
//! - No roster ever exceeds its capacity

use huddle_server::{
    GroupRecord, Hub, Limits, MemoryStore, Outbox, RecordStore, SessionAction, SessionMachine,
    SessionState, UserRecord,
};
use proptest::prelude::*;

fn connect(hub: &Hub<MemoryStore>, name: &str) -> SessionMachine<MemoryStore> {
    let (outbox, _rx) = Outbox::channel(16);
    let mut session = SessionMachine::new(hub.clone(), hub.registry.allocate_uid(), outbox);
    session.start();
    for line in ["L", name, "pw"] {
        session.handle_line(line);
    }
    assert_eq!(session.state(), SessionState::Active);
    session
}

fn replies(actions: Vec<SessionAction>) -> String {
    actions
        .into_iter()
        .filter_map(|a| match a {
            SessionAction::Send(text) => Some(text),
            SessionAction::Close { .. } => None,
        })
        .collect()
}

#[derive(Debug, Clone)]
enum Op {
    CreateGroup(String),
    DeleteGroup(String),
    EnterGroup(String),
    AddContact(String),
    DeleteContact(String),
}

impl Op {
    fn line(&self) -> String {
        match self {
            Self::CreateGroup(g) => format!("cgroup {g}"),
            Self::DeleteGroup(g) => format!("dgroup {g}"),
            Self::EnterGroup(g) => format!("egroup {g}"),
            Self::AddContact(c) => format!("acontact {c}"),
            Self::DeleteContact(c) => format!("dcontact {c}"),
        }
    }
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let group = prop::sample::select(vec!["eng", "ops", "qa", "lab"]).prop_map(String::from);
    let contact = prop::sample::select(vec!["bob", "carol", "dave", "erin"]).prop_map(String::from);

    prop_oneof![
        group.clone().prop_map(Op::CreateGroup),
        group.clone().prop_map(Op::DeleteGroup),
        group.prop_map(Op::EnterGroup),
        contact.clone().prop_map(Op::AddContact),
        contact.prop_map(Op::DeleteContact),
    ]
}

fn sorted(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names
}

#[test]
fn prop_contact_adds_then_delete_match_store() {
    proptest!(|(
        adds in prop::collection::vec("[a-h]{1,4}", 1..20),
        pick in any::<prop::sample::Index>(),
    )| {
        let store = MemoryStore::with_records(vec![UserRecord::new("alice", "pw", vec![])], vec![]);
        let hub = Hub::restore(store, Limits::default()).unwrap();
        let mut alice = connect(&hub, "alice");

        let mut expected: Vec<String> = Vec::new();
        for name in &adds {
            alice.handle_line(&format!("acontact {name}"));
            if !expected.contains(name) {
                expected.push(name.clone());
            }
        }

        let victim = pick.get(adds.as_slice()).clone();
        alice.handle_line(&format!("dcontact {victim}"));
        expected.retain(|c| c != &victim);

        // ORACLE: insertion order kept, exactly one name removed
        let record = hub.store.find_user("alice").unwrap().unwrap();
        prop_assert_eq!(alice.contacts(), expected.as_slice());
        prop_assert_eq!(record.contacts, expected);
    });
}

#[test]
fn prop_session_and_store_stay_in_step() {
    proptest!(|(ops in prop::collection::vec(op_strategy(), 1..40))| {
        let store = MemoryStore::with_records(
            vec![UserRecord::new("alice", "pw", vec![]), UserRecord::new("root", "pw", vec![])],
            vec![GroupRecord::new("eng", "root"), GroupRecord::new("ops", "root")],
        );
        let hub = Hub::restore(store, Limits::default()).unwrap();
        let mut alice = connect(&hub, "alice");

        for op in &ops {
            let reply = replies(alice.handle_line(&op.line()));
            prop_assert!(!reply.contains("Unknown error"), "{:?} failed: {}", op, reply);
            prop_assert_eq!(alice.state(), SessionState::Active);

            // ORACLE: after every command the durable record mirrors the session
            let record = hub.store.find_user("alice").unwrap().unwrap();
            prop_assert_eq!(alice.contacts(), record.contacts.as_slice());
            prop_assert_eq!(
                sorted(hub.directory.memberships("alice")),
                sorted(record.groups.clone())
            );

            // ORACLE: user records only name groups in the group table
            let table: Vec<String> =
                hub.store.load_groups().unwrap().into_iter().map(|g| g.name).collect();
            for user in hub.store.load_users().unwrap() {
                for group in &user.groups {
                    prop_assert!(table.contains(group), "{} lists deleted {}", user.name, group);
                }
            }

            // ORACLE: the directory and the group table hold the same groups
            prop_assert_eq!(hub.directory.list(), table);
        }
    });
}

#[test]
fn prop_roster_never_exceeds_capacity() {
    proptest!(ProptestConfig::with_cases(32), |(
        users in 1usize..16,
        max_roster in 1usize..12,
    )| {
        let records = (0..users).map(|i| UserRecord::new(format!("u{i}"), "pw", vec![])).collect();
        let store = MemoryStore::with_records(records, vec![GroupRecord::new("eng", "root")]);
        let limits = Limits { max_roster, ..Limits::default() };
        let hub = Hub::restore(store, limits).unwrap();

        let mut sessions = Vec::new();
        for i in 0..users {
            let mut session = connect(&hub, &format!("u{i}"));
            session.handle_line("egroup eng");
            sessions.push(session);
        }

        let roster = hub.directory.roster("eng").unwrap();
        prop_assert_eq!(roster.len(), users.min(max_roster));

        // ORACLE: exactly the rostered users have the membership on record
        let persisted = hub
            .store
            .load_users()
            .unwrap()
            .into_iter()
            .filter(|u| u.groups.iter().any(|g| g == "eng"))
            .count();
        prop_assert_eq!(persisted, roster.len());
    });
}
