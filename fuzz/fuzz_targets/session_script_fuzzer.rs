//! Fuzz target for scripted sessions against shared state
//!
//! Keep live state and durable records in step under arbitrary input
//! (HIGH priority integration test)
//!
//! # Strategy
//!
//! - Several sessions interleaved on one hub and one in-memory store
//! - Well-formed protocol steps mixed with arbitrary lines
//! - Disconnects at any point, including mid-registration
//!
//! # Invariants
//!
//! - An active session's contacts equal its persisted contacts
//! - Every group named in a user record exists in the group table
//! - Rosters NEVER exceed `max_roster`, groups NEVER exceed `max_groups`
//! - A closed session is NEVER reachable through the registry
//! - Registered sessions NEVER exceed `max_sessions`

#![no_main]

use arbitrary::Arbitrary;
use huddle_server::{
    GroupRecord, Hub, Limits, MemoryStore, Outbox, RecordStore, SessionMachine, SessionState,
    UserRecord,
};
use libfuzzer_sys::fuzz_target;

const NAMES: [&str; 4] = ["alice", "bob", "carol", "dave"];
const GROUPS: [&str; 3] = ["eng", "ops", "qa"];

#[derive(Debug, Clone, Arbitrary)]
struct Script {
    max_sessions: u8,
    max_roster: u8,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, Arbitrary)]
struct Step {
    session: u8,
    input: Input,
}

#[derive(Debug, Clone, Arbitrary)]
enum Input {
    Connect,
    Register { name: u8, groups: Vec<u8> },
    Login { name: u8 },
    Command(CommandChoice),
    Raw(String),
    Disconnect,
}

#[derive(Debug, Clone, Arbitrary)]
enum CommandChoice {
    CreateGroup(u8),
    DeleteGroup(u8),
    EnterGroup(u8),
    AddContact(u8),
    DeleteContact(u8),
    Personal(u8),
    Group(u8),
    Chat,
    Exit,
}

fn name(i: u8) -> &'static str {
    NAMES[i as usize % NAMES.len()]
}

fn group(i: u8) -> &'static str {
    GROUPS[i as usize % GROUPS.len()]
}

fn command_line(choice: &CommandChoice) -> String {
    match choice {
        CommandChoice::CreateGroup(g) => format!("cgroup {}", group(*g)),
        CommandChoice::DeleteGroup(g) => format!("dgroup {}", group(*g)),
        CommandChoice::EnterGroup(g) => format!("egroup {}", group(*g)),
        CommandChoice::AddContact(n) => format!("acontact {}", name(*n)),
        CommandChoice::DeleteContact(n) => format!("dcontact {}", name(*n)),
        CommandChoice::Personal(n) => format!("pm {} hi", name(*n)),
        CommandChoice::Group(g) => format!("mgroup {} hi", group(*g)),
        CommandChoice::Chat => "hello".to_string(),
        CommandChoice::Exit => "exit".to_string(),
    }
}

fn check(hub: &Hub<MemoryStore>, sessions: &[Option<SessionMachine<MemoryStore>>]) {
    assert!(hub.registry.session_count() <= hub.limits.max_sessions);
    assert!(hub.directory.len() <= hub.limits.max_groups);

    for group in hub.directory.list() {
        if let Some(roster) = hub.directory.roster(&group) {
            assert!(roster.len() <= hub.limits.max_roster);
        }
    }

    let table: Vec<String> =
        hub.store.load_groups().unwrap_or_default().into_iter().map(|g| g.name).collect();
    for user in hub.store.load_users().unwrap_or_default() {
        for group in &user.groups {
            assert!(table.contains(group), "{} lists deleted group {group}", user.name);
        }
    }

    for session in sessions.iter().flatten() {
        match (session.state(), session.name()) {
            (SessionState::Active, Some(name)) => {
                let record = hub.store.find_user(name).ok().flatten();
                let persisted = record.map(|r| r.contacts).unwrap_or_default();
                assert_eq!(session.contacts(), persisted.as_slice());
                assert_eq!(hub.registry.find_by_name(name).map(|h| h.uid), Some(session.uid()));
            },
            (SessionState::Closed, _) => {
                assert!(!hub.registry.all_uids().contains(&session.uid()));
            },
            _ => {},
        }
    }
}

fuzz_target!(|script: Script| {
    let store = MemoryStore::with_records(
        vec![UserRecord::new("bob", "pw", vec!["eng".into()])],
        vec![GroupRecord::new("eng", "bob")],
    );
    let limits = Limits {
        max_sessions: (script.max_sessions % 4) as usize + 1,
        max_roster: (script.max_roster % 4) as usize + 1,
        max_groups: 4,
        max_contacts: 3,
        outbox_capacity: 4,
    };
    let Ok(hub) = Hub::restore(store, limits) else {
        return;
    };

    let mut sessions: Vec<Option<SessionMachine<MemoryStore>>> = (0..4).map(|_| None).collect();
    // receivers stay alive so deliveries hit full queues, not closed ones
    let mut inboxes = Vec::new();

    for step in script.steps.iter().take(256) {
        let slot = step.session as usize % sessions.len();

        let lines: Vec<String> = match &step.input {
            Input::Connect => {
                let (outbox, rx) = Outbox::channel(limits.outbox_capacity);
                let mut session = SessionMachine::new(hub.clone(), hub.registry.allocate_uid(), outbox);
                session.start();
                sessions[slot] = Some(session);
                inboxes.push(rx);
                Vec::new()
            },
            Input::Register { name: n, groups } => {
                let selection: Vec<&str> = groups.iter().take(4).map(|g| group(*g)).collect();
                vec!["R".into(), name(*n).into(), "pw".into(), selection.join(",")]
            },
            Input::Login { name: n } => vec!["L".into(), name(*n).into(), "pw".into()],
            Input::Command(choice) => vec![command_line(choice)],
            Input::Raw(text) => vec![text.clone()],
            Input::Disconnect => {
                if let Some(session) = sessions[slot].as_mut() {
                    session.handle_disconnect();
                }
                Vec::new()
            },
        };

        if let Some(session) = sessions[slot].as_mut() {
            for line in &lines {
                session.handle_line(line);
            }
        }

        check(&hub, &sessions);
    }
});
