//! Crash recovery tests for the durable record stores.
//!
//! These tests verify that records persist across close/reopen cycles,
//! simulating server restarts, and that the group directory restores from
//! what was persisted.

use huddle_server::{
    FileStore, GroupDirectory, GroupRecord, Limits, RecordStore, RedbStore, UserRecord,
};
use tempfile::tempdir;

fn populate(store: &impl RecordStore) {
    store.append_user(&UserRecord::new("alice", "pw1234", vec!["eng".into()])).unwrap();
    store.append_user(&UserRecord::new("bob", "hunter2", vec!["eng".into(), "ops".into()])).unwrap();
    store.append_group(&GroupRecord::new("eng", "alice")).unwrap();
    store.append_group(&GroupRecord::new("ops", "bob")).unwrap();
    store.update_user("alice", &|u| u.contacts.push("bob".into())).unwrap();
}

fn verify(store: &impl RecordStore) {
    let alice = store.find_user_by_credentials("alice", "pw1234").unwrap().unwrap();
    assert_eq!(alice.contacts, vec!["bob"]);
    assert_eq!(alice.groups, vec!["eng"]);

    let bob = store.find_user("bob").unwrap().unwrap();
    assert_eq!(bob.groups, vec!["eng", "ops"]);

    assert_eq!(
        store.load_groups().unwrap(),
        vec![GroupRecord::new("eng", "alice"), GroupRecord::new("ops", "bob")]
    );
}

#[test]
fn test_file_records_survive_restart() {
    let dir = tempdir().unwrap();

    {
        let store = FileStore::open(dir.path()).unwrap();
        populate(&store);
    }

    let store = FileStore::open(dir.path()).unwrap();
    verify(&store);
}

#[test]
fn test_redb_records_survive_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("huddle.redb");

    {
        let store = RedbStore::open(&db_path).unwrap();
        populate(&store);
    }

    let store = RedbStore::open(&db_path).unwrap();
    verify(&store);
}

#[test]
fn test_group_deletion_survives_restart() {
    let dir = tempdir().unwrap();

    {
        let store = FileStore::open(dir.path()).unwrap();
        populate(&store);

        let directory = GroupDirectory::restore(store, Limits::default()).unwrap();
        directory.delete("eng", "alice").unwrap();
    }

    let store = FileStore::open(dir.path()).unwrap();
    let directory = GroupDirectory::restore(store.clone(), Limits::default()).unwrap();

    assert_eq!(directory.list(), vec!["ops"]);
    assert!(store.find_user("alice").unwrap().unwrap().groups.is_empty());
    assert_eq!(store.find_user("bob").unwrap().unwrap().groups, vec!["ops"]);
}

#[test]
fn test_legacy_flat_file_tables_load() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("users.txt"), "alice:pw1234\ncontacts:\ngroups::eng\n").unwrap();
    std::fs::write(dir.path().join("groups.txt"), "eng:alice\n").unwrap();

    let store = FileStore::open(dir.path()).unwrap();

    let alice = store.find_user("alice").unwrap().unwrap();
    assert!(alice.contacts.is_empty());
    assert_eq!(alice.groups, vec!["eng"]);
    assert!(store.find_group("eng", "alice").unwrap());
}
