mod common;

use std::io::Write;

use common::{failing_session, memory_session};
use doctx::{BlobStore, DocumentStore, Step, StepState, TaskRecord};
use serde_json::json;

#[test]
fn test_sweep_recovers_an_abandoned_task() {
    // a crashed process left a record with two completed steps, one pending
    // step whose write never landed, and two that never started
    let (session, docs, _) = memory_session();

    docs.insert_one("users", json!({"_id": "a1", "name": "A"})).unwrap();
    docs.insert_one("users", json!({"_id": "u1", "name": "new"})).unwrap();

    let mut steps = vec![
        Step::save(0, "users".to_string(), json!({"_id": "a1", "name": "A"})),
        Step::update(1, "users".to_string(), json!({"_id": "u1"}), json!({"name": "new"})),
        Step::save(2, "users".to_string(), json!({"name": "never landed"})),
        Step::save(3, "users".to_string(), json!({"name": "never started"})),
        Step::save(4, "users".to_string(), json!({"name": "never started"})),
    ];
    steps[0].state = StepState::Done;
    steps[0].data_store = vec![json!({"_id": "a1"})];
    steps[1].state = StepState::Done;
    steps[1].data_store = vec![json!({"_id": "u1", "name": "old"})];
    steps[2].state = StepState::Pending;
    steps[2].data_store = vec![json!({"_id": "a2"})];

    let record = TaskRecord {
        id: "crashed".to_string(),
        steps,
    };
    docs.insert_one(session.task_collection(), record.to_document().unwrap())
        .unwrap();

    let outcome = session.roller().sweep().unwrap();
    assert_eq!(outcome.rolled, 1);
    assert!(outcome.failures.is_empty());

    let users = docs.dump("users");
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["_id"], "u1");
    assert_eq!(users[0]["name"], "old");
    assert_eq!(docs.count(session.task_collection()), 0);
}

#[test]
fn test_rolled_steps_are_not_compensated_twice() {
    let (session, docs, _) = memory_session();
    docs.insert_one("users", json!({"_id": "keep", "name": "A"})).unwrap();

    let mut step = Step::save(0, "users".to_string(), json!({"_id": "keep", "name": "A"}));
    step.state = StepState::Rolled;
    step.data_store = vec![json!({"_id": "keep"})];

    let record = TaskRecord {
        id: "half_rolled".to_string(),
        steps: vec![step],
    };
    docs.insert_one(session.task_collection(), record.to_document().unwrap())
        .unwrap();

    let outcome = session.roller().sweep().unwrap();
    assert_eq!(outcome.rolled, 1);

    // the already-compensated step must not delete the document again
    assert_eq!(docs.count("users"), 1);
    assert_eq!(docs.count(session.task_collection()), 0);
}

#[test]
fn test_sweep_isolates_a_poisoned_record() {
    let (session, docs, _) = memory_session();
    docs.insert_one("users", json!({"_id": "x1"})).unwrap();

    docs.insert_one(
        session.task_collection(),
        json!({"_id": "poisoned", "steps": [{"index": 0, "type": "save", "state": 9}]}),
    )
    .unwrap();

    let mut step = Step::save(0, "users".to_string(), json!({"_id": "x1"}));
    step.state = StepState::Done;
    step.data_store = vec![json!({"_id": "x1"})];
    docs.insert_one(
        session.task_collection(),
        TaskRecord {
            id: "healthy".to_string(),
            steps: vec![step],
        }
        .to_document()
        .unwrap(),
    )
    .unwrap();

    let outcome = session.roller().sweep().unwrap();

    assert_eq!(outcome.rolled, 1);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].0, "poisoned");

    // the healthy record was rolled and reclaimed, the poisoned one remains
    assert_eq!(docs.count("users"), 0);
    let leftover = docs.dump(session.task_collection());
    assert_eq!(leftover.len(), 1);
    assert_eq!(leftover[0]["_id"], "poisoned");
}

#[test]
fn test_remove_rollback_reinserts_deleted_documents() {
    let (session, docs, _) = failing_session("poison");
    docs.inner.insert_one("events", json!({"_id": "e1", "kind": "old"})).unwrap();
    docs.inner.insert_one("events", json!({"_id": "e2", "kind": "old"})).unwrap();

    let mut task = session.task();
    task.remove("events", json!({"kind": "old"}))
        .unwrap()
        .save("poison", json!({}))
        .unwrap();
    task.run().unwrap_err();

    let events = docs.inner.dump("events");
    assert_eq!(events.len(), 2);
    assert!(events.iter().any(|e| e["_id"] == "e1"));
    assert!(events.iter().any(|e| e["_id"] == "e2"));
    assert_eq!(docs.inner.count(session.task_collection()), 0);
}

#[test]
fn test_file_save_rollback_deletes_the_blob() {
    let (session, _, blobs) = failing_session("poison");

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"doomed upload").unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let mut task = session.task();
    task.save_file(&path, Some(json!({"filename": "doomed.txt"})))
        .unwrap()
        .save("poison", json!({}))
        .unwrap();
    task.run().unwrap_err();

    assert!(blobs.is_empty());
}

#[test]
fn test_file_remove_rollback_restores_from_shadow() {
    let (session, docs, blobs) = failing_session("poison");
    let mut src: &[u8] = b"precious bytes";
    blobs
        .write(json!({"_id": "f1", "filename": "precious.bin"}), &mut src)
        .unwrap();

    let mut task = session.task();
    task.remove_file(json!({"_id": "f1"}))
        .unwrap()
        .save("poison", json!({}))
        .unwrap();
    task.run().unwrap_err();

    // the original blob is back under its id, shadow included in cleanup
    assert_eq!(blobs.len(), 1);
    let restored = blobs.find_one(&json!({"_id": "f1"})).unwrap().unwrap();
    assert_eq!(restored["filename"], "precious.bin");

    let mut contents = Vec::new();
    blobs.read(&json!({"_id": "f1"}), &mut contents).unwrap();
    assert_eq!(contents, b"precious bytes");

    assert_eq!(docs.inner.count(session.task_collection()), 0);
}
