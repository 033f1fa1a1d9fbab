use docdex::engine::people::{self, ENTITY};
use docdex::engine::{Document, FieldValue, Repository};
use std::sync::Arc;
use std::thread;

fn person_with_age(id: &str, age: i64) -> Document {
    let mut doc = people::seed_documents().remove(0);
    doc.id = id.to_string();
    doc.set("age", age);
    doc
}

#[test]
fn test_concurrent_upserts_of_one_id_leave_one_index_entry() {
    let repo = Arc::new(Repository::in_memory());
    people::ensure_registered(&repo).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let repo = Arc::clone(&repo);
            thread::spawn(move || {
                for i in 0..25 {
                    let saved = repo.upsert(ENTITY, person_with_age("thor", t * 100 + i)).unwrap();
                    assert!(saved.warning.is_none());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(repo.verify(ENTITY).unwrap(), 1);
    let stored = repo.find_by_id(ENTITY, "thor").unwrap();
    let age = match stored.get("age") {
        Some(FieldValue::Integer(age)) => *age,
        other => panic!("unexpected age {:?}", other),
    };

    let all = repo.query(ENTITY, &people::age_between(0, 1000)).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(repo.query(ENTITY, &people::age_between(age, age)).unwrap().len(), 1);
}

#[test]
fn test_concurrent_writers_and_readers_on_distinct_ids() {
    let repo = Arc::new(Repository::in_memory());
    people::ensure_registered(&repo).unwrap();

    let writers: Vec<_> = (0..6)
        .map(|t| {
            let repo = Arc::clone(&repo);
            thread::spawn(move || {
                for i in 0..20 {
                    let id = format!("w{}-{}", t, i);
                    repo.upsert(ENTITY, person_with_age(&id, i)).unwrap();
                    if i % 4 == 0 {
                        repo.delete_by_id(ENTITY, &id).unwrap();
                    }
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let repo = Arc::clone(&repo);
            thread::spawn(move || {
                for _ in 0..50 {
                    for doc in repo.query(ENTITY, &people::age_between(0, 9)).unwrap() {
                        assert!(doc.get("age").and_then(|v| v.as_i64()).unwrap() <= 9);
                    }
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    // Every fourth write per thread was deleted again
    assert_eq!(repo.verify(ENTITY).unwrap(), 6 * 15);
    assert_eq!(repo.find_all(ENTITY).unwrap().len(), 6 * 15);
    assert_eq!(repo.query(ENTITY, &people::age_between(0, 0)).unwrap().len(), 0);
}
