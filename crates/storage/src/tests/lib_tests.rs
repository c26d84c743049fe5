use super::*;

fn student(id: &str, dni: &str, first_name: &str, average: f64) -> Student {
    Student {
        id: StudentId::new(id),
        dni: dni.to_string(),
        first_name: first_name.to_string(),
        last_name: "Tester".to_string(),
        age: 21,
        email: format!("{}@example.com", first_name.to_lowercase()),
        average,
    }
}

fn course(id: &str, name: &str) -> Course {
    Course {
        id: CourseId::new(id),
        name: name.to_string(),
        description: "An introductory course".to_string(),
        credits: 3,
    }
}

#[tokio::test]
async fn upsert_inserts_then_replaces_by_natural_key() {
    let store = EntityStore::<Student>::default();
    assert!(store.upsert(student("1", "12345678", "Ana", 7.0)).await.is_none());
    assert!(store.upsert(student("2", "87654321", "Luis", 8.0)).await.is_none());

    let replaced = store
        .upsert(student("1", "12345678", "Ana", 9.5))
        .await
        .expect("previous record");
    assert_eq!(replaced.average, 7.0);

    let records = store.list().await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].dni, "12345678");
    assert_eq!(records[0].average, 9.5);
    assert_eq!(records[1].dni, "87654321");
}

#[tokio::test]
async fn list_preserves_insertion_order() {
    let store = EntityStore::<Course>::default();
    for (id, name) in [("3", "History"), ("1", "Maths"), ("2", "Programming")] {
        store.upsert(course(id, name)).await;
    }
    let ids: Vec<String> = store
        .list()
        .await
        .iter()
        .map(|c| c.id.to_string())
        .collect();
    assert_eq!(ids, vec!["3", "1", "2"]);
}

#[tokio::test]
async fn remove_by_key_returns_removed_record_and_ignores_missing() {
    let store = EntityStore::<Course>::default();
    store.upsert(course("1", "Maths")).await;

    let removed = store.remove_by_key(&CourseId::new("1")).await;
    assert_eq!(removed.map(|c| c.name), Some("Maths".to_string()));
    assert!(store.remove_by_key(&CourseId::new("1")).await.is_none());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn subscribers_receive_every_mutation_in_order() {
    let store = EntityStore::<Course>::default();
    let mut rx = store.subscribe();

    store.upsert(course("1", "Maths")).await;
    store.upsert(course("2", "Programming")).await;
    store.remove_by_key(&CourseId::new("1")).await;

    let first = rx.recv().await.expect("first snapshot");
    let second = rx.recv().await.expect("second snapshot");
    let third = rx.recv().await.expect("third snapshot");
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 2);
    assert_eq!(third.len(), 1);
    assert_eq!(third[0].id, CourseId::new("2"));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn noop_mutations_publish_nothing() {
    let store = EntityStore::<Course>::default();
    store.upsert(course("1", "Maths")).await;
    let mut rx = store.subscribe();

    assert!(store.remove_by_key(&CourseId::new("9")).await.is_none());
    assert!(store.retain(|_| true).await.is_empty());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn retain_publishes_once_for_bulk_removal() {
    let store = EntityStore::<Course>::default();
    store
        .replace_all(vec![course("1", "Maths"), course("2", "Art"), course("3", "Music")])
        .await;
    let mut rx = store.subscribe();

    let removed = store.retain(|c| c.id != CourseId::new("2")).await;
    assert_eq!(removed.len(), 1);
    let snapshot = rx.recv().await.expect("snapshot");
    assert_eq!(snapshot.len(), 2);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn insert_with_leaves_store_untouched_on_error() {
    let store = EntityStore::<Course>::default();
    store.upsert(course("1", "Maths")).await;
    let mut rx = store.subscribe();

    let result: Result<Course, &str> = store.insert_with(|_| Err("rejected")).await;
    assert_eq!(result, Err("rejected"));
    assert_eq!(store.len().await, 1);
    assert!(rx.try_recv().is_err());

    let created = store
        .insert_with(|existing| -> Result<Course, &str> {
            Ok(course(&(existing.len() + 1).to_string(), "Art"))
        })
        .await
        .expect("insert");
    assert_eq!(created.id, CourseId::new("2"));
    assert_eq!(rx.recv().await.expect("snapshot").len(), 2);
}

#[tokio::test]
async fn earlier_snapshots_are_not_affected_by_later_mutations() {
    let store = EntityStore::<Course>::default();
    store.upsert(course("1", "Maths")).await;
    let before = store.list().await;
    store.upsert(course("2", "Art")).await;
    assert_eq!(before.len(), 1);
    assert_eq!(store.list().await.len(), 2);
}

#[tokio::test]
async fn storage_resolves_students_by_id_and_users_by_username() {
    let storage = Storage::new();
    storage.students.upsert(student("7", "11223344", "Pedro", 7.5)).await;
    storage
        .users
        .upsert(User {
            id: UserId::new("1"),
            username: "admin".to_string(),
            password: "admin123".to_string(),
            role: shared::domain::Role::Admin,
            name: "Administrator".to_string(),
            email: "admin@example.com".to_string(),
        })
        .await;

    let found = storage.student_by_id(&StudentId::new("7")).await;
    assert_eq!(found.map(|s| s.dni), Some("11223344".to_string()));
    assert!(storage.student_by_id(&StudentId::new("8")).await.is_none());
    assert!(storage.user_by_username("admin").await.is_some());
    assert!(storage.user_by_username("nobody").await.is_none());
}

#[tokio::test]
async fn memory_kv_round_trips_and_rejects_bad_keys() {
    let kv = MemoryKeyValueStore::new();
    kv.set("auth_data", "{}").await.expect("set");
    assert_eq!(kv.get("auth_data").await.expect("get"), Some("{}".to_string()));
    kv.remove("auth_data").await.expect("remove");
    assert_eq!(kv.get("auth_data").await.expect("get"), None);

    let err = kv.get("../escape").await.expect_err("invalid key");
    assert!(matches!(err, shared::error::PersistenceError::InvalidKey(_)));
}

#[tokio::test]
async fn file_kv_creates_root_and_treats_missing_slot_as_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("nested").join("state");
    let kv = FileKeyValueStore::new(&root);

    assert_eq!(kv.get("auth_data").await.expect("get"), None);
    kv.set("auth_data", r#"{"isAuthenticated":false}"#)
        .await
        .expect("set");
    assert!(root.join("auth_data.json").exists());
    assert_eq!(
        kv.get("auth_data").await.expect("get").as_deref(),
        Some(r#"{"isAuthenticated":false}"#)
    );

    kv.remove("auth_data").await.expect("remove");
    kv.remove("auth_data").await.expect("second remove is a no-op");
    assert!(!root.join("auth_data.json").exists());
}
