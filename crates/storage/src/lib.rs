use std::{fmt, sync::Arc};

use tokio::sync::{broadcast, RwLock};
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    Stream, StreamExt,
};
use tracing::warn;

use shared::{
    domain::{Course, CourseId, Enrollment, EnrollmentId, Student, StudentId, User, UserId},
    error::EntityKind,
};

mod kv;

pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};

pub const DEFAULT_SNAPSHOT_CAPACITY: usize = 64;

/// An immutable view of a collection at one point in time.
pub type Snapshot<T> = Arc<Vec<T>>;

/// A record with a natural key that identifies it within its collection.
pub trait Keyed: Clone + Send + Sync + 'static {
    type Key: PartialEq + Clone + fmt::Debug + fmt::Display + Send + Sync;

    const KIND: EntityKind;

    fn key(&self) -> &Self::Key;
}

impl Keyed for Student {
    type Key = String;
    const KIND: EntityKind = EntityKind::Student;

    fn key(&self) -> &String {
        &self.dni
    }
}

impl Keyed for Course {
    type Key = CourseId;
    const KIND: EntityKind = EntityKind::Course;

    fn key(&self) -> &CourseId {
        &self.id
    }
}

impl Keyed for Enrollment {
    type Key = EnrollmentId;
    const KIND: EntityKind = EntityKind::Enrollment;

    fn key(&self) -> &EnrollmentId {
        &self.id
    }
}

impl Keyed for User {
    type Key = UserId;
    const KIND: EntityKind = EntityKind::User;

    fn key(&self) -> &UserId {
        &self.id
    }
}

/// In-memory authoritative collection for one entity type.
///
/// Records keep insertion order. Every mutation swaps in a new snapshot and
/// publishes it to subscribers while the write lock is still held, so
/// subscribers observe snapshots in exactly the order mutations were applied.
/// Calls that change nothing publish nothing.
pub struct EntityStore<T: Keyed> {
    records: Arc<RwLock<Snapshot<T>>>,
    events: broadcast::Sender<Snapshot<T>>,
}

impl<T: Keyed> Clone for EntityStore<T> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
            events: self.events.clone(),
        }
    }
}

impl<T: Keyed> Default for EntityStore<T> {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_CAPACITY)
    }
}

impl<T: Keyed> EntityStore<T> {
    pub fn new(capacity: usize) -> Self {
        Self::with_records(Vec::new(), capacity)
    }

    pub fn with_records(records: Vec<T>, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            records: Arc::new(RwLock::new(Arc::new(records))),
            events,
        }
    }

    pub async fn list(&self) -> Snapshot<T> {
        Arc::clone(&*self.records.read().await)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn find_by_key(&self, key: &T::Key) -> Option<T> {
        self.records
            .read()
            .await
            .iter()
            .find(|record| record.key() == key)
            .cloned()
    }

    pub async fn contains_key(&self, key: &T::Key) -> bool {
        self.records
            .read()
            .await
            .iter()
            .any(|record| record.key() == key)
    }

    pub async fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.records
            .read()
            .await
            .iter()
            .find(|record| predicate(record))
            .cloned()
    }

    pub async fn filter(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.records
            .read()
            .await
            .iter()
            .filter(|record| predicate(record))
            .cloned()
            .collect()
    }

    /// Inserts the record, or replaces the one with the same key in place.
    ///
    /// Returns the replaced record, if any.
    pub async fn upsert(&self, record: T) -> Option<T> {
        let mut guard = self.records.write().await;
        let mut next = (**guard).clone();
        let previous = match next.iter().position(|existing| existing.key() == record.key()) {
            Some(index) => Some(std::mem::replace(&mut next[index], record)),
            None => {
                next.push(record);
                None
            }
        };
        self.publish(&mut guard, next);
        previous
    }

    /// Removes the record with this key. Absent keys are a no-op.
    pub async fn remove_by_key(&self, key: &T::Key) -> Option<T> {
        let mut guard = self.records.write().await;
        let index = guard.iter().position(|record| record.key() == key)?;
        let mut next = (**guard).clone();
        let removed = next.remove(index);
        self.publish(&mut guard, next);
        Some(removed)
    }

    /// Keeps only the records matching `keep`, returning the ones dropped.
    pub async fn retain(&self, mut keep: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut guard = self.records.write().await;
        let (kept, removed): (Vec<T>, Vec<T>) =
            guard.iter().cloned().partition(|record| keep(record));
        if !removed.is_empty() {
            self.publish(&mut guard, kept);
        }
        removed
    }

    pub async fn replace_all(&self, records: Vec<T>) {
        let mut guard = self.records.write().await;
        self.publish(&mut guard, records);
    }

    /// Builds a record from the current snapshot and appends it, atomically.
    ///
    /// No other mutation can interleave between `build` observing the
    /// snapshot and the insert. Nothing is written when `build` fails.
    pub async fn insert_with<E>(
        &self,
        build: impl FnOnce(&[T]) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut guard = self.records.write().await;
        let record = build(guard.as_slice())?;
        if guard.iter().any(|existing| existing.key() == record.key()) {
            warn!(
                entity = %T::KIND,
                key = %record.key(),
                "insert_with produced an existing key; replacing the stored record"
            );
        }
        let mut next: Vec<T> = guard
            .iter()
            .filter(|existing| existing.key() != record.key())
            .cloned()
            .collect();
        next.push(record.clone());
        self.publish(&mut guard, next);
        Ok(record)
    }

    /// Receives every snapshot published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Snapshot<T>> {
        self.events.subscribe()
    }

    pub fn snapshots(&self) -> impl Stream<Item = Snapshot<T>> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|item| match item {
            Ok(snapshot) => Some(snapshot),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(entity = %T::KIND, skipped, "snapshot subscriber lagged");
                None
            }
        })
    }

    fn publish(&self, current: &mut Snapshot<T>, next: Vec<T>) {
        let snapshot = Arc::new(next);
        *current = Arc::clone(&snapshot);
        // No subscribers is fine.
        let _ = self.events.send(snapshot);
    }
}

/// The full set of collections owned by one client (or one simulated server).
#[derive(Clone, Default)]
pub struct Storage {
    pub students: EntityStore<Student>,
    pub courses: EntityStore<Course>,
    pub enrollments: EntityStore<Enrollment>,
    pub users: EntityStore<User>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            students: EntityStore::new(capacity),
            courses: EntityStore::new(capacity),
            enrollments: EntityStore::new(capacity),
            users: EntityStore::new(capacity),
        }
    }

    pub fn seeded(
        students: Vec<Student>,
        courses: Vec<Course>,
        enrollments: Vec<Enrollment>,
        users: Vec<User>,
    ) -> Self {
        Self {
            students: EntityStore::with_records(students, DEFAULT_SNAPSHOT_CAPACITY),
            courses: EntityStore::with_records(courses, DEFAULT_SNAPSHOT_CAPACITY),
            enrollments: EntityStore::with_records(enrollments, DEFAULT_SNAPSHOT_CAPACITY),
            users: EntityStore::with_records(users, DEFAULT_SNAPSHOT_CAPACITY),
        }
    }

    pub async fn student_by_id(&self, student_id: &StudentId) -> Option<Student> {
        self.students.find(|student| &student.id == student_id).await
    }

    pub async fn user_by_username(&self, username: &str) -> Option<User> {
        self.users.find(|user| user.username == username).await
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
