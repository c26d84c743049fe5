use std::sync::Arc;

use academic_api::{self as api, ApiContext, Removed};
use shared::{
    domain::{
        Course, CourseId, Enrollment, EnrollmentId, EnrollmentWithDetails, Student, StudentId,
        User, UserId,
    },
    error::{EntityKind, ValidationError},
    protocol::{
        ApiRequest, ApiResponse, CourseStatistics, CreateCourseRequest, CreateStudentRequest,
        CreateUserRequest, DistributionBucket, EnrollmentStatistics, StudentStatistics,
        UserStatistics,
    },
};
use storage::{EntityStore, FileKeyValueStore, KeyValueStore, Keyed, Snapshot, Storage};
use tokio::sync::broadcast;
use tracing::{info, warn};

pub mod config;
pub mod data_source;
pub mod fallback;
pub mod network;
pub mod session;
pub mod state;

use config::Settings;
use data_source::{DataSource, SimulatedApi};
use network::MockNetwork;
use session::{AuthService, SessionStore};

/// Where a loaded collection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrigin {
    Remote,
    /// The remote call failed and the store was empty.
    Fallback,
    /// The remote call failed and the previous snapshot was kept.
    Cached,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Loaded {
        entity: EntityKind,
        origin: LoadOrigin,
        count: usize,
    },
    /// A write whose remote call failed was applied locally anyway.
    CommittedLocally {
        entity: EntityKind,
        key: String,
        reason: String,
    },
    Rejected(ValidationError),
}

/// The client's view of the registry: local authoritative stores kept in
/// step with a remote [`DataSource`].
///
/// Reads never fail. Writes validate locally first; once validation passes,
/// the local change is applied whether or not the remote call succeeds.
pub struct RegistryClient {
    local: ApiContext,
    source: Arc<dyn DataSource>,
    auth: AuthService,
    events: broadcast::Sender<ClientEvent>,
}

impl RegistryClient {
    /// A client talking to a simulated backend seeded with the built-in
    /// dataset, persisting its session under `settings.state_dir`.
    pub fn new(settings: &Settings) -> Arc<Self> {
        let remote = Storage::seeded(
            fallback::students(),
            fallback::courses(),
            fallback::enrollments(),
            fallback::users(),
        );
        let network = Arc::new(MockNetwork::new(settings.network()));
        Self::new_with_dependencies(
            Storage::with_capacity(settings.snapshot_capacity),
            Arc::new(SimulatedApi::new(network, remote)),
            Arc::new(FileKeyValueStore::new(&settings.state_dir)),
        )
    }

    pub fn new_with_dependencies(
        local: Storage,
        source: Arc<dyn DataSource>,
        kv: Arc<dyn KeyValueStore>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            local: ApiContext::new(local),
            auth: AuthService::new(Arc::clone(&source), SessionStore::new(kv)),
            source,
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn storage(&self) -> &Storage {
        &self.local.storage
    }

    pub fn context(&self) -> &ApiContext {
        &self.local
    }

    // ---- reads ----

    pub async fn load_students(&self) -> Snapshot<Student> {
        self.load(
            &self.local.storage.students,
            ApiRequest::ListStudents,
            |response| match response {
                ApiResponse::Students(records) => Some(records),
                _ => None,
            },
            fallback::students,
        )
        .await
    }

    pub async fn load_courses(&self) -> Snapshot<Course> {
        self.load(
            &self.local.storage.courses,
            ApiRequest::ListCourses,
            |response| match response {
                ApiResponse::Courses(records) => Some(records),
                _ => None,
            },
            fallback::courses,
        )
        .await
    }

    pub async fn load_enrollments(&self) -> Snapshot<Enrollment> {
        self.load(
            &self.local.storage.enrollments,
            ApiRequest::ListEnrollments,
            |response| match response {
                ApiResponse::Enrollments(records) => Some(records),
                _ => None,
            },
            fallback::enrollments,
        )
        .await
    }

    pub async fn load_users(&self) -> Snapshot<User> {
        self.load(
            &self.local.storage.users,
            ApiRequest::ListUsers,
            |response| match response {
                ApiResponse::Users(records) => Some(records),
                _ => None,
            },
            fallback::users,
        )
        .await
    }

    /// Loads the four collections concurrently.
    pub async fn load_all(&self) {
        futures::join!(
            self.load_students(),
            self.load_courses(),
            self.load_enrollments(),
            self.load_users(),
        );
    }

    async fn load<T: Keyed>(
        &self,
        store: &EntityStore<T>,
        request: ApiRequest,
        extract: impl FnOnce(ApiResponse) -> Option<Vec<T>>,
        fallback: fn() -> Vec<T>,
    ) -> Snapshot<T> {
        let failure = match self.source.call(request).await {
            Ok(response) => match extract(response) {
                Some(records) => {
                    store.replace_all(records).await;
                    None
                }
                None => Some("unexpected response shape".to_string()),
            },
            Err(err) => Some(err.to_string()),
        };

        let origin = match failure {
            None => LoadOrigin::Remote,
            Some(reason) => {
                if store.is_empty().await {
                    warn!(entity = %T::KIND, %reason, "load failed; installing built-in dataset");
                    store.replace_all(fallback()).await;
                    LoadOrigin::Fallback
                } else {
                    warn!(entity = %T::KIND, %reason, "load failed; keeping last known-good records");
                    LoadOrigin::Cached
                }
            }
        };

        let snapshot = store.list().await;
        let _ = self.events.send(ClientEvent::Loaded {
            entity: T::KIND,
            origin,
            count: snapshot.len(),
        });
        snapshot
    }

    /// Sends a write to the remote side. Failures are logged and reported as
    /// [`ClientEvent::CommittedLocally`]; the caller commits regardless.
    async fn push(&self, entity: EntityKind, key: String, request: ApiRequest) {
        match self.source.call(request).await {
            Ok(_) => info!(%entity, %key, "remote write acknowledged"),
            Err(err) => {
                warn!(%entity, %key, error = %err, "remote write failed; committing locally");
                let _ = self.events.send(ClientEvent::CommittedLocally {
                    entity,
                    key,
                    reason: err.to_string(),
                });
            }
        }
    }

    fn rejected<T>(&self, result: Result<T, ValidationError>) -> Result<T, ValidationError> {
        if let Err(err) = &result {
            let _ = self.events.send(ClientEvent::Rejected(err.clone()));
        }
        result
    }

    // ---- students ----

    pub async fn add_student(
        &self,
        request: CreateStudentRequest,
    ) -> Result<Student, ValidationError> {
        let student = self.rejected(api::prepare_student(&self.local, request).await)?;
        self.push(
            EntityKind::Student,
            student.dni.clone(),
            ApiRequest::CreateStudent(student.clone()),
        )
        .await;
        self.rejected(api::insert_student(&self.local, student).await)
    }

    pub async fn update_student(&self, student: Student) -> Result<Student, ValidationError> {
        self.rejected(api::check_student_update(&self.local, &student).await)?;
        self.push(
            EntityKind::Student,
            student.dni.clone(),
            ApiRequest::UpdateStudent(student.clone()),
        )
        .await;
        self.rejected(api::update_student(&self.local, student).await)
    }

    pub async fn delete_student(&self, dni: &str) -> Result<Removed<Student>, ValidationError> {
        self.rejected(api::require_student(&self.local, dni).await)?;
        self.push(
            EntityKind::Student,
            dni.to_string(),
            ApiRequest::DeleteStudent {
                dni: dni.to_string(),
            },
        )
        .await;
        self.rejected(api::delete_student(&self.local, dni).await)
    }

    // ---- courses ----

    pub async fn add_course(&self, request: CreateCourseRequest) -> Result<Course, ValidationError> {
        let course = self.rejected(api::prepare_course(&self.local, request).await)?;
        self.push(
            EntityKind::Course,
            course.id.to_string(),
            ApiRequest::CreateCourse(course.clone()),
        )
        .await;
        self.rejected(api::insert_course(&self.local, course).await)
    }

    pub async fn update_course(&self, course: Course) -> Result<Course, ValidationError> {
        self.rejected(api::check_course_update(&self.local, &course).await)?;
        self.push(
            EntityKind::Course,
            course.id.to_string(),
            ApiRequest::UpdateCourse(course.clone()),
        )
        .await;
        self.rejected(api::update_course(&self.local, course).await)
    }

    pub async fn delete_course(
        &self,
        course_id: &CourseId,
    ) -> Result<Removed<Course>, ValidationError> {
        self.rejected(api::require_course(&self.local, course_id).await)?;
        self.push(
            EntityKind::Course,
            course_id.to_string(),
            ApiRequest::DeleteCourse {
                id: course_id.clone(),
            },
        )
        .await;
        self.rejected(api::delete_course(&self.local, course_id).await)
    }

    // ---- enrollments ----

    pub async fn enroll(
        &self,
        student_id: &StudentId,
        course_id: &CourseId,
    ) -> Result<Enrollment, ValidationError> {
        let enrollment =
            self.rejected(api::prepare_enrollment(&self.local, student_id, course_id).await)?;
        self.push(
            EntityKind::Enrollment,
            enrollment.id.to_string(),
            ApiRequest::CreateEnrollment(enrollment.clone()),
        )
        .await;
        self.rejected(api::commit_enrollment(&self.local, enrollment).await)
    }

    pub async fn unenroll(&self, enrollment_id: &EnrollmentId) -> Result<Enrollment, ValidationError> {
        self.rejected(api::require_enrollment(&self.local, enrollment_id).await)?;
        self.push(
            EntityKind::Enrollment,
            enrollment_id.to_string(),
            ApiRequest::DeleteEnrollment {
                id: enrollment_id.clone(),
            },
        )
        .await;
        self.rejected(api::unenroll(&self.local, enrollment_id).await)
    }

    // ---- users (administrators only) ----

    async fn admin_actor(&self) -> Result<User, ValidationError> {
        let actor = self
            .auth
            .require_admin()
            .await
            .map_err(|err| ValidationError::Forbidden(err.to_string()));
        self.rejected(actor)
    }

    pub async fn add_user(&self, request: CreateUserRequest) -> Result<User, ValidationError> {
        self.admin_actor().await?;
        let user = self.rejected(api::prepare_user(&self.local, request).await)?;
        self.push(
            EntityKind::User,
            user.id.to_string(),
            ApiRequest::CreateUser(user.clone()),
        )
        .await;
        self.rejected(api::insert_user(&self.local, user).await)
    }

    pub async fn update_user(&self, user: User) -> Result<User, ValidationError> {
        self.admin_actor().await?;
        self.rejected(api::check_user_update(&self.local, &user).await)?;
        self.push(
            EntityKind::User,
            user.id.to_string(),
            ApiRequest::UpdateUser(user.clone()),
        )
        .await;
        self.rejected(api::update_user(&self.local, user).await)
    }

    pub async fn delete_user(&self, user_id: &UserId) -> Result<User, ValidationError> {
        let actor = self.admin_actor().await?;
        self.rejected(api::check_user_delete(&self.local, &actor, user_id).await)?;
        self.push(
            EntityKind::User,
            user_id.to_string(),
            ApiRequest::DeleteUser {
                id: user_id.clone(),
                actor: actor.id.clone(),
            },
        )
        .await;
        self.rejected(api::delete_user(&self.local, &actor, user_id).await)
    }

    // ---- views ----

    pub async fn joined_view(&self) -> Vec<EnrollmentWithDetails> {
        api::joined_view(&self.local).await
    }

    pub async fn courses_for_student(&self, student_id: &StudentId) -> Vec<Course> {
        api::courses_for_student(&self.local, student_id).await
    }

    pub async fn students_for_course(&self, course_id: &CourseId) -> Vec<Student> {
        api::students_for_course(&self.local, course_id).await
    }

    pub async fn student_statistics(&self) -> StudentStatistics {
        api::student_statistics(&self.local).await
    }

    pub async fn enrollment_statistics(&self) -> EnrollmentStatistics {
        api::enrollment_statistics(&self.local).await
    }

    pub async fn course_statistics(&self) -> CourseStatistics {
        api::course_statistics(&self.local).await
    }

    pub async fn user_statistics(&self) -> UserStatistics {
        api::user_statistics(&self.local).await
    }

    pub async fn grade_distribution(&self) -> Vec<DistributionBucket> {
        api::grade_distribution(&self.local).await
    }

    pub async fn age_distribution(&self) -> Vec<DistributionBucket> {
        api::age_distribution(&self.local).await
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
