use std::sync::Arc;

use academic_api::{self as api, ApiContext};
use async_trait::async_trait;
use chrono::Utc;
use shared::{
    error::{EntityKind, ErrorCode, ValidationError},
    protocol::{ApiRequest, ApiResponse, AuthResponse, Resource},
};
use storage::Storage;
use tracing::debug;

use crate::{
    network::{MockNetwork, NetworkError, NetworkSimulationConfig},
    session,
};

/// Where the client sends its remote calls.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn call(&self, request: ApiRequest) -> Result<ApiResponse, NetworkError>;
}

/// A simulated backend: every call pays the mock network's delay and fault
/// injection, then runs against a remote copy of the collections.
pub struct SimulatedApi {
    network: Arc<MockNetwork>,
    remote: ApiContext,
}

impl SimulatedApi {
    pub fn new(network: Arc<MockNetwork>, remote: Storage) -> Self {
        Self {
            network,
            remote: ApiContext::new(remote),
        }
    }

    pub fn with_config(config: NetworkSimulationConfig, remote: Storage) -> Self {
        Self::new(Arc::new(MockNetwork::new(config)), remote)
    }

    pub fn network(&self) -> &Arc<MockNetwork> {
        &self.network
    }

    pub fn remote(&self) -> &Storage {
        &self.remote.storage
    }

    async fn serve(&self, request: ApiRequest) -> Result<ApiResponse, ValidationError> {
        let ctx = &self.remote;
        let response = match request {
            ApiRequest::Login(credentials) => {
                let user = ctx
                    .storage
                    .user_by_username(&credentials.username)
                    .await
                    .filter(|u| u.password == credentials.password)
                    .ok_or_else(|| {
                        ValidationError::not_found(EntityKind::User, &credentials.username)
                    })?
                    .without_password();
                let token = session::issue_token(&user, Utc::now())
                    .map_err(|err| ValidationError::Forbidden(err.to_string()))?;
                ApiResponse::Authenticated(AuthResponse { user, token })
            }
            ApiRequest::Logout => ApiResponse::Empty,
            ApiRequest::ListStudents => ApiResponse::Students(ctx.storage.students.list().await.to_vec()),
            ApiRequest::CreateStudent(student) => {
                ApiResponse::Student(api::insert_student(ctx, student).await?)
            }
            ApiRequest::UpdateStudent(student) => {
                ApiResponse::Student(api::update_student(ctx, student).await?)
            }
            ApiRequest::DeleteStudent { dni } => {
                api::delete_student(ctx, &dni).await?;
                ApiResponse::Empty
            }
            ApiRequest::ListCourses => ApiResponse::Courses(ctx.storage.courses.list().await.to_vec()),
            ApiRequest::CreateCourse(course) => {
                ApiResponse::Course(api::insert_course(ctx, course).await?)
            }
            ApiRequest::UpdateCourse(course) => {
                ApiResponse::Course(api::update_course(ctx, course).await?)
            }
            ApiRequest::DeleteCourse { id } => {
                api::delete_course(ctx, &id).await?;
                ApiResponse::Empty
            }
            ApiRequest::ListEnrollments => {
                ApiResponse::Enrollments(ctx.storage.enrollments.list().await.to_vec())
            }
            ApiRequest::CreateEnrollment(enrollment) => {
                ApiResponse::Enrollment(api::commit_enrollment(ctx, enrollment).await?)
            }
            ApiRequest::DeleteEnrollment { id } => {
                api::unenroll(ctx, &id).await?;
                ApiResponse::Empty
            }
            ApiRequest::ListUsers => ApiResponse::Users(ctx.storage.users.list().await.to_vec()),
            ApiRequest::CreateUser(user) => ApiResponse::User(api::insert_user(ctx, user).await?),
            ApiRequest::UpdateUser(user) => ApiResponse::User(api::update_user(ctx, user).await?),
            ApiRequest::DeleteUser { id, actor } => {
                let actor = ctx.storage.users.find_by_key(&actor).await.ok_or_else(|| {
                    ValidationError::Forbidden(format!("unknown acting user {actor}"))
                })?;
                api::delete_user(ctx, &actor, &id).await?;
                ApiResponse::Empty
            }
        };
        Ok(response)
    }
}

#[async_trait]
impl DataSource for SimulatedApi {
    async fn call(&self, request: ApiRequest) -> Result<ApiResponse, NetworkError> {
        let resource = request.resource();
        debug!(method = ?request.method(), path = %request.path(), "simulated request");
        self.network.round_trip(resource).await?;
        self.serve(request)
            .await
            .map_err(|err| rejected(resource, &err))
    }
}

fn rejected(resource: Resource, err: &ValidationError) -> NetworkError {
    let code = match (resource, err) {
        (Resource::Auth, ValidationError::NotFound { .. }) => ErrorCode::Unauthorized,
        _ => err.code(),
    };
    NetworkError::Transient {
        status: code.status(),
        message: match code {
            ErrorCode::Unauthorized => "Invalid username or password".to_string(),
            _ => err.to_string(),
        },
        resource,
    }
}

/// A backend that is never reachable.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineApi;

#[async_trait]
impl DataSource for OfflineApi {
    async fn call(&self, request: ApiRequest) -> Result<ApiResponse, NetworkError> {
        Err(NetworkError::Transient {
            status: 503,
            message: "Service unavailable".to_string(),
            resource: request.resource(),
        })
    }
}
