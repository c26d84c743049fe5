use serde::{Deserialize, Serialize};

use crate::domain::{
    Course, CourseId, Enrollment, EnrollmentId, Role, Student, User, UserId,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudentRequest {
    pub dni: String,
    pub first_name: String,
    pub last_name: String,
    pub age: u32,
    pub email: String,
    #[serde(default)]
    pub average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourseRequest {
    pub name: String,
    pub description: String,
    pub credits: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

/// The persisted authentication slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub token: Option<String>,
}

impl AuthState {
    pub fn signed_in(user: User, token: String) -> Self {
        Self {
            user: Some(user),
            is_authenticated: true,
            token: Some(token),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

/// Logical resources exposed by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Auth,
    Students,
    Courses,
    Enrollments,
    Users,
}

impl Resource {
    pub fn path(self) -> &'static str {
        match self {
            Resource::Auth => "/auth",
            Resource::Students => "/students",
            Resource::Courses => "/courses",
            Resource::Enrollments => "/enrollments",
            Resource::Users => "/users",
        }
    }
}

/// Every call the client makes against the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ApiRequest {
    Login(LoginRequest),
    Logout,
    ListStudents,
    CreateStudent(Student),
    UpdateStudent(Student),
    DeleteStudent { dni: String },
    ListCourses,
    CreateCourse(Course),
    UpdateCourse(Course),
    DeleteCourse { id: CourseId },
    ListEnrollments,
    CreateEnrollment(Enrollment),
    DeleteEnrollment { id: EnrollmentId },
    ListUsers,
    CreateUser(User),
    UpdateUser(User),
    /// `actor` is the signed-in administrator asking for the delete.
    DeleteUser { id: UserId, actor: UserId },
}

impl ApiRequest {
    pub fn method(&self) -> HttpMethod {
        match self {
            ApiRequest::ListStudents
            | ApiRequest::ListCourses
            | ApiRequest::ListEnrollments
            | ApiRequest::ListUsers => HttpMethod::Get,
            ApiRequest::Login(_)
            | ApiRequest::Logout
            | ApiRequest::CreateStudent(_)
            | ApiRequest::CreateCourse(_)
            | ApiRequest::CreateEnrollment(_)
            | ApiRequest::CreateUser(_) => HttpMethod::Post,
            ApiRequest::UpdateStudent(_) | ApiRequest::UpdateCourse(_) | ApiRequest::UpdateUser(_) => {
                HttpMethod::Put
            }
            ApiRequest::DeleteStudent { .. }
            | ApiRequest::DeleteCourse { .. }
            | ApiRequest::DeleteEnrollment { .. }
            | ApiRequest::DeleteUser { .. } => HttpMethod::Delete,
        }
    }

    pub fn resource(&self) -> Resource {
        match self {
            ApiRequest::Login(_) | ApiRequest::Logout => Resource::Auth,
            ApiRequest::ListStudents
            | ApiRequest::CreateStudent(_)
            | ApiRequest::UpdateStudent(_)
            | ApiRequest::DeleteStudent { .. } => Resource::Students,
            ApiRequest::ListCourses
            | ApiRequest::CreateCourse(_)
            | ApiRequest::UpdateCourse(_)
            | ApiRequest::DeleteCourse { .. } => Resource::Courses,
            ApiRequest::ListEnrollments
            | ApiRequest::CreateEnrollment(_)
            | ApiRequest::DeleteEnrollment { .. } => Resource::Enrollments,
            ApiRequest::ListUsers
            | ApiRequest::CreateUser(_)
            | ApiRequest::UpdateUser(_)
            | ApiRequest::DeleteUser { .. } => Resource::Users,
        }
    }

    /// Request path relative to the service root, e.g. `/students/12345678`.
    pub fn path(&self) -> String {
        let base = self.resource().path();
        match self {
            ApiRequest::Login(_) => format!("{base}/login"),
            ApiRequest::Logout => format!("{base}/logout"),
            ApiRequest::UpdateStudent(student) => format!("{base}/{}", student.dni),
            ApiRequest::DeleteStudent { dni } => format!("{base}/{dni}"),
            ApiRequest::UpdateCourse(course) => format!("{base}/{}", course.id),
            ApiRequest::DeleteCourse { id } => format!("{base}/{id}"),
            ApiRequest::DeleteEnrollment { id } => format!("{base}/{id}"),
            ApiRequest::UpdateUser(user) => format!("{base}/{}", user.id),
            ApiRequest::DeleteUser { id, .. } => format!("{base}/{id}"),
            _ => base.to_string(),
        }
    }

    pub fn is_read(&self) -> bool {
        self.method() == HttpMethod::Get
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ApiResponse {
    Authenticated(AuthResponse),
    Students(Vec<Student>),
    Student(Student),
    Courses(Vec<Course>),
    Course(Course),
    Enrollments(Vec<Enrollment>),
    Enrollment(Enrollment),
    Users(Vec<User>),
    User(User),
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStatistics {
    pub total: usize,
    pub average_age: f64,
    pub average_grade: f64,
    pub top_student: Option<Student>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentStatistics {
    pub total: usize,
    pub unique_students: usize,
    pub unique_courses: usize,
    pub avg_enrollments_per_student: f64,
    pub avg_enrollments_per_course: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseStatistics {
    pub total: usize,
    pub avg_description_length: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatistics {
    pub total: usize,
    pub admins: usize,
    pub users: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionBucket {
    pub label: String,
    pub count: usize,
    pub percentage: u32,
}
