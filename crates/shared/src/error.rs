use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{CourseId, StudentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Conflict,
    RateLimited,
    Timeout,
    Unavailable,
    Internal,
}

impl ErrorCode {
    /// Maps an HTTP-style status onto the error taxonomy.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => ErrorCode::Validation,
            401 => ErrorCode::Unauthorized,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            408 => ErrorCode::Timeout,
            409 => ErrorCode::Conflict,
            429 => ErrorCode::RateLimited,
            503 => ErrorCode::Unavailable,
            _ => ErrorCode::Internal,
        }
    }

    pub fn status(self) -> u16 {
        match self {
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::Validation => 422,
            ErrorCode::Conflict => 409,
            ErrorCode::RateLimited => 429,
            ErrorCode::Timeout => 408,
            ErrorCode::Unavailable => 503,
            ErrorCode::Internal => 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Student,
    Course,
    Enrollment,
    User,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Student => "student",
            EntityKind::Course => "course",
            EntityKind::Enrollment => "enrollment",
            EntityKind::User => "user",
        })
    }
}

/// A single failed field rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Local, synchronous rejections raised before any remote call is attempted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("student {student_id} is already enrolled in course {course_id}")]
    DuplicateEnrollment {
        student_id: StudentId,
        course_id: CourseId,
    },
    #[error("a {entity} with key {key} already exists")]
    DuplicateKey { entity: EntityKind, key: String },
    #[error("{entity} {key} not found")]
    NotFound { entity: EntityKind, key: String },
    #[error("invalid {entity}: {}", join_violations(.violations))]
    InvalidFields {
        entity: EntityKind,
        violations: Vec<FieldViolation>,
    },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("no {0} ids left to assign")]
    IdsExhausted(EntityKind),
}

impl ValidationError {
    pub fn not_found(entity: EntityKind, key: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn duplicate(entity: EntityKind, key: impl fmt::Display) -> Self {
        Self::DuplicateKey {
            entity,
            key: key.to_string(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ValidationError::DuplicateEnrollment { .. }
            | ValidationError::DuplicateKey { .. }
            | ValidationError::IdsExhausted(_) => ErrorCode::Conflict,
            ValidationError::NotFound { .. } => ErrorCode::NotFound,
            ValidationError::InvalidFields { .. } => ErrorCode::Validation,
            ValidationError::Forbidden(_) => ErrorCode::Forbidden,
        }
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<ValidationError> for ApiError {
    fn from(value: ValidationError) -> Self {
        Self {
            code: value.code(),
            message: value.to_string(),
        }
    }
}

/// Failures reading or writing locally persisted state.
///
/// Callers log these and carry on as if nothing was stored.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage io failed for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("stored value could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),
}

impl From<PersistenceError> for ApiError {
    fn from(value: PersistenceError) -> Self {
        Self::new(ErrorCode::Internal, value.to_string())
    }
}
