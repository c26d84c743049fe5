use std::sync::Arc;

use chrono::Utc;
use shared::{
    domain::{
        Course, CourseId, Enrollment, EnrollmentId, EnrollmentWithDetails, Student, StudentId,
        User, UserId,
    },
    error::{EntityKind, ValidationError},
    protocol::{
        CourseStatistics, CreateCourseRequest, CreateStudentRequest, CreateUserRequest,
        DistributionBucket, EnrollmentStatistics, StudentStatistics, UserStatistics,
    },
};
use storage::Storage;
use tokio::sync::Mutex;
use tracing::info;

pub mod statistics;
pub mod validation;

use validation::{validate_course, validate_student, validate_user};

/// Handle to one set of collections.
///
/// Enrollment commits and cascading deletes hold `relations` across their
/// reads and writes. Clones share the lock.
#[derive(Clone, Default)]
pub struct ApiContext {
    pub storage: Storage,
    relations: Arc<Mutex<()>>,
}

impl ApiContext {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            relations: Arc::default(),
        }
    }
}

/// What a cascading delete removed.
#[derive(Debug, Clone, PartialEq)]
pub struct Removed<T> {
    pub record: T,
    pub enrollments: Vec<Enrollment>,
}

// ---- students ----

/// Builds and validates a new student without writing it.
pub async fn prepare_student(
    ctx: &ApiContext,
    request: CreateStudentRequest,
) -> Result<Student, ValidationError> {
    let existing = ctx.storage.students.list().await;
    let student = Student {
        id: StudentId::new(next_id(
            EntityKind::Student,
            existing.iter().map(|s| s.id.sequence()),
        )?),
        dni: request.dni,
        first_name: request.first_name,
        last_name: request.last_name,
        age: request.age,
        email: request.email,
        average: request.average.unwrap_or(0.0),
    };
    validate_student(&student)?;
    ensure_dni_is_free(&existing, &student)?;
    Ok(student)
}

/// Validates and inserts a complete student record. The dni must be unused;
/// an id taken since the record was prepared is replaced with the next free
/// one.
pub async fn insert_student(
    ctx: &ApiContext,
    student: Student,
) -> Result<Student, ValidationError> {
    validate_student(&student)?;
    let student = ctx
        .storage
        .students
        .insert_with(|existing| -> Result<Student, ValidationError> {
            ensure_dni_is_free(existing, &student)?;
            let mut student = student;
            if existing.iter().any(|s| s.id == student.id) {
                student.id = StudentId::new(next_id(
                    EntityKind::Student,
                    existing.iter().map(|s| s.id.sequence()),
                )?);
            }
            Ok(student)
        })
        .await?;
    info!(dni = %student.dni, id = %student.id, "student added");
    Ok(student)
}

pub async fn add_student(
    ctx: &ApiContext,
    request: CreateStudentRequest,
) -> Result<Student, ValidationError> {
    let student = prepare_student(ctx, request).await?;
    insert_student(ctx, student).await
}

/// The stored student is found by dni and keeps its id; enrollments refer to
/// students by id.
pub async fn check_student_update(
    ctx: &ApiContext,
    student: &Student,
) -> Result<(), ValidationError> {
    validate_student(student)?;
    let stored = require_student(ctx, &student.dni).await?;
    if stored.id != student.id {
        return Err(ValidationError::Forbidden(format!(
            "student {} keeps id {}; cannot change it to {}",
            student.dni, stored.id, student.id
        )));
    }
    Ok(())
}

/// Replaces the student with the same dni.
pub async fn update_student(
    ctx: &ApiContext,
    student: Student,
) -> Result<Student, ValidationError> {
    check_student_update(ctx, &student).await?;
    ctx.storage.students.upsert(student.clone()).await;
    Ok(student)
}

pub async fn require_student(ctx: &ApiContext, dni: &str) -> Result<Student, ValidationError> {
    ctx.storage
        .students
        .find_by_key(&dni.to_string())
        .await
        .ok_or_else(|| ValidationError::not_found(EntityKind::Student, dni))
}

/// Deletes the student and every enrollment referencing it.
pub async fn delete_student(
    ctx: &ApiContext,
    dni: &str,
) -> Result<Removed<Student>, ValidationError> {
    let _relations = ctx.relations.lock().await;
    let record = ctx
        .storage
        .students
        .remove_by_key(&dni.to_string())
        .await
        .ok_or_else(|| ValidationError::not_found(EntityKind::Student, dni))?;
    let enrollments = ctx
        .storage
        .enrollments
        .retain(|e| e.student_id != record.id)
        .await;
    info!(
        dni,
        cascaded = enrollments.len(),
        "student deleted with dependent enrollments"
    );
    Ok(Removed {
        record,
        enrollments,
    })
}

fn ensure_dni_is_free(existing: &[Student], student: &Student) -> Result<(), ValidationError> {
    if existing.iter().any(|s| s.dni == student.dni) {
        return Err(ValidationError::duplicate(EntityKind::Student, &student.dni));
    }
    Ok(())
}

// ---- courses ----

pub async fn prepare_course(
    ctx: &ApiContext,
    request: CreateCourseRequest,
) -> Result<Course, ValidationError> {
    let existing = ctx.storage.courses.list().await;
    let course = Course {
        id: CourseId::new(next_id(
            EntityKind::Course,
            existing.iter().map(|c| c.id.sequence()),
        )?),
        name: request.name,
        description: request.description,
        credits: request.credits,
    };
    validate_course(&course)?;
    Ok(course)
}

/// Inserts a course, moving it to the next free id if its id was taken in
/// the meantime.
pub async fn insert_course(ctx: &ApiContext, course: Course) -> Result<Course, ValidationError> {
    validate_course(&course)?;
    let course = ctx
        .storage
        .courses
        .insert_with(|existing| -> Result<Course, ValidationError> {
            let mut course = course;
            if existing.iter().any(|c| c.id == course.id) {
                course.id = CourseId::new(next_id(
                    EntityKind::Course,
                    existing.iter().map(|c| c.id.sequence()),
                )?);
            }
            Ok(course)
        })
        .await?;
    info!(id = %course.id, "course added");
    Ok(course)
}

pub async fn add_course(
    ctx: &ApiContext,
    request: CreateCourseRequest,
) -> Result<Course, ValidationError> {
    let course = prepare_course(ctx, request).await?;
    insert_course(ctx, course).await
}

pub async fn check_course_update(ctx: &ApiContext, course: &Course) -> Result<(), ValidationError> {
    validate_course(course)?;
    require_course(ctx, &course.id).await.map(|_| ())
}

pub async fn update_course(ctx: &ApiContext, course: Course) -> Result<Course, ValidationError> {
    check_course_update(ctx, &course).await?;
    ctx.storage.courses.upsert(course.clone()).await;
    Ok(course)
}

pub async fn require_course(
    ctx: &ApiContext,
    course_id: &CourseId,
) -> Result<Course, ValidationError> {
    ctx.storage
        .courses
        .find_by_key(course_id)
        .await
        .ok_or_else(|| ValidationError::not_found(EntityKind::Course, course_id))
}

/// Deletes the course and every enrollment referencing it.
pub async fn delete_course(
    ctx: &ApiContext,
    course_id: &CourseId,
) -> Result<Removed<Course>, ValidationError> {
    let _relations = ctx.relations.lock().await;
    let record = ctx
        .storage
        .courses
        .remove_by_key(course_id)
        .await
        .ok_or_else(|| ValidationError::not_found(EntityKind::Course, course_id))?;
    let enrollments = ctx
        .storage
        .enrollments
        .retain(|e| &e.course_id != course_id)
        .await;
    info!(
        id = %course_id,
        cascaded = enrollments.len(),
        "course deleted with dependent enrollments"
    );
    Ok(Removed {
        record,
        enrollments,
    })
}

// ---- enrollments ----

/// Checks that the pair may be enrolled and builds the record, timestamped
/// now, without writing it.
pub async fn prepare_enrollment(
    ctx: &ApiContext,
    student_id: &StudentId,
    course_id: &CourseId,
) -> Result<Enrollment, ValidationError> {
    let existing = ctx.storage.enrollments.list().await;
    ensure_not_enrolled(&existing, student_id, course_id)?;
    ensure_references_exist(ctx, student_id, course_id).await?;
    Ok(Enrollment {
        id: EnrollmentId::new(next_id(
            EntityKind::Enrollment,
            existing.iter().map(|e| e.id.sequence()),
        )?),
        student_id: student_id.clone(),
        course_id: course_id.clone(),
        enrollment_date: Utc::now(),
    })
}

/// Persists a prepared enrollment. The student and course must still exist
/// and the pair must still be free; a colliding id is reassigned.
pub async fn commit_enrollment(
    ctx: &ApiContext,
    enrollment: Enrollment,
) -> Result<Enrollment, ValidationError> {
    let _relations = ctx.relations.lock().await;
    ensure_references_exist(ctx, &enrollment.student_id, &enrollment.course_id).await?;
    let enrollment = ctx
        .storage
        .enrollments
        .insert_with(|existing| -> Result<Enrollment, ValidationError> {
            ensure_not_enrolled(existing, &enrollment.student_id, &enrollment.course_id)?;
            let mut enrollment = enrollment;
            if existing.iter().any(|e| e.id == enrollment.id) {
                enrollment.id = EnrollmentId::new(next_id(
                    EntityKind::Enrollment,
                    existing.iter().map(|e| e.id.sequence()),
                )?);
            }
            Ok(enrollment)
        })
        .await?;
    info!(
        id = %enrollment.id,
        student_id = %enrollment.student_id,
        course_id = %enrollment.course_id,
        "enrollment created"
    );
    Ok(enrollment)
}

pub async fn enroll(
    ctx: &ApiContext,
    student_id: &StudentId,
    course_id: &CourseId,
) -> Result<Enrollment, ValidationError> {
    let enrollment = prepare_enrollment(ctx, student_id, course_id).await?;
    commit_enrollment(ctx, enrollment).await
}

pub async fn require_enrollment(
    ctx: &ApiContext,
    enrollment_id: &EnrollmentId,
) -> Result<Enrollment, ValidationError> {
    ctx.storage
        .enrollments
        .find_by_key(enrollment_id)
        .await
        .ok_or_else(|| ValidationError::not_found(EntityKind::Enrollment, enrollment_id))
}

pub async fn unenroll(
    ctx: &ApiContext,
    enrollment_id: &EnrollmentId,
) -> Result<Enrollment, ValidationError> {
    ctx.storage
        .enrollments
        .remove_by_key(enrollment_id)
        .await
        .ok_or_else(|| ValidationError::not_found(EntityKind::Enrollment, enrollment_id))
}

pub async fn enrollment_exists(
    ctx: &ApiContext,
    student_id: &StudentId,
    course_id: &CourseId,
) -> bool {
    ctx.storage
        .enrollments
        .find(|e| &e.student_id == student_id && &e.course_id == course_id)
        .await
        .is_some()
}

/// Every enrollment with its student and course resolved. References that no
/// longer resolve come back as `None`.
pub async fn joined_view(ctx: &ApiContext) -> Vec<EnrollmentWithDetails> {
    let enrollments = ctx.storage.enrollments.list().await;
    let students = ctx.storage.students.list().await;
    let courses = ctx.storage.courses.list().await;
    enrollments
        .iter()
        .map(|enrollment| EnrollmentWithDetails {
            enrollment: enrollment.clone(),
            student: students
                .iter()
                .find(|s| s.id == enrollment.student_id)
                .cloned(),
            course: courses.iter().find(|c| c.id == enrollment.course_id).cloned(),
        })
        .collect()
}

pub async fn enrollments_for_student(ctx: &ApiContext, student_id: &StudentId) -> Vec<Enrollment> {
    ctx.storage
        .enrollments
        .filter(|e| &e.student_id == student_id)
        .await
}

pub async fn enrollments_for_course(ctx: &ApiContext, course_id: &CourseId) -> Vec<Enrollment> {
    ctx.storage
        .enrollments
        .filter(|e| &e.course_id == course_id)
        .await
}

/// Courses the student is enrolled in, in enrollment order.
pub async fn courses_for_student(ctx: &ApiContext, student_id: &StudentId) -> Vec<Course> {
    let courses = ctx.storage.courses.list().await;
    enrollments_for_student(ctx, student_id)
        .await
        .iter()
        .filter_map(|e| courses.iter().find(|c| c.id == e.course_id).cloned())
        .collect()
}

/// Students enrolled in the course, in enrollment order.
pub async fn students_for_course(ctx: &ApiContext, course_id: &CourseId) -> Vec<Student> {
    let students = ctx.storage.students.list().await;
    enrollments_for_course(ctx, course_id)
        .await
        .iter()
        .filter_map(|e| students.iter().find(|s| s.id == e.student_id).cloned())
        .collect()
}

async fn ensure_references_exist(
    ctx: &ApiContext,
    student_id: &StudentId,
    course_id: &CourseId,
) -> Result<(), ValidationError> {
    if ctx.storage.student_by_id(student_id).await.is_none() {
        return Err(ValidationError::not_found(EntityKind::Student, student_id));
    }
    if !ctx.storage.courses.contains_key(course_id).await {
        return Err(ValidationError::not_found(EntityKind::Course, course_id));
    }
    Ok(())
}

fn ensure_not_enrolled(
    existing: &[Enrollment],
    student_id: &StudentId,
    course_id: &CourseId,
) -> Result<(), ValidationError> {
    if existing
        .iter()
        .any(|e| &e.student_id == student_id && &e.course_id == course_id)
    {
        return Err(ValidationError::DuplicateEnrollment {
            student_id: student_id.clone(),
            course_id: course_id.clone(),
        });
    }
    Ok(())
}

// ---- users ----

pub async fn prepare_user(
    ctx: &ApiContext,
    request: CreateUserRequest,
) -> Result<User, ValidationError> {
    let existing = ctx.storage.users.list().await;
    let user = User {
        id: UserId::new(next_id(
            EntityKind::User,
            existing.iter().map(|u| u.id.sequence()),
        )?),
        username: request.username,
        password: request.password,
        role: request.role,
        name: request.name,
        email: request.email,
    };
    validate_user(&user)?;
    ensure_username_free(&existing, &user)?;
    Ok(user)
}

pub async fn insert_user(ctx: &ApiContext, user: User) -> Result<User, ValidationError> {
    validate_user(&user)?;
    let user = ctx
        .storage
        .users
        .insert_with(|existing| -> Result<User, ValidationError> {
            let mut user = user;
            if existing.iter().any(|u| u.id == user.id) {
                user.id = UserId::new(next_id(
                    EntityKind::User,
                    existing.iter().map(|u| u.id.sequence()),
                )?);
            }
            ensure_username_free(existing, &user)?;
            Ok(user)
        })
        .await?;
    info!(id = %user.id, username = %user.username, "user added");
    Ok(user)
}

pub async fn add_user(
    ctx: &ApiContext,
    request: CreateUserRequest,
) -> Result<User, ValidationError> {
    let user = prepare_user(ctx, request).await?;
    insert_user(ctx, user).await
}

pub async fn check_user_update(ctx: &ApiContext, user: &User) -> Result<(), ValidationError> {
    validate_user(user)?;
    let existing = ctx.storage.users.list().await;
    if !existing.iter().any(|u| u.id == user.id) {
        return Err(ValidationError::not_found(EntityKind::User, &user.id));
    }
    ensure_username_free(&existing, user)
}

pub async fn update_user(ctx: &ApiContext, user: User) -> Result<User, ValidationError> {
    check_user_update(ctx, &user).await?;
    ctx.storage.users.upsert(user.clone()).await;
    Ok(user)
}

/// Only admins may delete users, and never their own account.
pub async fn check_user_delete(
    ctx: &ApiContext,
    actor: &User,
    user_id: &UserId,
) -> Result<User, ValidationError> {
    if !actor.is_admin() {
        return Err(ValidationError::Forbidden(
            "user management is restricted to administrators".to_string(),
        ));
    }
    if &actor.id == user_id {
        return Err(ValidationError::Forbidden(
            "you cannot delete your own account".to_string(),
        ));
    }
    ctx.storage
        .users
        .find_by_key(user_id)
        .await
        .ok_or_else(|| ValidationError::not_found(EntityKind::User, user_id))
}

pub async fn delete_user(
    ctx: &ApiContext,
    actor: &User,
    user_id: &UserId,
) -> Result<User, ValidationError> {
    check_user_delete(ctx, actor, user_id).await?;
    ctx.storage
        .users
        .remove_by_key(user_id)
        .await
        .ok_or_else(|| ValidationError::not_found(EntityKind::User, user_id))
}

fn ensure_username_free(existing: &[User], user: &User) -> Result<(), ValidationError> {
    if existing
        .iter()
        .any(|u| u.username == user.username && u.id != user.id)
    {
        return Err(ValidationError::duplicate(EntityKind::User, &user.username));
    }
    Ok(())
}

// ---- statistics over the current snapshot ----

pub async fn student_statistics(ctx: &ApiContext) -> StudentStatistics {
    statistics::student_statistics(&ctx.storage.students.list().await)
}

pub async fn enrollment_statistics(ctx: &ApiContext) -> EnrollmentStatistics {
    statistics::enrollment_statistics(&ctx.storage.enrollments.list().await)
}

pub async fn course_statistics(ctx: &ApiContext) -> CourseStatistics {
    statistics::course_statistics(&ctx.storage.courses.list().await)
}

pub async fn user_statistics(ctx: &ApiContext) -> UserStatistics {
    statistics::user_statistics(&ctx.storage.users.list().await)
}

pub async fn grade_distribution(ctx: &ApiContext) -> Vec<DistributionBucket> {
    statistics::grade_distribution(&ctx.storage.students.list().await)
}

pub async fn age_distribution(ctx: &ApiContext) -> Vec<DistributionBucket> {
    statistics::age_distribution(&ctx.storage.students.list().await)
}

/// Next id in a sequence of numeric ids; non-numeric ids count as zero.
/// `None` once the highest id is `u64::MAX`.
pub fn next_sequential_id(ids: impl Iterator<Item = Option<u64>>) -> Option<String> {
    ids.map(|id| id.unwrap_or(0))
        .max()
        .unwrap_or(0)
        .checked_add(1)
        .map(|next| next.to_string())
}

fn next_id(
    entity: EntityKind,
    ids: impl Iterator<Item = Option<u64>>,
) -> Result<String, ValidationError> {
    next_sequential_id(ids).ok_or(ValidationError::IdsExhausted(entity))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
