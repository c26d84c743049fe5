//! Built-in records installed when a collection cannot be loaded and nothing
//! is cached yet. One dataset per entity type.

use chrono::{DateTime, TimeZone, Utc};
use shared::domain::{
    Course, CourseId, Enrollment, EnrollmentId, Role, Student, StudentId, User, UserId,
};

pub fn students() -> Vec<Student> {
    vec![
        student("1", "12345678", "Juan", "Pérez", 20, 8.5),
        student("2", "87654321", "María", "Gómez", 22, 9.0),
        student("3", "11223344", "Pedro", "López", 21, 7.5),
    ]
}

pub fn courses() -> Vec<Course> {
    vec![
        Course {
            id: CourseId::new("1"),
            name: "Advanced Mathematics".to_string(),
            description: "Differential and integral calculus for advanced students.".to_string(),
            credits: 4,
        },
        Course {
            id: CourseId::new("2"),
            name: "JavaScript Programming".to_string(),
            description: "Fundamentals of JavaScript and modern web development.".to_string(),
            credits: 3,
        },
        Course {
            id: CourseId::new("3"),
            name: "World History".to_string(),
            description: "A survey of the major events of world history from antiquity to today."
                .to_string(),
            credits: 2,
        },
    ]
}

pub fn enrollments() -> Vec<Enrollment> {
    vec![
        enrollment("1", "1", "1", utc(2024, 1, 15, 10, 0)),
        enrollment("2", "2", "2", utc(2024, 1, 20, 14, 30)),
        enrollment("3", "1", "3", utc(2024, 2, 1, 9, 15)),
    ]
}

pub fn users() -> Vec<User> {
    vec![
        User {
            id: UserId::new("1"),
            username: "admin".to_string(),
            password: "admin123".to_string(),
            role: Role::Admin,
            name: "Administrator".to_string(),
            email: "admin@example.com".to_string(),
        },
        User {
            id: UserId::new("2"),
            username: "user".to_string(),
            password: "user123".to_string(),
            role: Role::User,
            name: "Regular User".to_string(),
            email: "user@example.com".to_string(),
        },
    ]
}

fn student(id: &str, dni: &str, first: &str, last: &str, age: u32, average: f64) -> Student {
    Student {
        id: StudentId::new(id),
        dni: dni.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        age,
        email: format!("{}@example.com", first.to_lowercase()),
        average,
    }
}

fn enrollment(id: &str, student_id: &str, course_id: &str, at: DateTime<Utc>) -> Enrollment {
    Enrollment {
        id: EnrollmentId::new(id),
        student_id: StudentId::new(student_id),
        course_id: CourseId::new(course_id),
        enrollment_date: at,
    }
}

fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use academic_api::validation::{validate_course, validate_student, validate_user};

    use super::*;

    #[test]
    fn fallback_records_pass_validation() {
        students()
            .iter()
            .for_each(|s| validate_student(s).expect("valid student"));
        courses()
            .iter()
            .for_each(|c| validate_course(c).expect("valid course"));
        users()
            .iter()
            .for_each(|u| validate_user(u).expect("valid user"));
    }

    #[test]
    fn fallback_enrollments_reference_fallback_records() {
        let students = students();
        let courses = courses();
        for e in enrollments() {
            assert!(students.iter().any(|s| s.id == e.student_id));
            assert!(courses.iter().any(|c| c.id == e.course_id));
        }
        assert_eq!(
            enrollments()[0].enrollment_date.to_rfc3339(),
            "2024-01-15T10:00:00+00:00"
        );
    }
}
