use chrono::Utc;
use shared::domain::{CourseId, EnrollmentId, StudentId, UserId};

use super::*;

fn student(id: &str, age: u32, average: f64) -> Student {
    Student {
        id: StudentId::new(id),
        dni: format!("{:0>8}", id),
        first_name: "Test".into(),
        last_name: "Student".into(),
        age,
        email: format!("s{id}@example.com"),
        average,
    }
}

fn enrollment(id: &str, student_id: &str, course_id: &str) -> Enrollment {
    Enrollment {
        id: EnrollmentId::new(id),
        student_id: StudentId::new(student_id),
        course_id: CourseId::new(course_id),
        enrollment_date: Utc::now(),
    }
}

#[test]
fn empty_students_yield_zeroed_statistics() {
    let stats = student_statistics(&[]);
    assert_eq!(
        stats,
        StudentStatistics {
            total: 0,
            average_age: 0.0,
            average_grade: 0.0,
            top_student: None,
        }
    );
}

#[test]
fn averages_round_to_two_decimals_and_pick_top_student() {
    let students = vec![
        student("1", 20, 8.5),
        student("2", 22, 9.0),
        student("3", 21, 7.5),
    ];
    let stats = student_statistics(&students);
    assert_eq!(stats.total, 3);
    assert_eq!(stats.average_grade, 8.33);
    assert_eq!(stats.average_age, 21.0);
    assert_eq!(stats.top_student.map(|s| s.id), Some(StudentId::new("2")));
}

#[test]
fn top_student_ties_go_to_first_in_store_order() {
    let students = vec![student("1", 20, 9.5), student("2", 21, 9.5)];
    let stats = student_statistics(&students);
    assert_eq!(stats.top_student.map(|s| s.id), Some(StudentId::new("1")));
}

#[test]
fn enrollment_averages_divide_by_distinct_references() {
    let enrollments = vec![
        enrollment("1", "1", "1"),
        enrollment("2", "2", "2"),
        enrollment("3", "1", "2"),
    ];
    let stats = enrollment_statistics(&enrollments);
    assert_eq!(stats.total, 3);
    assert_eq!(stats.unique_students, 2);
    assert_eq!(stats.unique_courses, 2);
    assert_eq!(stats.avg_enrollments_per_student, 1.5);
    assert_eq!(stats.avg_enrollments_per_course, 1.5);
}

#[test]
fn empty_enrollments_are_all_zero() {
    let stats = enrollment_statistics(&[]);
    assert_eq!(stats.total, 0);
    assert_eq!(stats.unique_students, 0);
    assert_eq!(stats.avg_enrollments_per_student, 0.0);
    assert_eq!(stats.avg_enrollments_per_course, 0.0);
}

#[test]
fn grade_distribution_covers_every_average() {
    let students = vec![
        student("1", 20, 10.0),
        student("2", 20, 8.95),
        student("3", 20, 7.0),
        student("4", 20, 6.5),
        student("5", 20, 0.0),
        student("6", 20, 5.99),
    ];
    let counts: Vec<usize> = grade_distribution(&students)
        .iter()
        .map(|b| b.count)
        .collect();
    assert_eq!(counts, vec![1, 1, 1, 1, 2]);
}

#[test]
fn distribution_percentages_round_to_whole_numbers() {
    let students = vec![student("1", 18, 9.0), student("2", 23, 8.0), student("3", 40, 8.0)];
    let grades = grade_distribution(&students);
    assert_eq!(grades[0].percentage, 33);
    assert_eq!(grades[1].percentage, 67);
    assert_eq!(grades[4].percentage, 0);

    let ages = age_distribution(&students);
    let summary: Vec<(usize, u32)> = ages.iter().map(|b| (b.count, b.percentage)).collect();
    assert_eq!(summary, vec![(1, 33), (1, 33), (0, 0), (1, 33)]);
}

#[test]
fn distributions_on_empty_collection_report_zero_percent() {
    let grades = grade_distribution(&[]);
    assert_eq!(grades.len(), 5);
    assert!(grades.iter().all(|b| b.count == 0 && b.percentage == 0));
    let ages = age_distribution(&[]);
    assert_eq!(ages.len(), 4);
    assert!(ages.iter().all(|b| b.percentage == 0));
}

#[test]
fn ages_below_sixteen_fall_outside_every_band() {
    let ages = age_distribution(&[student("1", 15, 7.0), student("2", 16, 7.0)]);
    assert_eq!(ages[0].count, 1);
    assert_eq!(ages[0].percentage, 50);
    assert_eq!(ages.iter().map(|b| b.count).sum::<usize>(), 1);
}

#[test]
fn course_and_user_statistics() {
    let courses = vec![
        Course {
            id: CourseId::new("1"),
            name: "Maths".into(),
            description: "0123456789".into(),
            credits: 4,
        },
        Course {
            id: CourseId::new("2"),
            name: "Art".into(),
            description: "01234567890".into(),
            credits: 2,
        },
    ];
    let stats = course_statistics(&courses);
    assert_eq!(stats.total, 2);
    assert_eq!(stats.avg_description_length, 10.5);

    let users = vec![
        User {
            id: UserId::new("1"),
            username: "admin".into(),
            password: String::new(),
            role: Role::Admin,
            name: "Admin".into(),
            email: "admin@example.com".into(),
        },
        User {
            id: UserId::new("2"),
            username: "user".into(),
            password: String::new(),
            role: Role::User,
            name: "User".into(),
            email: "user@example.com".into(),
        },
    ];
    assert_eq!(
        user_statistics(&users),
        UserStatistics {
            total: 2,
            admins: 1,
            users: 1
        }
    );
}

#[test]
fn round2_rounds_half_up() {
    assert_eq!(round2(1.5), 1.5);
    assert_eq!(round2(0.125), 0.13);
    assert_eq!(round2(8.333333), 8.33);
}
