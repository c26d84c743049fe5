//! Read-only summaries recomputed from a snapshot on every call.

use std::collections::HashSet;

use shared::{
    domain::{Course, Enrollment, Role, Student, User},
    protocol::{
        CourseStatistics, DistributionBucket, EnrollmentStatistics, StudentStatistics,
        UserStatistics,
    },
};

/// Grade bands, highest first. A student lands in the first band whose lower
/// bound their average reaches.
pub const GRADE_BANDS: [(&str, f64); 5] = [
    ("Excellent (9-10)", 9.0),
    ("Very good (8-8.9)", 8.0),
    ("Good (7-7.9)", 7.0),
    ("Fair (6-6.9)", 6.0),
    ("Insufficient (0-5.9)", 0.0),
];

/// Inclusive age bands. Ages outside every band are not counted.
pub const AGE_BANDS: [(&str, u32, u32); 4] = [
    ("16-20", 16, 20),
    ("21-25", 21, 25),
    ("26-30", 26, 30),
    ("31+", 31, u32::MAX),
];

/// Rounds half-up to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn percentage(count: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (count as f64 * 100.0 / total as f64).round() as u32
}

pub fn student_statistics(students: &[Student]) -> StudentStatistics {
    let Some(first) = students.first() else {
        return StudentStatistics {
            total: 0,
            average_age: 0.0,
            average_grade: 0.0,
            top_student: None,
        };
    };

    let total = students.len();
    let age_sum: f64 = students.iter().map(|s| f64::from(s.age)).sum();
    let grade_sum: f64 = students.iter().map(|s| s.average).sum();
    let top_student = students
        .iter()
        .fold(first, |top, current| if current.average > top.average { current } else { top });

    StudentStatistics {
        total,
        average_age: round2(age_sum / total as f64),
        average_grade: round2(grade_sum / total as f64),
        top_student: Some(top_student.clone()),
    }
}

pub fn enrollment_statistics(enrollments: &[Enrollment]) -> EnrollmentStatistics {
    if enrollments.is_empty() {
        return EnrollmentStatistics {
            total: 0,
            unique_students: 0,
            unique_courses: 0,
            avg_enrollments_per_student: 0.0,
            avg_enrollments_per_course: 0.0,
        };
    }

    let total = enrollments.len();
    let unique_students = enrollments
        .iter()
        .map(|e| &e.student_id)
        .collect::<HashSet<_>>()
        .len();
    let unique_courses = enrollments
        .iter()
        .map(|e| &e.course_id)
        .collect::<HashSet<_>>()
        .len();

    EnrollmentStatistics {
        total,
        unique_students,
        unique_courses,
        avg_enrollments_per_student: round2(total as f64 / unique_students as f64),
        avg_enrollments_per_course: round2(total as f64 / unique_courses as f64),
    }
}

pub fn course_statistics(courses: &[Course]) -> CourseStatistics {
    if courses.is_empty() {
        return CourseStatistics {
            total: 0,
            avg_description_length: 0.0,
        };
    }
    let total = courses.len();
    let length_sum: usize = courses.iter().map(|c| c.description.chars().count()).sum();
    CourseStatistics {
        total,
        avg_description_length: round2(length_sum as f64 / total as f64),
    }
}

pub fn user_statistics(users: &[User]) -> UserStatistics {
    let admins = users.iter().filter(|u| u.role == Role::Admin).count();
    UserStatistics {
        total: users.len(),
        admins,
        users: users.len() - admins,
    }
}

pub fn grade_distribution(students: &[Student]) -> Vec<DistributionBucket> {
    let mut counts = [0usize; GRADE_BANDS.len()];
    for student in students {
        if let Some(index) = GRADE_BANDS
            .iter()
            .position(|(_, lower)| student.average >= *lower)
        {
            counts[index] += 1;
        }
    }
    GRADE_BANDS
        .iter()
        .zip(counts)
        .map(|((label, _), count)| bucket(label, count, students.len()))
        .collect()
}

pub fn age_distribution(students: &[Student]) -> Vec<DistributionBucket> {
    AGE_BANDS
        .iter()
        .map(|(label, min, max)| {
            let count = students
                .iter()
                .filter(|s| (*min..=*max).contains(&s.age))
                .count();
            bucket(label, count, students.len())
        })
        .collect()
}

fn bucket(label: &str, count: usize, total: usize) -> DistributionBucket {
    DistributionBucket {
        label: label.to_string(),
        count,
        percentage: percentage(count, total),
    }
}

#[cfg(test)]
#[path = "tests/statistics_tests.rs"]
mod tests;
