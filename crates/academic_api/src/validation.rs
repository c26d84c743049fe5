//! Static field rules per entity type.
//!
//! Each rule is a plain function from the record to a pass/fail verdict.
//! Every rule of an entity runs, in declaration order, and all violations are
//! reported together.

use shared::{
    domain::{Course, Student, User},
    error::{EntityKind, FieldViolation, ValidationError},
};

pub const MIN_STUDENT_AGE: u32 = 16;
pub const MAX_STUDENT_AGE: u32 = 100;
pub const MAX_AVERAGE: f64 = 10.0;
pub const DNI_LENGTH: usize = 8;

pub type Check<T> = fn(&T) -> Result<(), String>;

pub struct FieldRule<T: 'static> {
    pub field: &'static str,
    pub check: Check<T>,
}

pub const STUDENT_RULES: &[FieldRule<Student>] = &[
    FieldRule {
        field: "dni",
        check: |s| dni_format(&s.dni),
    },
    FieldRule {
        field: "firstName",
        check: |s| person_name(&s.first_name),
    },
    FieldRule {
        field: "lastName",
        check: |s| person_name(&s.last_name),
    },
    FieldRule {
        field: "age",
        check: |s| {
            if (MIN_STUDENT_AGE..=MAX_STUDENT_AGE).contains(&s.age) {
                Ok(())
            } else {
                Err(format!(
                    "must be between {MIN_STUDENT_AGE} and {MAX_STUDENT_AGE}"
                ))
            }
        },
    },
    FieldRule {
        field: "email",
        check: |s| email_shape(&s.email),
    },
    FieldRule {
        field: "average",
        check: |s| {
            if s.average.is_finite() && (0.0..=MAX_AVERAGE).contains(&s.average) {
                Ok(())
            } else {
                Err(format!("must be between 0 and {MAX_AVERAGE}"))
            }
        },
    },
];

pub const COURSE_RULES: &[FieldRule<Course>] = &[
    FieldRule {
        field: "name",
        check: |c| min_chars(&c.name, 2),
    },
    FieldRule {
        field: "description",
        check: |c| min_chars(&c.description, 10),
    },
    FieldRule {
        field: "credits",
        check: |c| {
            if c.credits >= 1 {
                Ok(())
            } else {
                Err("must be a positive number".to_string())
            }
        },
    },
];

pub const USER_RULES: &[FieldRule<User>] = &[
    FieldRule {
        field: "username",
        check: |u| min_chars(&u.username, 3),
    },
    FieldRule {
        field: "password",
        check: |u| min_chars(&u.password, 1),
    },
    FieldRule {
        field: "name",
        check: |u| min_chars(&u.name, 1),
    },
    FieldRule {
        field: "email",
        check: |u| email_shape(&u.email),
    },
];

pub fn validate<T>(
    entity: EntityKind,
    value: &T,
    rules: &[FieldRule<T>],
) -> Result<(), ValidationError> {
    let violations: Vec<FieldViolation> = rules
        .iter()
        .filter_map(|rule| {
            (rule.check)(value)
                .err()
                .map(|message| FieldViolation::new(rule.field, message))
        })
        .collect();
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::InvalidFields { entity, violations })
    }
}

pub fn validate_student(student: &Student) -> Result<(), ValidationError> {
    validate(EntityKind::Student, student, STUDENT_RULES)
}

pub fn validate_course(course: &Course) -> Result<(), ValidationError> {
    validate(EntityKind::Course, course, COURSE_RULES)
}

pub fn validate_user(user: &User) -> Result<(), ValidationError> {
    validate(EntityKind::User, user, USER_RULES)
}

fn dni_format(dni: &str) -> Result<(), String> {
    if dni.len() == DNI_LENGTH && dni.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(format!("must be exactly {DNI_LENGTH} digits"))
    }
}

fn person_name(name: &str) -> Result<(), String> {
    min_chars(name, 2)?;
    if name.chars().all(|c| c.is_alphabetic() || c == ' ') {
        Ok(())
    } else {
        Err("may only contain letters and spaces".to_string())
    }
}

fn min_chars(value: &str, min: usize) -> Result<(), String> {
    if value.trim().chars().count() >= min {
        Ok(())
    } else if min == 1 {
        Err("is required".to_string())
    } else {
        Err(format!("must be at least {min} characters"))
    }
}

fn email_shape(email: &str) -> Result<(), String> {
    let mut parts = email.split('@');
    let valid = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace)
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err("must be a valid email address".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::{CourseId, Role, StudentId, UserId};

    fn student() -> Student {
        Student {
            id: StudentId::new("1"),
            dni: "12345678".into(),
            first_name: "María".into(),
            last_name: "García López".into(),
            age: 22,
            email: "maria@example.com".into(),
            average: 9.2,
        }
    }

    #[test]
    fn accepts_well_formed_student() {
        validate_student(&student()).expect("valid student");
    }

    #[test]
    fn reports_every_violation_in_rule_order() {
        let mut s = student();
        s.dni = "12AB".into();
        s.age = 15;
        s.average = 10.5;
        let err = validate_student(&s).expect_err("invalid");
        let ValidationError::InvalidFields { entity, violations } = err else {
            panic!("expected field violations");
        };
        assert_eq!(entity, EntityKind::Student);
        let fields: Vec<&str> = violations.iter().map(|v| v.field).collect();
        assert_eq!(fields, vec!["dni", "age", "average"]);
    }

    #[test]
    fn rejects_nan_average_and_digits_in_names() {
        let mut s = student();
        s.average = f64::NAN;
        s.first_name = "R2".into();
        let err = validate_student(&s).expect_err("invalid");
        assert!(err.to_string().contains("firstName"));
        assert!(err.to_string().contains("average"));
    }

    #[test]
    fn course_needs_positive_credits_and_description() {
        let course = Course {
            id: CourseId::new("1"),
            name: "AI".into(),
            description: "short".into(),
            credits: 0,
        };
        let err = validate_course(&course).expect_err("invalid");
        let ValidationError::InvalidFields { violations, .. } = err else {
            panic!("expected field violations");
        };
        let fields: Vec<&str> = violations.iter().map(|v| v.field).collect();
        assert_eq!(fields, vec!["description", "credits"]);
    }

    #[test]
    fn user_email_must_have_one_at_sign() {
        let user = User {
            id: UserId::new("1"),
            username: "admin".into(),
            password: "secret".into(),
            role: Role::Admin,
            name: "Admin".into(),
            email: "admin@@example.com".into(),
        };
        let err = validate_user(&user).expect_err("invalid");
        assert!(err.to_string().contains("email"));
    }
}
