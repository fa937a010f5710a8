use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::validation::ValidationErrors;

/// Youngest age accepted on a student profile.
const MIN_STUDENT_AGE: u8 = 5;

/// Oldest age accepted on a student profile.
const MAX_STUDENT_AGE: u8 = 25;

/// Minimum length for names, schools and locations.
const MIN_TEXT_LENGTH: usize = 2;

/// Minimum length for a phone number (digits plus separators).
const MIN_PHONE_LENGTH: usize = 10;

/// Account role; selects which profile variant is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum UserRole {
    Student,
    Teacher,
    School,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

/// Parses a role name as typed by a user ("student", " Teacher ", ...).
impl FromStr for UserRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "student" => Ok(UserRole::Student),
            "teacher" => Ok(UserRole::Teacher),
            "school" => Ok(UserRole::School),
            _ => Err(UnknownRole(s.trim().to_string())),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Student => "student",
            UserRole::Teacher => "teacher",
            UserRole::School => "school",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            UserRole::Student => "Student",
            UserRole::Teacher => "Teacher",
            UserRole::School => "School",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct StudentProfile {
    pub name: String,
    pub phone: String,
    pub location: String,
    pub school: String,
    pub age: u8,
    pub grade: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct TeacherProfile {
    pub name: String,
    pub phone: String,
    pub location: String,
    pub teaching_school: String,
    pub teaching_grades: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SchoolProfile {
    pub name: String,
    pub phone: String,
    pub location: String,
    pub ceo_name: String,
}

/// A user's profile. Exactly one variant is active and `role` on the wire
/// selects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum UserProfile {
    Student(StudentProfile),
    Teacher(TeacherProfile),
    School(SchoolProfile),
}

impl UserProfile {
    /// The canned identity used for demo sessions.
    pub fn demo() -> Self {
        UserProfile::Student(StudentProfile {
            name: "Demo User".to_string(),
            phone: "555-123-4567".to_string(),
            location: "Demo City".to_string(),
            school: "Demo School".to_string(),
            age: 16,
            grade: "10th".to_string(),
        })
    }

    pub fn role(&self) -> UserRole {
        match self {
            UserProfile::Student(_) => UserRole::Student,
            UserProfile::Teacher(_) => UserRole::Teacher,
            UserProfile::School(_) => UserRole::School,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            UserProfile::Student(p) => &p.name,
            UserProfile::Teacher(p) => &p.name,
            UserProfile::School(p) => &p.name,
        }
    }

    pub fn phone(&self) -> &str {
        match self {
            UserProfile::Student(p) => &p.phone,
            UserProfile::Teacher(p) => &p.phone,
            UserProfile::School(p) => &p.phone,
        }
    }

    pub fn location(&self) -> &str {
        match self {
            UserProfile::Student(p) => &p.location,
            UserProfile::Teacher(p) => &p.location,
            UserProfile::School(p) => &p.location,
        }
    }

    /// Check every field against the sign-up rules, collecting all failures.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        min_length(
            &mut errors,
            "name",
            self.name(),
            MIN_TEXT_LENGTH,
            "Name must be at least 2 characters.",
        );
        min_length(
            &mut errors,
            "phone",
            self.phone(),
            MIN_PHONE_LENGTH,
            "Please enter a valid phone number.",
        );
        min_length(
            &mut errors,
            "location",
            self.location(),
            MIN_TEXT_LENGTH,
            "Please enter your location.",
        );

        match self {
            UserProfile::Student(p) => {
                min_length(
                    &mut errors,
                    "school",
                    &p.school,
                    MIN_TEXT_LENGTH,
                    "Please enter your school name.",
                );
                if p.age < MIN_STUDENT_AGE {
                    errors.push("age", "Age must be at least 5.");
                } else if p.age > MAX_STUDENT_AGE {
                    errors.push("age", "Age must be at most 25.");
                }
                min_length(&mut errors, "grade", &p.grade, 1, "Please enter your grade.");
            }
            UserProfile::Teacher(p) => {
                min_length(
                    &mut errors,
                    "teachingSchool",
                    &p.teaching_school,
                    MIN_TEXT_LENGTH,
                    "Please enter your teaching school.",
                );
                if p.teaching_grades.iter().all(|g| g.trim().is_empty()) {
                    errors.push("teachingGrades", "Please enter grades you teach.");
                }
            }
            UserProfile::School(p) => {
                min_length(
                    &mut errors,
                    "ceoName",
                    &p.ceo_name,
                    MIN_TEXT_LENGTH,
                    "Please enter the CEO's name.",
                );
            }
        }

        errors.into_result()
    }
}

fn min_length(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: &str,
    min: usize,
    message: &str,
) {
    if value.trim().chars().count() < min {
        errors.push(field, message);
    }
}

/// Split a comma-separated grade list ("9, 10 ,11") into trimmed entries.
pub fn parse_grades(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(String::from)
        .collect()
}
