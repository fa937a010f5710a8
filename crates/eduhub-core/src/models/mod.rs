//! Data models for EduHub accounts.
//!
//! - `UserProfile`: role-tagged student, teacher or school profile
//! - `Credentials`: identifier and secret presented at login or sign-up
//! - `ValidationErrors`: per-field failures from the sign-up rules

pub mod credentials;
pub mod profile;
pub mod validation;

pub use credentials::Credentials;
pub use profile::{
    parse_grades, SchoolProfile, StudentProfile, TeacherProfile, UnknownRole, UserProfile, UserRole,
};
pub use validation::{FieldError, ValidationErrors};
