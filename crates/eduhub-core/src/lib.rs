//! EduHub core library.
//!
//! Owns the authentication/session lifecycle shared by every EduHub front end:
//!
//! - `auth`: the `SessionManager` state machine (anonymous, demo, authenticated),
//!   the demo countdown, session notifications and keychain access
//! - `backend`: the backend collaborator trait plus HTTP and in-memory adapters
//! - `storage`: durable key-value client storage for the persisted session
//! - `guard`: route guard deciding which views an anonymous user may reach
//! - `models`: user profiles, credentials and their validation rules

pub mod auth;
pub mod backend;
pub mod config;
pub mod guard;
pub mod models;
pub mod storage;
pub mod utils;

pub use auth::{
    Clock, CredentialStore, NoticeLevel, Session, SessionConfig, SessionError, SessionEvent,
    SessionManager, SessionMode, SystemClock,
};
pub use backend::{Backend, BackendError, HttpBackend, MemoryBackend};
pub use config::Config;
pub use guard::{Route, RouteDecision, RouteGuard};
pub use models::{Credentials, UserProfile, UserRole, ValidationErrors};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
