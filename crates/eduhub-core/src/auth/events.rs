use std::time::Duration;

use crate::utils::format_countdown;

/// Severity of a session notice, for front ends that style them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Notification emitted after a session transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    DemoStarted { duration: Duration },
    /// A demo saved by a previous run picked up where it left off.
    DemoResumed { remaining: Duration },
    LoggedIn { name: String },
    SignedUp { name: String },
    Restored { name: String },
    ProfileRefreshed { name: String },
    /// User-initiated logout from an authenticated session.
    LoggedOut,
    /// User-initiated exit from demo mode.
    DemoEnded,
    /// The demo budget ran out.
    DemoExpired,
}

impl SessionEvent {
    pub fn level(&self) -> NoticeLevel {
        match self {
            SessionEvent::LoggedIn { .. }
            | SessionEvent::SignedUp { .. }
            | SessionEvent::Restored { .. } => NoticeLevel::Success,
            SessionEvent::DemoExpired => NoticeLevel::Error,
            _ => NoticeLevel::Info,
        }
    }

    pub fn message(&self) -> String {
        match self {
            SessionEvent::DemoStarted { duration } => format!(
                "You are using demo mode. You have {} minutes to explore EduHub.",
                duration.as_secs() / 60
            ),
            SessionEvent::DemoResumed { remaining } => format!(
                "Demo mode resumed. {} left to explore EduHub.",
                format_countdown(*remaining)
            ),
            SessionEvent::LoggedIn { name } => format!("Welcome back, {}!", name),
            SessionEvent::SignedUp { name } => format!("Welcome to EduHub, {}!", name),
            SessionEvent::Restored { name } => format!("Signed in as {}.", name),
            SessionEvent::ProfileRefreshed { name } => format!("Profile updated for {}.", name),
            SessionEvent::LoggedOut => "You have been logged out.".to_string(),
            SessionEvent::DemoEnded => "You have left demo mode.".to_string(),
            SessionEvent::DemoExpired => {
                "Your demo session has expired. Please sign up or log in.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_distinct_from_logout() {
        assert_eq!(SessionEvent::DemoExpired.level(), NoticeLevel::Error);
        assert_eq!(SessionEvent::DemoEnded.level(), NoticeLevel::Info);
        assert_ne!(SessionEvent::DemoExpired.message(), SessionEvent::DemoEnded.message());
        assert_ne!(SessionEvent::DemoExpired.message(), SessionEvent::LoggedOut.message());
    }

    #[test]
    fn test_demo_started_message() {
        let event = SessionEvent::DemoStarted {
            duration: Duration::from_secs(600),
        };
        assert_eq!(
            event.message(),
            "You are using demo mode. You have 10 minutes to explore EduHub."
        );
    }

    #[test]
    fn test_demo_resumed_message() {
        let event = SessionEvent::DemoResumed {
            remaining: Duration::from_secs(245),
        };
        assert_eq!(event.message(), "Demo mode resumed. 4:05 left to explore EduHub.");
        assert_eq!(event.level(), NoticeLevel::Info);
    }

    #[test]
    fn test_welcome_message() {
        let event = SessionEvent::LoggedIn { name: "Ann".to_string() };
        assert_eq!(event.message(), "Welcome back, Ann!");
        assert_eq!(event.level(), NoticeLevel::Success);
    }
}
