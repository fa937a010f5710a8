use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SessionError;
use crate::backend::AccountId;
use crate::models::UserProfile;

/// Who, if anyone, is using the application and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMode {
    Anonymous,
    Demo {
        started_at: DateTime<Utc>,
    },
    Authenticated {
        account_id: AccountId,
        /// Last time the backend confirmed this account.
        validated_at: DateTime<Utc>,
    },
}

/// Immutable snapshot of the session.
///
/// Fields are private and the constructors are the only way in, so an
/// identity is present exactly when the mode is not `Anonymous`, and a demo
/// start time exists exactly in `Demo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    mode: SessionMode,
    identity: Option<UserProfile>,
    remember_me: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl Session {
    pub fn anonymous() -> Self {
        Self {
            mode: SessionMode::Anonymous,
            identity: None,
            remember_me: false,
        }
    }

    pub fn demo(started_at: DateTime<Utc>) -> Self {
        Self {
            mode: SessionMode::Demo {
                started_at: millisecond_precision(started_at),
            },
            identity: Some(UserProfile::demo()),
            remember_me: false,
        }
    }

    pub fn authenticated(
        profile: UserProfile,
        account_id: AccountId,
        remember_me: bool,
        validated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            mode: SessionMode::Authenticated {
                account_id,
                validated_at,
            },
            identity: Some(profile),
            remember_me,
        }
    }

    pub fn mode(&self) -> &SessionMode {
        &self.mode
    }

    pub fn identity(&self) -> Option<&UserProfile> {
        self.identity.as_ref()
    }

    pub fn remember_me(&self) -> bool {
        self.remember_me
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self.mode, SessionMode::Anonymous)
    }

    pub fn is_demo(&self) -> bool {
        matches!(self.mode, SessionMode::Demo { .. })
    }

    pub fn demo_started_at(&self) -> Option<DateTime<Utc>> {
        match self.mode {
            SessionMode::Demo { started_at } => Some(started_at),
            _ => None,
        }
    }

    pub fn account_id(&self) -> Option<&AccountId> {
        match &self.mode {
            SessionMode::Authenticated { account_id, .. } => Some(account_id),
            _ => None,
        }
    }

    /// `max(0, budget - elapsed)` in demo mode, `None` otherwise.
    /// A start time in the future (clock skew) counts as zero elapsed.
    pub fn remaining_demo_time(&self, now: DateTime<Utc>, budget: Duration) -> Option<Duration> {
        let started_at = self.demo_started_at()?;
        let elapsed = (now - started_at).to_std().unwrap_or(Duration::ZERO);
        Some(budget.saturating_sub(elapsed))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&PersistedSession::from(self))
    }

    pub fn from_json(raw: &str) -> Result<Self, SessionError> {
        let persisted: PersistedSession = serde_json::from_str(raw)
            .map_err(|e| SessionError::CorruptPersistedState(e.to_string()))?;
        Session::try_from(persisted)
    }
}

fn millisecond_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PersistedMode {
    Anonymous,
    Demo,
    Authenticated,
}

/// Storage wire form, shared with the web client.
/// `demoStartTime` is epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedSession {
    is_authenticated: bool,
    user_data: Option<UserProfile>,
    mode: PersistedMode,
    demo_start_time: Option<i64>,
    remember_me: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    account_id: Option<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    validated_at: Option<DateTime<Utc>>,
}

impl From<&Session> for PersistedSession {
    fn from(session: &Session) -> Self {
        let (mode, demo_start_time, account_id, validated_at) = match &session.mode {
            SessionMode::Anonymous => (PersistedMode::Anonymous, None, None, None),
            SessionMode::Demo { started_at } => {
                (PersistedMode::Demo, Some(started_at.timestamp_millis()), None, None)
            }
            SessionMode::Authenticated {
                account_id,
                validated_at,
            } => (
                PersistedMode::Authenticated,
                None,
                Some(account_id.clone()),
                Some(*validated_at),
            ),
        };

        Self {
            is_authenticated: session.is_authenticated(),
            user_data: session.identity.clone(),
            mode,
            demo_start_time,
            remember_me: session.remember_me,
            account_id,
            validated_at,
        }
    }
}

impl TryFrom<PersistedSession> for Session {
    type Error = SessionError;

    fn try_from(p: PersistedSession) -> Result<Self, Self::Error> {
        let corrupt = |what: &str| SessionError::CorruptPersistedState(what.to_string());

        if p.is_authenticated == (p.mode == PersistedMode::Anonymous) {
            return Err(corrupt("isAuthenticated disagrees with mode"));
        }

        let session = match p.mode {
            PersistedMode::Anonymous => {
                if p.user_data.is_some() || p.demo_start_time.is_some() {
                    return Err(corrupt("anonymous session carries user data"));
                }
                Session {
                    remember_me: p.remember_me,
                    ..Session::anonymous()
                }
            }
            PersistedMode::Demo => {
                let millis = p.demo_start_time.ok_or_else(|| corrupt("demo session without demoStartTime"))?;
                let started_at = DateTime::from_timestamp_millis(millis)
                    .ok_or_else(|| corrupt("demoStartTime out of range"))?;
                Session {
                    mode: SessionMode::Demo { started_at },
                    identity: Some(p.user_data.ok_or_else(|| corrupt("demo session without userData"))?),
                    remember_me: p.remember_me,
                }
            }
            PersistedMode::Authenticated => {
                if p.demo_start_time.is_some() {
                    return Err(corrupt("authenticated session carries demoStartTime"));
                }
                Session::authenticated(
                    p.user_data.ok_or_else(|| corrupt("authenticated session without userData"))?,
                    p.account_id.ok_or_else(|| corrupt("authenticated session without accountId"))?,
                    p.remember_me,
                    p.validated_at.ok_or_else(|| corrupt("authenticated session without validatedAt"))?,
                )
            }
        };

        Ok(session)
    }
}
