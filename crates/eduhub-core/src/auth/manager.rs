//! Session state machine.
//!
//! `SessionManager` owns the one active `Session` for the process. Readers get
//! cloned snapshots; every transition goes through the manager, which keeps
//! the demo countdown, client storage and notifications in step with it.
//!
//! ```text
//! Anonymous --start_demo--> Demo --expiry / logout--> Anonymous
//! Anonymous --login / signup--> Authenticated --logout--> Anonymous
//! Demo --login / signup--> Authenticated
//! ```

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::{Clock, Session, SessionError, SessionEvent, SessionMode, SystemClock};
use crate::backend::{AccountId, Backend};
use crate::config::SessionConfig;
use crate::models::{Credentials, UserProfile, UserRole, ValidationErrors};
use crate::storage::KeyValueStore;

/// Buffer size for the session event channel.
/// Front ends drain it continuously; 32 covers bursts like restore + expiry.
const EVENT_CHANNEL_CAPACITY: usize = 32;

struct State {
    session: Session,
    /// Bumped by explicit user transitions (logout, start_demo). Backend
    /// completions started under an older epoch are discarded.
    epoch: u64,
    in_flight: bool,
    countdown: Option<JoinHandle<()>>,
}

struct Shared {
    backend: Arc<dyn Backend>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    state: Mutex<State>,
    events: broadcast::Sender<SessionEvent>,
}

/// Marks a login/signup as in flight for its lifetime.
struct Operation<'a> {
    shared: &'a Shared,
    epoch: u64,
}

impl Drop for Operation<'_> {
    fn drop(&mut self) {
        self.shared.state().in_flight = false;
    }
}

/// Owns the session. Cloning is cheap and yields a handle to the same session.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn Backend>,
        store: Arc<dyn KeyValueStore>,
        config: SessionConfig,
    ) -> Self {
        Self::with_clock(backend, store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        backend: Arc<dyn Backend>,
        store: Arc<dyn KeyValueStore>,
        config: SessionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                backend,
                store,
                clock,
                config,
                state: Mutex::new(State {
                    session: Session::anonymous(),
                    epoch: 0,
                    in_flight: false,
                    countdown: None,
                }),
                events,
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Receive a notice after every transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn snapshot(&self) -> Session {
        let mut state = self.shared.state();
        self.shared.settle(&mut state);
        state.session.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot().is_authenticated()
    }

    /// Whether a login, sign-up or profile repair is waiting on the backend.
    pub fn is_transitioning(&self) -> bool {
        self.shared.state().in_flight
    }

    /// Time left in the demo, `None` outside demo mode. Display only; the
    /// countdown task drives the expiry itself.
    pub fn remaining_demo_time(&self) -> Option<Duration> {
        let mut state = self.shared.state();
        self.shared.settle(&mut state);
        state
            .session
            .remaining_demo_time(self.shared.clock.now(), self.shared.config.demo_duration)
    }

    // =========================================================================
    // Restore
    // =========================================================================

    /// Rebuild the session saved by a previous process, if any.
    ///
    /// Never fails: a missing, corrupt, expired or no longer valid entry
    /// leaves the session anonymous and the bad entry is deleted.
    pub async fn restore(&self) -> Session {
        if self.shared.state().session.is_authenticated() {
            debug!("Session already active, not restoring");
            return self.snapshot();
        }

        let key = &self.shared.config.storage_key;
        let raw = match self.shared.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("No persisted session");
                return self.snapshot();
            }
            Err(e) => {
                warn!(error = %e, "Failed to read persisted session");
                return self.snapshot();
            }
        };

        let stored = match Session::from_json(&raw) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Discarding corrupt persisted session");
                self.shared.remove_persisted();
                return self.snapshot();
            }
        };

        let op = match self.shared.begin(false) {
            Ok(op) => op,
            Err(e) => {
                debug!(error = %e, "Skipping restore, session already in use");
                return self.snapshot();
            }
        };

        let now = self.shared.clock.now();
        match stored.mode().clone() {
            SessionMode::Anonymous => {
                self.shared.remove_persisted();
            }
            SessionMode::Demo { started_at } => {
                let remaining = stored
                    .remaining_demo_time(now, self.shared.config.demo_duration)
                    .unwrap_or(Duration::ZERO);
                if !self.shared.config.persist_demo {
                    debug!("Demo persistence disabled, discarding stored demo");
                    self.shared.remove_persisted();
                } else if remaining.is_zero() {
                    debug!(%started_at, "Persisted demo session already expired");
                    self.shared.remove_persisted();
                } else {
                    let mut state = self.shared.state();
                    if state.epoch == op.epoch {
                        debug!(remaining_secs = remaining.as_secs(), "Resuming demo session");
                        self.shared.apply(&mut state, stored);
                        self.start_countdown(&mut state, started_at);
                        self.shared.emit(SessionEvent::DemoResumed { remaining });
                    }
                }
            }
            SessionMode::Authenticated {
                account_id,
                validated_at,
            } => {
                if !stored.remember_me() {
                    self.shared.remove_persisted();
                } else if self.shared.validation_is_fresh(validated_at, now) {
                    let name = stored.identity().map(|p| p.name().to_string()).unwrap_or_default();
                    // A stale commit means the user already moved on; nothing to do.
                    let _ = self.shared.commit(&op, stored, SessionEvent::Restored { name });
                } else {
                    self.revalidate(&op, account_id).await;
                }
            }
        }

        drop(op);
        self.snapshot()
    }

    async fn revalidate(&self, op: &Operation<'_>, account_id: AccountId) {
        debug!(%account_id, "Revalidating persisted session");
        match self.shared.backend.read_profile(&account_id).await {
            Ok(profile) => {
                let name = profile.name().to_string();
                let session =
                    Session::authenticated(profile, account_id, true, self.shared.clock.now());
                let _ = self.shared.commit(op, session, SessionEvent::Restored { name });
            }
            Err(e) => {
                warn!(%account_id, error = %e, "Persisted session rejected by backend");
                let state = self.shared.state();
                if state.epoch == op.epoch {
                    self.shared.remove_persisted();
                }
            }
        }
    }

    // =========================================================================
    // Login / Signup
    // =========================================================================

    /// Sign in with existing credentials.
    ///
    /// `role` is the role the user signed in as; an account registered under
    /// a different role is rejected like a wrong password. A failed login
    /// never creates an account.
    pub async fn login(
        &self,
        role: UserRole,
        credentials: Credentials,
        remember_me: bool,
    ) -> Result<Session, SessionError> {
        credentials.validate()?;
        let op = self.shared.begin(true)?;

        let verified = self
            .shared
            .backend
            .verify_credentials(&credentials.identifier, &credentials.secret)
            .await
            .map_err(SessionError::from)?;
        let account_id = verified.account_id;

        let profile = match verified.profile {
            Some(profile) => profile,
            None => {
                warn!(%account_id, "Account has no profile");
                return Err(SessionError::PartialSignup {
                    account_id,
                    reason: "profile was never saved".to_string(),
                });
            }
        };

        if profile.role() != role {
            self.shared.invalidate_quietly(&account_id).await;
            return Err(SessionError::InvalidCredentials(format!(
                "account is not registered as a {}",
                role.as_str()
            )));
        }

        let name = profile.name().to_string();
        let session = Session::authenticated(profile, account_id.clone(), remember_me, self.shared.clock.now());
        match self.shared.commit(&op, session, SessionEvent::LoggedIn { name }) {
            Ok(session) => {
                info!(%account_id, role = role.as_str(), remember_me, "Login successful");
                Ok(session)
            }
            Err(e) => {
                self.shared.invalidate_quietly(&account_id).await;
                Err(e)
            }
        }
    }

    /// Create an account and its profile, then sign in.
    ///
    /// If the account is created but the profile write fails, returns
    /// `PartialSignup`; finish with `retry_profile_write`.
    pub async fn signup(
        &self,
        profile: UserProfile,
        credentials: Credentials,
        remember_me: bool,
    ) -> Result<Session, SessionError> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = profile.validate() {
            errors.merge(e);
        }
        if let Err(e) = credentials.validate() {
            errors.merge(e);
        }
        errors.into_result()?;

        let op = self.shared.begin(true)?;

        let account_id = self
            .shared
            .backend
            .create_account(&credentials.identifier, &credentials.secret, &profile)
            .await
            .map_err(SessionError::from)?;

        if let Err(e) = self.shared.backend.write_profile(&account_id, &profile).await {
            warn!(%account_id, error = %e, "Account created but profile write failed");
            return Err(SessionError::PartialSignup {
                account_id,
                reason: e.to_string(),
            });
        }

        let name = profile.name().to_string();
        let session = Session::authenticated(profile, account_id.clone(), remember_me, self.shared.clock.now());
        match self.shared.commit(&op, session, SessionEvent::SignedUp { name }) {
            Ok(session) => {
                info!(%account_id, role = session.identity().map(|p| p.role().as_str()), "Signup successful");
                Ok(session)
            }
            Err(e) => {
                self.shared.invalidate_quietly(&account_id).await;
                Err(e)
            }
        }
    }

    /// Repair path for `PartialSignup`: write the profile for an existing
    /// account and sign in.
    pub async fn retry_profile_write(
        &self,
        account_id: AccountId,
        profile: UserProfile,
        remember_me: bool,
    ) -> Result<Session, SessionError> {
        profile.validate()?;
        let op = self.shared.begin(true)?;

        if let Err(e) = self.shared.backend.write_profile(&account_id, &profile).await {
            warn!(%account_id, error = %e, "Profile write retry failed");
            return Err(match SessionError::from(e) {
                SessionError::BackendUnavailable(reason) => {
                    SessionError::PartialSignup { account_id, reason }
                }
                other => other,
            });
        }

        let name = profile.name().to_string();
        let session = Session::authenticated(profile, account_id.clone(), remember_me, self.shared.clock.now());
        match self.shared.commit(&op, session, SessionEvent::SignedUp { name }) {
            Ok(session) => Ok(session),
            Err(e) => {
                self.shared.invalidate_quietly(&account_id).await;
                Err(e)
            }
        }
    }

    /// Re-read the signed-in account's profile from the backend.
    pub async fn refresh_profile(&self) -> Result<Session, SessionError> {
        let (account_id, remember_me, epoch) = {
            let state = self.shared.state();
            match state.session.account_id() {
                Some(id) => (id.clone(), state.session.remember_me(), state.epoch),
                None => return Err(SessionError::NotAuthenticated),
            }
        };

        let profile = self
            .shared
            .backend
            .read_profile(&account_id)
            .await
            .map_err(SessionError::from)?;

        let mut state = self.shared.state();
        if state.epoch != epoch || state.session.account_id() != Some(&account_id) {
            return Err(SessionError::Superseded);
        }
        let name = profile.name().to_string();
        let session = Session::authenticated(profile, account_id, remember_me, self.shared.clock.now());
        self.shared.apply(&mut state, session);
        self.shared.emit(SessionEvent::ProfileRefreshed { name });
        Ok(state.session.clone())
    }

    // =========================================================================
    // Demo / Logout
    // =========================================================================

    /// Enter demo mode with the canned student identity. Replaces whatever
    /// session was active locally and never contacts the backend.
    pub fn start_demo(&self) -> Session {
        let mut state = self.shared.state();

        if let SessionMode::Authenticated { account_id, .. } = state.session.mode() {
            warn!(%account_id, "Replacing authenticated session with demo");
        }

        state.epoch += 1;
        let started_at = self.shared.clock.now();
        self.shared.apply(&mut state, Session::demo(started_at));
        let started_at = state.session.demo_started_at().unwrap_or(started_at);
        self.start_countdown(&mut state, started_at);

        info!(duration_secs = self.shared.config.demo_duration.as_secs(), "Demo started");
        self.shared.emit(SessionEvent::DemoStarted {
            duration: self.shared.config.demo_duration,
        });
        state.session.clone()
    }

    /// End the session. Safe to call repeatedly; local state is always
    /// cleared even if the backend cannot be told.
    pub async fn logout(&self) {
        let previous = {
            let mut state = self.shared.state();
            state.epoch += 1;
            let previous = state.session.clone();
            self.shared.apply(&mut state, Session::anonymous());
            previous
        };

        match previous.mode() {
            SessionMode::Anonymous => {
                debug!("Logout with no active session");
            }
            SessionMode::Demo { .. } => {
                info!("Left demo mode");
                self.shared.emit(SessionEvent::DemoEnded);
            }
            SessionMode::Authenticated { account_id, .. } => {
                info!(%account_id, "Logged out");
                self.shared.emit(SessionEvent::LoggedOut);
                self.shared.invalidate_quietly(account_id).await;
            }
        }
    }

    fn start_countdown(&self, state: &mut State, started_at: DateTime<Utc>) {
        let weak = Arc::downgrade(&self.shared);
        let period = self.shared.config.tick_interval;
        // Anchored here rather than at the task's first poll.
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        state.countdown = Some(tokio::spawn(run_countdown(weak, ticker, started_at)));
    }
}

/// Tick until the demo that started at `started_at` ends, one way or another.
async fn run_countdown(shared: Weak<Shared>, mut ticker: Interval, started_at: DateTime<Utc>) {
    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        if !shared.tick(started_at) {
            break;
        }
    }
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        debug!(?event, "Session event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Claim the single in-flight slot.
    fn begin(&self, require_signed_out: bool) -> Result<Operation<'_>, SessionError> {
        let mut state = self.state();
        if state.in_flight {
            return Err(SessionError::OperationInProgress);
        }
        if require_signed_out && state.session.account_id().is_some() {
            return Err(SessionError::AlreadyAuthenticated);
        }
        state.in_flight = true;
        Ok(Operation {
            shared: self,
            epoch: state.epoch,
        })
    }

    /// Apply a backend result unless the user moved on while it was in flight.
    fn commit(
        &self,
        op: &Operation<'_>,
        session: Session,
        event: SessionEvent,
    ) -> Result<Session, SessionError> {
        let mut state = self.state();
        if state.epoch != op.epoch {
            debug!(started = op.epoch, current = state.epoch, "Discarding stale completion");
            return Err(SessionError::Superseded);
        }
        self.apply(&mut state, session);
        self.emit(event);
        Ok(state.session.clone())
    }

    /// Install `session`, stopping any countdown and syncing storage.
    fn apply(&self, state: &mut State, session: Session) {
        if let Some(countdown) = state.countdown.take() {
            countdown.abort();
        }
        state.session = session;
        self.persist(&state.session);
    }

    fn persist(&self, session: &Session) {
        let keep = match session.mode() {
            SessionMode::Anonymous => false,
            SessionMode::Demo { .. } => self.config.persist_demo,
            SessionMode::Authenticated { .. } => session.remember_me(),
        };

        if !keep {
            self.remove_persisted();
            return;
        }

        let result = session
            .to_json()
            .map_err(anyhow::Error::from)
            .and_then(|json| self.store.set(&self.config.storage_key, &json));
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist session");
        }
    }

    fn remove_persisted(&self) {
        if let Err(e) = self.store.remove(&self.config.storage_key) {
            warn!(error = %e, "Failed to remove persisted session");
        }
    }

    fn validation_is_fresh(&self, validated_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match (now - validated_at).to_std() {
            Ok(age) => age < self.config.revalidate_after,
            // Validated "in the future": the clock moved, don't trust it.
            Err(_) => false,
        }
    }

    /// Expire the demo if its budget is spent. Returns true if it did.
    fn settle(&self, state: &mut State) -> bool {
        let remaining = state
            .session
            .remaining_demo_time(self.clock.now(), self.config.demo_duration);
        if remaining == Some(Duration::ZERO) {
            info!("Demo session expired");
            self.apply(state, Session::anonymous());
            self.emit(SessionEvent::DemoExpired);
            true
        } else {
            false
        }
    }

    /// One countdown step. Returns whether the countdown should keep running.
    fn tick(&self, started_at: DateTime<Utc>) -> bool {
        let mut state = self.state();
        if state.session.demo_started_at() != Some(started_at) {
            return false;
        }
        if self.settle(&mut state) {
            return false;
        }
        trace!(
            remaining_secs = state
                .session
                .remaining_demo_time(self.clock.now(), self.config.demo_duration)
                .map(|d| d.as_secs()),
            "Demo tick"
        );
        true
    }

    async fn invalidate_quietly(&self, account_id: &AccountId) {
        if let Err(e) = self.backend.invalidate_session(account_id).await {
            warn!(%account_id, error = %e, "Failed to invalidate backend session");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
