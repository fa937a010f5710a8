//! Interactive command loop.
//!
//! Reads commands from stdin, drives the `SessionManager` and keeps track of
//! the current view through the route guard. Session notices are printed by
//! a separate task as they arrive.

use std::io::{self, Write};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, warn};

use eduhub_core::backend::AccountId;
use eduhub_core::models::{parse_grades, SchoolProfile, StudentProfile, TeacherProfile};
use eduhub_core::utils::{format_countdown, format_phone, truncate_string};
use eduhub_core::{
    Config, CredentialStore, Credentials, Route, RouteDecision, RouteGuard, SessionError,
    SessionManager, SessionMode, UserProfile, UserRole,
};

// ============================================================================
// Constants
// ============================================================================

/// Longest value shown per profile field in `whoami`.
const MAX_FIELD_DISPLAY: usize = 40;

const HELP: &str = "\
Commands:
  login <student|teacher|school>   Sign in
  signup <student|teacher|school>  Create an account
  repair                           Retry saving the profile after a failed sign-up
  demo                             Explore EduHub for 10 minutes without an account
  logout                           End the session
  whoami                           Show the current session
  time                             Show the demo time remaining
  go <path>                        Open a view (/home, /messages, /settings, ...)
  refresh                          Reload your profile from the server
  help                             Show this help
  quit                             Exit";

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login(UserRole),
    Signup(UserRole),
    Repair,
    Demo,
    Logout,
    WhoAmI,
    Time,
    Go(Route),
    Refresh,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        let arg = words.next();

        let role = |arg: Option<&str>| -> Result<UserRole, String> {
            match arg {
                None => Ok(UserRole::Student),
                Some(s) => s
                    .parse::<UserRole>()
                    .map_err(|e| format!("{}. Use student, teacher or school.", e)),
            }
        };

        let command = match name.to_lowercase().as_str() {
            "login" => Command::Login(role(arg)?),
            "signup" => Command::Signup(role(arg)?),
            "repair" => Command::Repair,
            "demo" => Command::Demo,
            "logout" => Command::Logout,
            "whoami" => Command::WhoAmI,
            "time" => Command::Time,
            "go" => {
                let path = arg.ok_or_else(|| "Usage: go <path>".to_string())?;
                Command::Go(Route::from_path(path))
            }
            "refresh" => Command::Refresh,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("Unknown command '{}'. Type 'help'.", other)),
        };
        Ok(Some(command))
    }
}

/// Account waiting for its profile after a partial sign-up.
struct PendingRepair {
    account_id: AccountId,
    role: UserRole,
    profile: Option<UserProfile>,
    remember_me: bool,
}

// ============================================================================
// App
// ============================================================================

pub struct App {
    manager: SessionManager,
    guard: RouteGuard,
    config: Config,
    current: Route,
    input: Lines<BufReader<Stdin>>,
    pending_repair: Option<PendingRepair>,
}

impl App {
    pub fn new(manager: SessionManager, config: Config) -> Self {
        let current = if manager.is_authenticated() {
            Route::Home
        } else {
            Route::Login
        };

        Self {
            manager,
            guard: RouteGuard::new(),
            config,
            current,
            input: BufReader::new(tokio::io::stdin()).lines(),
            pending_repair: None,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        println!("EduHub - type 'help' for commands.");

        loop {
            self.enforce_guard();

            let label = self.prompt_label();
            let Some(line) = self.read_line(&label).await? else {
                return Ok(());
            };

            let command = match Command::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(message) => {
                    println!("{}", message);
                    continue;
                }
            };

            if command == Command::Quit {
                return Ok(());
            }

            if let Err(e) = self.handle(command).await {
                println!("Error: {:#}", e);
            }
        }
    }

    fn prompt_label(&self) -> String {
        let badge = match self.manager.remaining_demo_time() {
            Some(remaining) => format!(" [demo {}]", format_countdown(remaining)),
            None => String::new(),
        };
        format!("{}{}> ", self.current.path(), badge)
    }

    /// Bounce off protected views once the session ends (e.g. demo expiry).
    fn enforce_guard(&mut self) {
        let authenticated = self.manager.is_authenticated();
        if let RouteDecision::RedirectToLogin { from } = self.guard.check(self.current, authenticated) {
            debug!(from = from.path(), "Session ended, returning to login");
            self.current = Route::Login;
        }
    }

    async fn handle(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Login(role) => self.login(role).await,
            Command::Signup(role) => self.signup(role).await,
            Command::Repair => self.repair().await,
            Command::Demo => {
                self.manager.start_demo();
                self.current = self.guard.take_post_login_redirect();
                Ok(())
            }
            Command::Logout => {
                let identifier = self.config.last_identifier.clone();
                let was_authenticated = self.manager.snapshot().account_id().is_some();
                self.manager.logout().await;
                if was_authenticated {
                    if let Some(identifier) = identifier {
                        if let Err(e) = CredentialStore::delete(&identifier) {
                            warn!(error = %e, "Failed to remove stored secret");
                        }
                    }
                }
                self.current = Route::Login;
                Ok(())
            }
            Command::WhoAmI => {
                self.print_session();
                Ok(())
            }
            Command::Time => {
                match self.manager.remaining_demo_time() {
                    Some(remaining) => println!("Demo time remaining: {}", format_countdown(remaining)),
                    None => println!("Not in demo mode."),
                }
                Ok(())
            }
            Command::Go(route) => {
                self.navigate(route);
                Ok(())
            }
            Command::Refresh => {
                if let Err(e) = self.manager.refresh_profile().await {
                    println!("{}", e.user_message());
                }
                Ok(())
            }
            Command::Help => {
                println!("{}", HELP);
                Ok(())
            }
            Command::Quit => Ok(()),
        }
    }

    fn navigate(&mut self, route: Route) {
        match self.guard.check(route, self.manager.is_authenticated()) {
            RouteDecision::Allow(route) => {
                self.current = route;
                println!("{}", route.title());
            }
            RouteDecision::RedirectToLogin { from } => {
                self.current = Route::Login;
                println!("Please log in to view {}.", from.title());
            }
            RouteDecision::RedirectHome => {
                self.current = Route::Home;
                println!("You are already signed in.");
            }
        }
    }

    // =========================================================================
    // Authentication flows
    // =========================================================================

    async fn login(&mut self, role: UserRole) -> Result<()> {
        let identifier = self.prompt_identifier().await?;
        let stored = CredentialStore::load(&identifier).unwrap_or_else(|e| {
            warn!(error = %e, "Keychain unavailable");
            None
        });
        let secret = match stored {
            Some(stored) => {
                if self.confirm("Use stored password?", true).await? {
                    stored
                } else {
                    Self::prompt_secret()?
                }
            }
            None => Self::prompt_secret()?,
        };
        let remember_me = self.confirm("Remember me?", false).await?;

        println!("Signing in...");
        let credentials = Credentials::new(identifier.clone(), secret.clone());
        match self.manager.login(role, credentials, remember_me).await {
            Ok(_) => {
                self.after_sign_in(&identifier, &secret, remember_me);
                Ok(())
            }
            Err(SessionError::PartialSignup { account_id, .. }) => {
                println!("Your account has no profile yet. Type 'repair' to finish setting it up.");
                self.pending_repair = Some(PendingRepair {
                    account_id,
                    role,
                    profile: None,
                    remember_me,
                });
                Ok(())
            }
            Err(e) => {
                println!("{}", e.user_message());
                Ok(())
            }
        }
    }

    async fn signup(&mut self, role: UserRole) -> Result<()> {
        let profile = self.prompt_profile(role).await?;
        let identifier = self.prompt_identifier().await?;
        let secret = Self::prompt_secret()?;
        let confirm = rpassword::prompt_password("Confirm password: ")?;
        if secret != confirm {
            println!("Passwords do not match.");
            return Ok(());
        }
        let remember_me = self.confirm("Remember me?", false).await?;

        println!("Creating account...");
        let credentials = Credentials::new(identifier.clone(), secret.clone());
        match self.manager.signup(profile.clone(), credentials, remember_me).await {
            Ok(_) => {
                self.after_sign_in(&identifier, &secret, remember_me);
                Ok(())
            }
            Err(SessionError::Validation(errors)) => {
                for error in errors.iter() {
                    println!("  {}: {}", error.field, error.message);
                }
                Ok(())
            }
            Err(e) => {
                println!("{}", e.user_message());
                if let SessionError::PartialSignup { account_id, .. } = e {
                    println!("Type 'repair' to try again.");
                    self.pending_repair = Some(PendingRepair {
                        account_id,
                        role,
                        profile: Some(profile),
                        remember_me,
                    });
                }
                Ok(())
            }
        }
    }

    async fn repair(&mut self) -> Result<()> {
        let Some(pending) = self.pending_repair.take() else {
            println!("Nothing to repair.");
            return Ok(());
        };

        let profile = match pending.profile.clone() {
            Some(profile) => profile,
            None => self.prompt_profile(pending.role).await?,
        };

        match self
            .manager
            .retry_profile_write(pending.account_id.clone(), profile.clone(), pending.remember_me)
            .await
        {
            Ok(_) => {
                self.current = self.guard.take_post_login_redirect();
                Ok(())
            }
            Err(e) => {
                println!("{}", e.user_message());
                if matches!(e, SessionError::PartialSignup { .. } | SessionError::BackendUnavailable(_)) {
                    self.pending_repair = Some(PendingRepair {
                        profile: Some(profile),
                        ..pending
                    });
                }
                Ok(())
            }
        }
    }

    fn after_sign_in(&mut self, identifier: &str, secret: &str, remember_me: bool) {
        if remember_me {
            if let Err(e) = CredentialStore::store(identifier, secret) {
                warn!(error = %e, "Failed to store credentials");
            }
        }

        self.config.last_identifier = Some(identifier.to_string());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        self.pending_repair = None;
        self.current = self.guard.take_post_login_redirect();
    }

    // =========================================================================
    // Display
    // =========================================================================

    fn print_session(&self) {
        let session = self.manager.snapshot();
        let Some(profile) = session.identity() else {
            println!("Not signed in.");
            return;
        };

        let mode = match session.mode() {
            SessionMode::Demo { .. } => "demo",
            SessionMode::Authenticated { .. } => "signed in",
            SessionMode::Anonymous => "anonymous",
        };
        println!("{} ({}, {})", profile.name(), profile.role().display_name(), mode);

        let field = |label: &str, value: &str| {
            println!("  {:<16}{}", label, truncate_string(value, MAX_FIELD_DISPLAY));
        };
        field("Phone", &format_phone(profile.phone()));
        field("Location", profile.location());
        match profile {
            UserProfile::Student(p) => {
                field("School", &p.school);
                field("Age", &p.age.to_string());
                field("Grade", &p.grade);
            }
            UserProfile::Teacher(p) => {
                field("Teaching at", &p.teaching_school);
                field("Grades", &p.teaching_grades.join(", "));
            }
            UserProfile::School(p) => {
                field("CEO", &p.ceo_name);
            }
        }
        if session.remember_me() {
            println!("  Remembered on this device");
        }
    }

    // =========================================================================
    // Prompts
    // =========================================================================

    async fn read_line(&mut self, label: &str) -> Result<Option<String>> {
        print!("{}", label);
        io::stdout().flush()?;
        let line = self.input.next_line().await.context("Failed to read input")?;
        Ok(line.map(|l| l.trim().to_string()))
    }

    async fn prompt(&mut self, label: &str) -> Result<String> {
        self.read_line(&format!("{}: ", label))
            .await?
            .ok_or_else(|| anyhow::anyhow!("Input closed"))
    }

    async fn confirm(&mut self, question: &str, default: bool) -> Result<bool> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        let answer = self.prompt(&format!("{} {}", question, hint)).await?;
        Ok(parse_yes_no(&answer, default))
    }

    async fn prompt_identifier(&mut self) -> Result<String> {
        match self.config.last_identifier.clone() {
            Some(last) => {
                let input = self.prompt(&format!("Email or phone [{}]", last)).await?;
                Ok(if input.is_empty() { last } else { input })
            }
            None => self.prompt("Email or phone").await,
        }
    }

    fn prompt_secret() -> Result<String> {
        let secret = rpassword::prompt_password("Password: ")?;
        Ok(secret)
    }

    async fn prompt_profile(&mut self, role: UserRole) -> Result<UserProfile> {
        let name = self.prompt("Full name").await?;
        let phone = self.prompt("Phone").await?;
        let location = self.prompt("Location").await?;

        let profile = match role {
            UserRole::Student => {
                let school = self.prompt("School").await?;
                let age = self.prompt("Age").await?;
                let grade = self.prompt("Grade").await?;
                UserProfile::Student(StudentProfile {
                    name,
                    phone,
                    location,
                    school,
                    // Out-of-range input is reported by profile validation.
                    age: age.parse().unwrap_or(0),
                    grade,
                })
            }
            UserRole::Teacher => {
                let teaching_school = self.prompt("Teaching school").await?;
                let grades = self.prompt("Grades taught (comma separated)").await?;
                UserProfile::Teacher(TeacherProfile {
                    name,
                    phone,
                    location,
                    teaching_school,
                    teaching_grades: parse_grades(&grades),
                })
            }
            UserRole::School => {
                let ceo_name = self.prompt("CEO name").await?;
                UserProfile::School(SchoolProfile {
                    name,
                    phone,
                    location,
                    ceo_name,
                })
            }
        };
        Ok(profile)
    }
}

fn parse_yes_no(answer: &str, default: bool) -> bool {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default,
    }
}

// ============================================================================
// Tests
// ============================================================================
