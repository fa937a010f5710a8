//! Route guard.
//!
//! Every view except login and sign-up requires a session (demo counts).
//! Anonymous visitors are sent to the login view and the page they asked for
//! is remembered so they land there after signing in.

use std::sync::Mutex;

use tracing::debug;

/// Application routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Root,
    Home,
    Videos,
    Messages,
    Resources,
    Profile,
    Settings,
    CreatePost,
    Login,
    Signup,
    NotFound,
}

impl Route {
    pub const ALL: [Route; 11] = [
        Route::Root,
        Route::Home,
        Route::Videos,
        Route::Messages,
        Route::Resources,
        Route::Profile,
        Route::Settings,
        Route::CreatePost,
        Route::Login,
        Route::Signup,
        Route::NotFound,
    ];

    /// Parse a path; trailing slashes and query strings are ignored.
    /// Unknown paths map to `NotFound`.
    pub fn from_path(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or("");
        let trimmed = path.trim_end_matches('/');
        match trimmed {
            "" => Route::Root,
            "/home" => Route::Home,
            "/videos" => Route::Videos,
            "/messages" => Route::Messages,
            "/resources" => Route::Resources,
            "/profile" => Route::Profile,
            "/settings" => Route::Settings,
            "/create-post" => Route::CreatePost,
            "/login" => Route::Login,
            "/signup" => Route::Signup,
            _ => Route::NotFound,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Route::Root => "/",
            Route::Home => "/home",
            Route::Videos => "/videos",
            Route::Messages => "/messages",
            Route::Resources => "/resources",
            Route::Profile => "/profile",
            Route::Settings => "/settings",
            Route::CreatePost => "/create-post",
            Route::Login => "/login",
            Route::Signup => "/signup",
            Route::NotFound => "/404",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Route::Root | Route::Home => "Home",
            Route::Videos => "Videos",
            Route::Messages => "Messages",
            Route::Resources => "Resources",
            Route::Profile => "Profile",
            Route::Settings => "Settings",
            Route::CreatePost => "Create Post",
            Route::Login => "Login",
            Route::Signup => "Sign Up",
            Route::NotFound => "Not Found",
        }
    }

    pub fn requires_auth(&self) -> bool {
        !matches!(self, Route::Login | Route::Signup | Route::NotFound)
    }

    fn is_auth_page(&self) -> bool {
        matches!(self, Route::Login | Route::Signup)
    }
}

/// Outcome of a navigation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Allow(Route),
    /// Anonymous access to a protected view.
    RedirectToLogin { from: Route },
    /// Login or sign-up page while already signed in.
    RedirectHome,
}

#[derive(Debug, Default)]
pub struct RouteGuard {
    pending: Mutex<Option<Route>>,
}

impl RouteGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, route: Route, authenticated: bool) -> RouteDecision {
        if route.requires_auth() && !authenticated {
            debug!(route = route.path(), "Redirecting anonymous visitor to login");
            *self.pending.lock().unwrap_or_else(|p| p.into_inner()) = Some(route);
            RouteDecision::RedirectToLogin { from: route }
        } else if route.is_auth_page() && authenticated {
            RouteDecision::RedirectHome
        } else {
            RouteDecision::Allow(route)
        }
    }

    /// Where to go after a successful sign-in. Yields the remembered
    /// destination once, then falls back to `Home`.
    pub fn take_post_login_redirect(&self) -> Route {
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
            .unwrap_or(Route::Home)
    }
}
