//! REST adapter for the hosted EduHub service.
//!
//! Login and sign-up return a bearer token which is attached to later
//! profile and logout calls for the same account. Tokens are saved in a
//! secret store (the OS keychain by default) so a restored session can still
//! talk to the service, and are dropped again on logout. They never enter
//! the persisted session snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{AccountId, Backend, BackendError, VerifiedAccount};
use crate::auth::CredentialStore;
use crate::models::UserProfile;
use crate::storage::KeyValueStore;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Secret store key prefix for bearer tokens.
const TOKEN_KEY_PREFIX: &str = "session-token-";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    identifier: &'a str,
    secret: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    account_id: AccountId,
    token: String,
    #[serde(default)]
    profile: Option<UserProfile>,
}

#[derive(Debug, Serialize)]
struct CreateAccountRequest<'a> {
    identifier: &'a str,
    secret: &'a str,
    role: &'a str,
    name: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAccountResponse {
    account_id: AccountId,
    token: String,
}

pub struct HttpBackend {
    client: Client,
    base_url: String,
    tokens: Mutex<HashMap<AccountId, String>>,
    vault: Arc<dyn KeyValueStore>,
}

impl HttpBackend {
    /// Backend whose tokens are kept in the OS keychain.
    pub fn new(base_url: impl Into<String>) -> Result<Self, BackendError> {
        Self::with_token_store(base_url, Arc::new(CredentialStore))
    }

    pub fn with_token_store(
        base_url: impl Into<String>,
        vault: Arc<dyn KeyValueStore>,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens: Mutex::new(HashMap::new()),
            vault,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<AccountId, String>> {
        self.tokens.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn token_key(account_id: &AccountId) -> String {
        format!("{}{}", TOKEN_KEY_PREFIX, account_id)
    }

    fn remember_token(&self, account_id: &AccountId, token: String) {
        if let Err(e) = self.vault.set(&Self::token_key(account_id), &token) {
            warn!(%account_id, error = %e, "Failed to save session token");
        }
        self.tokens().insert(account_id.clone(), token);
    }

    fn forget_token(&self, account_id: &AccountId) {
        self.tokens().remove(account_id);
        if let Err(e) = self.vault.remove(&Self::token_key(account_id)) {
            warn!(%account_id, error = %e, "Failed to remove session token");
        }
    }

    /// Token for an account, loaded from the secret store on first use.
    fn token(&self, account_id: &AccountId) -> Option<String> {
        if let Some(token) = self.tokens().get(account_id) {
            return Some(token.clone());
        }

        match self.vault.get(&Self::token_key(account_id)) {
            Ok(Some(token)) => {
                debug!(%account_id, "Loaded saved session token");
                self.tokens().insert(account_id.clone(), token.clone());
                Some(token)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(%account_id, error = %e, "Failed to read saved session token");
                None
            }
        }
    }

    /// Attach the bearer token for an account, if one is known.
    fn authorized(&self, request: RequestBuilder, account_id: &AccountId) -> RequestBuilder {
        match self.token(account_id) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, BackendError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(BackendError::from_status(status, &body))
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn verify_credentials(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<VerifiedAccount, BackendError> {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .header(header::ACCEPT, "application/json")
            .json(&LoginRequest { identifier, secret })
            .send()
            .await?;

        let login: LoginResponse = Self::check_response(response).await?.json().await?;
        debug!(account_id = %login.account_id, "Credentials verified");

        self.remember_token(&login.account_id, login.token);

        Ok(VerifiedAccount {
            account_id: login.account_id,
            profile: login.profile,
        })
    }

    async fn create_account(
        &self,
        identifier: &str,
        secret: &str,
        seed: &UserProfile,
    ) -> Result<AccountId, BackendError> {
        let body = CreateAccountRequest {
            identifier,
            secret,
            role: seed.role().as_str(),
            name: seed.name(),
        };

        let response = self
            .client
            .post(self.url("/auth/accounts"))
            .header(header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;

        let created: CreateAccountResponse = Self::check_response(response).await?.json().await?;
        debug!(account_id = %created.account_id, "Account created");

        self.remember_token(&created.account_id, created.token);
        Ok(created.account_id)
    }

    async fn write_profile(
        &self,
        account_id: &AccountId,
        profile: &UserProfile,
    ) -> Result<(), BackendError> {
        let request = self
            .client
            .put(self.url(&format!("/profiles/{}", account_id)))
            .json(profile);

        let response = self.authorized(request, account_id).send().await?;
        Self::check_response(response).await?;
        Ok(())
    }

    async fn read_profile(&self, account_id: &AccountId) -> Result<UserProfile, BackendError> {
        let request = self
            .client
            .get(self.url(&format!("/profiles/{}", account_id)))
            .header(header::ACCEPT, "application/json");

        let response = self.authorized(request, account_id).send().await?;
        Ok(Self::check_response(response).await?.json().await?)
    }

    async fn invalidate_session(&self, account_id: &AccountId) -> Result<(), BackendError> {
        let request = self.client.post(self.url("/auth/logout"));
        let response = self.authorized(request, account_id).send().await;

        // The token is useless to us after logout whether or not the server heard.
        self.forget_token(account_id);

        Self::check_response(response?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{header as http_header, HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;
    use crate::config::SessionConfig;
    use crate::models::{Credentials, UserRole};
    use crate::storage::MemoryStore;
    use crate::SessionManager;

    const TOKEN: &str = "tok-ann";

    fn ann_json() -> Value {
        json!({
            "role": "student",
            "name": "Ann",
            "phone": "555-0100-000",
            "location": "Springfield",
            "school": "Springfield High",
            "age": 15,
            "grade": "9th"
        })
    }

    fn require_token(headers: &HeaderMap) -> Result<(), StatusCode> {
        let expected = format!("Bearer {}", TOKEN);
        match headers.get(http_header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
            Some(value) if value == expected => Ok(()),
            _ => Err(StatusCode::UNAUTHORIZED),
        }
    }

    async fn login() -> Json<Value> {
        Json(json!({ "accountId": "acct-ann", "token": TOKEN, "profile": ann_json() }))
    }

    async fn read_profile(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
        require_token(&headers)?;
        Ok(Json(ann_json()))
    }

    async fn logout(headers: HeaderMap) -> StatusCode {
        match require_token(&headers) {
            Ok(()) => StatusCode::NO_CONTENT,
            Err(status) => status,
        }
    }

    /// Serve a minimal EduHub API that insists on the bearer token.
    async fn spawn_service() -> String {
        let app = Router::new()
            .route("/auth/login", post(login))
            .route("/profiles/{id}", get(read_profile))
            .route("/auth/logout", post(logout));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn backend(url: &str, vault: &Arc<MemoryStore>) -> HttpBackend {
        HttpBackend::with_token_store(url, vault.clone()).unwrap()
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let backend = backend("https://api.eduhub.test/v1/", &Arc::new(MemoryStore::new()));
        assert_eq!(backend.url("/auth/login"), "https://api.eduhub.test/v1/auth/login");
    }

    #[test]
    fn test_login_response_without_profile() {
        let json = r#"{"accountId":"acct-1","token":"t"}"#;
        let parsed: LoginResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.account_id, AccountId::from("acct-1"));
        assert!(parsed.profile.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unavailable() {
        // Port 9 (discard) on localhost is not expected to run an HTTP server.
        let backend = backend("http://127.0.0.1:9", &Arc::new(MemoryStore::new()));
        let err = backend.verify_credentials("ann@example.com", "hunter22").await.unwrap_err();
        assert!(err.is_transient(), "expected transport failure, got {:?}", err);
    }

    #[tokio::test]
    async fn test_token_survives_restart_until_logout() {
        let url = spawn_service().await;
        let vault = Arc::new(MemoryStore::new());

        let first = backend(&url, &vault);
        let verified = first.verify_credentials("ann@example.com", "hunter22").await.unwrap();
        let account_id = verified.account_id;
        assert!(vault.get("session-token-acct-ann").unwrap().is_some());

        // A new process finds the token in the secret store.
        let second = backend(&url, &vault);
        let profile = second.read_profile(&account_id).await.unwrap();
        assert_eq!(profile.name(), "Ann");

        second.invalidate_session(&account_id).await.unwrap();
        assert!(vault.get("session-token-acct-ann").unwrap().is_none());

        let third = backend(&url, &vault);
        let err = third.read_profile(&account_id).await.unwrap_err();
        assert!(matches!(err, BackendError::Credential(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_stale_remembered_session_revalidates_after_restart() {
        let url = spawn_service().await;
        let vault = Arc::new(MemoryStore::new());
        let storage = Arc::new(MemoryStore::new());
        let config = SessionConfig {
            revalidate_after: Duration::ZERO,
            ..SessionConfig::default()
        };

        let first = SessionManager::new(Arc::new(backend(&url, &vault)), storage.clone(), config.clone());
        first
            .login(UserRole::Student, Credentials::new("ann@example.com", "hunter22"), true)
            .await
            .unwrap();

        let second = SessionManager::new(Arc::new(backend(&url, &vault)), storage.clone(), config);
        let restored = second.restore().await;
        assert!(restored.is_authenticated());
        assert_eq!(restored.account_id(), Some(&AccountId::from("acct-ann")));

        second.logout().await;
        assert!(vault.get("session-token-acct-ann").unwrap().is_none());
    }
}
