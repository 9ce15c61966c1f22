//! In-memory view of the logged-in user.
//!
//! `Auth` is the single owner of "who is logged in". It reads the token from
//! the `SessionStore`, confirms it against the backend, and clears it when
//! the backend rejects it.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::api::error::find_api_error;
use crate::api::{ApiClient, ApiError};
use crate::models::UserInfo;

use super::SessionStore;

/// Shown when neither a custom nor a provider nickname is available.
pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous user";

/// Point-in-time copy of the auth state, suitable for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub user: Option<UserInfo>,
    pub is_authenticated: bool,
    pub display_name: String,
    pub custom_nickname: Option<String>,
}

#[derive(Debug, Default)]
struct AuthInner {
    user: Option<UserInfo>,
    is_authenticated: bool,
    custom_nickname: Option<String>,
}

impl AuthInner {
    fn snapshot(&self) -> AuthSnapshot {
        AuthSnapshot {
            user: self.user.clone(),
            is_authenticated: self.is_authenticated,
            display_name: display_name(self.user.as_ref(), self.custom_nickname.as_deref()),
            custom_nickname: self.custom_nickname.clone(),
        }
    }

    fn sign_out(&mut self) {
        self.user = None;
        self.is_authenticated = false;
    }
}

/// Pick the name to show: custom nickname, then provider nickname, then default.
pub fn display_name(user: Option<&UserInfo>, custom_nickname: Option<&str>) -> String {
    let non_blank = |s: &str| {
        let trimmed = s.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    };

    custom_nickname
        .and_then(non_blank)
        .or_else(|| user.and_then(|u| u.nickname.as_deref()).and_then(non_blank))
        .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string())
}

/// Shared auth state. Clone is cheap.
#[derive(Clone)]
pub struct Auth {
    api: ApiClient,
    store: SessionStore,
    inner: Arc<Mutex<AuthInner>>,
}

impl Auth {
    pub fn new(api: ApiClient, store: SessionStore, custom_nickname: Option<String>) -> Self {
        let inner = AuthInner {
            custom_nickname: custom_nickname.and_then(normalize_nickname),
            ..AuthInner::default()
        };
        Self {
            api,
            store,
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AuthInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.lock().snapshot()
    }

    /// API client carrying the stored token, if there is one
    pub fn session_api(&self) -> Option<ApiClient> {
        self.store.get().map(|token| self.api.with_token(token))
    }

    /// Optimistically treat `user` as logged in before the backend confirms.
    pub fn set_user_from_login(&self, user: UserInfo) {
        debug!(user_id = user.id, "Merging user from login result");
        let mut inner = self.lock();
        inner.user = Some(user);
        inner.is_authenticated = true;
    }

    /// Put the user fields back to an earlier snapshot.
    pub fn restore(&self, snapshot: &AuthSnapshot) {
        let mut inner = self.lock();
        inner.user = snapshot.user.clone();
        inner.is_authenticated = snapshot.is_authenticated;
    }

    /// Drop the stored token and forget the user.
    pub fn clear_session(&self) {
        self.store.clear();
        self.lock().sign_out();
    }

    /// Confirm the stored token with the backend and adopt the returned user.
    ///
    /// Errors are returned untouched; a rejected token is also cleared.
    pub async fn reconcile(&self) -> Result<UserInfo> {
        let user = self.authorized(|api| async move { api.current_user().await }).await?;
        let mut inner = self.lock();
        inner.user = Some(user.clone());
        inner.is_authenticated = true;
        Ok(user)
    }

    /// Re-derive the auth state from the stored token.
    ///
    /// Any failure to confirm the token logs the user out locally.
    pub async fn refresh(&self) -> AuthSnapshot {
        if !self.store.has_token() {
            self.lock().sign_out();
            return self.snapshot();
        }

        if let Err(e) = self.reconcile().await {
            warn!(error = %e, "Failed to confirm session");
            self.clear_session();
        }
        self.snapshot()
    }

    /// Log out locally, telling the backend on a best-effort basis.
    pub async fn logout(&self) {
        if let Some(api) = self.session_api() {
            if let Err(e) = api.logout().await {
                warn!(error = %e, "Backend logout failed");
            }
        }
        self.clear_session();
        info!("Logged out");
    }

    /// Set or clear (empty input) the custom nickname.
    ///
    /// Returns the normalized value for the caller to persist.
    pub fn set_custom_nickname(&self, name: &str) -> Option<String> {
        let normalized = normalize_nickname(name.to_string());
        self.lock().custom_nickname = normalized.clone();
        normalized
    }

    /// Run an authenticated call. A 401 clears the stored token and signs out.
    pub async fn authorized<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: FnOnce(ApiClient) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(api) = self.session_api() else {
            self.lock().sign_out();
            return Err(ApiError::Unauthorized.into());
        };

        let result = call(api).await;
        if let Err(ref e) = result {
            if find_api_error(e).is_some_and(ApiError::is_unauthorized) {
                warn!("Stored token rejected, clearing session");
                self.clear_session();
            }
        }
        result
    }
}

fn normalize_nickname(name: String) -> Option<String> {
    let trimmed = name.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn user(id: i64, nickname: Option<&str>) -> UserInfo {
        UserInfo {
            id,
            nickname: nickname.map(str::to_string),
            profile_image: None,
            email: None,
        }
    }

    #[test]
    fn test_display_name_precedence() {
        let kim = user(1, Some("kim"));
        assert_eq!(display_name(Some(&kim), Some("  coach ")), "coach");
        assert_eq!(display_name(Some(&kim), Some("   ")), "kim");
        assert_eq!(display_name(Some(&kim), None), "kim");
        assert_eq!(display_name(Some(&user(2, Some(" "))), None), DEFAULT_DISPLAY_NAME);
        assert_eq!(display_name(None, None), DEFAULT_DISPLAY_NAME);
    }

    #[test]
    fn test_set_custom_nickname_trims_and_clears() {
        let auth = Auth::new(
            ApiClient::new("http://localhost:8000").unwrap(),
            SessionStore::in_memory(),
            None,
        );
        assert_eq!(auth.set_custom_nickname("  Coach Lee "), Some("Coach Lee".to_string()));
        assert_eq!(auth.snapshot().display_name, "Coach Lee");
        assert_eq!(auth.set_custom_nickname("   "), None);
        assert_eq!(auth.snapshot().display_name, DEFAULT_DISPLAY_NAME);
    }

    #[test]
    fn test_optimistic_merge_and_restore() {
        let auth = Auth::new(
            ApiClient::new("http://localhost:8000").unwrap(),
            SessionStore::in_memory(),
            None,
        );
        let before = auth.snapshot();
        auth.set_user_from_login(user(1, Some("kim")));
        assert!(auth.snapshot().is_authenticated);
        assert_eq!(auth.snapshot().display_name, "kim");

        auth.restore(&before);
        assert_eq!(auth.snapshot(), before);
    }

    #[tokio::test]
    async fn test_refresh_without_token_is_logged_out() {
        let auth = Auth::new(
            ApiClient::new("http://localhost:8000").unwrap(),
            SessionStore::in_memory(),
            None,
        );
        let snapshot = auth.refresh().await;
        assert!(!snapshot.is_authenticated);
        assert!(snapshot.user.is_none());
    }

    #[tokio::test]
    async fn test_refresh_adopts_backend_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/me"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": 3, "nickname": "park"})),
            )
            .mount(&server)
            .await;

        let store = SessionStore::in_memory();
        store.set("tok");
        let auth = Auth::new(ApiClient::new(&server.uri()).unwrap(), store, None);
        let snapshot = auth.refresh().await;
        assert!(snapshot.is_authenticated);
        assert_eq!(snapshot.display_name, "park");
    }

    #[tokio::test]
    async fn test_unauthorized_clears_store() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/me"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let store = SessionStore::in_memory();
        store.set("stale");
        let auth = Auth::new(ApiClient::new(&server.uri()).unwrap(), store.clone(), None);
        auth.set_user_from_login(user(1, None));

        let err = auth
            .authorized(|api| async move { api.current_user().await })
            .await
            .unwrap_err();
        assert!(find_api_error(&err).is_some_and(ApiError::is_unauthorized));
        assert!(!store.has_token());
        assert!(!auth.snapshot().is_authenticated);
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_backend_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/logout"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let store = SessionStore::in_memory();
        store.set("tok");
        let auth = Auth::new(ApiClient::new(&server.uri()).unwrap(), store.clone(), None);
        auth.set_user_from_login(user(1, Some("kim")));

        auth.logout().await;
        assert!(!store.has_token());
        assert!(!auth.snapshot().is_authenticated);
    }
}
