//! API client for the dashboard backend.
//!
//! This module provides the `ApiClient` struct for the authorization URL
//! lookup, the code-for-token exchange and the authenticated user endpoints.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::models::{AuthResponse, LoginUrlResponse, UserInfo};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Default backend location for local development.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const LOGIN_URL_PATH: &str = "/api/auth/kakao/login-url";
const CODE_EXCHANGE_PATH: &str = "/api/auth/kakao/callback";
const CURRENT_USER_PATH: &str = "/api/auth/me";
const LOGOUT_PATH: &str = "/api/auth/logout";

/// API client for the dashboard backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client against `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    /// Fetch the provider-issued authorization URL
    pub async fn login_url(&self) -> Result<String> {
        let resp: LoginUrlResponse = self
            .get(LOGIN_URL_PATH)
            .await
            .context("Failed to fetch login URL")?;
        debug!(url = %resp.login_url, "Received login URL");
        Ok(resp.login_url)
    }

    /// Exchange an authorization code for an access token
    pub async fn exchange_code(&self, code: &str) -> Result<AuthResponse> {
        let body = serde_json::json!({ "code": code });
        self.post(CODE_EXCHANGE_PATH, &body)
            .await
            .context("Failed to exchange authorization code")
    }

    /// Fetch the user the current token belongs to
    pub async fn current_user(&self) -> Result<UserInfo> {
        self.get(CURRENT_USER_PATH)
            .await
            .context("Failed to fetch current user")
    }

    /// Invalidate the current token on the backend
    pub async fn logout(&self) -> Result<()> {
        let url = self.url(LOGOUT_PATH);
        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .send()
            .await
            .map_err(ApiError::from)
            .with_context(|| format!("Failed to send POST request to {}", url))?;
        Self::check_response(response).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .headers(self.auth_headers()?)
            .send()
            .await
            .map_err(ApiError::from)
            .with_context(|| format!("Failed to send GET request to {}", url))?;

        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .json(body)
            .send()
            .await
            .map_err(ApiError::from)
            .with_context(|| format!("Failed to send POST request to {}", url))?;

        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::find_api_error;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_login_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LOGIN_URL_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"login_url": "https://idp.example/auth"})),
            )
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri()).unwrap();
        assert_eq!(api.login_url().await.unwrap(), "https://idp.example/auth");
    }

    #[tokio::test]
    async fn test_exchange_code_sends_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CODE_EXCHANGE_PATH))
            .and(body_json(serde_json::json!({"code": "abc"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "token_type": "bearer",
                "user_info": {"id": 1, "nickname": "kim"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri()).unwrap();
        let resp = api.exchange_code("abc").await.unwrap();
        assert_eq!(resp.access_token, "tok-1");
        assert_eq!(resp.user_info.nickname.as_deref(), Some("kim"));
    }

    #[tokio::test]
    async fn test_current_user_uses_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CURRENT_USER_PATH))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1})),
            )
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri()).unwrap().with_token("tok-1".into());
        assert_eq!(api.current_user().await.unwrap().id, 1);
    }

    #[tokio::test]
    async fn test_unauthorized_is_typed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CURRENT_USER_PATH))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri()).unwrap().with_token("stale".into());
        let err = api.current_user().await.unwrap_err();
        assert!(find_api_error(&err).is_some_and(ApiError::is_unauthorized));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let api = ApiClient::new("http://localhost:8000/").unwrap();
        assert_eq!(api.url(LOGIN_URL_PATH), "http://localhost:8000/api/auth/kakao/login-url");
    }

    #[tokio::test]
    async fn test_logout_network_failure_is_api_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let api = ApiClient::new(&format!("http://127.0.0.1:{}", port))
            .unwrap()
            .with_token("tok".into());
        let err = api.logout().await.unwrap_err();
        assert!(matches!(find_api_error(&err), Some(ApiError::NetworkError(_))));
    }
}
