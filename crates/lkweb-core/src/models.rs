//! Wire types shared between the backend, the web frontend and this client.

use serde::{Deserialize, Serialize};

/// The logged-in user as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UserInfo {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Response of the code-for-token exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: String,
    pub user_info: UserInfo,
}

/// Response of the authorization URL endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginUrlResponse {
    pub login_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_info_optional_fields() {
        let user: UserInfo = serde_json::from_str(r#"{"id":1,"nickname":"kim"}"#).unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(user.nickname.as_deref(), Some("kim"));
        assert!(user.email.is_none());

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("email"));
    }

    #[test]
    fn test_auth_response_parse() {
        let body = r#"{
            "access_token": "tok",
            "token_type": "bearer",
            "user_info": {"id": 7, "email": "a@b.c"}
        }"#;
        let resp: AuthResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.access_token, "tok");
        assert_eq!(resp.user_info.id, 7);
    }
}
