//! Messages posted back by the login popup, and the origin check that gates them.

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::models::UserInfo;

/// A raw delivery on the message channel, before any validation.
#[derive(Debug, Clone)]
pub struct InboundEnvelope {
    pub origin: String,
    pub data: serde_json::Value,
}

impl InboundEnvelope {
    pub fn new(origin: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

/// The result of an external login, as posted by the callback page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "type")]
pub enum HandshakeMessage {
    /// Login finished; the credential is either carried here or already stored.
    #[serde(rename = "AUTH_SUCCESS", rename_all = "camelCase")]
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_info: Option<UserInfo>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        access_token: Option<String>,
    },
    /// The provider redirected back with a code that still needs exchanging.
    #[serde(rename = "AUTH_CODE")]
    Code { code: String },
    #[serde(rename = "AUTH_ERROR")]
    Error { error: String },
}

impl HandshakeMessage {
    /// Parse a payload, returning `None` for anything that is not a handshake message.
    pub fn parse(data: &serde_json::Value) -> Option<Self> {
        match serde_json::from_value(data.clone()) {
            Ok(msg) => Some(msg),
            Err(e) => {
                debug!(error = %e, "Ignoring malformed handshake message");
                None
            }
        }
    }
}

/// Decides which sender origins may deliver a login result.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    app_origin: url::Origin,
    allow_loopback: bool,
}

impl OriginPolicy {
    /// Only the application's own origin is accepted.
    pub fn strict(app_origin: &Url) -> Self {
        Self {
            app_origin: app_origin.origin(),
            allow_loopback: false,
        }
    }

    /// Also accept any loopback sender. For local development only.
    pub fn allow_loopback(mut self, allow: bool) -> Self {
        self.allow_loopback = allow;
        self
    }

    pub fn accepts(&self, sender: &str) -> bool {
        let Ok(url) = Url::parse(sender) else {
            return false;
        };
        let origin = url.origin();
        if !origin.is_tuple() {
            return false;
        }
        if origin == self.app_origin {
            return true;
        }
        self.allow_loopback && is_loopback(&url)
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(url::Host::Ipv4(addr)) => addr.is_loopback(),
        Some(url::Host::Ipv6(addr)) => addr.is_loopback(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy() -> OriginPolicy {
        OriginPolicy::strict(&Url::parse("https://lk.example").unwrap())
    }

    #[test]
    fn test_parse_success_with_user_info() {
        let msg = HandshakeMessage::parse(&json!({
            "type": "AUTH_SUCCESS",
            "userInfo": {"id": 1, "nickname": "kim"}
        }))
        .unwrap();
        match msg {
            HandshakeMessage::Success {
                user_info,
                access_token,
            } => {
                assert_eq!(user_info.unwrap().nickname.as_deref(), Some("kim"));
                assert!(access_token.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_bare_success() {
        assert_eq!(
            HandshakeMessage::parse(&json!({"type": "AUTH_SUCCESS"})),
            Some(HandshakeMessage::Success {
                user_info: None,
                access_token: None
            })
        );
    }

    #[test]
    fn test_parse_error_and_code() {
        assert_eq!(
            HandshakeMessage::parse(&json!({"type": "AUTH_ERROR", "error": "access_denied"})),
            Some(HandshakeMessage::Error {
                error: "access_denied".into()
            })
        );
        assert_eq!(
            HandshakeMessage::parse(&json!({"type": "AUTH_CODE", "code": "c1"})),
            Some(HandshakeMessage::Code { code: "c1".into() })
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(HandshakeMessage::parse(&json!({"type": "SOMETHING_ELSE"})).is_none());
        assert!(HandshakeMessage::parse(&json!({"type": "AUTH_ERROR"})).is_none());
        assert!(HandshakeMessage::parse(&json!("AUTH_SUCCESS")).is_none());
        assert!(HandshakeMessage::parse(&json!({"type": "AUTH_SUCCESS", "userInfo": 5})).is_none());
    }

    #[test]
    fn test_origin_exact_match() {
        let policy = policy();
        assert!(policy.accepts("https://lk.example"));
        assert!(policy.accepts("https://lk.example/"));
        assert!(!policy.accepts("https://evil.example"));
        assert!(!policy.accepts("http://lk.example"));
        assert!(!policy.accepts("https://lk.example:8443"));
    }

    #[test]
    fn test_origin_rejects_wildcard_and_garbage() {
        let policy = policy().allow_loopback(true);
        assert!(!policy.accepts("*"));
        assert!(!policy.accepts("null"));
        assert!(!policy.accepts(""));
    }

    #[test]
    fn test_loopback_only_when_enabled() {
        let strict = policy();
        assert!(!strict.accepts("http://localhost:5173"));

        let dev = policy().allow_loopback(true);
        assert!(dev.accepts("http://localhost:5173"));
        assert!(dev.accepts("https://localhost:3000"));
        assert!(dev.accepts("http://127.0.0.1:8080"));
        assert!(dev.accepts("http://[::1]:8080"));
        assert!(!dev.accepts("http://localhost.evil.example"));
    }
}
