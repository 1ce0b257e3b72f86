//! SASL mechanisms for AUTHENTICATE.
//!
//! Implements:
//! - PLAIN (RFC 4616)
//! - OAUTHBEARER (RFC 7628)
//! - XOAUTH2 (Google/Microsoft)
//!
//! All three are single-round: the client response is known up front and
//! is sent inline when the server advertises SASL-IR, otherwise after the
//! first empty `+` challenge.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// A SASL mechanism with its credentials.
#[derive(Clone, PartialEq, Eq)]
pub enum SaslMechanism {
    /// PLAIN with username and password.
    Plain {
        /// Authentication identity.
        username: String,
        /// Password.
        password: String,
    },
    /// OAUTHBEARER with an access token.
    OAuthBearer {
        /// User email address.
        user: String,
        /// OAuth2 access token.
        token: String,
    },
    /// XOAUTH2 with an access token.
    XOAuth2 {
        /// User email address.
        user: String,
        /// OAuth2 access token.
        token: String,
    },
}

impl std::fmt::Debug for SaslMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaslMechanism")
            .field("name", &self.name())
            .field("user", &self.user())
            .finish_non_exhaustive()
    }
}

impl SaslMechanism {
    /// Mechanism name as used in `AUTH=` capabilities.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Plain { .. } => "PLAIN",
            Self::OAuthBearer { .. } => "OAUTHBEARER",
            Self::XOAuth2 { .. } => "XOAUTH2",
        }
    }

    /// The user the mechanism authenticates as.
    #[must_use]
    pub fn user(&self) -> &str {
        match self {
            Self::Plain { username, .. } => username,
            Self::OAuthBearer { user, .. } | Self::XOAuth2 { user, .. } => user,
        }
    }

    /// The client response, before base64.
    #[must_use]
    pub fn initial_response(&self) -> Vec<u8> {
        match self {
            // Empty authorization identity: act as the authentication identity.
            Self::Plain { username, password } => format!("\0{username}\0{password}"),
            Self::OAuthBearer { user, token } => {
                format!("n,a={user},\x01auth=Bearer {token}\x01\x01")
            }
            Self::XOAuth2 { user, token } => format!("user={user}\x01auth=Bearer {token}\x01\x01"),
        }
        .into_bytes()
    }
}

/// Encodes a client response for a continuation line.
#[must_use]
pub fn encode_response(response: &[u8]) -> String {
    STANDARD.encode(response)
}

/// Decodes a server challenge. Empty or invalid challenges yield `None`.
#[must_use]
pub fn decode_challenge(challenge: Option<&str>) -> Option<Vec<u8>> {
    let text = challenge?.trim();
    if text.is_empty() {
        return None;
    }
    STANDARD.decode(text).ok()
}

/// Error details a server sends as an OAuth2 challenge before failing.
///
/// The payload is JSON: `{"status":"401","schemes":"bearer","scope":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct OAuthError {
    /// HTTP-style status code.
    pub status: String,
    /// Accepted schemes.
    #[serde(default)]
    pub schemes: Option<String>,
    /// Required scope.
    #[serde(default)]
    pub scope: Option<String>,
}

impl OAuthError {
    /// Parses a decoded challenge.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the payload is not an OAuth2 error.
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_format() {
        let mech = SaslMechanism::Plain {
            username: "test".into(),
            password: "pass".into(),
        };
        assert_eq!(mech.initial_response(), b"\0test\0pass");
        assert_eq!(mech.name(), "PLAIN");
    }

    #[test]
    fn test_oauthbearer_format() {
        let mech = SaslMechanism::OAuthBearer {
            user: "test@test.com".into(),
            token: "abc".into(),
        };
        assert_eq!(
            mech.initial_response(),
            b"n,a=test@test.com,\x01auth=Bearer abc\x01\x01"
        );
    }

    #[test]
    fn test_xoauth2_format() {
        let mech = SaslMechanism::XOAuth2 {
            user: "test@test.com".into(),
            token: "abc".into(),
        };
        let encoded = encode_response(&mech.initial_response());
        assert_eq!(
            STANDARD.decode(encoded).unwrap(),
            b"user=test@test.com\x01auth=Bearer abc\x01\x01"
        );
    }

    #[test]
    fn test_debug_hides_secrets() {
        let mech = SaslMechanism::Plain {
            username: "bob".into(),
            password: "hunter2".into(),
        };
        let rendered = format!("{mech:?}");
        assert!(rendered.contains("bob"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_oauth_error_challenge() {
        let json = r#"{"status":"401","schemes":"bearer","scope":"https://mail.google.com/"}"#;
        let challenge = STANDARD.encode(json);
        let payload = decode_challenge(Some(&challenge)).unwrap();
        let error = OAuthError::parse(&payload).unwrap();
        assert_eq!(error.status, "401");
        assert_eq!(error.scope.as_deref(), Some("https://mail.google.com/"));
        assert!(decode_challenge(Some("")).is_none());
        assert!(decode_challenge(None).is_none());
    }
}
