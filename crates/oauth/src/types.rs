use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
    url::Url,
};

/// Validated OAuth 2.0 client configuration. Built by
/// [`resolve_oauth_config`](crate::defaults::resolve_oauth_config).
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub auth_url: Url,
    pub token_url: Url,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// Extra query parameters for the authorization URL (e.g. `access_type`).
    pub extra_auth_params: Vec<(String, String)>,
}

fn default_token_type() -> String {
    "Bearer".into()
}

/// Access + refresh credential pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds) when the access token expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: None,
            token_type: default_token_type(),
        }
    }

    #[must_use]
    pub fn with_expiry(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the access token expires within `leeway` seconds of `now`.
    /// Tokens without a known expiry are never considered expired.
    pub fn is_expired(&self, now: u64, leeway: u64) -> bool {
        self.expires_at
            .is_some_and(|expiry| expiry <= now.saturating_add(leeway))
    }
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// The at-rest form of a [`TokenPair`], keyed by identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub identity: String,
    pub tokens: TokenPair,
    /// Unix timestamp (seconds) of the write.
    pub updated_at: u64,
}

/// How a Signing Client authenticates its requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMode {
    /// Simple API access: API key in the query string.
    #[serde(rename = "no-auth")]
    NoAuth,
    /// User-authorized access: bearer token with refresh.
    #[serde(rename = "oauth")]
    OAuth,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_with_leeway() {
        let tokens = TokenPair::new("a", "r").with_expiry(1_000);
        assert!(!tokens.is_expired(900, 60));
        assert!(tokens.is_expired(940, 60));
        assert!(tokens.is_expired(2_000, 0));
        assert!(!TokenPair::new("a", "r").is_expired(u64::MAX, 60));
    }

    #[test]
    fn debug_redacts_tokens() {
        let out = format!("{:?}", TokenPair::new("secret-access", "secret-refresh"));
        assert!(!out.contains("secret-access"));
        assert!(!out.contains("secret-refresh"));
    }

    #[test]
    fn token_type_defaults_when_absent() {
        let tokens: TokenPair =
            serde_json::from_str(r#"{"access_token":"a","refresh_token":"r"}"#).unwrap();
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.expires_at, None);
    }
}
