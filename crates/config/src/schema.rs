/// Config schema types (API key, OAuth client, wrapped API, gateway, storage).
use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

/// Google's standard OAuth 2.0 endpoints, used when the config leaves them out.
pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.google.com/o/oauth2/token";
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/plus.me";
pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/plus/v1/";
/// A public activity shown by the `activities.get` action when none is given.
pub const DEFAULT_ACTIVITY_ID: &str = "z12gtjhq3qn2xxl2o224exwiqruvtda0i";
/// Out-of-band redirect: the provider shows the code to the user instead of redirecting.
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlusgateConfig {
    /// Simple API access key, appended to unauthenticated requests.
    pub api_key: Option<Secret<String>>,
    pub oauth: OAuthSettings,
    pub api: ApiSettings,
    pub gateway: GatewaySettings,
    pub storage: StorageSettings,
}

/// OAuth client registration for protected user data access.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<Secret<String>>,
    pub auth_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,

    /// Path in the web app that receives the provider's redirect.
    pub redirect_path: String,
    /// Scheme, host and port of the app on the local development server.
    pub dev_root_url: Option<String>,
    /// Scheme, host and port of the deployed app.
    pub prod_root_url: Option<String>,
    /// Redirect URI used by the CLI. The web app derives its own.
    pub redirect_uri: String,

    pub access_type: Option<String>,
    pub approval_prompt: Option<String>,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            auth_url: DEFAULT_AUTH_URL.into(),
            token_url: DEFAULT_TOKEN_URL.into(),
            scopes: vec![DEFAULT_SCOPE.into()],
            redirect_path: "/oauth2callback".into(),
            dev_root_url: None,
            prod_root_url: None,
            redirect_uri: OOB_REDIRECT_URI.into(),
            access_type: Some("offline".into()),
            approval_prompt: None,
        }
    }
}

/// The wrapped API.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub activity_id: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.into(),
            activity_id: DEFAULT_ACTIVITY_ID.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub bind: String,
    pub port: u16,
    pub environment: Environment,
    /// sqlx connection string for the credential database.
    pub database_url: String,
    /// Where users without an identity cookie are sent.
    pub login_path: String,
    /// Base64 key (at least 64 bytes) signing the identity cookie. A random
    /// per-process key is used when unset, so logins do not survive restarts.
    pub cookie_key: Option<Secret<String>>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8080,
            environment: Environment::Development,
            database_url: "sqlite://plusgate.db?mode=rwc".into(),
            login_path: "/login".into(),
            cookie_key: None,
        }
    }
}

/// Local (CLI) credential persistence.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// File holding the OAuth tokens. No persistence when unset.
    pub token_path: Option<String>,
    /// Base64-encoded 32-byte key. Tokens are stored in plain text when unset.
    pub encryption_key: Option<Secret<String>>,
}

impl PlusgateConfig {
    /// Redirect URI registered for the web app: the root URL for the current
    /// environment with its path replaced by `oauth.redirect_path`.
    pub fn web_redirect_uri(&self) -> anyhow::Result<String> {
        let root = match self.gateway.environment {
            Environment::Development => self.oauth.dev_root_url.as_deref(),
            Environment::Production => self.oauth.prod_root_url.as_deref(),
        }
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no root URL configured for the {:?} environment",
                self.gateway.environment
            )
        })?;

        let mut url = url::Url::parse(root)
            .map_err(|e| anyhow::anyhow!("invalid root URL {root}: {e}"))?;
        url.set_path(&self.oauth.redirect_path);
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_google() {
        let cfg = PlusgateConfig::default();
        assert_eq!(cfg.oauth.auth_url, DEFAULT_AUTH_URL);
        assert_eq!(cfg.oauth.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(cfg.oauth.redirect_uri, OOB_REDIRECT_URI);
        assert_eq!(cfg.api.base_url, DEFAULT_API_BASE_URL);
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn web_redirect_uri_follows_environment() {
        let mut cfg = PlusgateConfig::default();
        cfg.oauth.dev_root_url = Some("http://localhost:8080".into());
        cfg.oauth.prod_root_url = Some("https://plusgate.example.com/ignored".into());

        assert_eq!(
            cfg.web_redirect_uri().unwrap(),
            "http://localhost:8080/oauth2callback"
        );

        cfg.gateway.environment = Environment::Production;
        assert_eq!(
            cfg.web_redirect_uri().unwrap(),
            "https://plusgate.example.com/oauth2callback"
        );
    }

    #[test]
    fn web_redirect_uri_requires_root() {
        let cfg = PlusgateConfig::default();
        let err = cfg.web_redirect_uri().unwrap_err();
        assert!(err.to_string().contains("Development"));
    }
}
