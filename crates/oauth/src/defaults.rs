//! Turning the loaded configuration into validated core types.

use {
    plusgate_config::{OAuthSettings, PlusgateConfig, StorageSettings},
    secrecy::{ExposeSecret, Secret},
    url::Url,
};

use crate::{
    cipher::TokenCipher,
    error::{Error, Result},
    types::OAuthConfig,
};

/// The API key for simple access. Missing and empty are the same failure.
pub fn resolve_api_key(config: &PlusgateConfig) -> Result<Secret<String>> {
    match &config.api_key {
        Some(key) if !key.expose_secret().trim().is_empty() => Ok(key.clone()),
        _ => Err(Error::config("no API key supplied (set api_key or PLUSGATE_API_KEY)")),
    }
}

/// Validate the OAuth client registration against `redirect_uri`.
///
/// Priority for every field is config file, then environment override
/// (already applied by the loader), then the built-in Google defaults.
pub fn resolve_oauth_config(settings: &OAuthSettings, redirect_uri: &str) -> Result<OAuthConfig> {
    let client_id = settings
        .client_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::config("oauth.client_id is not set"))?;

    let client_secret = settings
        .client_secret
        .as_ref()
        .filter(|s| !s.expose_secret().trim().is_empty())
        .cloned()
        .ok_or_else(|| Error::config("oauth.client_secret is not set"))?;

    let auth_url = parse_endpoint("oauth.auth_url", &settings.auth_url)?;
    let token_url = parse_endpoint("oauth.token_url", &settings.token_url)?;

    if redirect_uri.trim().is_empty() {
        return Err(Error::config("oauth redirect URI is empty"));
    }
    if settings.scopes.is_empty() {
        return Err(Error::config("oauth.scopes is empty"));
    }

    let mut extra_auth_params = Vec::new();
    if let Some(access_type) = &settings.access_type {
        extra_auth_params.push(("access_type".to_string(), access_type.clone()));
    }
    if let Some(prompt) = &settings.approval_prompt {
        extra_auth_params.push(("approval_prompt".to_string(), prompt.clone()));
    }

    Ok(OAuthConfig {
        client_id: client_id.to_string(),
        client_secret,
        auth_url,
        token_url,
        redirect_uri: redirect_uri.to_string(),
        scopes: settings.scopes.clone(),
        extra_auth_params,
    })
}

fn parse_endpoint(field: &str, value: &str) -> Result<Url> {
    let url = Url::parse(value).map_err(|e| Error::config(format!("{field} is invalid: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::config(format!("{field} has unsupported scheme {other}"))),
    }
}

/// The file cipher, when an encryption key is configured.
pub fn resolve_cipher(storage: &StorageSettings) -> Result<Option<TokenCipher>> {
    storage
        .encryption_key
        .as_ref()
        .map(|key| TokenCipher::from_base64(key.expose_secret()))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> OAuthSettings {
        OAuthSettings {
            client_id: Some("client-1".into()),
            client_secret: Some(Secret::new("shh".into())),
            approval_prompt: Some("force".into()),
            ..OAuthSettings::default()
        }
    }

    #[test]
    fn resolves_with_google_defaults() {
        let config = resolve_oauth_config(&settings(), "urn:ietf:wg:oauth:2.0:oob").unwrap();
        assert_eq!(config.client_id, "client-1");
        assert_eq!(config.auth_url.host_str(), Some("accounts.google.com"));
        assert_eq!(config.token_url.path(), "/o/oauth2/token");
        assert_eq!(config.extra_auth_params, vec![
            ("access_type".to_string(), "offline".to_string()),
            ("approval_prompt".to_string(), "force".to_string()),
        ]);
    }

    #[test]
    fn missing_client_fields_are_configuration_errors() {
        let mut no_id = settings();
        no_id.client_id = Some("  ".into());
        let err = resolve_oauth_config(&no_id, "urn:x").unwrap_err();
        assert!(err.to_string().contains("client_id"));

        let mut no_secret = settings();
        no_secret.client_secret = None;
        let err = resolve_oauth_config(&no_secret, "urn:x").unwrap_err();
        assert!(err.to_string().contains("client_secret"));

        assert!(matches!(
            resolve_oauth_config(&settings(), "").unwrap_err(),
            Error::Configuration(_)
        ));
    }

    #[test]
    fn endpoints_must_be_http_urls() {
        let mut bad = settings();
        bad.token_url = "not a url".into();
        let err = resolve_oauth_config(&bad, "urn:x").unwrap_err();
        assert!(err.to_string().contains("oauth.token_url"));

        bad.token_url = "ftp://accounts.example.com/token".into();
        assert!(resolve_oauth_config(&bad, "urn:x").is_err());
    }

    #[test]
    fn api_key_must_be_present() {
        let mut config = PlusgateConfig::default();
        assert!(resolve_api_key(&config).is_err());
        config.api_key = Some(Secret::new(String::new()));
        assert!(resolve_api_key(&config).is_err());
        config.api_key = Some(Secret::new("k1".into()));
        assert_eq!(resolve_api_key(&config).unwrap().expose_secret(), "k1");
    }

    #[test]
    fn cipher_is_optional() {
        assert!(resolve_cipher(&StorageSettings::default()).unwrap().is_none());
        let bad = StorageSettings {
            encryption_key: Some(Secret::new("short".into())),
            ..StorageSettings::default()
        };
        assert!(resolve_cipher(&bad).is_err());
    }
}
