//! Authorization URL construction and token endpoint calls
//! (`authorization_code` and `refresh_token` grants).

use std::sync::Arc;

use {
    reqwest::{
        Method, Request, Response, StatusCode,
        header::{ACCEPT, CONTENT_TYPE, HeaderValue},
    },
    secrecy::ExposeSecret,
    serde::Deserialize,
    tracing::{debug, warn},
    url::{Url, form_urlencoded},
};

use crate::{
    clock::{Clock, SystemClock},
    error::{Error, Result},
    transport::HttpTransport,
    types::{OAuthConfig, TokenPair},
};

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    token_type: Option<String>,
}

#[derive(Deserialize, Default)]
struct TokenErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Why a token endpoint call failed.
enum Failure {
    /// The endpoint answered with a client error (bad code, revoked grant).
    Rejected(String),
    /// Network failure, server error, or an unparseable answer.
    Broken(String),
}

/// OAuth client for one provider registration.
pub struct OAuthFlow {
    config: Arc<OAuthConfig>,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
}

impl OAuthFlow {
    pub fn new(config: Arc<OAuthConfig>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config,
            transport,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// The URL the user visits to grant access. `state` comes back unchanged
    /// on the redirect.
    pub fn authorization_url(&self, state: &str) -> Url {
        let mut url = self.config.auth_url.clone();
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("response_type", "code")
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", &self.config.redirect_uri)
                .append_pair("scope", &self.config.scopes.join(" "))
                .append_pair("state", state);
            for (k, v) in &self.config.extra_auth_params {
                q.append_pair(k, v);
            }
        }
        url
    }

    /// Swap an authorization code for a token pair.
    pub async fn exchange(&self, code: &str) -> Result<TokenPair> {
        let code = code.trim();
        if code.is_empty() {
            return Err(Error::exchange("empty authorization code"));
        }

        debug!(token_url = %self.config.token_url, "exchanging authorization code");
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret().as_str()),
        ];

        let resp = self.post_token(&params).await.map_err(failure_to_exchange)?;
        let tokens = match resp.refresh_token.clone() {
            Some(refresh) => self.pair_from(resp, refresh),
            None => {
                warn!("token endpoint returned no refresh token; refresh will not be possible");
                self.pair_from(resp, String::new())
            },
        };
        Ok(tokens)
    }

    /// Use the refresh token in `current` to get a new access token. The
    /// returned pair keeps the old refresh token if the provider sends none.
    ///
    /// A rejected refresh token yields [`Error::ReauthorizationRequired`].
    pub async fn refresh(&self, current: &TokenPair) -> Result<TokenPair> {
        if current.refresh_token.is_empty() {
            return Err(Error::ReauthorizationRequired);
        }

        debug!(token_url = %self.config.token_url, "refreshing access token");
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", current.refresh_token.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret().as_str()),
        ];

        match self.post_token(&params).await {
            Ok(resp) => {
                let refresh = resp
                    .refresh_token
                    .clone()
                    .unwrap_or_else(|| current.refresh_token.clone());
                Ok(self.pair_from(resp, refresh))
            },
            Err(Failure::Rejected(msg)) => {
                warn!(reason = %msg, "refresh token rejected");
                Err(Error::ReauthorizationRequired)
            },
            Err(Failure::Broken(msg)) => Err(Error::CredentialExchange(msg)),
        }
    }

    fn pair_from(&self, resp: TokenResponse, refresh_token: String) -> TokenPair {
        TokenPair {
            access_token: resp.access_token,
            refresh_token,
            expires_at: resp
                .expires_in
                .map(|secs| self.clock.now().saturating_add(secs)),
            token_type: resp.token_type.unwrap_or_else(|| "Bearer".into()),
        }
    }

    async fn post_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse, Failure> {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();

        let mut req = Request::new(Method::POST, self.config.token_url.clone());
        req.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        req.headers_mut()
            .insert(ACCEPT, HeaderValue::from_static("application/json"));
        *req.body_mut() = Some(body.into());

        let resp = self
            .transport
            .send(req)
            .await
            .map_err(|e| Failure::Broken(format!("token endpoint request failed: {e}")))?;
        parse_token_response(resp).await
    }
}

async fn parse_token_response(resp: Response) -> Result<TokenResponse, Failure> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| Failure::Broken(format!("token response read failed: {e}")))?;

    if !status.is_success() {
        let detail: TokenErrorResponse = serde_json::from_str(&body).unwrap_or_default();
        let mut msg = format!("token endpoint returned status={}", status.as_u16());
        if let Some(code) = detail.error {
            msg.push_str(" error=");
            msg.push_str(&code);
        }
        if let Some(desc) = detail.error_description {
            msg.push_str(" description=");
            msg.extend(desc.chars().take(240));
        }
        return Err(if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            Failure::Rejected(msg)
        } else {
            Failure::Broken(msg)
        });
    }

    let parsed: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| Failure::Broken(format!("token response json invalid: {e}")))?;
    if parsed.access_token.trim().is_empty() {
        return Err(Failure::Broken("token response missing access_token".into()));
    }
    Ok(parsed)
}

fn failure_to_exchange(f: Failure) -> Error {
    match f {
        Failure::Rejected(msg) | Failure::Broken(msg) => Error::CredentialExchange(msg),
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{clock::FixedClock, test_support::oauth_config, transport::ReqwestTransport},
    };

    fn flow(server_url: &str) -> OAuthFlow {
        OAuthFlow::new(
            Arc::new(oauth_config(server_url)),
            Arc::new(ReqwestTransport::default()),
        )
        .with_clock(Arc::new(FixedClock(1_000)))
    }

    #[test]
    fn authorization_url_carries_client_and_state() {
        let url = flow("http://unused").authorization_url("/plus_me");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |k: &str| {
            pairs
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(url.host_str(), Some("accounts.example.com"));
        assert_eq!(get("response_type"), Some("code"));
        assert_eq!(get("client_id"), Some("client-1"));
        assert_eq!(get("redirect_uri"), Some("urn:ietf:wg:oauth:2.0:oob"));
        assert_eq!(get("scope"), Some("scope.a scope.b"));
        assert_eq!(get("state"), Some("/plus_me"));
        assert_eq!(get("access_type"), Some("offline"));
    }

    #[tokio::test]
    async fn exchange_posts_code_and_parses_tokens() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                mockito::Matcher::UrlEncoded("code".into(), "CODE1".into()),
                mockito::Matcher::UrlEncoded("client_secret".into(), "shh".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"acc","refresh_token":"ref","expires_in":3600}"#)
            .create_async()
            .await;

        let tokens = flow(&server.url()).exchange("CODE1").await.unwrap();
        mock.assert_async().await;
        assert_eq!(tokens.access_token, "acc");
        assert_eq!(tokens.refresh_token, "ref");
        assert_eq!(tokens.expires_at, Some(4_600));
        assert_eq!(tokens.token_type, "Bearer");
    }

    #[tokio::test]
    async fn exchange_rejected_code_is_exchange_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let err = flow(&server.url()).exchange("bad").await.unwrap_err();
        match err {
            Error::CredentialExchange(msg) => assert!(msg.contains("invalid_grant")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn exchange_rejects_empty_code() {
        let err = flow("http://unused").exchange("  ").await.unwrap_err();
        assert!(matches!(err, Error::CredentialExchange(_)));
    }

    #[tokio::test]
    async fn refresh_keeps_old_refresh_token() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .match_body(mockito::Matcher::UrlEncoded(
                "refresh_token".into(),
                "ref".into(),
            ))
            .with_status(200)
            .with_body(r#"{"access_token":"fresh","expires_in":60}"#)
            .create_async()
            .await;

        let current = TokenPair::new("stale", "ref");
        let tokens = flow(&server.url()).refresh(&current).await.unwrap();
        assert_eq!(tokens.access_token, "fresh");
        assert_eq!(tokens.refresh_token, "ref");
        assert_eq!(tokens.expires_at, Some(1_060));
    }

    #[tokio::test]
    async fn refresh_rejected_requires_reauthorization() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant","error_description":"Token has been revoked."}"#)
            .create_async()
            .await;

        let err = flow(&server.url())
            .refresh(&TokenPair::new("stale", "revoked"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ReauthorizationRequired));
    }

    #[tokio::test]
    async fn refresh_server_error_is_exchange_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(503)
            .create_async()
            .await;

        let err = flow(&server.url())
            .refresh(&TokenPair::new("stale", "ref"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CredentialExchange(_)));
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_requires_reauthorization() {
        let err = flow("http://unused")
            .refresh(&TokenPair::new("stale", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ReauthorizationRequired));
    }
}
