use std::{collections::VecDeque, sync::Mutex};

use {
    async_trait::async_trait,
    reqwest::{Request, Response},
    secrecy::Secret,
    url::Url,
};

use crate::{
    error::{Result, StorageError},
    storage::CredentialStore,
    transport::HttpTransport,
    types::{CredentialRecord, OAuthConfig},
};

/// Client registration whose token endpoint is `{token_base}/token`.
pub fn oauth_config(token_base: &str) -> OAuthConfig {
    OAuthConfig {
        client_id: "client-1".into(),
        client_secret: Secret::new("shh".into()),
        auth_url: Url::parse("https://accounts.example.com/o/oauth2/auth").unwrap(),
        token_url: Url::parse(&format!("{token_base}/token")).unwrap(),
        redirect_uri: "urn:ietf:wg:oauth:2.0:oob".into(),
        scopes: vec!["scope.a".into(), "scope.b".into()],
        extra_auth_params: vec![("access_type".into(), "offline".into())],
    }
}

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub url: String,
    pub authorization: Option<String>,
}

/// Records every request and answers with scripted statuses (200 when the
/// script runs out). The body echoes the authorization header.
#[derive(Default)]
pub struct ScriptedTransport {
    statuses: Mutex<VecDeque<u16>>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl ScriptedTransport {
    pub fn with_statuses(statuses: &[u16]) -> Self {
        Self {
            statuses: Mutex::new(statuses.iter().copied().collect()),
            seen: Mutex::default(),
        }
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let authorization = request
            .headers()
            .get(reqwest::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.seen.lock().unwrap().push(SeenRequest {
            url: request.url().to_string(),
            authorization: authorization.clone(),
        });

        let status = self.statuses.lock().unwrap().pop_front().unwrap_or(200);
        let resp = http::Response::builder()
            .status(status)
            .body(authorization.unwrap_or_default())
            .unwrap();
        Ok(Response::from(resp))
    }
}

/// A store whose backend is always down.
pub struct FailingStore;

fn backend_down() -> StorageError {
    StorageError::Backend("backend unavailable".into())
}

#[async_trait]
impl CredentialStore for FailingStore {
    async fn load_record(
        &self,
        _identity: &str,
    ) -> std::result::Result<Option<CredentialRecord>, StorageError> {
        Err(backend_down())
    }

    async fn save_record(&self, _record: &CredentialRecord) -> std::result::Result<(), StorageError> {
        Err(backend_down())
    }

    async fn delete(&self, _identity: &str) -> std::result::Result<(), StorageError> {
        Err(backend_down())
    }

    async fn list(&self) -> std::result::Result<Vec<String>, StorageError> {
        Err(backend_down())
    }
}
