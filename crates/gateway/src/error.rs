use {
    axum::{
        Json,
        http::{StatusCode, header::LOCATION},
        response::{IntoResponse, Response},
    },
    tracing::{error, warn},
};

/// Handler and stage failures, rendered as a status plus `{"error": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Core(#[from] plusgate_oauth::Error),

    /// The provider redirected back with `error=`.
    #[error("{0}")]
    Provider(String),

    #[error("{0}")]
    BadRequest(String),

    /// A stage that needs the signed-in user ran without one.
    #[error("no signed-in user on request")]
    MissingIdentity,
}

/// Marks a response produced from `ReauthorizationRequired`, so the OAuth
/// stage can replace it with a fresh trip to the provider.
#[derive(Debug, Clone, Copy)]
pub struct ReauthorizationNeeded;

/// `302 Found` to `location`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

fn status_for(err: &plusgate_oauth::Error) -> StatusCode {
    use plusgate_oauth::Error;

    match err {
        Error::CredentialNotFound { .. } => StatusCode::NOT_FOUND,
        Error::ReauthorizationRequired => StatusCode::UNAUTHORIZED,
        Error::Transport(_) => StatusCode::BAD_GATEWAY,
        Error::Request(_) => StatusCode::BAD_REQUEST,
        Error::Configuration(_)
        | Error::CredentialExchange(_)
        | Error::Storage(_)
        | Error::PersistFailed { .. }
        | Error::AuthorizationPending { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Core(plusgate_oauth::Error::AuthorizationPending { url }) => {
                return found(url);
            },
            Self::Core(err) => status_for(err),
            Self::Provider(_) | Self::MissingIdentity => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "request rejected");
        }
        let reauthorize = matches!(
            self,
            Self::Core(plusgate_oauth::Error::ReauthorizationRequired)
        );
        let mut resp =
            (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response();
        if reauthorize {
            resp.extensions_mut().insert(ReauthorizationNeeded);
        }
        resp
    }
}
