use {
    axum::{
        Extension, Json,
        extract::{Query, State},
        response::{IntoResponse, Response},
    },
    axum_extra::extract::{SignedCookieJar, cookie::Cookie},
    plusgate_oauth::SigningClient,
    serde::Deserialize,
    serde_json::Value,
    tracing::{debug, info, warn},
};

use crate::{
    error::{GatewayError, found},
    identity::{UserIdentity, local_path},
    stages::{OAUTH_STATE_COOKIE, verify_state},
    state::AppState,
};

/// Relay an upstream API response: same status, body as JSON when it parses,
/// otherwise as a JSON string.
async fn relay(resp: reqwest::Response) -> Result<Response, GatewayError> {
    let status = resp.status();
    let body = resp.text().await.map_err(plusgate_oauth::Error::from)?;
    let value = serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body));
    Ok((status, Json(value)).into_response())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn index_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "user": user.0,
        "routes": {
            "/activities_get": "a public activity (API key)",
            "/people_search?query=": "people search (API key)",
            "/plus_me": "your profile (OAuth)",
        },
        "logout": "/logout",
        "oauth_callback": state.config.oauth.redirect_path,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    activity_id: Option<String>,
}

pub async fn activities_get_handler(
    State(state): State<AppState>,
    Extension(client): Extension<SigningClient>,
    Query(query): Query<ActivityQuery>,
) -> Result<Response, GatewayError> {
    let id = query
        .activity_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| state.config.api.activity_id.clone());
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(GatewayError::BadRequest(format!("invalid activity id {id:?}")));
    }

    debug!(activity_id = %id, "fetching activity");
    relay(client.get(&format!("activities/{id}"), &[]).await?).await
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    query: String,
}

pub async fn people_search_handler(
    Extension(client): Extension<SigningClient>,
    Query(search): Query<SearchQuery>,
) -> Result<Response, GatewayError> {
    let query = search.query.trim();
    if query.is_empty() {
        return Ok(Json(serde_json::json!({ "query": "", "items": [] })).into_response());
    }
    relay(client.get("people", &[("query", query)]).await?).await
}

pub async fn plus_me_handler(
    Extension(client): Extension<SigningClient>,
) -> Result<Response, GatewayError> {
    relay(client.get("people/me", &[]).await?).await
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    error: Option<String>,
    code: Option<String>,
    state: Option<String>,
}

/// Where the provider sends the user after the consent screen. The `state`
/// must carry the nonce set by `with_oauth_client` for this browser.
pub async fn oauth_callback_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    jar: SignedCookieJar,
    Query(query): Query<CallbackQuery>,
) -> Result<(SignedCookieJar, Response), GatewayError> {
    if let Some(error) = query.error.filter(|e| !e.is_empty()) {
        return Err(GatewayError::Provider(error));
    }
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| GatewayError::BadRequest("Missing access code".into()))?;
    let back = verify_state(&jar, query.state.as_deref()).ok_or_else(|| {
        warn!(user = %user.0, "callback state does not match this browser");
        GatewayError::BadRequest("Authorization state mismatch".into())
    })?;

    state.factory.exchange()?.complete(&user.0, &code).await?;
    info!(user = %user.0, "oauth authorization completed");
    let target = local_path(Some(back)).to_string();
    Ok((
        jar.remove(Cookie::build(OAUTH_STATE_COOKIE).path("/")),
        found(&target),
    ))
}
