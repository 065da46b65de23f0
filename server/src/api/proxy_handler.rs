use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use super::error::proxy_error;
use super::extract::CurrentSession;
use super::state::AppState;

/// Forward `/api/*` to the upstream v1 API on behalf of the signed-in user
pub async fn proxy_handler(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(session) = session else {
        return proxy_error(StatusCode::UNAUTHORIZED, "Session non trouvée");
    };

    let forwarded = state
        .proxy
        .forward(
            &session.user.provider_id,
            method,
            uri.path(),
            uri.query(),
            &headers,
            body,
        )
        .await;

    match forwarded {
        Ok(upstream) if upstream.body == Value::Null => upstream.status.into_response(),
        Ok(upstream) => (upstream.status, Json(upstream.body)).into_response(),
        Err(err) => err.into_response(),
    }
}
