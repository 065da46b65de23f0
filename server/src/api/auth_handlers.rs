//! Authentication HTTP handlers for the Discord OAuth flow

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use super::extract::{CurrentSession, expired_session_cookie, session_cookie};
use super::pages::{escape_html, page};
use super::state::AppState;
use crate::auth::{PendingLogin, User};
use crate::config::ServerEnv;

/// `?callbackUrl=` accepted by the sign-in routes
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInParams {
    #[serde(default)]
    pub callback_url: Option<String>,
}

/// OAuth callback parameters
#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by Discord when the user denies consent
    pub error: Option<String>,
}

/// Body of `GET {auth_path}/session`
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SessionStatus {
    Authenticated { user: User, expires: DateTime<Utc> },
    Unauthenticated,
}

/// Public origin used to build the OAuth redirect URI
///
/// `AUTH_URL` wins; request headers are only trusted when `AUTH_TRUST_HOST`
/// is set.
pub fn public_base_url(env: &ServerEnv, headers: &HeaderMap) -> Option<String> {
    if let Some(url) = &env.auth_url {
        return Some(url.origin().ascii_serialization());
    }
    if !env.auth_trust_host {
        return None;
    }

    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let host = header_str("x-forwarded-host").or_else(|| header_str(header::HOST.as_str()))?;
    let proto = header_str("x-forwarded-proto").unwrap_or("http");

    Some(format!("{}://{}", proto, host))
}

/// Restrict post-login redirects to same-site relative paths
pub fn safe_callback_url(raw: Option<&str>) -> String {
    match raw {
        Some(url) if url.starts_with('/') && !url.starts_with("//") && !url.contains('\\') => {
            url.to_string()
        }
        _ => "/".to_string(),
    }
}

fn failure_page(status: StatusCode, message: &str) -> Response {
    let body = format!(
        "<h1>Authentication Failed</h1>\n        <p>{}</p>\n        <a href=\"/\">Back</a>",
        escape_html(message)
    );
    (status, Html(page("Authentication Failed", &body))).into_response()
}

/// Handler for the sign-in page
pub async fn signin_handler(
    State(state): State<AppState>,
    Query(params): Query<SignInParams>,
) -> Html<String> {
    let callback_url = safe_callback_url(params.callback_url.as_deref());
    let encoded: String = form_urlencoded::byte_serialize(callback_url.as_bytes()).collect();

    let body = format!(
        r#"<h1>Sign in to Valhalla</h1>
        <p>Use your Discord account to continue.</p>
        <a href="{}/signin/discord?callbackUrl={}" class="button">Sign in with Discord</a>"#,
        state.config.settings.server.auth_path, encoded
    );

    Html(page("Sign in", &body))
}

/// Handler for initiating Discord login
///
/// Stores the CSRF state and PKCE verifier, then redirects to Discord.
pub async fn signin_discord_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SignInParams>,
) -> Response {
    let Some(base_url) = public_base_url(&state.config.env, &headers) else {
        tracing::error!("Cannot build redirect URI: AUTH_URL unset and AUTH_TRUST_HOST disabled");
        return failure_page(StatusCode::INTERNAL_SERVER_ERROR, "Server URL is not configured.");
    };
    let redirect_uri = format!(
        "{}{}/callback/discord",
        base_url, state.config.settings.server.auth_path
    );

    let request = match state.discord.authorization_url(&redirect_uri) {
        Ok(request) => request,
        Err(err) => {
            tracing::error!(error = %err, "Failed to generate authorization URL");
            return failure_page(StatusCode::INTERNAL_SERVER_ERROR, "Failed to initiate login.");
        }
    };

    let login = PendingLogin {
        state: request.state,
        pkce_verifier: request.pkce_verifier,
        redirect_uri,
        callback_url: safe_callback_url(params.callback_url.as_deref()),
        created_at: Utc::now(),
    };
    if let Err(err) = state.sessions.store_pending_login(login) {
        tracing::error!(error = %err, "Failed to store pending login");
        return failure_page(StatusCode::INTERNAL_SERVER_ERROR, "Failed to initiate login.");
    }

    Redirect::to(&request.url).into_response()
}

/// Handler for the Discord OAuth callback
///
/// Exchanges the authorization code, loads the profile and opens a session.
pub async fn callback_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<OAuthCallback>,
) -> Response {
    if let Some(error) = params.error {
        tracing::warn!(error = %error, "Discord refused authorization");
        return failure_page(StatusCode::BAD_REQUEST, "Discord did not authorize the login.");
    }

    let pending = match params.state.as_deref() {
        Some(csrf_state) => state.sessions.take_pending_login(csrf_state),
        None => Ok(None),
    };
    let login = match pending {
        Ok(Some(login)) => login,
        Ok(None) => {
            tracing::warn!("OAuth callback with unknown or expired state");
            return failure_page(StatusCode::BAD_REQUEST, "Login attempt expired, please retry.");
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to read pending login");
            return failure_page(StatusCode::INTERNAL_SERVER_ERROR, "Failed to complete login.");
        }
    };

    let Some(code) = params.code else {
        return failure_page(StatusCode::BAD_REQUEST, "Missing authorization code.");
    };

    let access_token = match state
        .discord
        .exchange_code(code, login.pkce_verifier, &login.redirect_uri)
        .await
    {
        Ok(token) => token,
        Err(err) => {
            tracing::error!(error = %err, "Failed to exchange authorization code");
            return failure_page(StatusCode::BAD_GATEWAY, "Failed to exchange authorization code.");
        }
    };

    let profile = match state.discord.get_user_profile(&access_token).await {
        Ok(profile) => profile,
        Err(err) => {
            tracing::error!(error = %err, "Failed to fetch user profile");
            return failure_page(StatusCode::BAD_GATEWAY, "Failed to fetch user profile.");
        }
    };

    let user = match User::from_profile(&profile) {
        Ok(user) => user,
        Err(err) => {
            tracing::error!(error = %err, username = %profile.username, "Unusable Discord profile");
            return failure_page(StatusCode::BAD_GATEWAY, "Failed to identify Discord account.");
        }
    };

    let cookie_value = state
        .sessions
        .create_session(user, access_token)
        .and_then(|session| {
            tracing::info!(
                provider_id = %session.user.provider_id,
                name = %session.user.name,
                "User authenticated"
            );
            state.sessions.cookie_value(&session.id)
        });
    let cookie_value = match cookie_value {
        Ok(value) => value,
        Err(err) => {
            tracing::error!(error = %err, "Failed to create session");
            return failure_page(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session.");
        }
    };

    let secure = state.config.env.node_env.is_production();
    let jar = jar.add(session_cookie(cookie_value, secure));

    (jar, Redirect::to(&login.callback_url)).into_response()
}

/// Handler for the sign-out confirmation page
///
/// Signing out only happens on POST, so a cross-site link cannot end a session.
pub async fn signout_page_handler(State(state): State<AppState>) -> Html<String> {
    let body = format!(
        r#"<h1>Sign out</h1>
        <p>Are you sure you want to sign out?</p>
        <form method="post" action="{}/signout">
            <button type="submit" class="button">Sign out</button>
        </form>"#,
        state.config.settings.server.auth_path
    );

    Html(page("Sign out", &body))
}

/// Handler for sign-out
pub async fn signout_handler(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    jar: CookieJar,
) -> Response {
    if let Some(session) = session {
        if let Err(err) = state.sessions.delete_session(&session.id) {
            tracing::error!(error = %err, "Failed to delete session");
        } else {
            tracing::info!(provider_id = %session.user.provider_id, "User signed out");
        }
    }

    (jar.remove(expired_session_cookie()), Redirect::to("/")).into_response()
}

/// Handler describing the caller's session
pub async fn session_handler(CurrentSession(session): CurrentSession) -> Json<SessionStatus> {
    Json(match session {
        Some(session) => SessionStatus::Authenticated {
            user: session.user,
            expires: session.expires_at,
        },
        None => SessionStatus::Unauthenticated,
    })
}
