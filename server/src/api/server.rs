use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{any, get, post};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth_handlers::{
    callback_handler, session_handler, signin_discord_handler, signin_handler, signout_handler,
    signout_page_handler,
};
use super::dolibarr_handlers::{create_event_handler, list_events_handler};
use super::pages::{
    EVENTS_PAGE_PATH, create_event_form_handler, events_page_handler, home_handler,
};
use super::proxy_handler::proxy_handler;
use super::state::AppState;
use crate::auth::SessionManager;

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(5 * 60);

fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/signin", get(signin_handler))
        .route("/signin/discord", get(signin_discord_handler))
        .route("/callback/discord", get(callback_handler))
        .route("/signout", get(signout_page_handler).post(signout_handler))
        .route("/session", get(session_handler))
}

pub fn build_router(state: AppState) -> Router {
    let auth_path = state.config.settings.server.auth_path.clone();

    Router::new()
        .route("/", get(home_handler))
        .route(
            EVENTS_PAGE_PATH,
            get(events_page_handler).post(create_event_form_handler),
        )
        .route("/api/dolibarr/event", post(create_event_handler))
        .route("/api/dolibarr/events", get(list_events_handler))
        .route("/api/{*path}", any(proxy_handler))
        .nest(&auth_path, auth_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any).allow_methods(Any))
        .with_state(state)
}

pub async fn run_api(state: AppState, shutdown: CancellationToken) -> Result<()> {
    let bind_address = state.config.settings.server.bind_address.clone();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    tracing::info!(address = %bind_address, "Listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

/// Periodically drop expired sessions and abandoned sign-in attempts
pub async fn run_session_janitor(
    sessions: Arc<SessionManager>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let removed = sessions.purge_expired()?;
                if removed > 0 {
                    tracing::debug!(removed, "Purged expired sessions");
                }
            }
            _ = shutdown.cancelled() => return Ok(()),
        }
    }
}
