//! Builders shared by unit and integration tests

use anyhow::{Context, Result};
use axum::Router;

use crate::api::AppState;
use crate::api::extract::SESSION_COOKIE;
use crate::auth::User;
use crate::config::{Config, DiscordSettings, NodeEnv, ServerEnv, Settings};

/// 32-byte proxy token key, hex encoded
pub const TEST_API_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

pub const TEST_AUTH_SECRET: &str = "test-auth-secret";

/// Environment pointing the proxy at `url_v1`, with Dolibarr unset
pub fn test_env(url_v1: &str) -> ServerEnv {
    ServerEnv {
        node_env: NodeEnv::Test,
        discord_id: "test-client-id".to_string(),
        discord_secret: "test-client-secret".to_string(),
        discord_token: "test-bot-token".to_string(),
        discord_guild_id: "42".to_string(),
        auth_secret: TEST_AUTH_SECRET.to_string(),
        auth_trust_host: false,
        auth_url: None,
        dolibarr_url: None,
        dolibarr_api_key: None,
        api_key: TEST_API_KEY.to_string(),
        url_v1: url_v1.trim_end_matches('/').to_string(),
    }
}

pub fn test_config(env: ServerEnv) -> Config {
    Config {
        env,
        settings: Settings::default(),
    }
}

/// Point the Discord OAuth and profile endpoints at a mock server
pub fn mock_discord_settings(base_url: &str) -> DiscordSettings {
    DiscordSettings {
        authorize_url: format!("{}/oauth2/authorize", base_url),
        token_url: format!("{}/api/oauth2/token", base_url),
        api_base: format!("{}/api", base_url),
        ..DiscordSettings::default()
    }
}

/// Open a session for `user` and return the matching `Cookie` header value
pub fn sign_in(state: &AppState, user: User) -> Result<String> {
    let session = state
        .sessions
        .create_session(user, "discord-access-token".to_string())?;
    let value = state.sessions.cookie_value(&session.id)?;
    Ok(format!("{}={}", SESSION_COOKIE, value))
}

/// Serve `router` on an ephemeral local port, returning its base URL
pub async fn spawn_mock(router: Router) -> Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("Failed to bind mock server")?;
    let address = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router).await {
            tracing::error!(error = %err, "Mock server failed");
        }
    });

    Ok(format!("http://{}", address))
}

/// Collect a response body as JSON
pub async fn response_json(response: axum::response::Response) -> Result<serde_json::Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    serde_json::from_slice(&bytes).context("Response body is not JSON")
}

/// Collect a response body as text
pub async fn response_text(response: axum::response::Response) -> Result<String> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}
