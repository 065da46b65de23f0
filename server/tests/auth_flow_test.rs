use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower::ServiceExt;
use url::Url;
use valhalla::api::{AppState, build_router};
use valhalla::test_helpers::{
    mock_discord_settings, response_json, response_text, spawn_mock, test_config, test_env,
};

async fn mock_discord() -> Result<String> {
    let router = Router::new()
        .route(
            "/api/oauth2/token",
            post(|| async {
                Json(json!({
                    "access_token": "discord-access-token",
                    "token_type": "bearer",
                    "expires_in": 604800,
                    "refresh_token": "discord-refresh-token",
                    "scope": "identify email"
                }))
            }),
        )
        .route(
            "/api/users/@me",
            get(|| async {
                Json(json!({
                    "id": "80351110224678912",
                    "username": "nelly",
                    "global_name": "Nelly",
                    "discriminator": "0",
                    "avatar": "8342729096ea3675442027381ff50dfe",
                    "email": "nelly@example.com"
                }))
            }),
        );
    spawn_mock(router).await
}

async fn setup() -> Result<AppState> {
    let discord_url = mock_discord().await?;
    let mut env = test_env("http://127.0.0.1:1");
    env.auth_url = Some(Url::parse("http://localhost:8000")?);

    let mut config = test_config(env);
    config.settings.discord = mock_discord_settings(&discord_url);
    AppState::from_config(config)
}

fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn get_with_cookie(state: &AppState, uri: &str, cookie: Option<&str>) -> Result<Response> {
    let mut builder = Request::get(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    Ok(build_router(state.clone())
        .oneshot(builder.body(Body::empty())?)
        .await?)
}

/// Run sign-in up to the callback and return the session cookie pair
async fn sign_in_through_discord(state: &AppState) -> Result<String> {
    let response = get_with_cookie(state, "/auth/signin/discord?callbackUrl=/events", None).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let authorize = Url::parse(&location(&response))?;
    assert!(authorize.path().ends_with("/oauth2/authorize"));
    let param = |name: &str| {
        authorize
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    };
    assert_eq!(param("response_type").as_deref(), Some("code"));
    assert_eq!(param("client_id").as_deref(), Some("test-client-id"));
    assert_eq!(param("code_challenge_method").as_deref(), Some("S256"));
    assert_eq!(param("scope").as_deref(), Some("identify email"));
    assert_eq!(
        param("redirect_uri").as_deref(),
        Some("http://localhost:8000/auth/callback/discord")
    );
    let csrf_state = param("state").expect("state parameter");

    let response = get_with_cookie(
        state,
        &format!("/auth/callback/discord?code=abc&state={}", csrf_state),
        None,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/events");

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("session cookie")
        .to_string();
    assert!(set_cookie.starts_with("valhalla.session-token="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Path=/"));

    Ok(set_cookie
        .split(';')
        .next()
        .unwrap_or_default()
        .to_string())
}

#[tokio::test]
async fn full_sign_in_flow() -> Result<()> {
    let state = setup().await?;
    let cookie = sign_in_through_discord(&state).await?;

    let response = get_with_cookie(&state, "/auth/session", Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let session = response_json(response).await?;
    assert_eq!(session["status"], "authenticated");
    assert_eq!(session["user"]["name"], "Nelly");
    assert_eq!(session["user"]["providerId"], "80351110224678912");
    assert_eq!(session["user"]["email"], "nelly@example.com");
    assert_eq!(
        session["user"]["image"],
        "https://cdn.discordapp.com/avatars/80351110224678912/8342729096ea3675442027381ff50dfe.png"
    );

    let response = get_with_cookie(&state, "/", Some(&cookie)).await?;
    let html = response_text(response).await?;
    assert!(html.contains("Welcome Nelly"));

    let response = get_with_cookie(&state, "/auth/signout", Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let html = response_text(response).await?;
    assert!(html.contains(r#"<form method="post" action="/auth/signout">"#));
    assert_eq!(state.sessions.session_count()?, 1);

    let response = build_router(state.clone())
        .oneshot(
            Request::post("/auth/signout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let response = get_with_cookie(&state, "/auth/session", Some(&cookie)).await?;
    assert_eq!(
        response_json(response).await?,
        json!({"status": "unauthenticated"})
    );
    assert_eq!(state.sessions.session_count()?, 0);
    Ok(())
}

#[tokio::test]
async fn callback_state_is_single_use() -> Result<()> {
    let state = setup().await?;

    let response = get_with_cookie(&state, "/auth/signin/discord", None).await?;
    let authorize = Url::parse(&location(&response))?;
    let csrf_state = authorize
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .expect("state parameter");
    let callback = format!("/auth/callback/discord?code=abc&state={}", csrf_state);

    let response = get_with_cookie(&state, &callback, None).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let response = get_with_cookie(&state, &callback, None).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn callback_rejects_unknown_state() -> Result<()> {
    let state = setup().await?;

    let response =
        get_with_cookie(&state, "/auth/callback/discord?code=abc&state=forged", None).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    Ok(())
}

#[tokio::test]
async fn callback_reports_denied_consent() -> Result<()> {
    let state = setup().await?;

    let response =
        get_with_cookie(&state, "/auth/callback/discord?error=access_denied", None).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn foreign_callback_url_is_ignored() -> Result<()> {
    let state = setup().await?;

    let response = get_with_cookie(
        &state,
        "/auth/signin/discord?callbackUrl=https://evil.example/",
        None,
    )
    .await?;
    let authorize = Url::parse(&location(&response))?;
    let csrf_state = authorize
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .expect("state parameter");

    let response = get_with_cookie(
        &state,
        &format!("/auth/callback/discord?code=abc&state={}", csrf_state),
        None,
    )
    .await?;
    assert_eq!(location(&response), "/");
    Ok(())
}

#[tokio::test]
async fn signin_needs_public_url() -> Result<()> {
    let state = AppState::from_config(test_config(test_env("http://127.0.0.1:1")))?;

    let response = get_with_cookie(&state, "/auth/signin/discord", None).await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    Ok(())
}

#[tokio::test]
async fn anonymous_pages() -> Result<()> {
    let state = AppState::from_config(test_config(test_env("http://127.0.0.1:1")))?;

    let response = get_with_cookie(&state, "/auth/session", None).await?;
    assert_eq!(
        response_json(response).await?,
        json!({"status": "unauthenticated"})
    );

    let response = get_with_cookie(&state, "/?count=5", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let html = response_text(response).await?;
    assert!(html.contains(r#"href="/auth/signin""#));
    assert!(html.contains(r#"href="/?count=6""#));
    assert!(html.contains(r#"href="/?count=4""#));

    let response = get_with_cookie(&state, "/auth/signin?callbackUrl=/events", None).await?;
    let html = response_text(response).await?;
    assert!(html.contains("/auth/signin/discord?callbackUrl=%2Fevents"));
    Ok(())
}
