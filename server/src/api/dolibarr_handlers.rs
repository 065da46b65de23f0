//! Event routes backed by Dolibarr

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use super::error::ApiError;
use super::extract::CurrentSession;
use super::state::AppState;
use crate::auth::User;
use crate::dolibarr::{CreateEventRequest, ProjectPayload, is_owned_by};

#[derive(Debug, Serialize)]
pub struct CreateEventResponse {
    pub success: bool,
    pub message: &'static str,
    pub project: Value,
}

#[derive(Debug, Serialize)]
pub struct ListEventsResponse {
    pub success: bool,
    pub message: &'static str,
    pub events: Vec<Value>,
    pub total: usize,
    #[serde(rename = "userDiscordId")]
    pub user_discord_id: String,
}

/// Create a Dolibarr project for `user`, returning Dolibarr's answer
pub async fn create_project_for(
    state: &AppState,
    user: &User,
    request: &CreateEventRequest,
) -> Result<Value, ApiError> {
    let event = request.validate()?;
    let client = state
        .dolibarr
        .as_ref()
        .ok_or(ApiError::DolibarrNotConfigured)?;

    let payload = ProjectPayload::new(
        event,
        user,
        &state.config.settings.dolibarr,
        Utc::now().timestamp_millis(),
    );
    tracing::info!(
        discord_id = %user.provider_id,
        label = %payload.label,
        "Creating Dolibarr project"
    );

    client
        .create_project(&payload)
        .await
        .map_err(|err| ApiError::from_dolibarr(err, "Erreur lors de la création de l'événement"))
}

/// Agenda events carrying `discord_id`'s attribution
pub async fn events_owned_by(state: &AppState, discord_id: &str) -> Result<Vec<Value>, ApiError> {
    let client = state
        .dolibarr
        .as_ref()
        .ok_or(ApiError::DolibarrNotConfigured)?;

    let events = client
        .list_agenda_events(state.config.settings.dolibarr.list_limit)
        .await
        .map_err(|err| {
            ApiError::from_dolibarr(err, "Erreur lors de la récupération des événements")
        })?;

    let fetched = events.len();
    let events: Vec<Value> = events
        .into_iter()
        .filter(|event| is_owned_by(event, discord_id))
        .collect();
    tracing::debug!(%discord_id, fetched, kept = events.len(), "Filtered agenda events");

    Ok(events)
}

/// Create a Dolibarr project attributed to the caller
pub async fn create_event_handler(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    body: Bytes,
) -> Result<Json<CreateEventResponse>, ApiError> {
    let session = session.ok_or(ApiError::Unauthenticated)?;

    let request: CreateEventRequest =
        serde_json::from_slice(&body).map_err(|_| ApiError::MissingFields)?;
    let project = create_project_for(&state, &session.user, &request).await?;

    Ok(Json(CreateEventResponse {
        success: true,
        message: "Projet créé avec succès",
        project,
    }))
}

/// List the agenda events the caller created
pub async fn list_events_handler(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<Json<ListEventsResponse>, ApiError> {
    let session = session.ok_or(ApiError::Unauthenticated)?;
    let discord_id = session.user.provider_id;
    let events = events_owned_by(&state, &discord_id).await?;

    Ok(Json(ListEventsResponse {
        success: true,
        message: "Événements récupérés avec succès",
        total: events.len(),
        events,
        user_discord_id: discord_id,
    }))
}
