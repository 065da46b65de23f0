use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::User;
use crate::config::DolibarrSettings;

/// Body accepted by `POST /api/dolibarr/event`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateEventRequest {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub datep: Option<String>,
    #[serde(default)]
    pub datef: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Validated event fields, dates already in epoch seconds
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub label: String,
    pub datep: i64,
    pub datef: i64,
    pub location: String,
}

/// Why a create request was refused before reaching Dolibarr
#[derive(Debug, Clone, PartialEq)]
pub enum EventValidationError {
    MissingFields,
    InvalidDate(&'static str),
}

impl CreateEventRequest {
    pub fn validate(&self) -> Result<NewEvent, EventValidationError> {
        let (Some(label), Some(datep), Some(datef)) = (
            non_blank(&self.label),
            non_blank(&self.datep),
            non_blank(&self.datef),
        ) else {
            return Err(EventValidationError::MissingFields);
        };

        Ok(NewEvent {
            label: label.to_string(),
            datep: parse_epoch_seconds(datep).ok_or(EventValidationError::InvalidDate("datep"))?,
            datef: parse_epoch_seconds(datef).ok_or(EventValidationError::InvalidDate("datef"))?,
            location: self.location.clone().unwrap_or_default(),
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Convert an ISO 8601 date to Unix seconds, rounding down
///
/// Values without an offset are read as UTC.
pub fn parse_epoch_seconds(raw: &str) -> Option<i64> {
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.timestamp());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc().timestamp());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc().timestamp())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectExtrafields {
    pub event_type: String,
    pub discord_id: String,
    pub discord_user: String,
}

/// Payload of `POST /projects`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectPayload {
    pub label: String,
    pub type_id: i64,
    pub code: String,
    pub datep: i64,
    pub datef: i64,
    pub userownerid: i64,
    pub location: String,
    pub fulldayevent: i32,
    pub percentage: i32,
    pub priority: i32,
    pub transparency: i32,
    pub extrafields: ProjectExtrafields,
    pub note_private: String,
    #[serde(rename = "ref")]
    pub reference: String,
}

impl ProjectPayload {
    /// Build the project for `event`, tagged with the creator's Discord identity
    pub fn new(event: NewEvent, user: &User, settings: &DolibarrSettings, now_millis: i64) -> Self {
        let discord_id = &user.provider_id;

        Self {
            label: event.label,
            type_id: settings.type_id,
            code: settings.code.clone(),
            datep: event.datep,
            datef: event.datef,
            userownerid: settings.user_owner_id,
            location: event.location,
            fulldayevent: 0,
            percentage: -1,
            priority: 0,
            transparency: 0,
            extrafields: ProjectExtrafields {
                event_type: settings.event_type.clone(),
                discord_id: discord_id.clone(),
                discord_user: user.name.clone(),
            },
            note_private: format!(
                "Événement créé par {} (Discord ID: {})",
                user.name, discord_id
            ),
            reference: format!("DISCORD_{}_{}", discord_id, now_millis),
        }
    }
}

/// Whether a Dolibarr event carries `discord_id`'s attribution marker
///
/// Dolibarr cannot filter on custom fields server-side, so the listing is
/// filtered here on the extrafield tag, the private note or the reference.
pub fn is_owned_by(event: &Value, discord_id: &str) -> bool {
    if discord_id.is_empty() {
        return false;
    }

    let tag_matches = |pointer: &str| {
        event
            .pointer(pointer)
            .and_then(Value::as_str)
            .is_some_and(|tag| tag == discord_id)
    };
    let text_contains = |field: &str| {
        event
            .get(field)
            .and_then(Value::as_str)
            .is_some_and(|text| text.contains(discord_id))
    };

    tag_matches("/extrafields/discord_id")
        || tag_matches("/array_options/options_discord_id")
        || text_contains("note_private")
        || text_contains("ref")
}
