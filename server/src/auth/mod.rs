//! Discord authentication module
//!
//! This module implements OAuth login with Discord accounts and the
//! server-side sessions that back the session cookie.

pub mod discord;
pub mod session;

pub use discord::{DiscordAuthClient, DiscordProfile};
pub use session::{PendingLogin, Session, SessionManager};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdentityError {
    #[error("no picture")]
    MissingPicture,

    #[error("no provider id in {0}")]
    InvalidProviderId(String),
}

/// Represents an authenticated user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Display name
    pub name: String,
    pub email: Option<String>,
    /// Avatar URL
    pub image: Option<String>,
    /// Numeric Discord user id
    pub provider_id: String,
}

impl User {
    pub fn new(name: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: None,
            image: None,
            provider_id: provider_id.into(),
        }
    }

    /// Build a user from a Discord profile
    pub fn from_profile(profile: &DiscordProfile) -> Result<Self, IdentityError> {
        let image = profile.image_url();
        let provider_id = resolve_provider_id(profile.id.as_deref(), image.as_deref())?;

        Ok(Self {
            name: profile.display_name().to_string(),
            email: profile.email.clone(),
            image,
            provider_id,
        })
    }
}

/// Pick the provider identity for a profile
///
/// The profile id is authoritative. Scraping the avatar URL is a fallback for
/// profiles that come back without one.
pub fn resolve_provider_id(
    profile_id: Option<&str>,
    picture: Option<&str>,
) -> Result<String, IdentityError> {
    if let Some(id) = profile_id.filter(|id| is_numeric_id(id)) {
        return Ok(id.to_string());
    }

    tracing::warn!("Discord profile without id, falling back to avatar URL");
    provider_id_from_picture(picture.ok_or(IdentityError::MissingPicture)?)
}

/// Fallback: second-to-last path segment of an avatar URL
/// (`https://cdn.discordapp.com/avatars/<id>/<hash>.png`)
pub fn provider_id_from_picture(picture: &str) -> Result<String, IdentityError> {
    let segments: Vec<&str> = picture.split('/').collect();
    let candidate = segments
        .len()
        .checked_sub(2)
        .and_then(|index| segments.get(index))
        .copied()
        .unwrap_or_default();

    if is_numeric_id(candidate) {
        Ok(candidate.to_string())
    } else {
        Err(IdentityError::InvalidProviderId(picture.to_string()))
    }
}

fn is_numeric_id(candidate: &str) -> bool {
    !candidate.is_empty() && candidate.chars().all(|c| c.is_ascii_digit())
}
