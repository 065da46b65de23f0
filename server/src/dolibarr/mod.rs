//! Dolibarr REST client
//!
//! Events are created as Dolibarr projects and read back from the agenda.
//! The API key travels both as the `DOLAPIKEY` query parameter and header.

pub mod models;

pub use models::{CreateEventRequest, EventValidationError, NewEvent, ProjectPayload, is_owned_by};

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

const API_KEY_PARAM: &str = "DOLAPIKEY";

#[derive(Debug, Error)]
pub enum DolibarrError {
    /// Dolibarr answered with a non-2xx status
    #[error("Dolibarr returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Dolibarr request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Client for one Dolibarr instance
pub struct DolibarrClient {
    base_url: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl DolibarrClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http_client,
        }
    }

    /// Create a project, returning Dolibarr's response body
    pub async fn create_project(&self, payload: &ProjectPayload) -> Result<Value, DolibarrError> {
        let url = format!("{}/projects", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .query(&[(API_KEY_PARAM, self.api_key.as_str())])
            .header(API_KEY_PARAM, &self.api_key)
            .json(payload)
            .send()
            .await?;

        Self::read_json(response).await
    }

    /// Most recent agenda events, newest start date first
    pub async fn list_agenda_events(&self, limit: u32) -> Result<Vec<Value>, DolibarrError> {
        let url = format!("{}/agendaevents", self.base_url);
        let limit = limit.to_string();

        let response = self
            .http_client
            .get(&url)
            .query(&[
                (API_KEY_PARAM, self.api_key.as_str()),
                ("limit", limit.as_str()),
                ("sortfield", "datep"),
                ("sortorder", "DESC"),
            ])
            .header(API_KEY_PARAM, &self.api_key)
            .send()
            .await?;

        Self::read_json(response).await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DolibarrError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DolibarrError::Status { status, body });
        }

        Ok(response.json::<T>().await?)
    }
}
