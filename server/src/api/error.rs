//! HTTP error responses
//!
//! The Dolibarr routes answer `{"error", "details"?}`; the proxy answers
//! `{"success": false, "message"}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::dolibarr::{DolibarrError, EventValidationError};
use crate::proxy::ProxyError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Utilisateur non authentifié")]
    Unauthenticated,

    #[error("Données manquantes: label, datep et datef sont requis")]
    MissingFields,

    #[error("Date invalide")]
    InvalidDate(&'static str),

    #[error("Configuration Dolibarr manquante")]
    DolibarrNotConfigured,

    #[error("{message}")]
    Upstream {
        status: StatusCode,
        message: &'static str,
        details: String,
    },

    #[error("Erreur interne du serveur")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Wrap a Dolibarr failure; `message` names the operation that failed
    pub fn from_dolibarr(err: DolibarrError, message: &'static str) -> Self {
        match err {
            DolibarrError::Status { status, body } => {
                tracing::error!(%status, body = %body, "Dolibarr API error");
                ApiError::Upstream {
                    status,
                    message,
                    details: body,
                }
            }
            DolibarrError::Transport(err) => ApiError::Internal(err.into()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::MissingFields | ApiError::InvalidDate(_) => StatusCode::BAD_REQUEST,
            ApiError::DolibarrNotConfigured | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Upstream { status, .. } => *status,
        }
    }
}

impl From<EventValidationError> for ApiError {
    fn from(err: EventValidationError) -> Self {
        match err {
            EventValidationError::MissingFields => ApiError::MissingFields,
            EventValidationError::InvalidDate(field) => ApiError::InvalidDate(field),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(err) = &self {
            tracing::error!(error = ?err, "Internal error");
        }

        let status = self.status();
        let details = match &self {
            ApiError::InvalidDate(field) => Some(field.to_string()),
            ApiError::Upstream { details, .. } => Some(details.clone()),
            _ => None,
        };

        let body = ErrorBody {
            error: self.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ProxyErrorBody {
    success: bool,
    message: &'static str,
}

/// Error response in the proxy's `{success, message}` shape
pub fn proxy_error(status: StatusCode, message: &'static str) -> Response {
    let body = ProxyErrorBody {
        success: false,
        message,
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match &self {
            ProxyError::Unmapped(path) => {
                tracing::warn!(path = %path, "No proxy route");
                proxy_error(StatusCode::NOT_FOUND, "Route non mappée")
            }
            ProxyError::Token(err) => {
                tracing::error!(error = %err, "Failed to mint proxy token");
                proxy_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Impossible de générer le jeton",
                )
            }
            ProxyError::Transport(_) | ProxyError::InvalidBody { .. } => {
                tracing::error!(error = %self, "Upstream request failed");
                proxy_error(StatusCode::BAD_GATEWAY, "Erreur du service amont")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::MissingFields.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::InvalidDate("datep").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::DolibarrNotConfigured.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from_dolibarr(
                DolibarrError::Status {
                    status: StatusCode::FORBIDDEN,
                    body: "denied".to_string(),
                },
                "Erreur"
            )
            .status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            ApiError::Unauthenticated.to_string(),
            "Utilisateur non authentifié"
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("db down")).to_string(),
            "Erreur interne du serveur"
        );
    }
}
