//! Authenticated reverse proxy to the upstream v1 API
//!
//! Each forwarded request carries a freshly minted [`token`] whose subject is
//! the caller's provider identity. Inbound paths are rewritten through an
//! explicit [`RouteTable`].

pub mod token;

pub use token::{ProxyClaims, ProxyTokenMinter, TokenError};

use axum::http::{HeaderMap, Method, StatusCode, header};
use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

use crate::config::RouteMapping;

/// Header telling the upstream which service minted the bearer token
pub const ORIGIN_HEADER: &str = "Authorization-origin";

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("no proxy route for {0}")]
    Unmapped(String),

    #[error("failed to mint proxy token: {0}")]
    Token(#[from] TokenError),

    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned a non-JSON body ({status})")]
    InvalidBody { status: StatusCode },
}

/// Longest-prefix route table
///
/// Prefixes only match on path segment boundaries, so `/api/badge` does not
/// capture `/api/badges`.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteMapping>,
}

impl RouteTable {
    pub fn new(mut routes: Vec<RouteMapping>) -> Self {
        routes.sort_by(|a, b| b.from.len().cmp(&a.from.len()));
        Self { routes }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Map an inbound path to its upstream path
    ///
    /// An empty table forwards every path unchanged.
    pub fn resolve(&self, path: &str) -> Option<String> {
        if self.routes.is_empty() {
            return Some(path.to_string());
        }

        self.routes.iter().find_map(|route| {
            let from = route.from.trim_end_matches('/');
            let rest = path.strip_prefix(from)?;
            if !(rest.is_empty() || rest.starts_with('/') || from.is_empty()) {
                return None;
            }

            let to = route.to.trim_end_matches('/');
            let mapped = format!("{}{}", to, rest);
            Some(if mapped.is_empty() { "/".to_string() } else { mapped })
        })
    }
}

/// Response relayed back to the caller
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Forwards requests to the upstream API with a minted bearer token
pub struct UpstreamProxy {
    base_url: String,
    routes: RouteTable,
    minter: ProxyTokenMinter,
    http_client: reqwest::Client,
}

impl UpstreamProxy {
    pub fn new(
        base_url: impl Into<String>,
        routes: RouteTable,
        minter: ProxyTokenMinter,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            routes,
            minter,
            http_client,
        }
    }

    pub fn minter(&self) -> &ProxyTokenMinter {
        &self.minter
    }

    /// Build the upstream URL for an inbound path and optional query
    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> Result<String, ProxyError> {
        let mapped = self
            .routes
            .resolve(path)
            .ok_or_else(|| ProxyError::Unmapped(path.to_string()))?;

        let mut url = format!("{}{}", self.base_url, mapped);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        Ok(url)
    }

    /// Forward one request on behalf of `subject`
    pub async fn forward(
        &self,
        subject: &str,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<UpstreamResponse, ProxyError> {
        let url = self.upstream_url(path, query)?;
        let token = self.minter.mint(subject)?;

        tracing::debug!(%method, %url, "Forwarding request upstream");

        let mut request = self
            .http_client
            .request(method, &url)
            .header(ORIGIN_HEADER, self.minter.audience())
            .header(header::AUTHORIZATION, format!("Bearer {}", token));

        if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
            request = request.header(header::CONTENT_TYPE, content_type.clone());
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let raw = response.bytes().await?;

        let body = if raw.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&raw).map_err(|_| ProxyError::InvalidBody { status })?
        };

        Ok(UpstreamResponse { status, body })
    }
}
