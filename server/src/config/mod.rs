//! Configuration management for Valhalla
//!
//! Secrets and deployment specific values come from the environment (see
//! [`env::ServerEnv`]). Tunables that are safe to commit, such as the proxy
//! route table or the Dolibarr classification codes, live in an optional RON
//! settings file handled by [`loader`].

pub mod env;
pub mod loader;

pub use env::{NodeEnv, ServerEnv};

use serde::{Deserialize, Serialize};

/// Longest accepted session lifetime: one year
pub const MAX_SESSION_TTL_SECS: i64 = 365 * 24 * 60 * 60;

/// Longest accepted proxy token lifetime: one day
pub const MAX_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Fully resolved configuration: environment plus settings file
#[derive(Debug, Clone)]
pub struct Config {
    pub env: ServerEnv,
    pub settings: Settings,
}

impl Config {
    /// Load the environment and discover the settings file
    pub fn load() -> anyhow::Result<Self> {
        let env = ServerEnv::from_env()?;
        let settings = loader::load_with_discovery()?;
        Ok(Self { env, settings })
    }
}

/// Top-level settings file
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub discord: DiscordSettings,

    #[serde(default)]
    pub proxy: ProxySettings,

    #[serde(default)]
    pub dolibarr: DolibarrSettings,
}

impl Settings {
    /// Validate cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), String> {
        validate_auth_path(&self.server.auth_path)?;
        for route in &self.proxy.routes {
            route.validate()?;
        }
        if !(1..=MAX_SESSION_TTL_SECS).contains(&self.server.session_ttl_secs) {
            return Err(format!(
                "session lifetime must be between 1 and {} seconds",
                MAX_SESSION_TTL_SECS
            ));
        }
        if !(1..=MAX_TOKEN_TTL_SECS).contains(&self.proxy.token_ttl_secs) {
            return Err(format!(
                "proxy token lifetime must be between 1 and {} seconds",
                MAX_TOKEN_TTL_SECS
            ));
        }
        Ok(())
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerSettings {
    /// Socket address the API binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Mount point of the sign-in/callback/sign-out routes
    #[serde(default = "default_auth_path")]
    pub auth_path: String,

    /// Session lifetime in seconds
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: i64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            auth_path: default_auth_path(),
            session_ttl_secs: default_session_ttl(),
        }
    }
}

/// Discord OAuth endpoints, overridable for staging and tests
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DiscordSettings {
    #[serde(default = "default_discord_authorize_url")]
    pub authorize_url: String,

    #[serde(default = "default_discord_token_url")]
    pub token_url: String,

    /// Base of the REST API, used for `/users/@me`
    #[serde(default = "default_discord_api_base")]
    pub api_base: String,

    #[serde(default = "default_discord_scopes")]
    pub scopes: Vec<String>,
}

impl Default for DiscordSettings {
    fn default() -> Self {
        Self {
            authorize_url: default_discord_authorize_url(),
            token_url: default_discord_token_url(),
            api_base: default_discord_api_base(),
            scopes: default_discord_scopes(),
        }
    }
}

/// Upstream proxy settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProxySettings {
    /// `iss` claim of minted tokens
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// `aud` claim of minted tokens, also sent as `Authorization-origin`
    #[serde(default = "default_audience")]
    pub audience: String,

    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: i64,

    /// Explicit inbound-prefix to upstream-prefix mapping. Empty forwards
    /// paths unchanged.
    #[serde(default)]
    pub routes: Vec<RouteMapping>,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            issuer: default_issuer(),
            audience: default_audience(),
            token_ttl_secs: default_token_ttl(),
            routes: Vec::new(),
        }
    }
}

/// One entry of the proxy route table
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RouteMapping {
    /// Inbound path prefix, e.g. `/api/badges`
    pub from: String,
    /// Replacement upstream prefix, e.g. `/v1/badges`
    pub to: String,
}

impl RouteMapping {
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [("from", &self.from), ("to", &self.to)] {
            if !value.starts_with('/') {
                return Err(format!(
                    "Route mapping '{}' must start with '/': {}",
                    name, value
                ));
            }
        }
        Ok(())
    }
}

/// Classification defaults sent with every Dolibarr project
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DolibarrSettings {
    #[serde(default = "default_type_id")]
    pub type_id: i64,

    #[serde(default = "default_project_code")]
    pub code: String,

    #[serde(default = "default_owner_id")]
    pub user_owner_id: i64,

    #[serde(default = "default_event_type")]
    pub event_type: String,

    /// Page size of the agenda listing
    #[serde(default = "default_list_limit")]
    pub list_limit: u32,
}

impl Default for DolibarrSettings {
    fn default() -> Self {
        Self {
            type_id: default_type_id(),
            code: default_project_code(),
            user_owner_id: default_owner_id(),
            event_type: default_event_type(),
            list_limit: default_list_limit(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_auth_path() -> String {
    "/auth".to_string()
}

fn default_session_ttl() -> i64 {
    30 * 24 * 60 * 60
}

fn default_discord_authorize_url() -> String {
    "https://discord.com/oauth2/authorize".to_string()
}

fn default_discord_token_url() -> String {
    "https://discord.com/api/oauth2/token".to_string()
}

fn default_discord_api_base() -> String {
    "https://discord.com/api".to_string()
}

fn default_discord_scopes() -> Vec<String> {
    vec!["identify".to_string(), "email".to_string()]
}

fn default_issuer() -> String {
    "valhalla_2".to_string()
}

fn default_audience() -> String {
    "valhalla_1".to_string()
}

fn default_token_ttl() -> i64 {
    5 * 60
}

fn default_type_id() -> i64 {
    40
}

fn default_project_code() -> String {
    "AC_OTH_AUTO".to_string()
}

fn default_owner_id() -> i64 {
    1
}

fn default_event_type() -> String {
    "rien".to_string()
}

fn default_list_limit() -> u32 {
    100
}

/// The auth mount point must be an absolute path without a trailing slash
fn validate_auth_path(path: &str) -> Result<(), String> {
    if !path.starts_with('/') {
        return Err(format!("Auth path '{}' must start with '/'", path));
    }
    if path.len() > 1 && path.ends_with('/') {
        return Err(format!("Auth path '{}' cannot end with '/'", path));
    }
    if path == "/" {
        return Err("Auth path cannot be the site root".to_string());
    }
    Ok(())
}
