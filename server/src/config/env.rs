//! Environment-provided secrets and deployment values

use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Runtime mode, mirrors `NODE_ENV`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeEnv {
    #[default]
    Development,
    Production,
    Test,
}

impl NodeEnv {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "development" => Ok(NodeEnv::Development),
            "production" => Ok(NodeEnv::Production),
            "test" => Ok(NodeEnv::Test),
            other => Err(ConfigError::Invalid {
                key: "NODE_ENV",
                reason: format!("expected development, production or test, got '{}'", other),
            }),
        }
    }

    pub fn is_production(self) -> bool {
        self == NodeEnv::Production
    }
}

/// Values read from the process environment
#[derive(Clone)]
pub struct ServerEnv {
    pub node_env: NodeEnv,
    /// Discord OAuth application id
    pub discord_id: String,
    pub discord_secret: String,
    /// Bot token of the Discord application
    pub discord_token: String,
    pub discord_guild_id: String,
    /// Key for signing session cookies
    pub auth_secret: String,
    /// Derive the public URL from request headers when `auth_url` is unset
    pub auth_trust_host: bool,
    /// Public base URL used to build OAuth redirect URIs
    pub auth_url: Option<Url>,
    pub dolibarr_url: Option<String>,
    pub dolibarr_api_key: Option<String>,
    /// Hex-encoded content encryption key for proxy tokens
    pub api_key: String,
    /// Base URL of the upstream v1 API
    pub url_v1: String,
}

impl std::fmt::Debug for ServerEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerEnv")
            .field("node_env", &self.node_env)
            .field("discord_id", &self.discord_id)
            .field("discord_guild_id", &self.discord_guild_id)
            .field("auth_trust_host", &self.auth_trust_host)
            .field("auth_url", &self.auth_url.as_ref().map(Url::as_str))
            .field("dolibarr_url", &self.dolibarr_url)
            .field("url_v1", &self.url_v1)
            .finish_non_exhaustive()
    }
}

impl ServerEnv {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &'static str| optional(key).ok_or(ConfigError::Missing(key));

        let node_env = match optional("NODE_ENV") {
            Some(raw) => NodeEnv::parse(&raw)?,
            None => NodeEnv::default(),
        };

        let auth_url = optional("AUTH_URL")
            .map(|raw| {
                Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                    key: "AUTH_URL",
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let url_v1 = required("URL_V1")?;
        Url::parse(&url_v1).map_err(|e| ConfigError::Invalid {
            key: "URL_V1",
            reason: e.to_string(),
        })?;

        Ok(Self {
            node_env,
            discord_id: required("DISCORD_ID")?,
            discord_secret: required("DISCORD_SECRET")?,
            discord_token: required("DISCORD_TOKEN")?,
            discord_guild_id: required("DISCORD_GUILD_ID")?,
            auth_secret: required("AUTH_SECRET")?,
            auth_trust_host: optional("AUTH_TRUST_HOST")
                .map(|raw| parse_flag(&raw))
                .unwrap_or(false),
            auth_url,
            dolibarr_url: optional("DOLIBARR_URL")
                .map(|raw| raw.trim_end_matches('/').to_string()),
            dolibarr_api_key: optional("DOLIBARR_API_KEY"),
            api_key: required("API_KEY")?,
            url_v1: url_v1.trim_end_matches('/').to_string(),
        })
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
