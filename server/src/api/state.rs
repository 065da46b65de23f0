use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::auth::discord::AuthConfig;
use crate::auth::{DiscordAuthClient, SessionManager};
use crate::config::Config;
use crate::dolibarr::DolibarrClient;
use crate::proxy::{ProxyTokenMinter, RouteTable, UpstreamProxy};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager>,
    pub discord: Arc<DiscordAuthClient>,
    pub proxy: Arc<UpstreamProxy>,
    /// `None` when DOLIBARR_URL or DOLIBARR_API_KEY is unset
    pub dolibarr: Option<Arc<DolibarrClient>>,
}

impl AppState {
    pub fn from_config(config: Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let minter = ProxyTokenMinter::from_hex(&config.env.api_key, &config.settings.proxy)
            .context("Invalid API_KEY")?;
        let routes = RouteTable::new(config.settings.proxy.routes.clone());
        if routes.is_empty() {
            tracing::info!("No proxy route table configured, forwarding paths unchanged");
        }
        let proxy = UpstreamProxy::new(
            config.env.url_v1.clone(),
            routes,
            minter,
            http_client.clone(),
        );

        let discord = DiscordAuthClient::new(
            AuthConfig {
                client_id: config.env.discord_id.clone(),
                client_secret: config.env.discord_secret.clone(),
            },
            config.settings.discord.clone(),
            http_client.clone(),
        )?;

        let dolibarr = match (&config.env.dolibarr_url, &config.env.dolibarr_api_key) {
            (Some(url), Some(api_key)) => Some(Arc::new(DolibarrClient::new(
                url.clone(),
                api_key.clone(),
                http_client.clone(),
            ))),
            _ => {
                tracing::warn!("Dolibarr is not configured, event routes will answer 500");
                None
            }
        };

        let sessions = SessionManager::new(
            &config.env.auth_secret,
            config.settings.server.session_ttl_secs,
        );

        Ok(Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            discord: Arc::new(discord),
            proxy: Arc::new(proxy),
            dolibarr,
        })
    }
}
