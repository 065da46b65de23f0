//! Discord OAuth client
//!
//! Authorization-code flow with PKCE against Discord's OAuth2 endpoints.
//! See: https://discord.com/developers/docs/topics/oauth2
//!
//! Key features:
//! - PKCE (Proof Key for Code Exchange) and CSRF state on every login
//! - Token exchange through the `oauth2` crate
//! - Profile lookup through `GET /users/@me`

use anyhow::{Context, Result, anyhow};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};

use crate::config::DiscordSettings;

const CDN_BASE: &str = "https://cdn.discordapp.com";

/// Configuration for Discord OAuth
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
}

/// A prepared redirect to Discord's consent screen
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    /// CSRF state echoed back on the callback
    pub state: String,
    pub pkce_verifier: String,
}

/// Subset of the Discord user object returned by `/users/@me`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscordProfile {
    #[serde(default)]
    pub id: Option<String>,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub discriminator: Option<String>,
    /// Avatar hash
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Ready-made avatar URL, when the profile carries one instead of a hash
    #[serde(default, alias = "image", alias = "image_url")]
    pub picture: Option<String>,
}

impl DiscordProfile {
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }

    /// Avatar URL, or the default embed avatar when no custom one is set
    ///
    /// Without an id only a provider-supplied `picture` can be returned.
    pub fn image_url(&self) -> Option<String> {
        let Some(id) = self.id.as_deref() else {
            return self.picture.clone();
        };

        if let Some(hash) = self.avatar.as_deref() {
            let format = if hash.starts_with("a_") { "gif" } else { "png" };
            return Some(format!("{}/avatars/{}/{}.{}", CDN_BASE, id, hash, format));
        }

        let index = match self.discriminator.as_deref() {
            None | Some("0") => id.parse::<u64>().ok().map(|id| (id >> 22) % 6)?,
            Some(discriminator) => discriminator.parse::<u64>().ok()? % 5,
        };
        Some(format!("{}/embed/avatars/{}.png", CDN_BASE, index))
    }
}

/// Discord OAuth client
pub struct DiscordAuthClient {
    config: AuthConfig,
    settings: DiscordSettings,
    http_client: reqwest::Client,
}

impl DiscordAuthClient {
    /// Create a new Discord OAuth client
    pub fn new(
        config: AuthConfig,
        settings: DiscordSettings,
        http_client: reqwest::Client,
    ) -> Result<Self> {
        AuthUrl::new(settings.authorize_url.clone()).context("Invalid Discord authorize URL")?;
        TokenUrl::new(settings.token_url.clone()).context("Invalid Discord token URL")?;

        Ok(Self {
            config,
            settings,
            http_client,
        })
    }

    fn oauth_client(&self, redirect_uri: &str) -> Result<BasicClient> {
        let client = BasicClient::new(
            ClientId::new(self.config.client_id.clone()),
            Some(ClientSecret::new(self.config.client_secret.clone())),
            AuthUrl::new(self.settings.authorize_url.clone())?,
            Some(TokenUrl::new(self.settings.token_url.clone())?),
        )
        .set_redirect_uri(
            RedirectUrl::new(redirect_uri.to_string()).context("Invalid redirect URI")?,
        );

        Ok(client)
    }

    /// Generate authorization URL with PKCE
    ///
    /// The caller must keep `state` and `pkce_verifier` until the callback.
    pub fn authorization_url(&self, redirect_uri: &str) -> Result<AuthorizationRequest> {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (url, csrf_token) = self
            .oauth_client(redirect_uri)?
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.settings.scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(pkce_challenge)
            .url();

        Ok(AuthorizationRequest {
            url: url.to_string(),
            state: csrf_token.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        })
    }

    /// Exchange authorization code for an access token
    pub async fn exchange_code(
        &self,
        code: String,
        pkce_verifier: String,
        redirect_uri: &str,
    ) -> Result<String> {
        let token = self
            .oauth_client(redirect_uri)?
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
            .request_async(async_http_client)
            .await
            .map_err(|e| anyhow!("Token exchange failed: {}", e))?;

        Ok(token.access_token().secret().clone())
    }

    /// Fetch user profile using access token
    pub async fn get_user_profile(&self, access_token: &str) -> Result<DiscordProfile> {
        let profile_url = format!("{}/users/@me", self.settings.api_base.trim_end_matches('/'));

        let response = self
            .http_client
            .get(&profile_url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to fetch user profile")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Failed to fetch user profile: {}",
                response.status()
            ));
        }

        response
            .json::<DiscordProfile>()
            .await
            .context("Failed to parse user profile")
    }
}
