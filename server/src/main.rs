use anyhow::Result;
use tracing_subscriber::EnvFilter;

use valhalla::api::{AppState, run_api, run_session_janitor};
use valhalla::config::Config;
use valhalla::supervisor::Supervisor;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load()?;
    tracing::info!(
        env = ?config.env.node_env,
        guild_id = %config.env.discord_guild_id,
        upstream = %config.env.url_v1,
        "Starting Valhalla"
    );

    let state = AppState::from_config(config)?;
    let sessions = state.sessions.clone();

    let mut supervisor = Supervisor::new();
    supervisor.spawn("api", move |shutdown| run_api(state, shutdown));
    supervisor.spawn("session-janitor", move |shutdown| {
        run_session_janitor(sessions, shutdown)
    });

    supervisor.run().await
}
