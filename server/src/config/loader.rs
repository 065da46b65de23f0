//! Settings file loading and parsing
//!
//! This module handles loading Valhalla settings from RON files with
//! fallback strategies for finding settings files in standard locations.

use super::Settings;
use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};

/// Standard settings file names to search for
const CONFIG_FILENAMES: &[&str] = &["valhalla.ron", ".valhalla/config.ron"];

/// Environment variable overriding settings discovery
pub const CONFIG_PATH_ENV: &str = "VALHALLA_CONFIG_PATH";

/// Load settings from a specific file path
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_ron(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load settings with automatic file discovery
///
/// Searches for settings files in the following locations (in order):
/// 1. Path specified in VALHALLA_CONFIG_PATH environment variable
/// 2. valhalla.ron in current directory
/// 3. .valhalla/config.ron relative to current directory
///
/// If no settings file is found, returns the default settings.
pub fn load_with_discovery() -> Result<Settings> {
    if let Ok(env_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            tracing::info!(path = %path.display(), "Loading config from {}", CONFIG_PATH_ENV);
            return load_from_file(&path);
        } else {
            tracing::warn!(
                path = %path.display(),
                "{} specified but file not found",
                CONFIG_PATH_ENV
            );
        }
    }

    for filename in CONFIG_FILENAMES {
        let path = PathBuf::from(filename);
        if path.exists() {
            tracing::info!(path = %path.display(), "Loading config");
            return load_from_file(&path);
        }
    }

    tracing::info!("No config file found, using defaults");
    Ok(Settings::default())
}

/// Parse and validate a RON settings string
fn parse_ron(content: &str) -> Result<Settings> {
    let settings: Settings = ron::from_str(content).context("Failed to parse RON configuration")?;
    settings
        .validate()
        .map_err(|reason| anyhow!("Invalid configuration: {}", reason))?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteMapping;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_config() {
        let ron = "Settings()";

        let settings = parse_ron(ron).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_parse_full_config() {
        let ron = r#"
Settings(
    server: ServerSettings(
        bind_address: "127.0.0.1:3000",
        auth_path: "/api/auth",
        session_ttl_secs: 3600,
    ),
    discord: DiscordSettings(
        authorize_url: "https://discord.test/oauth2/authorize",
        token_url: "https://discord.test/api/oauth2/token",
        api_base: "https://discord.test/api",
        scopes: ["identify"],
    ),
    proxy: ProxySettings(
        issuer: "gateway",
        audience: "backend",
        token_ttl_secs: 60,
        routes: [
            RouteMapping(from: "/api/badges", to: "/v1/badges"),
            RouteMapping(from: "/api", to: "/v1"),
        ],
    ),
    dolibarr: DolibarrSettings(
        type_id: 12,
        code: "AC_RDV",
        user_owner_id: 7,
        event_type: "raid",
        list_limit: 25,
    ),
)
        "#;

        let settings = parse_ron(ron).unwrap();

        assert_eq!(settings.server.bind_address, "127.0.0.1:3000");
        assert_eq!(settings.server.auth_path, "/api/auth");
        assert_eq!(settings.server.session_ttl_secs, 3600);

        assert_eq!(settings.discord.scopes, vec!["identify".to_string()]);

        assert_eq!(settings.proxy.issuer, "gateway");
        assert_eq!(settings.proxy.token_ttl_secs, 60);
        assert_eq!(settings.proxy.routes.len(), 2);
        assert_eq!(
            settings.proxy.routes[0],
            RouteMapping {
                from: "/api/badges".to_string(),
                to: "/v1/badges".to_string(),
            }
        );

        assert_eq!(settings.dolibarr.code, "AC_RDV");
        assert_eq!(settings.dolibarr.list_limit, 25);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let ron = r#"
Settings(
    proxy: ProxySettings(
        routes: [RouteMapping(from: "/api", to: "/")],
    ),
)
        "#;

        let settings = parse_ron(ron).unwrap();
        assert_eq!(settings.proxy.issuer, "valhalla_2");
        assert_eq!(settings.proxy.routes.len(), 1);
        assert_eq!(settings.server, Default::default());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("valhalla.ron");

        let ron_content = r#"
Settings(
    server: ServerSettings(bind_address: "127.0.0.1:9000"),
)
        "#;

        std::fs::write(&config_path, ron_content).unwrap();

        let settings = load_from_file(&config_path).unwrap();
        assert_eq!(settings.server.bind_address, "127.0.0.1:9000");
    }

    #[test]
    fn test_load_from_nonexistent_file() {
        let result = load_from_file("/nonexistent/path/valhalla.ron");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_with_discovery_defaults() {
        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
        }

        let settings = load_with_discovery().unwrap();
        assert!(settings.proxy.routes.is_empty());
    }

    #[test]
    fn test_parse_invalid_ron() {
        let result = parse_ron("This is not valid RON");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_rejects_invalid_route() {
        let ron = r#"
Settings(
    proxy: ProxySettings(
        routes: [RouteMapping(from: "badges", to: "/v1/badges")],
    ),
)
        "#;

        let result = parse_ron(ron);
        assert!(result.is_err());
    }
}
