/*
 * Meeting Orchestrator
 * Copyright (c) 2024 Meeting Orchestrator Contributors
 *
 * This work is licensed under the Creative Commons Attribution-NonCommercial 4.0 International License.
 * To view a copy of this license, visit http://creativecommons.org/licenses/by-nc/4.0/
 *
 * You are free to share and adapt this work for non-commercial purposes with attribution.
 * Commercial use is prohibited without explicit written permission.
 */

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Every option enumerated in `spec.md` §6's Configuration table, loaded the
/// way the teacher's `Config::load` reads `.env` + environment overrides.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub max_concurrent_sessions: usize,
    pub session_start_timeout_seconds: u64,
    pub chunk_interval_seconds: u64,
    pub headless_browser: bool,
    pub profiles_root: PathBuf,
    pub default_profile_name: String,
    pub data_dir: PathBuf,
    pub bot_display_name: String,
    pub bot_account_identifiers: Vec<String>,
    pub diarization_endpoint_url: Option<String>,
    pub event_sink_endpoint: Option<String>,
    pub artifact_store_endpoint: Option<String>,
    pub credential_encryption_secret: Option<String>,
}

impl Config {
    pub async fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let api_host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let api_port = env::var("API_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse::<u16>()
            .unwrap_or(8000);

        let max_concurrent_sessions = env::var("MAX_CONCURRENT_SESSIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<usize>()
            .unwrap_or(10);

        let session_start_timeout_seconds = env::var("SESSION_START_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .unwrap_or(30);

        let chunk_interval_seconds = env::var("CHUNK_INTERVAL_SECONDS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .unwrap_or(30);

        let headless_browser = env::var("HEADLESS_BROWSER")
            .unwrap_or_else(|_| "false".to_string())
            .to_lowercase()
            == "true";

        let profiles_root = env::var("PROFILES_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("profiles"));

        let default_profile_name =
            env::var("DEFAULT_PROFILE_NAME").unwrap_or_else(|_| "google_main".to_string());

        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));

        let bot_display_name =
            env::var("BOT_DISPLAY_NAME").unwrap_or_else(|_| "Meeting Bot".to_string());

        let bot_account_identifiers = env::var("BOT_ACCOUNT_IDENTIFIERS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let diarization_endpoint_url = env::var("DIARIZATION_ENDPOINT_URL").ok();
        let event_sink_endpoint = env::var("EVENT_SINK_ENDPOINT").ok();
        let artifact_store_endpoint = env::var("ARTIFACT_STORE_ENDPOINT").ok();
        let credential_encryption_secret = env::var("CREDENTIAL_ENCRYPTION_SECRET").ok();

        std::fs::create_dir_all(&profiles_root)
            .context("failed to create profiles root directory")?;
        std::fs::create_dir_all(&data_dir).context("failed to create data directory")?;

        Ok(Config {
            api_host,
            api_port,
            max_concurrent_sessions,
            session_start_timeout_seconds,
            chunk_interval_seconds,
            headless_browser,
            profiles_root,
            default_profile_name,
            data_dir,
            bot_display_name,
            bot_account_identifiers,
            diarization_endpoint_url,
            event_sink_endpoint,
            artifact_store_endpoint,
            credential_encryption_secret,
        })
    }

    /// All identifiers C4 treats as "this is the bot": display name plus any
    /// extra configured account identifiers, lowercased for comparison.
    pub fn bot_identifiers(&self) -> Vec<String> {
        let mut ids = vec![self.bot_display_name.to_lowercase(), "meeting bot".to_string(), "bot".to_string()];
        ids.extend(self.bot_account_identifiers.iter().map(|s| s.to_lowercase()));
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_apply_when_env_unset() {
        for key in [
            "MAX_CONCURRENT_SESSIONS",
            "CHUNK_INTERVAL_SECONDS",
            "BOT_DISPLAY_NAME",
        ] {
            env::remove_var(key);
        }
        let config = Config::load().await.unwrap();
        assert_eq!(config.max_concurrent_sessions, 10);
        assert_eq!(config.chunk_interval_seconds, 30);
        assert_eq!(config.bot_display_name, "Meeting Bot");
        assert!(config
            .bot_identifiers()
            .contains(&"meeting bot".to_string()));
    }
}
