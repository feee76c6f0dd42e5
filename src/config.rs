use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

use crate::audio::player::PlayerSettings;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Audio
    pub default_volume: f32,
    pub progress_interval_secs: u64,
    pub idle_poll_ms: u64,
    pub idle_timeout_secs: u64,

    // yt-dlp
    pub ytdlp_path: String,
    pub max_playlist_size: usize,
    pub resolve_timeout_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source and validates it.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let discord_token = lookup("BOT_TOKEN")
            .or_else(|| lookup("DISCORD_TOKEN"))
            .filter(|token| !token.trim().is_empty())
            .context("BOT_TOKEN (or DISCORD_TOKEN) must be set")?;

        let config = Self {
            discord_token,
            command_prefix: lookup("COMMAND_PREFIX")
                .filter(|prefix| !prefix.is_empty())
                .unwrap_or(defaults.command_prefix),

            default_volume: parse_or(&lookup, "DEFAULT_VOLUME", defaults.default_volume)?,
            progress_interval_secs: parse_or(&lookup, "PROGRESS_INTERVAL_SECS", defaults.progress_interval_secs)?,
            idle_poll_ms: parse_or(&lookup, "IDLE_POLL_MS", defaults.idle_poll_ms)?,
            idle_timeout_secs: parse_or(&lookup, "IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs)?,

            ytdlp_path: lookup("YTDLP_PATH")
                .filter(|path| !path.trim().is_empty())
                .unwrap_or(defaults.ytdlp_path),
            max_playlist_size: parse_or(&lookup, "MAX_PLAYLIST_SIZE", defaults.max_playlist_size)?,
            resolve_timeout_secs: parse_or(&lookup, "RESOLVE_TIMEOUT_SECS", defaults.resolve_timeout_secs)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - The idle poll must be between 1ms and 1s
    /// - Progress interval, idle timeout, resolve timeout and playlist size must be > 0
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.idle_poll_ms == 0 || self.idle_poll_ms > 1000 {
            anyhow::bail!("Idle poll must be between 1 and 1000 ms, got: {}", self.idle_poll_ms);
        }

        if self.progress_interval_secs == 0 {
            anyhow::bail!("Progress interval must be greater than 0");
        }

        if self.idle_timeout_secs == 0 {
            anyhow::bail!("Idle timeout must be greater than 0");
        }

        if self.resolve_timeout_secs == 0 {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix cannot be blank");
        }

        Ok(())
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            idle_poll: Duration::from_millis(self.idle_poll_ms),
            progress_interval: Duration::from_secs(self.progress_interval_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            ..PlayerSettings::default()
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix {:?}\n  \
            Audio: {}% vol, progress every {}s, idle poll {}ms, leave after {}s idle\n  \
            yt-dlp: {} (timeout {}s, playlists up to {})",
            self.command_prefix,
            (self.default_volume * 100.0) as u32,
            self.progress_interval_secs,
            self.idle_poll_ms,
            self.idle_timeout_secs,
            self.ytdlp_path,
            self.resolve_timeout_secs,
            self.max_playlist_size,
        )
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        _ => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no default token - must be provided)
            discord_token: String::new(),
            command_prefix: "zix ".to_string(),

            default_volume: 1.0,
            progress_interval_secs: 5,
            idle_poll_ms: 500,
            idle_timeout_secs: 300,

            ytdlp_path: "yt-dlp".to_string(),
            max_playlist_size: 100,
            resolve_timeout_secs: 180,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_token_is_set() {
        let config = load(&[("BOT_TOKEN", "secret")]).unwrap();

        assert_eq!(config.command_prefix, "zix ");
        assert_eq!(config.ytdlp_path, "yt-dlp");
        assert_eq!(config.max_playlist_size, 100);
        assert_eq!(config.resolve_timeout(), Duration::from_secs(180));
        assert_eq!(config.player_settings().idle_poll, Duration::from_millis(500));
        assert_eq!(config.player_settings().progress_interval, Duration::from_secs(5));
        assert_eq!(config.player_settings().idle_timeout, Duration::from_secs(300));
    }

    #[test]
    fn discord_token_is_accepted_as_fallback() {
        let config = load(&[("DISCORD_TOKEN", "other")]).unwrap();
        assert_eq!(config.discord_token, "other");
    }

    #[test]
    fn missing_token_is_an_error() {
        assert!(load(&[]).is_err());
        assert!(load(&[("BOT_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("BOT_TOKEN", "secret"),
            ("COMMAND_PREFIX", "!"),
            ("MAX_PLAYLIST_SIZE", "25"),
            ("IDLE_POLL_MS", "250"),
            ("DEFAULT_VOLUME", "0.8"),
        ])
        .unwrap();

        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.max_playlist_size, 25);
        assert_eq!(config.idle_poll_ms, 250);
        assert_eq!(config.default_volume, 0.8);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(load(&[("BOT_TOKEN", "x"), ("IDLE_POLL_MS", "1500")]).is_err());
        assert!(load(&[("BOT_TOKEN", "x"), ("DEFAULT_VOLUME", "3")]).is_err());
        assert!(load(&[("BOT_TOKEN", "x"), ("MAX_PLAYLIST_SIZE", "0")]).is_err());
        assert!(load(&[("BOT_TOKEN", "x"), ("IDLE_TIMEOUT_SECS", "0")]).is_err());
        assert!(load(&[("BOT_TOKEN", "x"), ("RESOLVE_TIMEOUT_SECS", "soon")]).is_err());
    }

    #[test]
    fn summary_hides_token() {
        let config = load(&[("BOT_TOKEN", "super-secret-token")]).unwrap();
        assert!(!config.summary().contains("super-secret-token"));
    }
}
