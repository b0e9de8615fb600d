use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::state::{percent_to_raw, MAX_VOLUME_PERCENT, NORMAL_VOLUME};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub voice_channel_id: Option<u64>,

    // SoundCloud
    pub soundcloud_client_id: String,

    // Audio
    pub default_volume: i32, // En porcentaje
    pub opus_bitrate: u32,   // En kbit/s
    pub stats_interval_secs: u64,
    pub ffmpeg_path: String,
    pub frame_buffer: usize,

    // Límites
    pub max_queue_size: usize,
}

/// Settings every [`Player`](crate::audio::player::Player) is built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerConfig {
    /// kbit/s
    pub bitrate: u32,
    /// Raw gain, see [`NORMAL_VOLUME`].
    pub default_volume: i32,
    pub stats_interval: Duration,
    pub max_queue_size: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            bitrate: 120,
            default_volume: NORMAL_VOLUME,
            stats_interval: Duration::from_secs(5),
            max_queue_size: 1000,
        }
    }
}

impl Config {
    /// Reads the configuration from the environment, after loading `.env`
    /// when present.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            voice_channel_id: var("VOICE_CHANNEL_ID")
                .map(|v| v.parse())
                .transpose()
                .context("VOICE_CHANNEL_ID inválido")?,

            soundcloud_client_id: var("SOUNDCLOUD_CLIENT_ID").context("SOUNDCLOUD_CLIENT_ID no está definido")?,

            // Audio
            default_volume: parse_or(var("DEFAULT_VOLUME"), defaults.default_volume, "DEFAULT_VOLUME")?,
            opus_bitrate: parse_or(var("OPUS_BITRATE"), defaults.opus_bitrate, "OPUS_BITRATE")?,
            stats_interval_secs: parse_or(var("STATS_INTERVAL_SECS"), defaults.stats_interval_secs, "STATS_INTERVAL_SECS")?,
            ffmpeg_path: var("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            frame_buffer: parse_or(var("FRAME_BUFFER"), defaults.frame_buffer, "FRAME_BUFFER")?,

            // Límites
            max_queue_size: parse_or(var("MAX_QUEUE_SIZE"), defaults.max_queue_size, "MAX_QUEUE_SIZE")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0% and 200%
    /// - Opus bitrate must be between 8 and 512 kbit/s
    /// - Stats interval, frame buffer and queue size must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if !(0..=MAX_VOLUME_PERCENT).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0 and {}%, got: {}", MAX_VOLUME_PERCENT, self.default_volume);
        }

        if self.opus_bitrate > 512 {
            anyhow::bail!("Opus bitrate cannot exceed 512kbps, got: {}", self.opus_bitrate);
        }

        if self.opus_bitrate < 8 {
            anyhow::bail!("Opus bitrate too low, minimum 8kbps, got: {}", self.opus_bitrate);
        }

        if self.stats_interval_secs == 0 {
            anyhow::bail!("Stats interval must be greater than 0");
        }

        if self.frame_buffer == 0 {
            anyhow::bail!("Frame buffer must be greater than 0");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging, without
    /// tokens or client ids.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: voice channel {}\n  \
            Audio: {}% vol, {}kbps, stats every {}s, {} frames buffered\n  \
            Encoder: {}\n  \
            Limits: {} queue",
            self.voice_channel_id.map_or("auto".to_string(), |id| id.to_string()),
            self.default_volume,
            self.opus_bitrate,
            self.stats_interval_secs,
            self.frame_buffer,
            self.ffmpeg_path,
            self.max_queue_size,
        )
    }

    pub fn player_config(&self) -> PlayerConfig {
        PlayerConfig {
            bitrate: self.opus_bitrate,
            default_volume: percent_to_raw(self.default_volume).unwrap_or(NORMAL_VOLUME),
            stats_interval: Duration::from_secs(self.stats_interval_secs),
            max_queue_size: self.max_queue_size,
        }
    }
}

fn parse_or<T>(value: Option<String>, default: T, key: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw.trim().parse::<T>().with_context(|| format!("{key} inválido: {raw}")),
        None => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            voice_channel_id: None,
            soundcloud_client_id: String::new(),

            // Audio defaults
            default_volume: 100,
            opus_bitrate: 120,
            stats_interval_secs: 5,
            ffmpeg_path: "ffmpeg".to_string(),
            frame_buffer: 256,

            // Limit defaults
            max_queue_size: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_apply() {
        let config = Config::from_lookup(lookup(&[("DISCORD_TOKEN", "t"), ("SOUNDCLOUD_CLIENT_ID", "c")])).unwrap();
        assert_eq!(config.default_volume, 100);
        assert_eq!(config.opus_bitrate, 120);
        assert_eq!(config.voice_channel_id, None);
        assert_eq!(config.player_config(), PlayerConfig::default());
    }

    #[test]
    fn test_required_values() {
        assert!(Config::from_lookup(lookup(&[("SOUNDCLOUD_CLIENT_ID", "c")])).is_err());
        assert!(Config::from_lookup(lookup(&[("DISCORD_TOKEN", "t"), ("SOUNDCLOUD_CLIENT_ID", " ")])).is_err());
    }

    #[test]
    fn test_overrides_and_player_config() {
        let config = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "t"),
            ("SOUNDCLOUD_CLIENT_ID", "c"),
            ("VOICE_CHANNEL_ID", "42"),
            ("DEFAULT_VOLUME", "50"),
            ("OPUS_BITRATE", "96"),
            ("STATS_INTERVAL_SECS", "2"),
        ]))
        .unwrap();

        assert_eq!(config.voice_channel_id, Some(42));
        let player = config.player_config();
        assert_eq!(player.default_volume, 128);
        assert_eq!(player.bitrate, 96);
        assert_eq!(player.stats_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        let base = [("DISCORD_TOKEN", "t"), ("SOUNDCLOUD_CLIENT_ID", "c")];
        for bad in [("DEFAULT_VOLUME", "250"), ("OPUS_BITRATE", "4"), ("OPUS_BITRATE", "600"), ("MAX_QUEUE_SIZE", "0"), ("DEFAULT_VOLUME", "loud")] {
            let mut vars = base.to_vec();
            vars.push(bad);
            assert!(Config::from_lookup(lookup(&vars)).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_summary_hides_secrets() {
        let config = Config {
            discord_token: "secret-token".into(),
            soundcloud_client_id: "secret-id".into(),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("secret"));
        assert!(summary.contains("100% vol"));
    }
}
