//! Configuration management for the converter
//!
//! Loads optional overrides from environment variables (.env file)

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Samples per channel fed to the encoder in one call (one MPEG-1 Layer III frame)
pub const BLOCK_SIZE: usize = 1152;

/// Constant bit rate of the produced MP3 stream
pub const BITRATE_KBPS: u32 = 128;

/// Media type of the assembled output
pub const OUTPUT_MEDIA_TYPE: &str = "audio/mpeg";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// How many channels the encoder is configured with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelMode {
    /// Follow the decoded source
    #[default]
    Auto,
    /// Always encode one channel, averaging stereo sources
    Mono,
    /// Always encode two channels, mirroring mono sources
    Stereo,
}

impl ChannelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelMode::Auto => "auto",
            ChannelMode::Mono => "mono",
            ChannelMode::Stereo => "stereo",
        }
    }

    /// Channel count the encoder uses for a source with `source_channels`
    pub fn encoder_channels(&self, source_channels: u8) -> u8 {
        match self {
            ChannelMode::Auto => source_channels,
            ChannelMode::Mono => 1,
            ChannelMode::Stereo => 2,
        }
    }
}

impl FromStr for ChannelMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(ChannelMode::Auto),
            "mono" => Ok(ChannelMode::Mono),
            "stereo" => Ok(ChannelMode::Stereo),
            _ => Err(ConfigError::InvalidValue(
                "VOICE_MP3_CHANNELS".to_string(),
                s.to_string(),
            )),
        }
    }
}

/// Converter configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Encoder channel mode
    pub channel_mode: ChannelMode,
    /// Longest recording accepted before decoding is aborted
    pub max_duration: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_mode: ChannelMode::Auto,
            max_duration: Duration::from_secs(600),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from any key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let channel_mode = lookup("VOICE_MP3_CHANNELS")
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<ChannelMode>())
            .transpose()?
            .unwrap_or(defaults.channel_mode);

        let max_duration = lookup("VOICE_MP3_MAX_DURATION")
            .filter(|s| !s.is_empty())
            .map(|s| match s.parse::<u64>() {
                Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
                _ => Err(ConfigError::InvalidValue(
                    "VOICE_MP3_MAX_DURATION".to_string(),
                    s,
                )),
            })
            .transpose()?
            .unwrap_or(defaults.max_duration);

        Ok(Self {
            channel_mode,
            max_duration,
        })
    }

    pub fn with_channel_mode(mut self, channel_mode: ChannelMode) -> Self {
        self.channel_mode = channel_mode;
        self
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.channel_mode, ChannelMode::Auto);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("VOICE_MP3_CHANNELS", "Stereo"),
            ("VOICE_MP3_MAX_DURATION", "30"),
        ]))
        .unwrap();
        assert_eq!(config.channel_mode, ChannelMode::Stereo);
        assert_eq!(config.max_duration, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_lookup(lookup_from(&[("VOICE_MP3_CHANNELS", "5.1")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue("VOICE_MP3_CHANNELS".to_string(), "5.1".to_string())
        );

        let err = Config::from_lookup(lookup_from(&[("VOICE_MP3_MAX_DURATION", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key, _) if key == "VOICE_MP3_MAX_DURATION"));
    }

    #[test]
    fn test_encoder_channels() {
        assert_eq!(ChannelMode::Auto.encoder_channels(1), 1);
        assert_eq!(ChannelMode::Auto.encoder_channels(2), 2);
        assert_eq!(ChannelMode::Mono.encoder_channels(2), 1);
        assert_eq!(ChannelMode::Stereo.encoder_channels(1), 2);
    }
}
