use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::constants;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_url")]
    pub url: String,
}

fn default_url() -> String {
    constants::transport::DEFAULT_URL.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig { url: default_url() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default = "default_capture_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    /// Input device name; the system default when unset
    #[serde(default)]
    pub device: Option<String>,
}

fn default_capture_rate() -> u32 {
    constants::capture::SAMPLE_RATE
}

fn default_frame_size() -> usize {
    constants::capture::FRAME_SIZE
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            sample_rate: default_capture_rate(),
            frame_size: default_frame_size(),
            device: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlaybackConfig {
    #[serde(default = "default_playback_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_lookahead_ms")]
    pub lookahead_ms: u64,
    /// Output device name; the system default when unset
    #[serde(default)]
    pub device: Option<String>,
}

fn default_playback_rate() -> u32 {
    constants::playback::SAMPLE_RATE
}

fn default_lookahead_ms() -> u64 {
    (constants::playback::LOOKAHEAD_SECS * 1000.0).round() as u64 // 150ms jitter floor
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        PlaybackConfig {
            sample_rate: default_playback_rate(),
            lookahead_ms: default_lookahead_ms(),
            device: None,
        }
    }
}

impl PlaybackConfig {
    pub fn lookahead_secs(&self) -> f64 {
        self.lookahead_ms as f64 / 1000.0
    }
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".voice-stream"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("settings.yaml"))
    }

    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            let config = Self::from_yaml(&contents)?;

            config.validate()?;

            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            println!("Created default config at: {}", config_path.display());
            Ok(config)
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).context("Failed to parse config file")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let url = &self.server.url;
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            bail!("server.url must be a ws:// or wss:// URL, got {:?}", url);
        }

        if self.capture.sample_rate == 0 {
            bail!("capture.sample_rate must be greater than 0");
        }
        if self.capture.frame_size == 0 {
            bail!("capture.frame_size must be greater than 0");
        }
        if self.capture.frame_size > 65536 {
            bail!("capture.frame_size must be <= 65536 samples");
        }

        if self.playback.sample_rate == 0 {
            bail!("playback.sample_rate must be greater than 0");
        }
        if self.playback.lookahead_ms > 2000 {
            bail!("playback.lookahead_ms must be <= 2000 (2 seconds)");
        }

        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let config_dir = Self::config_dir()?;
        fs::create_dir_all(&config_dir)
            .context("Failed to create config directory")?;

        let config_path = Self::config_path()?;
        let yaml = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs::write(&config_path, yaml)
            .context("Failed to write config file")?;

        Ok(())
    }
}
