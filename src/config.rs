use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "REELVIEW";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub rating: RatingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_country_code")]
    pub country_code: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            country_code: default_country_code(),
        }
    }
}

fn default_base_url() -> String {
    crate::api::DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    "reelview-dev/0.1 (+https://github.com/reelview/reelview)".to_string()
}

fn default_country_code() -> String {
    "91".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_preload_threshold")]
    pub preload_threshold: usize,
    #[serde(default = "default_comment_page_size")]
    pub comment_page_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            preload_threshold: default_preload_threshold(),
            comment_page_size: default_comment_page_size(),
        }
    }
}

fn default_page_size() -> usize {
    10
}

fn default_preload_threshold() -> usize {
    3
}

fn default_comment_page_size() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackConfig {
    #[serde(default = "default_autoplay")]
    pub autoplay: bool,
    #[serde(default = "default_start_muted")]
    pub start_muted: bool,
    #[serde(
        default = "default_auto_advance_delay",
        with = "humantime_serde"
    )]
    pub auto_advance_delay: Duration,
    #[serde(default = "default_player_command")]
    pub player_command: Vec<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            autoplay: default_autoplay(),
            start_muted: default_start_muted(),
            auto_advance_delay: default_auto_advance_delay(),
            player_command: default_player_command(),
        }
    }
}

fn default_autoplay() -> bool {
    true
}

fn default_start_muted() -> bool {
    true
}

fn default_auto_advance_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_player_command() -> Vec<String> {
    vec!["mpv".into(), "%URL%".into()]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatingConfig {
    #[serde(default = "default_countdown", with = "humantime_serde")]
    pub countdown: Duration,
    #[serde(default = "default_ack_duration", with = "humantime_serde")]
    pub ack_duration: Duration,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            countdown: default_countdown(),
            ack_duration: default_ack_duration(),
        }
    }
}

fn default_countdown() -> Duration {
    Duration::from_secs(10)
}

fn default_ack_duration() -> Duration {
    Duration::from_secs(3)
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.api.base_url.is_empty() {
        base.api.base_url = other.api.base_url;
    }
    if !other.api.user_agent.is_empty() {
        base.api.user_agent = other.api.user_agent;
    }
    if !other.api.country_code.is_empty() {
        base.api.country_code = other.api.country_code;
    }

    if other.feed.page_size != 0 {
        base.feed.page_size = other.feed.page_size;
    }
    base.feed.preload_threshold = other.feed.preload_threshold;
    if other.feed.comment_page_size != 0 {
        base.feed.comment_page_size = other.feed.comment_page_size;
    }

    base.playback.autoplay = other.playback.autoplay;
    base.playback.start_muted = other.playback.start_muted;
    base.playback.auto_advance_delay = other.playback.auto_advance_delay;
    if !other.playback.player_command.is_empty() {
        base.playback.player_command = other.playback.player_command;
    }

    if !other.rating.countdown.is_zero() {
        base.rating.countdown = other.rating.countdown;
    }
    if !other.rating.ack_duration.is_zero() {
        base.rating.ack_duration = other.rating.ack_duration;
    }

    base
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "api.base_url" => cfg.api.base_url = value,
        "api.user_agent" => cfg.api.user_agent = value,
        "api.country_code" => cfg.api.country_code = value,
        "feed.page_size" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.feed.page_size = parsed;
            }
        }
        "feed.preload_threshold" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.feed.preload_threshold = parsed;
            }
        }
        "feed.comment_page_size" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.feed.comment_page_size = parsed;
            }
        }
        "playback.autoplay" => {
            cfg.playback.autoplay = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        "playback.start_muted" => {
            cfg.playback.start_muted = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        "playback.auto_advance_delay" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.playback.auto_advance_delay = duration;
            }
        }
        "playback.player_command" => {
            cfg.playback.player_command = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "rating.countdown" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.rating.countdown = duration;
            }
        }
        "rating.ack_duration" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.rating.ack_duration = duration;
            }
        }
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("reelview").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let cfg = load(LoadOptions {
            env_prefix: Some("REELVIEW_TEST_NONE".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cfg.feed.page_size, 10);
        assert_eq!(cfg.rating.countdown, Duration::from_secs(10));
        assert_eq!(cfg.api.base_url, crate::api::DEFAULT_BASE_URL);
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "feed:\n  page_size: 25\nrating:\n  countdown: 15s\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("REELVIEW_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.feed.page_size, 25);
        assert_eq!(cfg.rating.countdown, Duration::from_secs(15));
        // untouched sections keep their defaults
        assert_eq!(cfg.feed.comment_page_size, 10);
    }

    #[test]
    fn env_overrides() {
        env::set_var("REELVIEW_FEED__PAGE_SIZE", "5");
        let cfg = load(LoadOptions::default()).unwrap();
        assert_eq!(cfg.feed.page_size, 5);
        env::remove_var("REELVIEW_FEED__PAGE_SIZE");
    }
}
