use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::Result;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::summarize::{DEFAULT_API_BASE, DEFAULT_MODEL, DEFAULT_PROMPT};

pub const API_KEY_ENV: &str = "GROQ_API_KEY";
pub const BIND_ENV: &str = "YTSUM_BIND";

pub const DEFAULT_BIND: &str = "127.0.0.1:8501";
pub const DEFAULT_YT_DLP: &str = "yt-dlp";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CHUNK_CHARS: usize = 12_000;
pub const DEFAULT_TOKEN_MAX_CHARS: usize = 12_000;

/// Contents of the optional config file; every field may be omitted
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub model: Option<String>,
    pub bind: Option<String>,
    pub yt_dlp: Option<String>,
    pub fetch_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub chunk_chars: Option<usize>,
    pub token_max_chars: Option<usize>,
    pub prompt: Option<String>,
}

impl Config {
    /// Load config from ~/.config/ytsum/config.toml if it exists
    pub fn load() -> Result<Self> {
        let path = config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            debug!("No config file found at {}", path.display());
            Ok(Config::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("ytsum")
        .join("config.toml")
}

/// Values given on the command line, which win over everything else
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub bind: Option<String>,
    pub model: Option<String>,
}

/// Fully resolved settings handed to the pipeline and the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub bind: String,
    pub yt_dlp: String,
    pub fetch_timeout: Duration,
    pub request_timeout: Duration,
    pub chunk_chars: usize,
    pub token_max_chars: usize,
    pub prompt: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            bind: DEFAULT_BIND.to_string(),
            yt_dlp: DEFAULT_YT_DLP.to_string(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            chunk_chars: DEFAULT_CHUNK_CHARS,
            token_max_chars: DEFAULT_TOKEN_MAX_CHARS,
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

impl Settings {
    /// Merge CLI overrides, environment and config file, in that priority.
    ///
    /// `env` looks up a variable by name; blank values count as unset.
    pub fn resolve<E>(config: Config, overrides: Overrides, env: E) -> Self
    where
        E: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Settings::default();

        Self {
            api_key: env(API_KEY_ENV).or(config.api_key).filter(|k| !k.trim().is_empty()),
            api_base: config.api_base.unwrap_or(defaults.api_base),
            model: overrides.model.or(config.model).unwrap_or(defaults.model),
            bind: overrides.bind.or_else(|| env(BIND_ENV)).or(config.bind).unwrap_or(defaults.bind),
            yt_dlp: config.yt_dlp.unwrap_or(defaults.yt_dlp),
            fetch_timeout: config
                .fetch_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.fetch_timeout),
            request_timeout: config
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            chunk_chars: config.chunk_chars.unwrap_or(defaults.chunk_chars),
            token_max_chars: config.token_max_chars.unwrap_or(defaults.token_max_chars),
            prompt: config.prompt.unwrap_or(defaults.prompt),
        }
    }

    /// Resolve against the real process environment
    pub fn from_env(config: Config, overrides: Overrides) -> Self {
        Self::resolve(config, overrides, |key| std::env::var(key).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
api_key = "gsk_test"
model = "llama-3.3-70b-versatile"
bind = "0.0.0.0:9000"
fetch_timeout_secs = 60
chunk_chars = 4000
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("gsk_test"));
        assert_eq!(config.model.as_deref(), Some("llama-3.3-70b-versatile"));
        assert_eq!(config.bind.as_deref(), Some("0.0.0.0:9000"));
        assert_eq!(config.fetch_timeout_secs, Some(60));
        assert_eq!(config.chunk_chars, Some(4000));
    }

    #[test]
    fn test_parse_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.api_key.is_none());
        assert!(config.prompt.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "yt_dlp = \"/opt/bin/yt-dlp\"\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.yt_dlp.as_deref(), Some("/opt/bin/yt-dlp"));
    }

    #[test]
    fn test_load_from_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "chunk_chars = \"many\"\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_resolve_defaults() {
        let settings = Settings::resolve(Config::default(), Overrides::default(), env_of(&[]));
        assert_eq!(settings, Settings::default());
        assert!(settings.api_key.is_none());
        assert_eq!(settings.model, "llama-3.1-8b-instant");
    }

    #[test]
    fn test_resolve_env_beats_config_for_api_key() {
        let config = Config {
            api_key: Some("from-file".into()),
            ..Default::default()
        };
        let settings = Settings::resolve(config, Overrides::default(), env_of(&[(API_KEY_ENV, "from-env")]));
        assert_eq!(settings.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_resolve_blank_api_key_is_missing() {
        let config = Config {
            api_key: Some("   ".into()),
            ..Default::default()
        };
        let settings = Settings::resolve(config, Overrides::default(), env_of(&[(API_KEY_ENV, "")]));
        assert!(settings.api_key.is_none());
    }

    #[test]
    fn test_resolve_cli_overrides_win() {
        let config = Config {
            bind: Some("0.0.0.0:1".into()),
            model: Some("file-model".into()),
            ..Default::default()
        };
        let overrides = Overrides {
            bind: Some("127.0.0.1:2".into()),
            model: Some("cli-model".into()),
        };
        let settings = Settings::resolve(config, overrides, env_of(&[(BIND_ENV, "127.0.0.1:3")]));
        assert_eq!(settings.bind, "127.0.0.1:2");
        assert_eq!(settings.model, "cli-model");
    }

    #[test]
    fn test_resolve_env_bind_beats_config() {
        let config = Config {
            bind: Some("0.0.0.0:1".into()),
            ..Default::default()
        };
        let settings = Settings::resolve(config, Overrides::default(), env_of(&[(BIND_ENV, "127.0.0.1:3")]));
        assert_eq!(settings.bind, "127.0.0.1:3");
    }
}
