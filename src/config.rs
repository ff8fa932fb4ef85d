use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DEFAULT_API_URL: &str = "https://api.mangadex.org";
pub const DEFAULT_PAGE_SIZE: usize = 25;

/// Runtime settings, read from `config.json` in the user's config dir.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    /// Language tag used for titles, descriptions and the chapter feed filter.
    pub language: String,
    pub chapter_page_size: usize,
    pub user_agent: String,
    pub search_debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            language: "en".to_string(),
            chapter_page_size: DEFAULT_PAGE_SIZE,
            user_agent: "MangaDex-TUI/0.1.0".to_string(),
            search_debounce_ms: 300,
        }
    }
}

pub fn get_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mangadex-tui")
        .join("config.json")
}

impl Config {
    /// Loads the config from the default location, falling back to defaults
    /// when the file is missing or unreadable.
    pub fn load() -> Self {
        let path = get_config_path();
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("ignoring config at {}: {e}", path.display());
                Config::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.chapter_page_size == 0 {
            return Err(Error::Config("chapter_page_size must be positive".into()));
        }
        if self.language.trim().is_empty() {
            return Err(Error::Config("language must not be empty".into()));
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    pub fn api_root(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }
}
