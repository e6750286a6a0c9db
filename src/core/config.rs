use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::tools::ToolboxConfig;

/// Default instruction given to the model. Mirrors the tool set: search
/// first, then read pages, then answer.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant with the ability to perform \
web searches and view websites using the tools provided. When a user asks you a question and you \
are uncertain or don't know about the topic, or if you simply want to learn more, you can use web \
search and search different websites to find up-to-date information on that topic. You can \
retrieve the content of webpages from search result links using the Search Website tool. Use \
several tool calls consecutively, performing deep searches and trying your best to extract \
relevant and helpful information before responding to the user.";

fn default_model() -> String {
    "palaver-chat-1".to_string()
}

fn default_base_url() -> String {
    "https://api.palaver.example/v1".to_string()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_search_base_url() -> String {
    ToolboxConfig::default().search_base_url
}

fn default_search_result_limit() -> usize {
    5
}

fn default_webpage_timeout_ms() -> u64 {
    5_000
}

fn default_tool_depth_limit() -> usize {
    16
}

fn default_max_attachments() -> usize {
    10
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Falls back to the `PALAVER_API_KEY` environment variable when unset.
    pub api_key: Option<String>,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Pass-through proxy prefix for outbound search/webpage fetches.
    pub relay_base_url: Option<String>,
    #[serde(default = "default_search_base_url")]
    pub search_base_url: String,
    #[serde(default = "default_search_result_limit")]
    pub search_result_limit: usize,
    #[serde(default = "default_webpage_timeout_ms")]
    pub webpage_timeout_ms: u64,
    /// Cap on consecutive tool round-trips within one user turn.
    /// `0` removes the cap, matching the original unbounded behavior.
    #[serde(default = "default_tool_depth_limit")]
    pub tool_depth_limit: usize,
    /// Collapse identical tool calls within one batch into one execution.
    #[serde(default)]
    pub dedupe_tool_calls: bool,
    #[serde(default = "default_max_attachments")]
    pub max_attachments: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key: None,
            system_prompt: default_system_prompt(),
            relay_base_url: None,
            search_base_url: default_search_base_url(),
            search_result_limit: default_search_result_limit(),
            webpage_timeout_ms: default_webpage_timeout_ms(),
            tool_depth_limit: default_tool_depth_limit(),
            dedupe_tool_calls: false,
            max_attachments: default_max_attachments(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Config, Box<dyn std::error::Error>> {
        let config_path = Self::get_config_path();
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(config_path: &PathBuf) -> Result<Config, Box<dyn std::error::Error>> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let config_path = Self::get_config_path();
        self.save_to_path(&config_path)
    }

    pub fn save_to_path(&self, config_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    pub fn get_config_path() -> PathBuf {
        if let Some(proj_dirs) = ProjectDirs::from("org", "permacommons", "palaver") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            PathBuf::from("palaver-config.toml")
        }
    }

    /// API key from the config file or the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("PALAVER_API_KEY").ok())
    }

    pub fn toolbox_config(&self) -> ToolboxConfig {
        ToolboxConfig {
            relay_base_url: self.relay_base_url.clone(),
            search_base_url: self.search_base_url.clone(),
            search_result_limit: self.search_result_limit,
            webpage_timeout_ms: self.webpage_timeout_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::load_from_path(&path).unwrap();

        assert_eq!(config.webpage_timeout_ms, 5_000);
        assert_eq!(config.search_result_limit, 5);
        assert_eq!(config.tool_depth_limit, 16);
        assert_eq!(config.max_attachments, 10);
        assert!(!config.dedupe_tool_calls);
        assert!(config.relay_base_url.is_none());
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.model = "test-model".to_string();
        config.relay_base_url = Some("https://relay.example/".to_string());
        config.tool_depth_limit = 0;
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.model, "test-model");
        assert_eq!(loaded.relay_base_url.as_deref(), Some("https://relay.example/"));
        assert_eq!(loaded.tool_depth_limit, 0);
    }

    #[test]
    fn partial_files_keep_defaults_for_missing_limits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "model = \"m\"\n").unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.model, "m");
        assert_eq!(config.tool_depth_limit, 16);
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }
}
