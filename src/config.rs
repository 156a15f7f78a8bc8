//! TOML configuration, read from `<config dir>/pixfold/config.toml` unless a path is given.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::layout::JustifiedLayout;
use crate::models::IMAGE_PAGE_SIZE;
use crate::thumbnails::DEFAULT_THUMB_HEIGHT;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub layout: JustifiedLayout,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Base URL clients use to reach this server; media URLs are built from it.
    pub public_url: String,
    /// Where the database and stored objects live. Defaults to the XDG data dir.
    pub data_dir: Option<PathBuf>,
    /// HMAC secret for bearer tokens. A random one is generated per run if unset.
    pub token_secret: Option<String>,
    pub page_size: u32,
    pub max_upload_bytes: usize,
    pub thumb_height: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            public_url: "http://127.0.0.1:8080".to_string(),
            data_dir: None,
            token_secret: None,
            page_size: IMAGE_PAGE_SIZE,
            max_upload_bytes: 6 * 1024 * 1024,
            thumb_height: DEFAULT_THUMB_HEIGHT,
        }
    }
}

impl ServerConfig {
    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => {
                let proj_dirs = ProjectDirs::from("", "", "pixfold")
                    .context("Failed to determine project directories")?;
                Ok(proj_dirs.data_dir().to_path_buf())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            token: None,
        }
    }
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "pixfold").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Loads an explicit file (which must exist), or the default file if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => {
                    debug!("No config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config = Self::parse(&text)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_file_gives_defaults() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_override() {
        let config = Config::parse(
            r#"
            [server]
            bind = "0.0.0.0:9000"
            page_size = 12

            [layout]
            target_row_height = 180.0
            search_window = 6

            [layout.heuristic]
            slack = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.server.page_size, 12);
        assert_eq!(config.server.thumb_height, DEFAULT_THUMB_HEIGHT);
        assert_eq!(config.layout.target_row_height, 180.0);
        assert_eq!(config.layout.margin, 2.0);
        assert_eq!(config.layout.search_window, Some(6));
        assert_eq!(config.layout.heuristic.slack, 4);
        assert_eq!(config.layout.heuristic.min_width, 450.0);
        assert_eq!(config.client, ClientConfig::default());
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        let dir = tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[client]\nbase_url = \"http://gallery.local\"\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.client.base_url, "http://gallery.local");
    }

    #[test]
    fn test_malformed_file_fails() {
        assert!(Config::parse("[server\nbind = ").is_err());
    }
}
