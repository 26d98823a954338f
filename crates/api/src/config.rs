use anyhow::{Context, Result};
use extract::DandelionConfig;
use forest::LibraryConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const CONFIG_ENV: &str = "RECURSE_PAPER_CONFIG";
pub const PAPERS_DIR_ENV: &str = "RECURSE_PAPER_DIR";
pub const CACHE_DIR_ENV: &str = "RECURSE_PAPER_CACHE";
pub const BIND_ENV: &str = "RECURSE_PAPER_BIND";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub papers_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub bind_addr: String,
    pub chunk_chars: usize,
    pub render: RenderConfig,
    pub dandelion: DandelionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// `pdftoppm`-compatible program; `None` disables page images.
    pub command: Option<String>,
    pub zoom: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            command: Some("pdftoppm".to_string()),
            zoom: 1.0,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            papers_dir: PathBuf::from("papers"),
            cache_dir: PathBuf::from("cache"),
            bind_addr: "127.0.0.1:3000".to_string(),
            chunk_chars: ingest::DEFAULT_MAX_CHARS,
            render: RenderConfig::default(),
            dandelion: DandelionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the JSON file named by `RECURSE_PAPER_CONFIG`, then
    /// individual environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(&PathBuf::from(path))?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let zoom = self.render.zoom;
        if !zoom.is_finite() || zoom <= 0.0 {
            anyhow::bail!("render.zoom must be a positive number, got {}", zoom);
        }
        if self.chunk_chars == 0 {
            anyhow::bail!("chunk_chars must be at least 1");
        }
        Ok(())
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid config file: {:?}", path))
    }

    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = get(PAPERS_DIR_ENV) {
            self.papers_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get(CACHE_DIR_ENV) {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(addr) = get(BIND_ENV) {
            self.bind_addr = addr;
        }
    }

    pub fn library(&self) -> LibraryConfig {
        LibraryConfig {
            papers_dir: self.papers_dir.clone(),
            cache_dir: self.cache_dir.clone(),
            zoom: self.render.zoom,
        }
    }
}
