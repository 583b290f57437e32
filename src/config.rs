use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use catalog_proto::record::Direction;
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::paginator::PaginatorConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// Defaults to `~/.catalog`.
    pub data_dir: Option<PathBuf>,
    pub log_level: String,
    pub page_size: usize,
    pub scan_batch_size: usize,
    /// Public catalog ordering. Older records tend to carry fuller
    /// attribute lists, so they go first.
    pub catalog_direction: Direction,
    /// Admin dashboard ordering, newest first.
    pub admin_direction: Direction,
    pub brand_cache_ttl_secs: u64,
    pub session_idle_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 9797)),
            data_dir: None,
            log_level: "info".to_string(),
            page_size: 100,
            scan_batch_size: 1000,
            catalog_direction: Direction::Ascending,
            admin_direction: Direction::Descending,
            brand_cache_ttl_secs: 300,
            session_idle_secs: 1800,
        }
    }
}

impl Config {
    pub fn home() -> Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or_else(|| anyhow!("Failed to get home directory"))?
            .join(".catalog"))
    }

    /// `~/.catalog/config.json` if present, then `CATALOG_*` environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let path = Self::home()?.join("config.json");
        let config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        let config = config.with_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn with_env(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        for (key, value) in vars {
            match key.as_str() {
                "CATALOG_LISTEN_ADDR" => {
                    self.listen_addr = value
                        .parse()
                        .with_context(|| format!("CATALOG_LISTEN_ADDR={value}"))?;
                }
                "CATALOG_DATA_DIR" => self.data_dir = Some(PathBuf::from(value)),
                "CATALOG_LOG" => self.log_level = value,
                "CATALOG_PAGE_SIZE" => {
                    self.page_size = value
                        .parse()
                        .with_context(|| format!("CATALOG_PAGE_SIZE={value}"))?;
                }
                "CATALOG_SCAN_BATCH_SIZE" => {
                    self.scan_batch_size = value
                        .parse()
                        .with_context(|| format!("CATALOG_SCAN_BATCH_SIZE={value}"))?;
                }
                _ => {}
            }
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            bail!("page_size must be at least 1");
        }
        if self.scan_batch_size < self.page_size {
            bail!(
                "scan_batch_size ({}) must not be smaller than page_size ({})",
                self.scan_batch_size,
                self.page_size
            );
        }
        self.log_level()?;
        Ok(())
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Self::home(),
        }
    }

    pub fn log_level(&self) -> Result<Level> {
        Level::from_str(&self.log_level)
            .map_err(|_| anyhow!("unknown log level {:?}", self.log_level))
    }

    pub fn catalog_paginator(&self) -> PaginatorConfig {
        PaginatorConfig {
            page_size: self.page_size,
            scan_batch_size: self.scan_batch_size,
            direction: self.catalog_direction,
        }
    }

    pub fn admin_paginator(&self) -> PaginatorConfig {
        PaginatorConfig {
            direction: self.admin_direction,
            ..self.catalog_paginator()
        }
    }

    pub fn brand_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.brand_cache_ttl_secs)
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }
}
