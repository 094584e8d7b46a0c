//! Configuration loaded from `~/.selfheal/config.json` (or `--config`).
//!
//! Every field has a default so a partial file only overrides what it names.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::types::ViewportSize;
use crate::webdriver::BrowserType;

/// Tuning for the resolution cascade and rescue heuristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResolverConfig {
    /// Upper bound for a single strategy attempt
    pub strategy_timeout_ms: u64,
    /// Upper bound for the whole cascade plus rescue for one step
    pub step_timeout_ms: u64,
    /// Allowed relative width/height drift for the visual strategy
    pub visual_size_tolerance: f64,
    /// Allowed top-left drift in pixels for the visual strategy
    pub visual_position_tolerance: f64,
    /// Matches inspected when breaking ties or filtering editables
    pub tie_break_limit: usize,
    /// Fuzzy rescue ignores elements whose text is this long or longer
    pub fuzzy_max_text_len: usize,
    /// Ancestor levels walked when escalating a generic capture target
    pub dom_walk_depth: usize,
    /// Interactive elements folded into the page structure hash
    pub signature_limit: usize,
    /// Cached selectors below this success rate are not tried first
    pub min_cache_success_rate: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            strategy_timeout_ms: 3_000,
            step_timeout_ms: 30_000,
            visual_size_tolerance: 0.2,
            visual_position_tolerance: 100.0,
            tie_break_limit: 10,
            fuzzy_max_text_len: 50,
            dom_walk_depth: 10,
            signature_limit: 100,
            min_cache_success_rate: 50.0,
        }
    }
}

impl ResolverConfig {
    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_millis(self.strategy_timeout_ms)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    pub enabled: bool,
    /// Directory of the shared file tier; `~/.selfheal/cache` when unset
    pub dir: Option<PathBuf>,
    /// Weight of the newest observation in the success-rate moving average
    pub ema_alpha: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            dir: None,
            ema_alpha: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrowserConfig {
    pub browser: BrowserType,
    /// WebDriver endpoint; derived from the browser type when unset
    pub webdriver_url: Option<String>,
    pub headless: bool,
    pub viewport: Option<ViewportSize>,
    /// Chrome remote-debugging port used for the DevTools capability
    pub devtools_port: u16,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        BrowserConfig {
            browser: BrowserType::Chrome,
            webdriver_url: None,
            headless: true,
            viewport: None,
            devtools_port: 9222,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub resolver: ResolverConfig,
    pub cache: CacheConfig,
    pub browser: BrowserConfig,
}

/// `~/.selfheal`
pub fn config_home() -> Result<PathBuf> {
    let home_dir = dirs::home_dir().context("Unable to determine home directory")?;
    Ok(home_dir.join(".selfheal"))
}

impl AppConfig {
    /// Load `path` if given, else `~/.selfheal/config.json` if it exists, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default_path = config_home()?.join("config.json");
                if !default_path.exists() {
                    debug!("No config file, using defaults");
                    return Ok(AppConfig::default());
                }
                default_path
            }
        };

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Shared cache tier directory (`~/.selfheal/cache` unless configured)
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.cache.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(config_home()?.join("cache")),
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
