use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{FileStore, SiteCache};
use crate::config::AppConfig;
use crate::devtools::CdpSession;
use crate::driver::{DevTools, PageDriver};
use crate::errors::SelfhealError;
use crate::types::ViewportSize;
use crate::webdriver::{Browser, BrowserType};

/// Flags every subcommand accepts
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<std::path::PathBuf>,
    pub browser: Option<BrowserType>,
    pub headless: Option<bool>,
    pub webdriver_url: Option<String>,
    pub viewport: Option<String>,
}

impl GlobalOptions {
    /// Config file (or defaults) with command-line overrides applied
    pub fn load_config(&self) -> Result<AppConfig> {
        let mut config = AppConfig::load(self.config.as_deref())
            .map_err(|e| SelfhealError::InvalidInput(format!("{:#}", e)))?;
        if let Some(browser) = self.browser {
            config.browser.browser = browser;
        }
        if let Some(headless) = self.headless {
            config.browser.headless = headless;
        }
        if let Some(url) = &self.webdriver_url {
            config.browser.webdriver_url = Some(url.clone());
        }
        if let Some(viewport) = &self.viewport {
            let size = ViewportSize::parse(viewport)
                .map_err(|e| SelfhealError::InvalidInput(e.to_string()))?;
            config.browser.viewport = Some(size);
        }
        Ok(config)
    }
}

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Read and parse a JSON input file; failures map to exit code 6
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| SelfhealError::InvalidInput(format!("{}: {}", path.display(), e)))?;
    let value = serde_json::from_str(&raw)
        .map_err(|e| SelfhealError::InvalidInput(format!("{}: {}", path.display(), e)))?;
    Ok(value)
}

/// Site cache backed by the shared file tier, or `None` when caching is disabled
pub fn open_cache(config: &AppConfig) -> Result<Option<Arc<SiteCache>>> {
    if !config.cache.enabled {
        return Ok(None);
    }
    let dir = config.cache_dir()?;
    let store = FileStore::new(&dir)?;
    Ok(Some(Arc::new(SiteCache::new(
        Some(Arc::new(store)),
        config.cache.ema_alpha,
    ))))
}

/// Live browser: WebDriver for actions, DevTools when the browser offers it
pub struct Session {
    browser: Arc<Browser>,
    devtools: Option<Arc<CdpSession>>,
}

impl Session {
    pub async fn open(config: &AppConfig) -> Result<Self> {
        let browser = Browser::connect(&config.browser)
            .await
            .map_err(|e| SelfhealError::DriverUnavailable(format!("{:#}", e)))?;

        let devtools = if browser.browser_type().has_devtools() {
            match CdpSession::connect(config.browser.devtools_port).await {
                Ok(session) => Some(Arc::new(session)),
                Err(e) => {
                    warn!("DevTools unavailable, continuing without it: {:#}", e);
                    None
                }
            }
        } else {
            info!("{:?} has no DevTools capability", browser.browser_type());
            None
        };

        Ok(Session {
            browser: Arc::new(browser),
            devtools,
        })
    }

    pub fn driver(&self) -> Arc<dyn PageDriver> {
        self.browser.clone()
    }

    pub fn devtools(&self) -> Option<Arc<dyn DevTools>> {
        self.devtools.clone().map(|d| d as Arc<dyn DevTools>)
    }

    /// DevTools, or an error for commands that cannot work without it
    pub fn require_devtools(&self) -> Result<Arc<dyn DevTools>> {
        self.devtools().ok_or_else(|| {
            SelfhealError::DriverUnavailable(
                "this command needs Chrome with a reachable DevTools endpoint".to_string(),
            )
            .into()
        })
    }

    pub async fn goto(&self, url: &str) -> Result<()> {
        self.browser
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {}", url))?;
        if let Some(devtools) = &self.devtools
            && let Err(e) = devtools.refresh().await
        {
            warn!("DevTools refresh after navigation failed: {}", e);
        }
        Ok(())
    }

    /// End the WebDriver session; other holders of the driver must be dropped first
    pub async fn close(self) {
        if let Some(devtools) = self.devtools.and_then(|d| Arc::try_unwrap(d).ok()) {
            devtools.close().await;
        }
        match Arc::try_unwrap(self.browser) {
            Ok(browser) => {
                if let Err(e) = browser.close().await {
                    warn!("Failed to close browser session: {}", e);
                }
            }
            Err(_) => warn!("Browser still in use; session left open"),
        }
    }
}

#[cfg(test)]
#[path = "utils_test.rs"]
mod utils_test;
