use anyhow::Result;
use clap::Subcommand;
use serde_json::json;

use crate::config::AppConfig;
use crate::errors::SelfhealError;

use super::utils::{open_cache, print_json};

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show cache entry counts and success rates
    Stats {
        /// Restrict to one domain
        #[arg(long)]
        domain: Option<String>,
    },

    /// Drop cached selectors for a domain, or for paths under a prefix
    Invalidate {
        domain: String,

        /// Path prefix, e.g. /admin
        #[arg(long)]
        path: Option<String>,
    },
}

pub async fn handle_cache_command(command: CacheCommands, config: &AppConfig) -> Result<()> {
    let cache = open_cache(config)?.ok_or_else(|| {
        SelfhealError::InvalidInput("the site cache is disabled in the configuration".to_string())
    })?;

    match command {
        CacheCommands::Stats { domain } => {
            let stats = cache.stats(domain.as_deref()).await;
            print_json(&stats)
        }
        CacheCommands::Invalidate { domain, path } => {
            let removed = cache.invalidate(&domain, path.as_deref()).await;
            print_json(&json!({
                "domain": domain,
                "path": path,
                "removed": removed,
            }))
        }
    }
}
