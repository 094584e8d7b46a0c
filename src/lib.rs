//! # selfheal
#![allow(clippy::uninlined_format_args)]
//!
//! Self-healing element resolution for recorded browser playbooks.
//!
//! A recorded step remembers an element several ways at once: ranked CSS/XPath
//! selectors, an accessibility identity (role + name, label, test id), text
//! patterns, a structural position and the element's last known box. When the
//! page changes, the resolver walks a fixed cascade of strategies and falls back
//! to geometric and fuzzy-text rescue before giving up. Whatever worked is
//! reported as a healing record and can be folded back into the playbook.
//!
//! ## CLI Usage
//!
//! ```bash
//! # Record the element at a point as a step
//! selfheal capture "https://app.example.com/login" --x 120 --y 340 --output login-button.json
//!
//! # Resolve a stored step against the live page, optionally performing it
//! selfheal resolve "https://app.example.com/login" login-button.json --perform
//!
//! # Run a playbook and persist healed selectors
//! selfheal run playbook.json --write-back
//!
//! # Offline: selectors for a captured snapshot, plan of a stored step
//! selfheal generate snapshot.json
//! selfheal step inspect playbook.json
//!
//! # Site cache and healing history
//! selfheal cache stats --domain app.example.com
//! selfheal cache invalidate app.example.com --path /admin
//! selfheal history playbook.json
//! ```
//!
//! Every command prints JSON on stdout. Errors print
//! `{"error": true, "kind": ..., "message": ..., "exit_code": ...}` and exit
//! with a code per error kind (2 not resolved, 3 step failed, 4 driver
//! unavailable, 5 timeout, 6 invalid input).
//!
//! ## Browsers
//!
//! Actions go through WebDriver (`chromedriver --port 9515` or
//! `geckodriver --port 4444`). Chrome additionally exposes its DevTools port,
//! which `capture` and the accessibility strategies need.
//!
//! ## Library Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use selfheal::{AppConfig, Browser, Resolver, Playbook, Runner};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AppConfig::load(None)?;
//! let browser = Arc::new(Browser::connect(&config.browser).await?);
//! let resolver = Resolver::new(browser.clone(), None, None, config.resolver.clone());
//! let runner = Runner::new(browser, resolver);
//!
//! let mut playbook = Playbook::load("playbook.json".as_ref())?;
//! let report = runner.run(&mut playbook).await;
//! println!("{} steps healed", report.healed);
//! # Ok(())
//! # }
//! ```

/// Two-tier cache of validated selectors per page version
pub mod cache;

/// Element snapshots and accessibility info from the DevTools capability
pub mod capture;

/// The resolution cascade
pub mod cascade;

/// CLI command handlers
pub mod commands;

pub mod config;

/// Chrome DevTools Protocol implementation of `DevTools`
pub mod devtools;

/// Browser capability traits
pub mod driver;

pub mod errors;

/// Selector candidates, validation and enhanced fallbacks
pub mod generator;

pub mod locator;

pub mod recorder;

/// Geometric and fuzzy-text rescue
pub mod rescue;

pub mod runner;

/// Blacklists for generated ids, classes and labels
pub mod stability;

/// Playbook steps and schema-version merging
pub mod step;

pub mod types;

/// WebDriver implementation of `PageDriver`
pub mod webdriver;

#[cfg(test)]
mod test_support;

pub use cache::SiteCache;
pub use cascade::{ResolveOutcome, Resolver, Target};
pub use config::AppConfig;
pub use errors::{DriverError, ResolveError, SelfhealError};
pub use recorder::{Recorder, Recording};
pub use runner::{RunReport, Runner};
pub use step::{Playbook, PlaybookStep};
pub use types::{ActionType, BoundingBox, ElementIdentity, MatchStrategy, SmartSelector};
pub use webdriver::{Browser, BrowserType};
