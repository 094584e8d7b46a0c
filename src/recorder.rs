//! Record a step from a point on the live page: capture, generate, validate,
//! and remember the validated selector in the site cache.

use anyhow::{Result, bail};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{SiteCache, page_hash, split_url};
use crate::capture::{Capturer, identity_with_parent};
use crate::config::ResolverConfig;
use crate::driver::{DevTools, PageDriver};
use crate::generator::{
    ValidatedSelector, enhanced_fallbacks, generate_validated, text_patterns, validate_enhanced,
};
use crate::step::PlaybookStep;
use crate::types::{ActionType, ElementSnapshot, SelectorInfo};

/// A freshly recorded step and how its primary selector validated
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    pub step: PlaybookStep,
    pub is_unique: bool,
    pub match_count: usize,
    /// Stored in the site cache for this page version
    pub cached: bool,
    /// Accessibility nodes sharing the recorded role and name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ax_matches: Option<usize>,
}

pub struct Recorder {
    driver: Arc<dyn PageDriver>,
    capturer: Capturer,
    cache: Option<Arc<SiteCache>>,
    config: ResolverConfig,
}

impl Recorder {
    pub fn new(
        driver: Arc<dyn PageDriver>,
        devtools: Arc<dyn DevTools>,
        cache: Option<Arc<SiteCache>>,
        config: ResolverConfig,
    ) -> Self {
        Recorder {
            driver,
            capturer: Capturer::new(devtools, config.clone()),
            cache,
            config,
        }
    }

    /// Record the element under a viewport point as a step carrying every
    /// schema generation's fields.
    pub async fn record_at(&self, x: f64, y: f64, action: ActionType) -> Result<Recording> {
        let Some((snapshot, info)) = self.capturer.capture_full(x, y).await else {
            bail!("No element found at ({}, {})", x, y);
        };
        let identity = identity_with_parent(&snapshot, &info);
        let ax_matches = match identity.ax_pair() {
            Some((role, name)) => {
                let shared = self.capturer.query_by_role_name(role, name).await.len();
                if shared > 1 {
                    warn!(
                        "Accessibility identity {} \"{}\" is shared by {} nodes",
                        role, name, shared
                    );
                }
                Some(shared)
            }
            None => None,
        };
        let validated = generate_validated(&snapshot, self.driver.as_ref()).await;
        let enhanced = validate_enhanced(enhanced_fallbacks(&snapshot), self.driver.as_ref()).await;

        let smart = &validated.smart_selector;
        let mut step = PlaybookStep::new(
            format!("step-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]),
            action,
        );
        step.selector = Some(validated.selector.value.clone());
        step.selectors = std::iter::once(&smart.primary)
            .chain(smart.fallbacks.iter())
            .enumerate()
            .map(|(i, s)| SelectorInfo {
                strategy: s.strategy,
                value: s.value.clone(),
                priority: i as u32 + 1,
            })
            .collect();
        step.smart_selector = Some(smart.clone());
        step.identity = Some(identity);
        step.enhanced_fallbacks = (!enhanced.is_empty()).then_some(enhanced);
        step.structural_position = snapshot.structure.clone();
        step.text_patterns = text_patterns(&snapshot);

        let cached = self.remember(&snapshot, &validated).await;
        info!(
            "Recorded <{}> as {} ({} match{})",
            snapshot.tag(),
            validated.selector.value,
            validated.match_count,
            if validated.match_count == 1 { "" } else { "es" }
        );

        Ok(Recording {
            step,
            is_unique: validated.is_unique,
            match_count: validated.match_count,
            cached,
            ax_matches,
        })
    }

    async fn remember(&self, snapshot: &ElementSnapshot, validated: &ValidatedSelector) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        if !validated.is_unique {
            return false;
        }
        let Some((domain, path)) = self.driver.current_url().await.ok().and_then(|u| split_url(&u))
        else {
            debug!("Current URL has no cacheable domain");
            return false;
        };
        let signature = match self.driver.page_signature(self.config.signature_limit).await {
            Ok(signature) => signature,
            Err(e) => {
                debug!("Page signature unavailable: {}", e);
                return false;
            }
        };
        cache
            .put(&domain, &path, &page_hash(&signature), snapshot, validated)
            .await
    }
}

#[cfg(test)]
#[path = "recorder_test.rs"]
mod recorder_test;
