//! Site-level selector cache.
//!
//! Two tiers: an in-process `DashMap` and an optional shared store (JSON files
//! per domain by default). Entries are keyed by (domain, path, element hash)
//! and scored by an exponential moving average of resolution outcomes, so a
//! selector that keeps failing sinks below the trust threshold without being
//! deleted. Page hashes summarize the interactive structure of a page and
//! mark when the markup behind the cached entries changed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::driver::SignatureEntry;
use crate::errors::ResolveError;
use crate::generator::ValidatedSelector;
use crate::locator::Locator;
use crate::types::{
    BoundingBox, ElementSnapshot, MAX_CONFIDENCE, SelectorStrategy, SelectorWithScore,
};

/// Interactive elements folded into a page hash
pub const PAGE_SIGNATURE_LIMIT: usize = 100;

/// Structural signature of a page: sha256 over `tag:aria-label:role:name:type:placeholder`
/// of the first interactive elements, first 16 hex chars
pub fn page_hash(entries: &[SignatureEntry]) -> String {
    let joined = entries
        .iter()
        .take(PAGE_SIGNATURE_LIMIT)
        .map(|e| {
            format!(
                "{}:{}:{}:{}:{}:{}",
                e.tag, e.aria_label, e.role, e.name, e.input_type, e.placeholder
            )
        })
        .collect::<Vec<_>>()
        .join("|");
    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// `(domain, path)` of a page URL; the domain keeps a non-default port
pub fn split_url(raw: &str) -> Option<(String, String)> {
    let parsed = url::Url::parse(raw).ok()?;
    let host = parsed.host_str()?;
    let domain = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    Some((domain, parsed.path().to_string()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSelector {
    pub domain: String,
    pub path: String,
    pub element_hash: String,
    /// Page hash at the time the selector was stored
    pub page_hash: String,
    pub selector: String,
    pub strategy: SelectorStrategy,
    pub confidence: u8,
    #[serde(default)]
    pub fallbacks: Vec<SelectorWithScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default)]
    pub element_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_role: Option<String>,
    #[serde(default)]
    pub hit_count: u64,
    /// Moving average of outcomes in `0..=100`
    pub success_rate: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl CachedSelector {
    fn key(&self) -> String {
        entry_key(&self.domain, &self.path, &self.element_hash)
    }

    pub fn locator(&self) -> Result<Locator, ResolveError> {
        Locator::parse(Some(self.strategy), &self.selector)
    }

    pub fn as_candidate(&self) -> SelectorWithScore {
        SelectorWithScore::new(self.strategy, self.selector.clone(), self.confidence as i32)
    }
}

fn entry_key(domain: &str, path: &str, element_hash: &str) -> String {
    format!("{}:{}:{}", domain, path, element_hash)
}

fn matches_scope(entry_path: &str, path: Option<&str>) -> bool {
    path.is_none_or(|p| entry_path.starts_with(p))
}

/// Everything the shared tier knows about one domain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DomainRecord {
    #[serde(default)]
    entries: Vec<CachedSelector>,
    /// path -> latest page hash
    #[serde(default)]
    pages: BTreeMap<String, String>,
}

impl DomainRecord {
    fn get(&self, path: &str, element_hash: &str) -> Option<&CachedSelector> {
        self.entries
            .iter()
            .find(|e| e.path == path && e.element_hash == element_hash)
    }

    fn upsert(&mut self, entry: CachedSelector) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.path == entry.path && e.element_hash == entry.element_hash)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    fn delete(&mut self, path: Option<&str>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !matches_scope(&e.path, path));
        self.pages.retain(|p, _| !matches_scope(p, path));
        before - self.entries.len()
    }
}

/// Shared (cross-process) cache tier; upserts are last-writer-wins
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(
        &self,
        domain: &str,
        path: &str,
        element_hash: &str,
    ) -> Result<Option<CachedSelector>>;

    async fn upsert(&self, entry: &CachedSelector) -> Result<()>;

    async fn page_hash(&self, domain: &str, path: &str) -> Result<Option<String>>;

    async fn set_page_hash(&self, domain: &str, path: &str, hash: &str) -> Result<()>;

    /// Remove entries and page hashes of `domain` whose path starts with `path`
    async fn delete_prefix(&self, domain: &str, path: Option<&str>) -> Result<usize>;

    /// Every entry, optionally restricted to one domain
    async fn all(&self, domain: Option<&str>) -> Result<Vec<CachedSelector>>;
}

/// One pretty-printed JSON file per domain
pub struct FileStore {
    dir: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;
        Ok(FileStore {
            dir,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, domain: &str) -> PathBuf {
        let name: String = domain
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }

    async fn load(&self, domain: &str) -> DomainRecord {
        let path = self.file_for(domain);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(_) => return DomainRecord::default(),
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Ignoring corrupt cache file {}: {}", path.display(), e);
            DomainRecord::default()
        })
    }

    async fn save(&self, domain: &str, record: &DomainRecord) -> Result<()> {
        let path = self.file_for(domain);
        let json = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write cache file {}", path.display()))
    }

    async fn domains(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                let raw = tokio::fs::read_to_string(&path).await.unwrap_or_default();
                if let Ok(record) = serde_json::from_str::<DomainRecord>(&raw)
                    && let Some(first) = record.entries.first()
                {
                    out.push(first.domain.clone());
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl SharedStore for FileStore {
    async fn get(
        &self,
        domain: &str,
        path: &str,
        element_hash: &str,
    ) -> Result<Option<CachedSelector>> {
        Ok(self.load(domain).await.get(path, element_hash).cloned())
    }

    async fn upsert(&self, entry: &CachedSelector) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.load(&entry.domain).await;
        record.upsert(entry.clone());
        self.save(&entry.domain, &record).await
    }

    async fn page_hash(&self, domain: &str, path: &str) -> Result<Option<String>> {
        Ok(self.load(domain).await.pages.get(path).cloned())
    }

    async fn set_page_hash(&self, domain: &str, path: &str, hash: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.load(domain).await;
        record.pages.insert(path.to_string(), hash.to_string());
        self.save(domain, &record).await
    }

    async fn delete_prefix(&self, domain: &str, path: Option<&str>) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.load(domain).await;
        let removed = record.delete(path);
        self.save(domain, &record).await?;
        Ok(removed)
    }

    async fn all(&self, domain: Option<&str>) -> Result<Vec<CachedSelector>> {
        let domains = match domain {
            Some(domain) => vec![domain.to_string()],
            None => self.domains().await?,
        };
        let mut out = Vec::new();
        for domain in domains {
            out.extend(self.load(&domain).await.entries);
        }
        Ok(out)
    }
}

/// Shared tier kept in memory; used by tests and `--no-cache-dir` style setups
#[derive(Default)]
pub struct MemoryStore {
    domains: Mutex<HashMap<String, DomainRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_domain<T>(&self, domain: &str, f: impl FnOnce(&mut DomainRecord) -> T) -> Result<T> {
        let mut domains = self
            .domains
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(f(domains.entry(domain.to_string()).or_default()))
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(
        &self,
        domain: &str,
        path: &str,
        element_hash: &str,
    ) -> Result<Option<CachedSelector>> {
        self.with_domain(domain, |r| r.get(path, element_hash).cloned())
    }

    async fn upsert(&self, entry: &CachedSelector) -> Result<()> {
        self.with_domain(&entry.domain, |r| r.upsert(entry.clone()))
    }

    async fn page_hash(&self, domain: &str, path: &str) -> Result<Option<String>> {
        self.with_domain(domain, |r| r.pages.get(path).cloned())
    }

    async fn set_page_hash(&self, domain: &str, path: &str, hash: &str) -> Result<()> {
        self.with_domain(domain, |r| {
            r.pages.insert(path.to_string(), hash.to_string());
        })
    }

    async fn delete_prefix(&self, domain: &str, path: Option<&str>) -> Result<usize> {
        self.with_domain(domain, |r| r.delete(path))
    }

    async fn all(&self, domain: Option<&str>) -> Result<Vec<CachedSelector>> {
        let domains = self
            .domains
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(domains
            .iter()
            .filter(|(d, _)| domain.is_none_or(|want| want == d.as_str()))
            .flat_map(|(_, r)| r.entries.clone())
            .collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Entries across both tiers
    pub entries: usize,
    pub local_entries: usize,
    pub tracked_pages: usize,
    pub domains: usize,
    pub average_success_rate: f64,
    pub total_hits: u64,
}

pub struct SiteCache {
    local: DashMap<String, CachedSelector>,
    page_hashes: DashMap<(String, String), String>,
    shared: Option<Arc<dyn SharedStore>>,
    ema_alpha: f64,
}

impl SiteCache {
    pub fn new(shared: Option<Arc<dyn SharedStore>>, ema_alpha: f64) -> Self {
        SiteCache {
            local: DashMap::new(),
            page_hashes: DashMap::new(),
            shared,
            ema_alpha,
        }
    }

    /// Local tier only
    pub fn in_memory() -> Self {
        Self::new(None, 0.1)
    }

    /// Local entry, else shared entry (promoted to local)
    pub async fn get(&self, domain: &str, path: &str, element_hash: &str) -> Option<CachedSelector> {
        let key = entry_key(domain, path, element_hash);
        if let Some(hit) = self.local.get(&key) {
            debug!("Local cache hit: {}", key);
            return Some(hit.clone());
        }
        let shared = self.shared.as_ref()?;
        match shared.get(domain, path, element_hash).await {
            Ok(Some(entry)) => {
                debug!("Shared cache hit: {}", key);
                self.local.insert(key, entry.clone());
                Some(entry)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Shared cache lookup failed: {}", e);
                None
            }
        }
    }

    /// Store a validated recording result; non-unique results are not cached
    pub async fn put(
        &self,
        domain: &str,
        path: &str,
        page_hash: &str,
        snapshot: &ElementSnapshot,
        result: &ValidatedSelector,
    ) -> bool {
        if !result.is_unique {
            debug!("Not caching non-unique selector {}", result.selector.value);
            return false;
        }
        let smart = &result.smart_selector;
        let entry = CachedSelector {
            domain: domain.to_string(),
            path: path.to_string(),
            element_hash: smart.element_hash.clone(),
            page_hash: page_hash.to_string(),
            selector: result.selector.value.clone(),
            strategy: result.selector.strategy,
            confidence: result.selector.confidence,
            fallbacks: smart.fallbacks.clone(),
            bounding_box: (!snapshot.bounding_box.is_zero()).then_some(snapshot.bounding_box),
            element_type: snapshot.tag(),
            element_role: snapshot.role.clone(),
            hit_count: 0,
            success_rate: MAX_CONFIDENCE as f64,
            updated_at: Utc::now(),
        };
        self.upsert(entry).await;
        self.save_page_hash(domain, path, page_hash).await;
        true
    }

    /// Insert or replace, keeping the hit count and success rate of an existing entry
    pub async fn upsert(&self, mut entry: CachedSelector) {
        if let Some(existing) = self
            .get(&entry.domain, &entry.path, &entry.element_hash)
            .await
        {
            entry.hit_count = existing.hit_count + 1;
            entry.success_rate = existing.success_rate;
        }
        entry.updated_at = Utc::now();
        debug!("Caching {} -> {}", entry.key(), entry.selector);
        self.local.insert(entry.key(), entry.clone());
        if let Some(shared) = &self.shared
            && let Err(e) = shared.upsert(&entry).await
        {
            warn!("Shared cache write failed: {}", e);
        }
    }

    /// Fold one resolution outcome into the entry's success-rate average
    pub async fn record_result(&self, domain: &str, path: &str, element_hash: &str, success: bool) {
        let Some(mut entry) = self.get(domain, path, element_hash).await else {
            return;
        };
        let rate = entry.success_rate;
        let next = if success {
            rate + self.ema_alpha * (100.0 - rate)
        } else {
            rate - self.ema_alpha * rate
        };
        entry.success_rate = next.clamp(0.0, 100.0);
        entry.hit_count += 1;
        entry.updated_at = Utc::now();
        debug!(
            "Cache {} success rate {:.1} -> {:.1}",
            entry.key(),
            rate,
            entry.success_rate
        );
        self.local.insert(entry.key(), entry.clone());
        if let Some(shared) = &self.shared
            && let Err(e) = shared.upsert(&entry).await
        {
            warn!("Shared cache write failed: {}", e);
        }
    }

    /// True when the stored page hash differs, or on the first visit (the
    /// current hash is then remembered)
    pub async fn is_page_changed(&self, domain: &str, path: &str, current_hash: &str) -> bool {
        let key = (domain.to_string(), path.to_string());
        if let Some(known) = self.page_hashes.get(&key) {
            let changed = known.as_str() != current_hash;
            if changed {
                info!("Page changed: {}{}", domain, path);
            }
            return changed;
        }
        if let Some(shared) = &self.shared {
            match shared.page_hash(domain, path).await {
                Ok(Some(known)) => {
                    let changed = known != current_hash;
                    if changed {
                        info!("Page changed since last recorded visit: {}{}", domain, path);
                    }
                    self.page_hashes.insert(key, known);
                    return changed;
                }
                Ok(None) => {}
                Err(e) => warn!("Shared page hash lookup failed: {}", e),
            }
        }
        self.page_hashes.insert(key, current_hash.to_string());
        true
    }

    pub async fn save_page_hash(&self, domain: &str, path: &str, hash: &str) {
        self.page_hashes
            .insert((domain.to_string(), path.to_string()), hash.to_string());
        if let Some(shared) = &self.shared
            && let Err(e) = shared.set_page_hash(domain, path, hash).await
        {
            warn!("Shared page hash write failed: {}", e);
        }
    }

    /// Drop entries and page hashes for a domain, or for paths under a prefix
    pub async fn invalidate(&self, domain: &str, path: Option<&str>) -> usize {
        let before = self.local.len();
        self.local
            .retain(|_, e| !(e.domain == domain && matches_scope(&e.path, path)));
        let mut removed = before - self.local.len();
        self.page_hashes
            .retain(|(d, p), _| !(d == domain && matches_scope(p, path)));

        if let Some(shared) = &self.shared {
            match shared.delete_prefix(domain, path).await {
                Ok(n) => removed = removed.max(n),
                Err(e) => warn!("Shared cache invalidation failed: {}", e),
            }
        }
        info!(
            "Cache invalidated: {}{} ({} entries)",
            domain,
            path.unwrap_or(""),
            removed
        );
        removed
    }

    pub async fn stats(&self, domain: Option<&str>) -> CacheStats {
        let mut merged: HashMap<String, CachedSelector> = HashMap::new();
        if let Some(shared) = &self.shared {
            match shared.all(domain).await {
                Ok(entries) => merged.extend(entries.into_iter().map(|e| (e.key(), e))),
                Err(e) => warn!("Shared cache listing failed: {}", e),
            }
        }
        for entry in self.local.iter() {
            if domain.is_none_or(|d| d == entry.domain) {
                merged.insert(entry.key().clone(), entry.value().clone());
            }
        }

        let domains: std::collections::HashSet<&str> =
            merged.values().map(|e| e.domain.as_str()).collect();
        let average_success_rate = if merged.is_empty() {
            0.0
        } else {
            merged.values().map(|e| e.success_rate).sum::<f64>() / merged.len() as f64
        };

        CacheStats {
            entries: merged.len(),
            local_entries: self
                .local
                .iter()
                .filter(|e| domain.is_none_or(|d| d == e.domain))
                .count(),
            tracked_pages: self.page_hashes.len(),
            domains: domains.len(),
            average_success_rate,
            total_hits: merged.values().map(|e| e.hit_count).sum(),
        }
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod cache_test;
