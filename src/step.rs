//! Persisted playbook steps and the merge of their schema versions.
//!
//! A step can carry fields from four schema generations at once: a v1
//! `selector` string, a v2 `selectors[]` list and `smartSelector`, a v3
//! `identity`, and v4 enhanced fallbacks. [`PlaybookStep::plan`] folds them
//! into a single [`StepPlan`] once, so the resolver never looks at raw fields.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::generator::{element_hash, identity_from_snapshot};
use crate::types::{
    ActionType, BoundingBox, ElementIdentity, EnhancedFallbacks, HealingRecord, MAX_CONFIDENCE,
    SelectorInfo, SelectorStrategy, SelectorWithScore, SmartSelector, StructuralPosition,
    TextPatterns, priority_confidence, sort_by_confidence,
};

/// Priority given to a v1 `selector` when it is appended to the legacy list
pub const V1_LEGACY_PRIORITY: u32 = 999;
/// Confidence bump for a fallback that healed a step
pub const HEAL_BONUS: i32 = 10;
/// Confidence penalty for the primary that failed
pub const PRIMARY_PENALTY: i32 = -15;
/// Default pause for `wait` steps without a timeout
pub const DEFAULT_WAIT_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    V1,
    V2,
    V3,
    V4,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybookStep {
    #[serde(default)]
    pub id: String,
    pub action: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Milliseconds; pause length for `wait`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_after: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selectors: Vec<SelectorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smart_selector: Option<SmartSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<ElementIdentity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced_fallbacks: Option<EnhancedFallbacks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structural_position: Option<StructuralPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_patterns: Option<TextPatterns>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub healing_history: Vec<HealingRecord>,
}

/// Everything the resolver needs from a step, merged across schema versions
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPlan {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<SelectorWithScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<ElementIdentity>,
    pub fallbacks: Vec<SelectorWithScore>,
    /// `selectors[]` in ascending priority
    pub legacy: Vec<SelectorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Target for the fuzzy rescue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhanced: Option<EnhancedFallbacks>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structural_position: Option<StructuralPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_patterns: Option<TextPatterns>,
}

impl StepPlan {
    pub fn primary_selector(&self) -> &str {
        self.primary
            .as_ref()
            .map(|p| p.value.as_str())
            .unwrap_or("(none)")
    }

    /// Recorded element is a form control
    pub fn is_form_field(&self) -> bool {
        matches!(
            self.recorded_tag.as_deref(),
            Some("input" | "textarea" | "select")
        )
    }

    pub fn has_target(&self) -> bool {
        self.primary.is_some()
            || self.identity.is_some()
            || !self.fallbacks.is_empty()
            || !self.legacy.is_empty()
            || self.coordinates.is_some()
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl PlaybookStep {
    pub fn new(id: impl Into<String>, action: ActionType) -> Self {
        PlaybookStep {
            id: id.into(),
            action,
            value: None,
            message: None,
            timeout: None,
            optional: false,
            wait_after: None,
            selector: None,
            selectors: Vec::new(),
            smart_selector: None,
            identity: None,
            enhanced_fallbacks: None,
            structural_position: None,
            text_patterns: None,
            healing_history: Vec::new(),
        }
    }

    /// Highest schema generation present on the step
    pub fn schema_version(&self) -> Option<SchemaVersion> {
        if self.enhanced_fallbacks.is_some()
            || self.structural_position.is_some()
            || self.text_patterns.is_some()
        {
            Some(SchemaVersion::V4)
        } else if self.identity.is_some() {
            Some(SchemaVersion::V3)
        } else if self.smart_selector.is_some() || !self.selectors.is_empty() {
            Some(SchemaVersion::V2)
        } else if non_empty(self.selector.as_deref()).is_some() {
            Some(SchemaVersion::V1)
        } else {
            None
        }
    }

    fn v1_selector(&self) -> Option<String> {
        non_empty(self.selector.as_deref())
    }

    fn legacy_sorted(&self) -> Vec<SelectorInfo> {
        let mut legacy: Vec<SelectorInfo> = self
            .selectors
            .iter()
            .filter(|s| !s.value.trim().is_empty())
            .cloned()
            .collect();
        legacy.sort_by_key(|s| s.priority);
        legacy
    }

    pub fn plan(&self) -> StepPlan {
        let smart = self.smart_selector.as_ref();
        let snapshot = smart.and_then(|s| s.snapshot.as_ref());
        let legacy_sorted = self.legacy_sorted();

        let primary = smart
            .map(|s| s.primary.clone())
            .or_else(|| {
                self.v1_selector()
                    .map(|v| SelectorWithScore::css(v, MAX_CONFIDENCE as i32))
            })
            .or_else(|| {
                legacy_sorted.first().map(|s| {
                    SelectorWithScore::new(
                        s.strategy,
                        s.value.clone(),
                        priority_confidence(s.priority),
                    )
                })
            });
        let primary_value = primary.as_ref().map(|p| p.value.clone());

        let identity = self
            .identity
            .clone()
            .or_else(|| snapshot.map(identity_from_snapshot));

        let mut fallbacks: Vec<SelectorWithScore> = smart
            .map(|s| s.fallbacks.clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|f| Some(&f.value) != primary_value.as_ref())
            .collect();
        sort_by_confidence(&mut fallbacks);

        let mut legacy = legacy_sorted;
        if let Some(v1) = self.v1_selector() {
            legacy.push(SelectorInfo {
                strategy: SelectorStrategy::Css,
                value: v1,
                priority: V1_LEGACY_PRIORITY,
            });
        }
        let mut seen: Vec<String> = primary_value.iter().cloned().collect();
        seen.extend(fallbacks.iter().map(|f| f.value.clone()));
        legacy.retain(|s| {
            if seen.contains(&s.value) {
                false
            } else {
                seen.push(s.value.clone());
                true
            }
        });

        let coordinates = identity
            .as_ref()
            .and_then(|i| i.bounding_box)
            .filter(|b| !b.is_zero())
            .or_else(|| smart.map(|s| s.coordinates).filter(|b| !b.is_zero()));

        let recorded_tag = identity
            .as_ref()
            .map(|i| i.tag())
            .filter(|t| !t.is_empty())
            .or_else(|| snapshot.map(|s| s.tag()).filter(|t| !t.is_empty()));

        let label = identity
            .as_ref()
            .and_then(|i| i.label())
            .map(str::to_string)
            .or_else(|| snapshot.and_then(|s| non_empty(s.attr("aria-label").or(s.text()))));

        let text_selector = smart
            .into_iter()
            .flat_map(|s| s.candidates())
            .map(|c| (c.strategy, c.value.as_str()))
            .chain(legacy.iter().map(|s| (s.strategy, s.value.as_str())))
            .find(|(strategy, _)| *strategy == SelectorStrategy::Text)
            .map(|(_, value)| value.strip_prefix("text=").unwrap_or(value).trim_matches('"'))
            .and_then(|v| non_empty(Some(v)));
        let text = snapshot
            .and_then(|s| non_empty(s.text()))
            .or_else(|| identity.as_ref().and_then(|i| non_empty(i.text_content.as_deref())))
            .or(text_selector);

        let element_hash = smart
            .map(|s| s.element_hash.clone())
            .filter(|h| !h.is_empty())
            .or_else(|| snapshot.map(element_hash));

        let structural_position = self
            .structural_position
            .clone()
            .or_else(|| snapshot.and_then(|s| s.structure.clone()));

        debug!(
            "Planned step {} ({:?}): primary={:?} fallbacks={} legacy={}",
            self.id,
            self.schema_version(),
            primary_value,
            fallbacks.len(),
            legacy.len()
        );

        StepPlan {
            primary,
            identity,
            fallbacks,
            legacy,
            coordinates,
            recorded_tag,
            label,
            text,
            element_hash,
            enhanced: self.enhanced_fallbacks.clone().filter(|e| !e.is_empty()),
            structural_position,
            text_patterns: self.text_patterns.clone(),
        }
    }

    /// Record a heal and, when a stored fallback did the healing, promote it
    pub fn apply_healing(&mut self, record: &HealingRecord) {
        self.healing_history.push(record.clone());
        if !record.success {
            return;
        }
        let Some(smart) = self.smart_selector.as_mut() else {
            return;
        };
        let Some(fallback) = smart
            .fallbacks
            .iter_mut()
            .find(|f| f.value == record.healed_selector)
        else {
            return;
        };
        fallback.adjust(HEAL_BONUS);
        smart.primary.adjust(PRIMARY_PENALTY);
        smart.rerank();
        debug!(
            "Step {} ranking updated; primary is now {}",
            self.id, smart.primary.value
        );
    }

    pub fn wait_duration_ms(&self) -> u64 {
        self.timeout.unwrap_or(DEFAULT_WAIT_MS)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybookMetadata {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    #[serde(default)]
    pub metadata: PlaybookMetadata,
    #[serde(default)]
    pub variables: Map<String, Value>,
    pub steps: Vec<PlaybookStep>,
}

impl Playbook {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read playbook {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse playbook {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Steps from a playbook, a single step, or a bare step array
pub fn parse_steps(raw: &str) -> Result<Vec<PlaybookStep>> {
    let value: Value = serde_json::from_str(raw).context("Invalid JSON")?;
    if value.get("steps").is_some() {
        let playbook: Playbook = serde_json::from_value(value)?;
        return Ok(playbook.steps);
    }
    if value.is_array() {
        return Ok(serde_json::from_value(value)?);
    }
    Ok(vec![serde_json::from_value(value)?])
}

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{\{\s*([\w.\-]+)\s*\}\}").unwrap();
}

fn lookup<'a>(variables: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = variables.get(parts.next()?)?;
    for part in parts {
        current = current.get(part)?;
    }
    Some(current)
}

/// Replace `{{name}}` and `{{a.b}}` with variable values; unknown names stay as written
pub fn interpolate(template: &str, variables: &Map<String, Value>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            match lookup(variables, &caps[1]) {
                Some(Value::String(s)) => s.clone(),
                Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
#[path = "step_test.rs"]
mod step_test;
