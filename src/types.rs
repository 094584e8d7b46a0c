use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Highest confidence a selector candidate can carry
pub const MAX_CONFIDENCE: u8 = 100;

/// Axis-aligned box in CSS pixels, relative to the viewport
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        BoundingBox {
            x,
            y,
            width,
            height,
        }
    }

    /// Elements without geometry report an all-zero box
    pub fn is_zero(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Size within `tolerance` (fractional) and top-left within `max_distance` pixels
    pub fn is_similar(&self, other: &BoundingBox, tolerance: f64, max_distance: f64) -> bool {
        if self.is_zero() || other.is_zero() {
            return false;
        }
        let width_ratio = (other.width - self.width).abs() / self.width;
        let height_ratio = (other.height - self.height).abs() / self.height;
        let distance = ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt();
        width_ratio <= tolerance && height_ratio <= tolerance && distance <= max_distance
    }
}

/// Browser viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportSize {
    /// Viewport width in pixels
    pub width: u32,
    /// Viewport height in pixels
    pub height: u32,
}

impl ViewportSize {
    /// Parse viewport size from "WIDTHxHEIGHT" format (e.g., "1920x1080")
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('x').collect();
        if parts.len() != 2 {
            anyhow::bail!("Invalid viewport format. Use WIDTHxHEIGHT (e.g., 1920x1080)");
        }

        let width = parts[0]
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("Invalid width in viewport size"))?;
        let height = parts[1]
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("Invalid height in viewport size"))?;

        Ok(ViewportSize { width, height })
    }
}

/// What a playbook step does once its target is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Navigate,
    Click,
    Type,
    Select,
    Wait,
    Guide,
    Scroll,
    Hover,
}

impl ActionType {
    /// Actions that write into a form control
    pub fn is_input(&self) -> bool {
        matches!(self, ActionType::Type | ActionType::Select)
    }

    /// Actions that need a resolved element on the page
    pub fn needs_target(&self) -> bool {
        matches!(
            self,
            ActionType::Click | ActionType::Type | ActionType::Select | ActionType::Hover
        )
    }
}

/// Normalized description of one live DOM element, captured at record time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSnapshot {
    #[serde(default)]
    pub node_id: i64,
    #[serde(default)]
    pub backend_node_id: i64,
    /// Lowercase tag name
    pub tag_name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    #[serde(default)]
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub is_visible: bool,
    #[serde(default)]
    pub is_in_viewport: bool,
    #[serde(default)]
    pub xpath: String,
    #[serde(default)]
    pub css_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<LabelAssociation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<StructuralPosition>,
}

impl ElementSnapshot {
    /// Non-empty, trimmed attribute value
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn tag(&self) -> String {
        self.tag_name.to_lowercase()
    }

    pub fn text(&self) -> Option<&str> {
        self.text_content
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// `input`, `textarea` and `select` identify themselves by attributes, not text
    pub fn is_form_field(&self) -> bool {
        matches!(self.tag().as_str(), "input" | "textarea" | "select")
    }
}

/// How a visible label is tied to a form control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelRelationship {
    For,
    Sibling,
    Preceding,
    Following,
    Parent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelAssociation {
    pub label_text: String,
    pub relationship: LabelRelationship,
}

/// Durable, accessibility-first description of which element a step targets.
///
/// Every field is optional so identities recorded by older capture code keep
/// deserializing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ax_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ax_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(default, rename = "dataTestId", skip_serializing_if = "Option::is_none")]
    pub data_test_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub tag_name: String,
    /// Only present when the id passed the stability blacklist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_hash: Option<String>,
    /// Ephemeral; invalid after any navigation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_node_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub captured_at: Option<DateTime<Utc>>,
}

impl ElementIdentity {
    pub fn tag(&self) -> String {
        self.tag_name.to_lowercase()
    }

    /// Accessibility role and name, both present and non-empty
    pub fn ax_pair(&self) -> Option<(&str, &str)> {
        let role = self.ax_role.as_deref().filter(|r| !r.is_empty())?;
        let name = self.ax_name.as_deref().filter(|n| !n.trim().is_empty())?;
        Some((role, name))
    }

    /// The label a human would read for this element
    pub fn label(&self) -> Option<&str> {
        [&self.ax_name, &self.aria_label, &self.text_content]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .map(str::trim)
            .find(|v| !v.is_empty())
    }
}

/// Kind of selector string stored in a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectorStrategy {
    Css,
    Xpath,
    Text,
    Role,
    TestId,
    Placeholder,
    Label,
}

impl SelectorStrategy {
    /// Strategies that identify an element by surrounding or visible text
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            SelectorStrategy::Text | SelectorStrategy::Label | SelectorStrategy::Role
        )
    }
}

fn deserialize_confidence<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(clamp_confidence(raw))
}

/// Round and clamp any score into `0..=100`
pub fn clamp_confidence(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, MAX_CONFIDENCE as f64) as u8
}

/// Confidence of a ranked selector: rank 1 scores 99, and deep ranks floor at 0
pub fn priority_confidence(priority: u32) -> i32 {
    i32::from(MAX_CONFIDENCE).saturating_sub(i32::try_from(priority).unwrap_or(i32::MAX))
}

/// A selector string with its ordinal confidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorWithScore {
    pub strategy: SelectorStrategy,
    pub value: String,
    #[serde(deserialize_with = "deserialize_confidence")]
    pub confidence: u8,
}

impl SelectorWithScore {
    pub fn new(strategy: SelectorStrategy, value: impl Into<String>, confidence: i32) -> Self {
        SelectorWithScore {
            strategy,
            value: value.into(),
            confidence: clamp_confidence(confidence as f64),
        }
    }

    pub fn css(value: impl Into<String>, confidence: i32) -> Self {
        Self::new(SelectorStrategy::Css, value, confidence)
    }

    pub fn adjust(&mut self, delta: i32) {
        self.confidence = clamp_confidence(self.confidence as f64 + delta as f64);
    }
}

/// Stable sort by confidence, highest first
pub fn sort_by_confidence(candidates: &mut [SelectorWithScore]) {
    candidates.sort_by(|a, b| b.confidence.cmp(&a.confidence));
}

/// Ranked selectors for one recorded element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartSelector {
    pub primary: SelectorWithScore,
    #[serde(default)]
    pub fallbacks: Vec<SelectorWithScore>,
    #[serde(default)]
    pub coordinates: BoundingBox,
    #[serde(default)]
    pub element_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<ElementSnapshot>,
}

impl SmartSelector {
    /// Rank `candidates` and split them into primary and fallbacks.
    /// Returns `None` for an empty list.
    pub fn from_candidates(
        mut candidates: Vec<SelectorWithScore>,
        coordinates: BoundingBox,
        element_hash: String,
        snapshot: Option<ElementSnapshot>,
    ) -> Option<Self> {
        sort_by_confidence(&mut candidates);
        let mut iter = candidates.into_iter();
        let primary = iter.next()?;
        Some(SmartSelector {
            primary,
            fallbacks: iter.collect(),
            coordinates,
            element_hash,
            snapshot,
        })
    }

    /// Primary followed by fallbacks, in stored order
    pub fn candidates(&self) -> impl Iterator<Item = &SelectorWithScore> {
        std::iter::once(&self.primary).chain(self.fallbacks.iter())
    }

    /// Re-sort after confidence adjustments so the best candidate becomes primary
    pub fn rerank(&mut self) {
        let mut all: Vec<SelectorWithScore> = std::mem::take(&mut self.fallbacks);
        all.insert(0, self.primary.clone());
        sort_by_confidence(&mut all);
        let mut iter = all.into_iter();
        if let Some(primary) = iter.next() {
            self.primary = primary;
        }
        self.fallbacks = iter.collect();
    }
}

/// Entry of the v2 `selectors[]` list; lower priority is tried first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorInfo {
    pub strategy: SelectorStrategy,
    pub value: String,
    #[serde(default)]
    pub priority: u32,
}

/// Cascade stage that produced (or failed to produce) a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchStrategy {
    Cached,
    Primary,
    Accessibility,
    AriaLabel,
    Name,
    TestId,
    Placeholder,
    InputType,
    StableId,
    Visual,
    Text,
    Fallback,
    Legacy,
    Enhanced,
    Geometric,
    Fuzzy,
    Coordinates,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::Cached => "cached",
            MatchStrategy::Primary => "primary",
            MatchStrategy::Accessibility => "accessibility",
            MatchStrategy::AriaLabel => "ariaLabel",
            MatchStrategy::Name => "name",
            MatchStrategy::TestId => "testId",
            MatchStrategy::Placeholder => "placeholder",
            MatchStrategy::InputType => "inputType",
            MatchStrategy::StableId => "stableId",
            MatchStrategy::Visual => "visual",
            MatchStrategy::Text => "text",
            MatchStrategy::Fallback => "fallback",
            MatchStrategy::Legacy => "legacy",
            MatchStrategy::Enhanced => "enhanced",
            MatchStrategy::Geometric => "geometric",
            MatchStrategy::Fuzzy => "fuzzy",
            MatchStrategy::Coordinates => "coordinates",
        }
    }

    /// Stages that reuse what the recording already validated; no healing record
    pub fn is_recorded_path(&self) -> bool {
        matches!(self, MatchStrategy::Cached | MatchStrategy::Primary)
    }
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One deviation from the stored primary selector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealingRecord {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub original_selector: String,
    pub healed_selector: String,
    pub strategy: MatchStrategy,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_strategy: Option<SelectorStrategy>,
    #[serde(default)]
    pub confidence: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempted: Vec<MatchStrategy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextMatchType {
    Exact,
    Contains,
    Regex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBasedSelector {
    #[serde(rename = "type")]
    pub match_type: TextMatchType,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    pub selector: String,
    #[serde(deserialize_with = "deserialize_confidence")]
    pub confidence: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentChainSelector {
    pub parent_selector: String,
    pub child_selector: String,
    pub full_selector: String,
    pub depth: u32,
    #[serde(deserialize_with = "deserialize_confidence")]
    pub confidence: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyLabelSelector {
    pub label_text: String,
    pub relationship: LabelRelationship,
    pub target_selector: String,
    #[serde(deserialize_with = "deserialize_confidence")]
    pub confidence: u8,
}

/// Selectors consulted only after every primary strategy failed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedFallbacks {
    #[serde(default)]
    pub text_selectors: Vec<TextBasedSelector>,
    #[serde(default)]
    pub parent_chain_selectors: Vec<ParentChainSelector>,
    #[serde(default)]
    pub nearby_label_selectors: Vec<NearbyLabelSelector>,
}

impl EnhancedFallbacks {
    pub fn is_empty(&self) -> bool {
        self.text_selectors.is_empty()
            && self.parent_chain_selectors.is_empty()
            && self.nearby_label_selectors.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentInfo {
    pub tag_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub selector: String,
    #[serde(default)]
    pub is_landmark: bool,
    #[serde(default)]
    pub is_form: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiblingInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_sibling_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_sibling_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_sibling_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_sibling_tag: Option<String>,
    #[serde(default)]
    pub total_siblings: u32,
    #[serde(default)]
    pub position: u32,
}

/// Ordinal position of an element among its siblings, same-tag siblings and form fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralPosition {
    #[serde(default)]
    pub parent_chain: Vec<ParentInfo>,
    #[serde(default)]
    pub sibling_info: SiblingInfo,
    #[serde(default)]
    pub nth_child: u32,
    #[serde(default)]
    pub nth_of_type: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_element_index: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariationKind {
    Korean,
    English,
    Mixed,
    Abbreviated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextVariation {
    #[serde(rename = "type")]
    pub kind: VariationKind,
    pub value: String,
    pub pattern: String,
}

/// Locale and spacing variants of an element's visible text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextPatterns {
    pub original: String,
    pub normalized: String,
    #[serde(default)]
    pub variations: Vec<TextVariation>,
    #[serde(default)]
    pub regex_pattern: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
