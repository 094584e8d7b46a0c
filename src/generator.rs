//! Selector candidate generation.
//!
//! Confidence values are hand-tuned ordinals: they order candidates, they are
//! not probabilities. Ids and classes only count as signals after passing the
//! blacklists in [`crate::stability`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::driver::PageDriver;
use crate::locator::{Locator, Query, quote};
use crate::stability::{
    has_dynamic_state, is_stable_id, normalize_whitespace, stable_classes, strip_dynamic_state,
};
use crate::types::{
    ElementIdentity, ElementSnapshot, EnhancedFallbacks, LabelAssociation, NearbyLabelSelector,
    ParentChainSelector, SelectorStrategy, SelectorWithScore, SmartSelector, StructuralPosition,
    TextBasedSelector, TextMatchType, TextPatterns, TextVariation, VariationKind,
    sort_by_confidence,
};

pub const CONF_TAB_TEXT: i32 = 99;
pub const CONF_ARIA_LABEL: i32 = 98;
pub const CONF_ROLE_NAME: i32 = 95;
pub const CONF_NAME_ATTR: i32 = 93;
pub const CONF_ROLE_ARIA: i32 = 92;
pub const CONF_UNIQUE_TYPE: i32 = 90;
pub const CONF_TEST_ID: i32 = 88;
pub const CONF_PLACEHOLDER: i32 = 85;
pub const CONF_STABLE_ID: i32 = 80;
pub const CONF_TAG_TEXT: i32 = 75;
pub const CONF_ARIA_LABELLEDBY: i32 = 70;
pub const CONF_TEXT: i32 = 65;
pub const CONF_PARENT_CLASSES: i32 = 62;
pub const CONF_PARENT_ID: i32 = 60;
pub const CONF_COMMON_TYPE: i32 = 50;
pub const CONF_CLASSES: i32 = 45;
pub const CONF_XPATH: i32 = 30;
pub const CONF_CSS_PATH: i32 = 20;
pub const CONF_TAG_ONLY: i32 = 10;

pub const CONF_COMBO_TYPE_LABEL: i32 = 95;
pub const CONF_COMBO_ROLE_LABEL: i32 = 93;
pub const CONF_COMBO_NEGATIVE: i32 = 85;

/// Input types that rarely repeat on one page
pub const UNIQUE_INPUT_TYPES: &[&str] = &[
    "password", "email", "tel", "search", "file", "date", "number",
];

pub const FORM_TAGS: &[&str] = &["input", "select", "textarea", "button"];

const TEXT_TAGS: &[&str] = &[
    "button", "a", "span", "div", "label", "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "td",
];

/// Label fragments that make otherwise identical aria-labels ambiguous on the
/// target site family (certificate-login variants of the same button)
const AMBIGUOUS_LABEL_FRAGMENTS: &[&str] = &["인증서", "공동"];

const KOREAN_ENGLISH: &[(&str, &[&str])] = &[
    ("로그인", &["Login", "Sign in"]),
    ("로그아웃", &["Logout", "Sign out"]),
    ("검색", &["Search", "Find"]),
    ("조회", &["Search", "View", "Inquiry"]),
    ("등록", &["Register", "Add", "Create"]),
    ("수정", &["Edit", "Update", "Modify"]),
    ("삭제", &["Delete", "Remove"]),
    ("저장", &["Save", "Submit"]),
    ("취소", &["Cancel"]),
    ("확인", &["OK", "Confirm"]),
    ("닫기", &["Close"]),
    ("목록", &["List"]),
    ("교부관리", &["Grant Management"]),
    ("집행관리", &["Execution Management"]),
    ("정산관리", &["Settlement Management"]),
];

fn digest_hex(input: &str, bytes: usize) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..bytes])
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Short fingerprint of the element's semantic attributes, stable across layout changes
pub fn element_hash(snapshot: &ElementSnapshot) -> String {
    let raw = [
        snapshot.tag(),
        snapshot.attr("aria-label").unwrap_or_default().to_string(),
        snapshot.role.clone().unwrap_or_default(),
        snapshot.attr("name").unwrap_or_default().to_string(),
        snapshot.attr("type").unwrap_or_default().to_string(),
        truncate_chars(snapshot.text().unwrap_or_default(), 30),
    ]
    .join("|");
    digest_hex(&raw, 4)
}

/// Coarse layout fingerprint: role plus size and position bucketed to 10px/50px
pub fn visual_hash(snapshot: &ElementSnapshot) -> Option<String> {
    let bbox = snapshot.bounding_box;
    if bbox.is_zero() {
        return None;
    }
    let raw = format!(
        "{}:{}x{}@{},{}",
        snapshot.role.as_deref().unwrap_or(&snapshot.tag()),
        (bbox.width / 10.0).round(),
        (bbox.height / 10.0).round(),
        (bbox.x / 50.0).round(),
        (bbox.y / 50.0).round()
    );
    Some(digest_hex(&raw, 4))
}

/// `#id` when the id is a plain identifier, else an attribute selector
pub fn id_selector(tag: &str, id: &str) -> String {
    let plain = id.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if plain {
        format!("#{}", id)
    } else {
        format!("{}[id={}]", tag, quote(id))
    }
}

/// Every single-signal candidate for the element, sorted by confidence
pub fn candidates(snapshot: &ElementSnapshot) -> Vec<SelectorWithScore> {
    let tag = snapshot.tag();
    let form_field = snapshot.is_form_field();
    let mut out: Vec<SelectorWithScore> = Vec::new();
    let css = |value: String, confidence: i32| SelectorWithScore::css(value, confidence);

    let role_attr = snapshot.attr("role");

    if let Some(raw_label) = snapshot.attr("aria-label") {
        let clean = strip_dynamic_state(raw_label);
        let dynamic = has_dynamic_state(raw_label);
        if !clean.is_empty() {
            if dynamic && role_attr == Some("tab") && !form_field {
                out.push(SelectorWithScore::new(
                    SelectorStrategy::Text,
                    format!("[role=\"tab\"]:has-text({})", quote(&clean)),
                    CONF_TAB_TEXT,
                ));
            }
            // a stripped label only matches the live attribute as a prefix
            let op = if dynamic { "^=" } else { "=" };
            out.push(css(
                format!("{}[aria-label{}{}]", tag, op, quote(&clean)),
                CONF_ARIA_LABEL,
            ));
            if let Some(role) = role_attr {
                out.push(css(
                    format!("[role={}][aria-label*={}]", quote(role), quote(&clean)),
                    CONF_ROLE_ARIA,
                ));
            }
        }
    }

    if !form_field
        && let (Some(role), Some(name)) = (snapshot.role.as_deref(), snapshot.name.as_deref())
    {
        let name = strip_dynamic_state(name);
        if !role.is_empty() && !name.is_empty() && !matches!(role, "generic" | "none") {
            out.push(SelectorWithScore::new(
                SelectorStrategy::Role,
                Locator::new(Query::Role {
                    role: role.to_string(),
                    name: Some(name),
                    exact: false,
                })
                .to_string(),
                CONF_ROLE_NAME,
            ));
        }
    }

    if let Some(name) = snapshot.attr("name")
        && FORM_TAGS.contains(&tag.as_str())
    {
        out.push(css(format!("{}[name={}]", tag, quote(name)), CONF_NAME_ATTR));
    }

    if tag == "input"
        && let Some(input_type) = snapshot.attr("type")
    {
        let confidence = if UNIQUE_INPUT_TYPES.contains(&input_type) {
            CONF_UNIQUE_TYPE
        } else {
            CONF_COMMON_TYPE
        };
        out.push(css(format!("input[type={}]", quote(input_type)), confidence));
    }

    if let Some(test_id) = snapshot.attr("data-testid") {
        out.push(SelectorWithScore::new(
            SelectorStrategy::TestId,
            format!("[data-testid={}]", quote(test_id)),
            CONF_TEST_ID,
        ));
    }

    if let Some(placeholder) = snapshot.attr("placeholder") {
        out.push(SelectorWithScore::new(
            SelectorStrategy::Placeholder,
            format!("{}[placeholder={}]", tag, quote(placeholder)),
            CONF_PLACEHOLDER,
        ));
    }

    if let Some(id) = snapshot.attr("id")
        && is_stable_id(id)
    {
        out.push(css(id_selector(&tag, id), CONF_STABLE_ID));
    }

    if !form_field && let Some(text) = snapshot.text() {
        let text = normalize_whitespace(text);
        let len = text.chars().count();
        if (1..50).contains(&len) {
            if TEXT_TAGS.contains(&tag.as_str()) {
                out.push(SelectorWithScore::new(
                    SelectorStrategy::Text,
                    format!("{}:has-text({})", tag, quote(&text)),
                    CONF_TAG_TEXT,
                ));
            } else {
                out.push(SelectorWithScore::new(
                    SelectorStrategy::Text,
                    format!("text={}", quote(&text)),
                    CONF_TEXT,
                ));
            }
        }
    }

    if !form_field && let Some(labelledby) = snapshot.attr("aria-labelledby") {
        out.push(SelectorWithScore::new(
            SelectorStrategy::Label,
            format!("{}[aria-labelledby={}]", tag, quote(labelledby)),
            CONF_ARIA_LABELLEDBY,
        ));
    }

    let classes: Vec<&str> = snapshot
        .attr("class")
        .map(|c| stable_classes(c).into_iter().take(2).collect())
        .unwrap_or_default();
    if !classes.is_empty() {
        out.push(css(
            format!("{}.{}", tag, classes.join(".")),
            CONF_CLASSES,
        ));
    }

    if let Some(structure) = &snapshot.structure
        && let Some(parent_id) = structure
            .parent_chain
            .iter()
            .find_map(|p| p.id.as_deref().filter(|id| is_stable_id(id)))
    {
        let parent = id_selector("*", parent_id);
        out.push(css(format!("{} {}", parent, tag), CONF_PARENT_ID));
        if !classes.is_empty() {
            out.push(css(
                format!("{} .{}", parent, classes.join(".")),
                CONF_PARENT_CLASSES,
            ));
        }
    }

    if !snapshot.xpath.is_empty() {
        out.push(SelectorWithScore::new(
            SelectorStrategy::Xpath,
            snapshot.xpath.clone(),
            CONF_XPATH,
        ));
    }

    if !snapshot.css_path.is_empty() {
        out.push(css(snapshot.css_path.clone(), CONF_CSS_PATH));
    }

    dedupe(&mut out);
    sort_by_confidence(&mut out);
    out
}

/// Keep the highest-confidence copy of each selector value
fn dedupe(candidates: &mut Vec<SelectorWithScore>) {
    sort_by_confidence(candidates);
    let mut seen = std::collections::HashSet::new();
    candidates.retain(|c| seen.insert(c.value.clone()));
}

/// Two-attribute AND-combinations tried when no single candidate is unique
pub fn combination_candidates(snapshot: &ElementSnapshot) -> Vec<SelectorWithScore> {
    let tag = snapshot.tag();
    let mut out = Vec::new();
    let Some(label) = snapshot.attr("aria-label") else {
        return out;
    };
    let clean = strip_dynamic_state(label);
    if clean.is_empty() {
        return out;
    }

    if let Some(input_type) = snapshot.attr("type") {
        out.push(SelectorWithScore::css(
            format!(
                "{}[aria-label={}][type={}]",
                tag,
                quote(&clean),
                quote(input_type)
            ),
            CONF_COMBO_TYPE_LABEL,
        ));
    }

    if let Some(role) = snapshot.attr("role") {
        out.push(SelectorWithScore::css(
            format!("[role={}][aria-label={}]", quote(role), quote(&clean)),
            CONF_COMBO_ROLE_LABEL,
        ));
    }

    let excluded: Vec<&&str> = AMBIGUOUS_LABEL_FRAGMENTS
        .iter()
        .filter(|f| !clean.contains(**f))
        .collect();
    if !excluded.is_empty() {
        let negative: String = excluded
            .iter()
            .map(|f| format!(":not([aria-label*='{}'])", f))
            .collect();
        out.push(SelectorWithScore::css(
            format!("{}[aria-label*={}]{}", tag, quote(&clean), negative),
            CONF_COMBO_NEGATIVE,
        ));
    }

    out
}

/// Unvalidated ranking; `None` only when the snapshot yields no candidate at all
pub fn generate(snapshot: &ElementSnapshot) -> Option<SmartSelector> {
    let mut list = candidates(snapshot);
    if list.is_empty() {
        list.push(SelectorWithScore::css(snapshot.tag(), CONF_TAG_ONLY));
    }
    SmartSelector::from_candidates(
        list,
        snapshot.bounding_box,
        element_hash(snapshot),
        Some(snapshot.clone()),
    )
}

/// Outcome of checking candidates against the live page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedSelector {
    pub selector: SelectorWithScore,
    pub is_unique: bool,
    pub match_count: usize,
    pub smart_selector: SmartSelector,
}

async fn match_count(driver: &dyn PageDriver, candidate: &SelectorWithScore) -> Option<usize> {
    let locator = match Locator::from_candidate(candidate) {
        Ok(locator) => locator,
        Err(e) => {
            debug!("Skipping candidate {}: {}", candidate.value, e);
            return None;
        }
    };
    match driver.count(&locator).await {
        Ok(count) => Some(count),
        Err(e) => {
            debug!("Count failed for {}: {}", candidate.value, e);
            None
        }
    }
}

/// Accept the first candidate that matches exactly one element; otherwise try
/// AND-combinations, then settle for the best non-unique candidate.
///
/// The returned `SmartSelector` keeps the chosen selector as primary. Candidates
/// that were checked and found ambiguous stay as fallbacks, capped just below
/// the primary so the list stays sorted.
pub async fn generate_validated(
    snapshot: &ElementSnapshot,
    driver: &dyn PageDriver,
) -> ValidatedSelector {
    let all = candidates(snapshot);
    let mut ambiguous: Vec<(SelectorWithScore, usize)> = Vec::new();
    let mut chosen: Option<(SelectorWithScore, usize, bool)> = None;
    let mut unchecked: Vec<SelectorWithScore> = Vec::new();

    for candidate in all {
        if chosen.is_some() {
            unchecked.push(candidate);
            continue;
        }
        match match_count(driver, &candidate).await {
            Some(1) => {
                debug!("Unique selector: {}", candidate.value);
                chosen = Some((candidate, 1, true));
            }
            Some(0) | None => {}
            Some(n) => ambiguous.push((candidate, n)),
        }
    }

    if chosen.is_none() {
        for combo in combination_candidates(snapshot) {
            if match_count(driver, &combo).await == Some(1) {
                debug!("Unique combined selector: {}", combo.value);
                chosen = Some((combo, 1, true));
                break;
            }
        }
    }

    let (selector, count, is_unique) = match chosen {
        Some(found) => found,
        None => match ambiguous.first() {
            Some((best, n)) => (best.clone(), *n, false),
            None => (
                SelectorWithScore::css(snapshot.tag(), CONF_TAG_ONLY),
                0,
                false,
            ),
        },
    };

    let cap = selector.confidence.saturating_sub(1) as i32;
    let mut fallbacks: Vec<SelectorWithScore> = ambiguous
        .into_iter()
        .filter(|(c, _)| c.value != selector.value)
        .map(|(mut c, _)| {
            if c.confidence as i32 > cap {
                c.confidence = cap.max(0) as u8;
            }
            c
        })
        .chain(unchecked)
        .collect();
    sort_by_confidence(&mut fallbacks);

    ValidatedSelector {
        smart_selector: SmartSelector {
            primary: selector.clone(),
            fallbacks,
            coordinates: snapshot.bounding_box,
            element_hash: element_hash(snapshot),
            snapshot: Some(snapshot.clone()),
        },
        selector,
        is_unique,
        match_count: count,
    }
}

/// Selector for the element itself, used under an ancestor anchor
pub fn child_selector(snapshot: &ElementSnapshot) -> String {
    let tag = snapshot.tag();
    if let Some(name) = snapshot.attr("name") {
        return format!("{}[name={}]", tag, quote(name));
    }
    if let Some(label) = snapshot.attr("aria-label") {
        return format!("{}[aria-label={}]", tag, quote(&strip_dynamic_state(label)));
    }
    if let Some(placeholder) = snapshot.attr("placeholder") {
        return format!("{}[placeholder={}]", tag, quote(placeholder));
    }
    if tag == "input"
        && let Some(input_type) = snapshot.attr("type")
    {
        return format!("input[type={}]", quote(input_type));
    }
    tag
}

/// v4 fallbacks derived from the snapshot alone; check them with
/// [`validate_enhanced`] before persisting.
pub fn enhanced_fallbacks(snapshot: &ElementSnapshot) -> EnhancedFallbacks {
    let tag = snapshot.tag();
    let mut fallbacks = EnhancedFallbacks::default();

    if !snapshot.is_form_field()
        && let Some(text) = snapshot.text()
    {
        let text = normalize_whitespace(text);
        let len = text.chars().count();
        if (2..=100).contains(&len) {
            fallbacks.text_selectors.push(TextBasedSelector {
                match_type: TextMatchType::Exact,
                value: text.clone(),
                pattern: None,
                selector: format!("{}:text({})", tag, quote(&text)),
                confidence: 85,
            });
            fallbacks.text_selectors.push(TextBasedSelector {
                match_type: TextMatchType::Contains,
                value: text.clone(),
                pattern: None,
                selector: format!("{}:has-text({})", tag, quote(&text)),
                confidence: 80,
            });
        }
    }

    if let Some(structure) = &snapshot.structure {
        let child = child_selector(snapshot);
        for (i, parent) in structure.parent_chain.iter().take(5).enumerate() {
            let parent_selector = match (&parent.id, &parent.role) {
                (Some(id), _) if is_stable_id(id) => id_selector(&parent.tag_name, id),
                (_, Some(role)) => format!("[role={}]", quote(role)),
                _ if parent.is_form => "form".to_string(),
                _ if parent.is_landmark => parent.tag_name.clone(),
                _ => continue,
            };
            fallbacks.parent_chain_selectors.push(ParentChainSelector {
                full_selector: format!("{} >> {}", parent_selector, child),
                parent_selector,
                child_selector: child.clone(),
                depth: (i + 1) as u32,
                confidence: (75 - 5 * i as i32).max(0) as u8,
            });
        }
    }

    if let Some(LabelAssociation {
        label_text,
        relationship,
    }) = &snapshot.label
    {
        let label_text = normalize_whitespace(label_text);
        if !label_text.is_empty() {
            fallbacks.nearby_label_selectors.push(NearbyLabelSelector {
                target_selector: format!("label={}", quote(&label_text)),
                label_text,
                relationship: *relationship,
                confidence: 80,
            });
        }
    }

    fallbacks
}

async fn is_unique(driver: &dyn PageDriver, selector: &str) -> bool {
    match Locator::parse(None, selector) {
        Ok(locator) => matches!(driver.count(&locator).await, Ok(1)),
        Err(_) => false,
    }
}

/// Drop enhanced selectors that do not match exactly one element right now
pub async fn validate_enhanced(
    fallbacks: EnhancedFallbacks,
    driver: &dyn PageDriver,
) -> EnhancedFallbacks {
    let mut out = EnhancedFallbacks::default();
    for s in fallbacks.text_selectors {
        if is_unique(driver, &s.selector).await {
            out.text_selectors.push(s);
        }
    }
    for s in fallbacks.parent_chain_selectors {
        if is_unique(driver, &s.full_selector).await {
            out.parent_chain_selectors.push(s);
        }
    }
    for s in fallbacks.nearby_label_selectors {
        if is_unique(driver, &s.target_selector).await {
            out.nearby_label_selectors.push(s);
        }
    }
    out
}

fn variation_kind(text: &str) -> VariationKind {
    let hangul = text
        .chars()
        .any(|c| ('\u{AC00}'..='\u{D7A3}').contains(&c) || ('\u{3131}'..='\u{318E}').contains(&c));
    let latin = text.chars().any(|c| c.is_ascii_alphabetic());
    match (hangul, latin) {
        (true, true) => VariationKind::Mixed,
        (true, false) => VariationKind::Korean,
        _ => VariationKind::English,
    }
}

/// Locale, spacing and keyword variants of an element's text
pub fn text_patterns(snapshot: &ElementSnapshot) -> Option<TextPatterns> {
    if snapshot.is_form_field() {
        return None;
    }
    let original = snapshot.text()?.to_string();
    let len = original.chars().count();
    if !(2..=100).contains(&len) {
        return None;
    }
    let normalized = normalize_whitespace(&original);
    let kind = variation_kind(&normalized);

    let mut variations = vec![TextVariation {
        kind,
        value: normalized.clone(),
        pattern: regex::escape(&normalized),
    }];

    let compact: String = normalized.chars().filter(|c| !c.is_whitespace()).collect();
    if compact != normalized {
        variations.push(TextVariation {
            kind: VariationKind::Abbreviated,
            pattern: regex::escape(&compact),
            value: compact.clone(),
        });
    }

    for (korean, english) in KOREAN_ENGLISH {
        if compact.contains(korean) {
            for eng in english.iter() {
                if variations.iter().any(|v| v.value == *eng) {
                    continue;
                }
                variations.push(TextVariation {
                    kind: VariationKind::English,
                    value: eng.to_string(),
                    pattern: regex::escape(eng),
                });
            }
        }
    }

    let keywords = normalized
        .split_whitespace()
        .filter(|w| w.chars().count() >= 2)
        .take(5)
        .map(str::to_string)
        .collect();

    // whitespace-insensitive so "교부관리" and "교부 관리" share one pattern
    let regex_pattern = compact
        .chars()
        .map(|c| regex::escape(&c.to_string()))
        .collect::<Vec<_>>()
        .join(r"\s*");

    Some(TextPatterns {
        original,
        normalized,
        variations,
        regex_pattern,
        keywords,
    })
}

/// Identity derived from a snapshot, for steps recorded before identities existed
pub fn identity_from_snapshot(snapshot: &ElementSnapshot) -> ElementIdentity {
    let bbox = (!snapshot.bounding_box.is_zero()).then_some(snapshot.bounding_box);
    ElementIdentity {
        ax_role: snapshot.role.clone().filter(|r| !r.is_empty()),
        ax_name: snapshot
            .name
            .as_deref()
            .map(strip_dynamic_state)
            .filter(|n| !n.is_empty()),
        aria_label: snapshot
            .attr("aria-label")
            .map(strip_dynamic_state)
            .filter(|l| !l.is_empty()),
        data_test_id: snapshot.attr("data-testid").map(str::to_string),
        name: snapshot.attr("name").map(str::to_string),
        tag_name: snapshot.tag(),
        id: snapshot
            .attr("id")
            .filter(|id| is_stable_id(id))
            .map(str::to_string),
        input_type: snapshot.attr("type").map(str::to_string),
        placeholder: snapshot.attr("placeholder").map(str::to_string),
        bounding_box: bbox,
        visual_hash: visual_hash(snapshot),
        backend_node_id: (snapshot.backend_node_id > 0).then_some(snapshot.backend_node_id),
        text_content: snapshot.text().map(|t| truncate_chars(t, 100)),
        parent_role: None,
        parent_name: None,
        captured_at: Some(Utc::now()),
    }
}

/// Structural fallbacks computed at replay from a recorded position
pub fn structural_locators(
    structure: &StructuralPosition,
    tag: &str,
    form_field: bool,
) -> Vec<Locator> {
    let mut out = Vec::new();

    if form_field && let Some(index) = structure.form_element_index.filter(|i| *i > 0) {
        let form = structure
            .parent_chain
            .iter()
            .find(|p| p.is_form)
            .map(|p| match &p.id {
                Some(id) if is_stable_id(id) => id_selector("form", id),
                _ => "form".to_string(),
            })
            .unwrap_or_else(|| "form".to_string());
        out.push(
            Locator::css(format!("{} >> input, textarea, select", form)).nth(index as usize - 1),
        );
    }

    if structure.nth_of_type > 0 {
        for parent in structure.parent_chain.iter().take(3) {
            let anchor = match &parent.id {
                Some(id) if is_stable_id(id) => id_selector(&parent.tag_name, id),
                _ if parent.is_landmark || parent.is_form => parent.tag_name.clone(),
                _ => continue,
            };
            out.push(Locator::css(format!(
                "{} >> {}:nth-of-type({})",
                anchor, tag, structure.nth_of_type
            )));
        }
    }

    out
}

#[cfg(test)]
#[path = "generator_test.rs"]
mod generator_test;
