//! Last-resort heuristics run after every cascade stage missed.
//!
//! Both are best-effort: driver failures are logged and turn into `None`.

use tracing::{debug, warn};

use crate::driver::{PageDriver, TextCandidate};
use crate::generator::id_selector;
use crate::locator::{Locator, Query, quote};
use crate::stability::{is_stable_id, normalize_whitespace, stable_classes};
use crate::types::{BoundingBox, MatchStrategy, SelectorStrategy, SelectorWithScore};

pub const GEOMETRIC_CONFIDENCE: i32 = 50;
pub const FUZZY_CONFIDENCE: i32 = 45;

/// Matches of the fuzzy selector inspected when pinning the winning element
const FUZZY_PIN_LIMIT: usize = 50;

/// Text-bearing tags scanned by the fuzzy rescue
pub const FUZZY_TAGS: &[&str] = &["BUTTON", "A", "LABEL", "SPAN", "DIV"];

/// A rescued element: the locator to act on and the selector to report
#[derive(Debug, Clone, PartialEq)]
pub struct RescueMatch {
    pub strategy: MatchStrategy,
    pub selector: SelectorWithScore,
    pub locator: Locator,
}

/// Character-level edit distance
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            row[j + 1] = substitution.min(prev[j + 1] + 1).min(row[j] + 1);
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}

/// Largest accepted distance for a target: `max(2, 30% of its length)`
pub fn fuzzy_threshold(target_len: usize) -> usize {
    (target_len * 3 / 10).max(2)
}

/// Closest candidate within the threshold; ties keep the earliest candidate
pub fn best_fuzzy_match<'a>(
    target: &str,
    candidates: &'a [TextCandidate],
) -> Option<(&'a TextCandidate, usize)> {
    let threshold = fuzzy_threshold(target.chars().count());
    let mut best: Option<(&TextCandidate, usize)> = None;
    for candidate in candidates {
        let text = candidate.text.trim();
        if text.is_empty() {
            continue;
        }
        let distance = levenshtein(target, text);
        if distance > threshold {
            continue;
        }
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((candidate, distance));
        }
    }
    best
}

/// `#id`, else the first stable class, else `tag:has-text("…")`
pub fn fuzzy_selector(candidate: &TextCandidate) -> String {
    let tag = candidate.tag_name.to_lowercase();
    if let Some(id) = candidate.id.as_deref().filter(|id| is_stable_id(id)) {
        return id_selector(&tag, id);
    }
    if let Some(class) = candidate
        .class_name
        .as_deref()
        .and_then(|c| stable_classes(c).first().map(|c| c.to_string()))
    {
        return format!("{}.{}", tag, class);
    }
    format!("{}:has-text({})", tag, quote(candidate.text.trim()))
}

/// Same-tag element at the recorded center point, usable only when it has an id
pub async fn geometric(
    driver: &dyn PageDriver,
    coordinates: BoundingBox,
    recorded_tag: &str,
) -> Option<RescueMatch> {
    if coordinates.is_zero() || recorded_tag.is_empty() {
        return None;
    }
    let (x, y) = coordinates.center();
    let found = match driver.element_at_point(x, y).await {
        Ok(found) => found?,
        Err(e) => {
            warn!("Geometric check failed: {}", e);
            return None;
        }
    };
    if !found.tag_name.eq_ignore_ascii_case(recorded_tag) {
        debug!(
            "Geometric: <{}> at ({}, {}) is not a <{}>",
            found.tag_name.to_lowercase(),
            x,
            y,
            recorded_tag
        );
        return None;
    }
    let Some(id) = found.id.filter(|id| !id.is_empty()) else {
        debug!("Geometric: same tag at point but no id to anchor a locator");
        return None;
    };
    let expression = format!("//*[@id={}]", quote(&id));
    Some(RescueMatch {
        strategy: MatchStrategy::Geometric,
        selector: SelectorWithScore::new(
            SelectorStrategy::Xpath,
            expression.clone(),
            GEOMETRIC_CONFIDENCE,
        ),
        locator: Locator::new(Query::XPath { expression }),
    })
}

/// Element whose text is within edit-distance tolerance of the recorded text
pub async fn fuzzy(driver: &dyn PageDriver, target: &str, max_len: usize) -> Option<RescueMatch> {
    let target = target.trim();
    if target.chars().count() <= 2 {
        return None;
    }
    let candidates = match driver.text_candidates(FUZZY_TAGS, max_len).await {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!("Fuzzy text check failed: {}", e);
            return None;
        }
    };
    let (best, distance) = best_fuzzy_match(target, &candidates)?;
    let selector = fuzzy_selector(best);
    debug!(
        "Fuzzy: '{}' ~ '{}' (distance {}) -> {}",
        target, best.text, distance, selector
    );
    let base = match Locator::parse(None, &selector) {
        Ok(locator) => locator,
        Err(e) => {
            warn!("Fuzzy produced an unusable selector {}: {}", selector, e);
            return None;
        }
    };
    let locator = pin_to_text(driver, base, &best.text).await?;
    Some(RescueMatch {
        strategy: MatchStrategy::Fuzzy,
        selector: SelectorWithScore::css(selector, FUZZY_CONFIDENCE),
        locator,
    })
}

/// Narrow a class or id selector to the match carrying the winner's text.
/// Siblings often share the class, so the first match is not necessarily the winner.
async fn pin_to_text(driver: &dyn PageDriver, base: Locator, text: &str) -> Option<Locator> {
    let wanted = normalize_whitespace(text);
    let matches = match driver.inspect(&base, FUZZY_PIN_LIMIT).await {
        Ok(matches) => matches,
        Err(e) => {
            warn!("Fuzzy could not inspect {}: {}", base, e);
            return None;
        }
    };
    match matches
        .iter()
        .find(|m| normalize_whitespace(&m.text) == wanted)
    {
        Some(m) => Some(base.nth(m.index)),
        None => {
            debug!("Fuzzy: no match of {} carries the text '{}'", base, wanted);
            None
        }
    }
}

#[cfg(test)]
#[path = "rescue_test.rs"]
mod rescue_test;
