//! Blacklists that decide whether an id or class can serve as a selector signal,
//! and normalization of accessible names that embed transient widget state.

use regex::Regex;

lazy_static::lazy_static! {
    /// Generated ids: uuids, timestamps, numeric suffixes and framework prefixes
    static ref DYNAMIC_ID_PATTERNS: Vec<Regex> = [
        r"(?i)^[a-f0-9]{8}-[a-f0-9]{4}",
        r"(?i)[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}",
        r"^\d+$",
        r"^\d{10,}",
        r"_\d+$",
        r"-\d+$",
        r"^react-",
        r"^ember",
        r"^ng-",
        r"^:r[0-9a-z]+:",
        r"^pt-",
        r"^uuid-",
        r"^ext-gen",
        r"^yui-gen",
        r"^closure-lm",
        r"[/.]",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect();

    /// CSS-in-JS hashes and utility-framework classes
    static ref UNSTABLE_CLASS_PATTERNS: Vec<Regex> = [
        r"^css-[a-z0-9]+$",
        r"^sc-[a-zA-Z]+$",
        r"^_[a-zA-Z0-9]{5,}$",
        r"^emotion-",
        r"--[a-zA-Z0-9]{6,}$",
        r"^(p|m)[trblxy]?-\d+$",
        r"^(w|h)-",
        r"^(flex|grid|inline-flex|inline-block)$",
        r"^(items|justify|gap|space)-",
        r"^text-(xs|sm|base|lg|xl|\dxl|left|center|right)$",
        r"^bg-",
        r"^(absolute|relative|fixed|sticky|static)$",
        r"^(hidden|block|inline|visible|invisible)$",
        r"^border(-|$)",
        r"^rounded(-|$)",
        r"^(hover|focus|active|disabled|sm|md|lg|xl):",
        r"^d-",
        r"^col-",
        r"^row-",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect();

    /// Trailing state announcements such as ", selected" or ", 선택됨"
    static ref DYNAMIC_STATE_SUFFIX: Regex = Regex::new(
        r"(?i),\s*(선택됨|선택되지 않음|선택|확장됨|축소됨|expanded|collapsed|selected|not selected|pressed|checked|unchecked|disabled|enabled|active|inactive)\s*$"
    )
    .expect("dynamic state pattern is valid");
}

/// An id is usable as a selector signal only if it looks hand-written
pub fn is_stable_id(id: &str) -> bool {
    let id = id.trim();
    if id.is_empty() {
        return false;
    }
    !DYNAMIC_ID_PATTERNS.iter().any(|p| p.is_match(id))
}

pub fn is_stable_class(class: &str) -> bool {
    let class = class.trim();
    if class.len() < 3 || class.len() >= 40 {
        return false;
    }
    !UNSTABLE_CLASS_PATTERNS.iter().any(|p| p.is_match(class))
}

/// Stable classes from a whitespace-separated `class` attribute, in source order
pub fn stable_classes(class_attr: &str) -> Vec<&str> {
    class_attr
        .split_whitespace()
        .filter(|c| is_stable_class(c))
        .collect()
}

/// Remove trailing dynamic-state suffixes, repeatedly ("Tab, selected, expanded")
pub fn strip_dynamic_state(label: &str) -> String {
    let mut current = label.trim().to_string();
    loop {
        let stripped = DYNAMIC_STATE_SUFFIX.replace(&current, "").trim().to_string();
        if stripped == current {
            return current;
        }
        current = stripped;
    }
}

pub fn has_dynamic_state(label: &str) -> bool {
    DYNAMIC_STATE_SUFFIX.is_match(label.trim())
}

/// Collapse runs of whitespace into one space and trim
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
#[path = "stability_test.rs"]
mod stability_test;
