use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use crate::errors::SelfhealError;
use crate::generator::{
    element_hash, enhanced_fallbacks, generate, identity_from_snapshot, text_patterns,
    visual_hash,
};
use crate::types::{
    ElementIdentity, ElementSnapshot, EnhancedFallbacks, SmartSelector, TextPatterns,
};

use super::utils::{print_json, read_json};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateOutput {
    smart_selector: SmartSelector,
    enhanced_fallbacks: EnhancedFallbacks,
    identity: ElementIdentity,
    element_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    visual_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text_patterns: Option<TextPatterns>,
}

pub async fn handle_generate(snapshot: PathBuf) -> Result<()> {
    let snapshot: ElementSnapshot = read_json(&snapshot)?;
    if snapshot.tag_name.trim().is_empty() {
        return Err(SelfhealError::InvalidInput("snapshot has no tagName".to_string()).into());
    }

    let smart_selector = generate(&snapshot).ok_or_else(|| {
        SelfhealError::InvalidInput(format!("no selector candidates for <{}>", snapshot.tag()))
    })?;
    info!(
        "Generated {} candidates for <{}>",
        smart_selector.fallbacks.len() + 1,
        snapshot.tag()
    );

    print_json(&GenerateOutput {
        enhanced_fallbacks: enhanced_fallbacks(&snapshot),
        identity: identity_from_snapshot(&snapshot),
        element_hash: element_hash(&snapshot),
        visual_hash: visual_hash(&snapshot),
        text_patterns: text_patterns(&snapshot),
        smart_selector,
    })
}
