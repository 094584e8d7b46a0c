use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

use crate::step::Playbook;
use crate::types::HealingRecord;

use super::utils::{print_json, read_json};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepHistory<'a> {
    step_id: &'a str,
    step_index: usize,
    records: &'a [HealingRecord],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryOutput<'a> {
    playbook: &'a str,
    total: usize,
    steps: Vec<StepHistory<'a>>,
}

/// Healing records stored in a playbook, newest last
pub async fn handle_history(playbook: PathBuf, step: Option<String>) -> Result<()> {
    let playbook: Playbook = read_json(&playbook)?;
    let steps: Vec<StepHistory> = playbook
        .steps
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.healing_history.is_empty())
        .filter(|(_, s)| step.as_deref().is_none_or(|id| s.id == id))
        .map(|(index, s)| StepHistory {
            step_id: &s.id,
            step_index: index,
            records: &s.healing_history,
        })
        .collect();

    print_json(&HistoryOutput {
        playbook: &playbook.metadata.name,
        total: steps.iter().map(|s| s.records.len()).sum(),
        steps,
    })
}
