use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use std::path::PathBuf;

use crate::errors::SelfhealError;
use crate::step::{SchemaVersion, StepPlan, parse_steps};
use crate::types::ActionType;

use super::utils::print_json;

#[derive(Subcommand)]
pub enum StepCommands {
    /// Show the schema generation and merged resolution plan of each step
    Inspect {
        /// Step, step array, or playbook JSON file
        file: PathBuf,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepSummary {
    id: String,
    action: ActionType,
    schema_version: Option<SchemaVersion>,
    primary: String,
    fallback_count: usize,
    has_identity: bool,
    is_form_field: bool,
    healing_count: usize,
    plan: StepPlan,
}

pub async fn handle_step_command(command: StepCommands) -> Result<()> {
    match command {
        StepCommands::Inspect { file } => {
            let raw = std::fs::read_to_string(&file)
                .map_err(|e| SelfhealError::InvalidInput(format!("{}: {}", file.display(), e)))?;
            let steps = parse_steps(&raw)
                .map_err(|e| SelfhealError::InvalidInput(format!("{}: {:#}", file.display(), e)))?;

            let summaries: Vec<StepSummary> = steps
                .iter()
                .map(|step| {
                    let plan = step.plan();
                    StepSummary {
                        id: step.id.clone(),
                        action: step.action,
                        schema_version: step.schema_version(),
                        primary: plan.primary_selector().to_string(),
                        fallback_count: plan.fallbacks.len(),
                        has_identity: plan.identity.is_some(),
                        is_form_field: plan.is_form_field(),
                        healing_count: step.healing_history.len(),
                        plan,
                    }
                })
                .collect();
            print_json(&summaries)
        }
    }
}
