use anyhow::Result;
use serde_json::Map;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::cascade::Resolver;
use crate::config::AppConfig;
use crate::errors::SelfhealError;
use crate::runner::{RunStatus, Runner};
use crate::step::{Playbook, PlaybookMetadata, PlaybookStep, parse_steps};
use crate::types::ActionType;

use super::utils::{Session, open_cache, print_json};

fn load_step(path: &PathBuf, step_id: Option<&str>) -> Result<PlaybookStep> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| SelfhealError::InvalidInput(format!("{}: {}", path.display(), e)))?;
    let steps = parse_steps(&raw)
        .map_err(|e| SelfhealError::InvalidInput(format!("{}: {:#}", path.display(), e)))?;
    let step = match step_id {
        Some(id) => steps.into_iter().find(|s| s.id == id),
        None => steps.into_iter().next(),
    };
    step.ok_or_else(|| {
        SelfhealError::InvalidInput(format!("{} contains no matching step", path.display())).into()
    })
}

pub async fn handle_resolve(
    url: String,
    step_file: PathBuf,
    step_id: Option<String>,
    action: Option<ActionType>,
    perform: bool,
    config: &AppConfig,
) -> Result<()> {
    let mut step = load_step(&step_file, step_id.as_deref())?;
    if let Some(action) = action {
        step.action = action;
    }
    if !step.action.needs_target() && step.action != ActionType::Scroll {
        return Err(SelfhealError::InvalidInput(format!(
            "step {} is a {:?} step and has no element to resolve",
            step.id, step.action
        ))
        .into());
    }

    let session = Session::open(config).await?;
    let result = async {
        let resolver = Resolver::new(
            session.driver(),
            session.devtools(),
            open_cache(config)?,
            config.resolver.clone(),
        );

        if perform {
            let runner = Runner::new(session.driver(), resolver);
            let mut playbook = Playbook {
                metadata: PlaybookMetadata {
                    id: step.id.clone(),
                    name: step.id.clone(),
                    start_url: Some(url.clone()),
                    ..Default::default()
                },
                variables: Map::new(),
                steps: vec![step],
            };
            let report = runner.run(&mut playbook).await;
            if report.status == RunStatus::Completed {
                return print_json(&report);
            }
            warn!("Run report: {}", serde_json::to_string(&report)?);
            let (step_id, message) = match report.failure() {
                Some(failed) => (
                    failed.step_id.clone(),
                    failed.error.clone().unwrap_or_default(),
                ),
                None => (playbook.metadata.id.clone(), format!("run {:?}", report.status)),
            };
            return Err(SelfhealError::StepFailed { step_id, message }.into());
        }

        session.goto(&url).await?;
        let plan = step.plan();
        let outcome = resolver.resolve(&plan, step.action).await;
        resolver.record_result(&plan, outcome.success).await;
        if !outcome.success {
            warn!("Attempted strategies: {:?}", outcome.attempted);
            return Err(SelfhealError::NotResolved(
                outcome.error.unwrap_or_else(|| plan.primary_selector().to_string()),
            )
            .into());
        }
        resolver.remember(&plan, &outcome).await;
        print_json(&outcome)?;
        info!(
            "Resolved {} via {:?}",
            outcome.selector.as_deref().unwrap_or_default(),
            outcome.strategy_used
        );
        Ok::<(), anyhow::Error>(())
    }
    .await;

    session.close().await;
    result
}
