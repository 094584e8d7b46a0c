//! Sequential playbook execution on top of the resolver.
//!
//! Steps run strictly one after another. Healing records are folded back into
//! the in-memory playbook so a caller can persist the upgraded ranking.

use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cascade::{ResolveOutcome, Resolver, Target};
use crate::driver::PageDriver;
use crate::step::{Playbook, PlaybookStep, interpolate};
use crate::types::{ActionType, MatchStrategy};

/// Scroll distance for `scroll` steps without a target
pub const DEFAULT_SCROLL_PX: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_id: String,
    pub step_index: usize,
    pub status: StepStatus,
    /// Milliseconds
    pub duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Base64 PNG taken when a required step failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub healed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healed_selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heal_method: Option<MatchStrategy>,
}

impl StepResult {
    fn new(step: &PlaybookStep, index: usize) -> Self {
        StepResult {
            step_id: step.id.clone(),
            step_index: index,
            status: StepStatus::Pending,
            duration: 0,
            error: None,
            screenshot: None,
            healed: false,
            healed_selector: None,
            original_selector: None,
            heal_method: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub playbook: String,
    pub status: RunStatus,
    pub results: Vec<StepResult>,
    /// Steps that resolved through something other than their stored primary
    pub healed: usize,
    /// Milliseconds
    pub duration: u64,
}

impl RunReport {
    /// First failed step, if any
    pub fn failure(&self) -> Option<&StepResult> {
        self.results
            .iter()
            .find(|r| r.status == StepStatus::Failed)
    }
}

pub struct Runner {
    driver: Arc<dyn PageDriver>,
    resolver: Resolver,
    stop: Arc<AtomicBool>,
}

impl Runner {
    pub fn new(driver: Arc<dyn PageDriver>, resolver: Resolver) -> Self {
        Runner {
            driver,
            resolver,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked between steps; setting it ends the run as `stopped`
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub async fn run(&self, playbook: &mut Playbook) -> RunReport {
        let started = Instant::now();
        let name = if playbook.metadata.name.is_empty() {
            playbook.metadata.id.clone()
        } else {
            playbook.metadata.name.clone()
        };
        info!("Running playbook '{}' ({} steps)", name, playbook.steps.len());

        let mut results = Vec::with_capacity(playbook.steps.len());
        let mut status = RunStatus::Completed;

        if let Some(url) = playbook.metadata.start_url.as_deref()
            && let Err(e) = self.navigate(&interpolate(url, &playbook.variables)).await
        {
            warn!("Start URL failed: {:#}", e);
            return RunReport {
                playbook: name,
                status: RunStatus::Failed,
                results,
                healed: 0,
                duration: started.elapsed().as_millis() as u64,
            };
        }

        let variables = &playbook.variables;
        for (index, step) in playbook.steps.iter_mut().enumerate() {
            if self.stop.load(Ordering::SeqCst) {
                info!("Run stopped before step {}", index + 1);
                status = RunStatus::Stopped;
                break;
            }
            let result = self.run_step(index, step, variables).await;
            let failed = result.status == StepStatus::Failed;
            results.push(result);
            if failed {
                status = RunStatus::Failed;
                break;
            }
        }

        let healed = results.iter().filter(|r| r.healed).count();
        let duration = started.elapsed().as_millis() as u64;
        info!(
            "Playbook '{}' {:?}: {} steps, {} healed, {} ms",
            name,
            status,
            results.len(),
            healed,
            duration
        );
        RunReport {
            playbook: name,
            status,
            results,
            healed,
            duration,
        }
    }

    async fn run_step(
        &self,
        index: usize,
        step: &mut PlaybookStep,
        variables: &Map<String, Value>,
    ) -> StepResult {
        let started = Instant::now();
        let mut result = StepResult::new(step, index);
        result.status = StepStatus::Running;
        debug!("Step {} ({}) {:?}", index + 1, step.id, step.action);

        let value = step.value.as_deref().map(|v| interpolate(v, variables));
        let outcome = self.execute(step, value.as_deref()).await;

        match outcome {
            Ok(resolved) => {
                result.status = StepStatus::Success;
                if let Some(record) = resolved.and_then(|o| o.healing_record) {
                    result.healed = true;
                    result.healed_selector = Some(record.healed_selector.clone());
                    result.original_selector = Some(record.original_selector.clone());
                    result.heal_method = Some(record.strategy);
                    step.apply_healing(&record);
                }
                if let Some(ms) = step.wait_after.filter(|ms| *ms > 0) {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                }
            }
            Err(e) if step.optional => {
                info!("Optional step {} skipped: {:#}", step.id, e);
                result.status = StepStatus::Skipped;
                result.error = Some(format!("{:#}", e));
            }
            Err(e) => {
                warn!("Step {} failed: {:#}", step.id, e);
                result.status = StepStatus::Failed;
                result.error = Some(format!("{:#}", e));
                result.screenshot = match self.driver.screenshot_base64().await {
                    Ok(png) => Some(png),
                    Err(e) => {
                        debug!("Failure screenshot unavailable: {}", e);
                        None
                    }
                };
            }
        }
        result.duration = started.elapsed().as_millis() as u64;
        result
    }

    /// Perform one step; returns the resolution for element actions
    async fn execute(
        &self,
        step: &PlaybookStep,
        value: Option<&str>,
    ) -> Result<Option<ResolveOutcome>> {
        match step.action {
            ActionType::Navigate => {
                let url = value
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| anyhow!("navigate step has no URL"))?;
                self.navigate(url).await?;
                Ok(None)
            }
            ActionType::Wait => {
                tokio::time::sleep(Duration::from_millis(step.wait_duration_ms())).await;
                Ok(None)
            }
            ActionType::Guide => {
                info!("Guide: {}", step.message.as_deref().unwrap_or_default());
                Ok(None)
            }
            ActionType::Scroll => {
                let plan = step.plan();
                if !plan.has_target() {
                    self.driver.scroll_by(0.0, DEFAULT_SCROLL_PX).await?;
                    return Ok(None);
                }
                let outcome = self.resolve(step).await?;
                match &outcome.target {
                    Some(Target::Locator { locator }) => {
                        self.driver.scroll_into_view(locator).await?
                    }
                    _ => self.driver.scroll_by(0.0, DEFAULT_SCROLL_PX).await?,
                }
                Ok(Some(outcome))
            }
            ActionType::Click | ActionType::Type | ActionType::Select | ActionType::Hover => {
                let outcome = self.resolve(step).await?;
                let text = value.unwrap_or_default();
                match outcome.target.as_ref() {
                    Some(Target::Locator { locator }) => match step.action {
                        ActionType::Click => self.driver.click(locator).await?,
                        ActionType::Type => self.driver.fill(locator, text).await?,
                        ActionType::Select => self.driver.select_option(locator, text).await?,
                        _ => self.driver.hover(locator).await?,
                    },
                    Some(Target::Point { x, y }) => match step.action {
                        ActionType::Click => self.driver.click_at(*x, *y).await?,
                        ActionType::Type => {
                            self.driver.click_at(*x, *y).await?;
                            self.driver.type_focused(text).await?;
                        }
                        other => bail!("{:?} needs an element locator, only a point was found", other),
                    },
                    None => bail!("resolution returned no target"),
                }
                Ok(Some(outcome))
            }
        }
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.driver
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {}", url))?;
        self.resolver.refresh_session().await;
        Ok(())
    }

    async fn resolve(&self, step: &PlaybookStep) -> Result<ResolveOutcome> {
        let plan = step.plan();
        if !plan.has_target() {
            bail!("step {} has no selector or identity to resolve", step.id);
        }
        let outcome = self.resolver.resolve(&plan, step.action).await;
        self.resolver.record_result(&plan, outcome.success).await;
        if !outcome.success {
            bail!(
                "{}",
                outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| "element not resolved".to_string())
            );
        }
        self.resolver.remember(&plan, &outcome).await;
        Ok(outcome)
    }
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod runner_test;
