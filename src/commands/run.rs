use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

use crate::cascade::Resolver;
use crate::config::AppConfig;
use crate::errors::SelfhealError;
use crate::runner::{RunStatus, Runner};
use crate::step::Playbook;

use super::utils::{Session, open_cache, print_json, read_json};

pub async fn handle_run(
    playbook_path: PathBuf,
    write_back: bool,
    url: Option<String>,
    config: &AppConfig,
) -> Result<()> {
    let mut playbook: Playbook = read_json(&playbook_path)?;
    if url.is_some() {
        playbook.metadata.start_url = url;
    }

    let session = Session::open(config).await?;
    let result = async {
        let resolver = Resolver::new(
            session.driver(),
            session.devtools(),
            open_cache(config)?,
            config.resolver.clone(),
        );
        let runner = Runner::new(session.driver(), resolver);

        let stop = runner.stop_handle();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; stopping after the current step");
                stop.store(true, Ordering::SeqCst);
            }
        });
        let report = runner.run(&mut playbook).await;
        watcher.abort();
        if report.status == RunStatus::Completed {
            print_json(&report)?;
        } else {
            warn!("Run report: {}", serde_json::to_string(&report)?);
        }

        if write_back && report.healed > 0 {
            playbook.save(&playbook_path)?;
            info!(
                "Wrote {} healed step(s) back to {}",
                report.healed,
                playbook_path.display()
            );
        }

        match report.status {
            RunStatus::Completed => Ok(()),
            RunStatus::Stopped => Err(anyhow::anyhow!("run stopped before completion")),
            RunStatus::Failed => {
                let (step_id, message) = match report.failure() {
                    Some(failed) => (
                        failed.step_id.clone(),
                        failed.error.clone().unwrap_or_default(),
                    ),
                    None => (
                        "startUrl".to_string(),
                        "failed to open the start URL".to_string(),
                    ),
                };
                Err(SelfhealError::StepFailed { step_id, message }.into())
            }
        }
    }
    .await;

    session.close().await;
    result
}
