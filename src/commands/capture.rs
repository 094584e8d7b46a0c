use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use crate::config::AppConfig;
use crate::recorder::Recorder;
use crate::types::ActionType;

use super::utils::{Session, open_cache, print_json};

pub async fn handle_capture(
    url: String,
    x: f64,
    y: f64,
    action: ActionType,
    output: Option<PathBuf>,
    config: &AppConfig,
) -> Result<()> {
    let session = Session::open(config).await?;
    let result = async {
        let devtools = session.require_devtools()?;
        session.goto(&url).await?;

        let recorder = Recorder::new(
            session.driver(),
            devtools,
            open_cache(config)?,
            config.resolver.clone(),
        );
        let recording = recorder.record_at(x, y, action).await?;

        if let Some(path) = &output {
            let json = serde_json::to_string_pretty(&recording.step)?;
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Step written to {}", path.display());
        }
        print_json(&recording)
    }
    .await;

    session.close().await;
    result
}
