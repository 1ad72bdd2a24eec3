//! Backup: pull the running configuration into a timestamped file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::info;

use super::{Phase, Run, WorkflowResult, require_device};
use crate::driver::{DeviceSession, SendMode};
use crate::error::{Result, WorkflowError};
use crate::profile::VerifiedProfile;

/// `Backup Config <YYYYMMDD-HHMM>.txt` inside `dir`.
pub fn artifact_path(dir: &Path, at: DateTime<Local>) -> PathBuf {
    dir.join(format!("Backup Config {}.txt", at.format("%Y%m%d-%H%M")))
}

pub(super) async fn run(run: &Run<'_>, device: Option<VerifiedProfile>) -> Result<WorkflowResult> {
    let started = Local::now();
    let profile = require_device(device)?;

    let mut session = run.session(&profile)?;
    let outcome = steps(run, &mut session).await;
    run.close(&mut session).await;
    let config = outcome?;

    // The device read already succeeded; a write failure is reported on its own
    let path = artifact_path(&run.settings.backup_dir, started);
    tokio::fs::write(&path, config.as_bytes())
        .await
        .map_err(|source| WorkflowError::Artifact {
            path: path.clone(),
            source,
        })?;
    info!("backup written to {}", path.display());

    run.emit("Configuration pulled");
    Ok(WorkflowResult::Success)
}

async fn steps(run: &Run<'_>, session: &mut DeviceSession) -> Result<String> {
    if session.kind().is_ip() {
        run.emit("Connecting....");
    }
    run.open(session).await?;
    run.emit("...connected...");
    run.escalate(session).await?;

    run.phase(Phase::Executing);
    let running = session
        .send_command("show running-config", SendMode::Synchronous)
        .await?;
    run.emit(running.result.clone());
    Ok(running.result)
}
