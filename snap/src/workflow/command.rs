//! Ad-hoc commands: diagnostics presets and operator-entered lines.

use super::{DiagnosticCommand, Phase, Run, WorkflowResult, require_device};
use crate::driver::{DeviceSession, SendMode};
use crate::error::Result;
use crate::profile::VerifiedProfile;

pub(super) async fn run(
    run: &Run<'_>,
    device: Option<VerifiedProfile>,
    command: &DiagnosticCommand,
) -> Result<WorkflowResult> {
    let line = command.command_line()?;
    let profile = require_device(device)?;

    let mut session = run.session(&profile)?;
    let outcome = steps(run, &mut session, &line).await;
    run.close(&mut session).await;
    let output = outcome?;

    if output.trim().is_empty() {
        run.emit("Process not running.");
    } else {
        run.emit(output);
    }
    Ok(WorkflowResult::Success)
}

async fn steps(run: &Run<'_>, session: &mut DeviceSession, line: &str) -> Result<String> {
    run.open(session).await?;
    run.escalate(session).await?;

    run.phase(Phase::Executing);
    let response = session.send_command(line, SendMode::Synchronous).await?;
    Ok(response.result)
}
