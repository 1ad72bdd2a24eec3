//! Zeroize: erase the startup configuration and reload (console only).
//!
//! Neither `write erase` nor `reload` returns to a prompt the way other
//! commands do, so both are sent with timed reads that stop as soon as the
//! confirmation text shows up. If it never shows up within the confirm
//! window the step fails; nothing is retried.

use std::time::Duration;

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::bytes::Regex;

use super::{Phase, Run, WorkflowResult, require_device};
use crate::driver::{DeviceSession, SendMode};
use crate::error::{Result, WorkflowError};
use crate::profile::VerifiedProfile;

static ERASE_CONFIRM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Erasing|\[confirm\]").expect("valid erase pattern"));

static RELOAD_CONFIRM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Proceed|Save\?").expect("valid reload pattern"));

static PROCEED: Lazy<Regex> = Lazy::new(|| Regex::new(r"Proceed").expect("valid proceed pattern"));

pub const REBOOT_WARNING: &str = "Router reloading....\n\
    After Reboot, username and password can be anything.\n\
    Ensure the correct com port is selected.\n\
    Reboot times may vary allow for 3-5 minutes.";

pub(super) async fn run(run: &Run<'_>, device: Option<VerifiedProfile>) -> Result<WorkflowResult> {
    let profile = require_device(device)?;
    let kind = profile.kind();
    if !kind.supports_factory_reset() {
        return Err(WorkflowError::Unsupported {
            operation: "Zeroize",
            kind,
        }
        .into());
    }

    let mut session = run.session(&profile)?;
    let outcome = steps(run, &mut session).await;
    run.close(&mut session).await;
    outcome?;

    Ok(WorkflowResult::Success)
}

async fn steps(run: &Run<'_>, session: &mut DeviceSession) -> Result<()> {
    run.open(session).await?;
    run.emit("...connected...");
    run.escalate(session).await?;

    let kind = session.kind();
    let window = run.settings.confirm_window * kind.delay_factor();
    let answer_wait = run.settings.timing.timed_interval_for(kind);

    run.phase(Phase::Executing);
    confirm(session, "Erase", "write erase", &ERASE_CONFIRM, window).await?;
    answer(session, "y", answer_wait).await?;
    run.emit("Erase succeed");

    debug!("settling for {:?} before reload", run.settings.erase_settle);
    tokio::time::sleep(run.settings.erase_settle).await;

    let output = confirm(session, "Reload", "reload", &RELOAD_CONFIRM, window).await?;
    if output.contains("Save?") {
        // Saving would undo the erase
        confirm(session, "Reload", "no", &PROCEED, window).await?;
    }
    answer(session, "y", answer_wait).await?;
    run.emit("Reload succeed");
    info!("{} is reloading with factory defaults", session.profile().address());

    run.emit(REBOOT_WARNING);
    Ok(())
}

/// Send `line` and wait up to `window` for `expect`. Returns what arrived.
async fn confirm(
    session: &mut DeviceSession,
    step: &'static str,
    line: &str,
    expect: &Regex,
    window: Duration,
) -> Result<String> {
    let response = session
        .send_command(
            line,
            SendMode::Timed {
                window,
                until: Some(expect),
            },
        )
        .await?;
    if !response.matched {
        return Err(WorkflowError::NotConfirmed { step, window }.into());
    }
    Ok(response.raw_result)
}

/// Send a confirmation keystroke and give the device a moment with it.
async fn answer(session: &mut DeviceSession, key: &str, wait: Duration) -> Result<()> {
    session
        .send_command(
            key,
            SendMode::Timed {
                window: wait,
                until: None,
            },
        )
        .await?;
    Ok(())
}
