//! Verify: prove the credentials work and check the IOS release.

use std::sync::Arc;

use log::{debug, info, warn};

use super::{Phase, Run, WorkflowResult};
use crate::classify::ErrorKind;
use crate::driver::{DeviceSession, SendMode, SessionState};
use crate::error::{Error, Result, WorkflowError};
use crate::profile::{DeviceProfile, VerifiedProfile};
use crate::transport::TransportKind;
use crate::version::{
    COMPATIBILITY_REMINDER, FLASH_IMAGES_COMMAND, GateVerdict, OUTDATED_BANNER,
    SHOW_VERSION_COMMAND, VersionGate,
};

pub(super) async fn run(run: &Run<'_>, profile: Arc<DeviceProfile>) -> Result<WorkflowResult> {
    run.emit("Verifying... (This may take a while on Console)");

    let mut session = run.session(&profile)?;
    let outcome = steps(run, &mut session).await;
    // Only a link that never opened points at the wrong port
    let never_connected = session.state() == SessionState::Disconnected;
    run.close(&mut session).await;

    if let Err(error) = &outcome {
        if never_connected {
            suggest_ports(run, profile.kind(), error);
        }
    }
    outcome?;

    run.emit(format!("Credentials Verified on {}!", profile.kind()));
    Ok(WorkflowResult::Verified(VerifiedProfile::new(profile)))
}

async fn steps(run: &Run<'_>, session: &mut DeviceSession) -> Result<()> {
    run.open(session).await?;
    run.escalate(session).await?;

    if session.in_config_mode() {
        // Leave the device usable for the next attempt
        run.phase(Phase::ExitingConfigMode);
        if let Err(e) = session.exit_config_mode().await {
            warn!("could not leave configuration mode: {}", e);
        }
        return Err(WorkflowError::ConfigModeActive.into());
    }

    run.phase(Phase::Executing);
    let version = session
        .send_command(SHOW_VERSION_COMMAND, SendMode::Synchronous)
        .await?;
    run.emit(version.result.clone());

    let gate = VersionGate::new(run.settings.minimum_version);
    match gate.evaluate(&version.result)? {
        GateVerdict::Supported(found) => {
            debug!("IOS {} meets minimum {}", found, gate.minimum());
        }
        GateVerdict::Outdated { found, minimum } => {
            info!("IOS {} is older than {}", found, minimum);
            run.emit(OUTDATED_BANNER);
            let listing = session
                .send_command(FLASH_IMAGES_COMMAND, SendMode::Synchronous)
                .await?;
            run.emit(listing.result);
            run.emit(COMPATIBILITY_REMINDER);
        }
    }
    Ok(())
}

/// A console port that cannot be opened is most likely the wrong one;
/// list the ports that do exist.
fn suggest_ports(run: &Run<'_>, kind: TransportKind, error: &Error) {
    if kind != TransportKind::Console || kind.classify(error) != ErrorKind::PortUnavailable {
        return;
    }
    run.emit("...COM Port does not appear to be working.");
    run.emit("Try one of these:");
    for port in run.connector.serial_ports() {
        run.emit(port);
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::{Transcript, Workflow};
    use crate::classify::ErrorKind;
    use crate::transport::TransportKind;
    use crate::transport::simulated::{SimulatedDevice, SimulatedFailure};
    use crate::version::{COMPATIBILITY_REMINDER, OUTDATED_BANNER, SHOW_VERSION_COMMAND};

    #[tokio::test(start_paused = true)]
    async fn test_current_release_verifies() {
        let device = SimulatedDevice::new();
        let transcript = Transcript::new();
        let result = engine(&device)
            .run(Workflow::Verify(profile(TransportKind::Telnet)), &transcript)
            .await;

        let verified = result.verified().expect("verify should succeed");
        assert_eq!(verified.kind(), TransportKind::Telnet);
        assert_eq!(
            transcript.lines(),
            vec![
                "Verifying... (This may take a while on Console)",
                "version 15.4",
                "Credentials Verified on Telnet!",
            ]
        );
        assert_eq!(device.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_release_emits_diagnostic_and_verifies() {
        let device = SimulatedDevice::new().version("12.2");
        let transcript = Transcript::new();
        let result = engine(&device)
            .run(Workflow::Verify(profile(TransportKind::Ssh)), &transcript)
            .await;

        assert!(result.verified().is_some());
        let lines = transcript.lines();
        let banner = lines.iter().position(|l| l == OUTDATED_BANNER).unwrap();
        assert!(lines[banner + 1].contains("c2900-universalk9"));
        assert_eq!(lines[banner + 2], COMPATIBILITY_REMINDER);
        assert_eq!(lines.last().unwrap(), "Credentials Verified on SSH!");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparsable_version_fails() {
        let device = SimulatedDevice::new().version_line("version unknown");
        let transcript = Transcript::new();
        let result = engine(&device)
            .run(Workflow::Verify(profile(TransportKind::Ssh)), &transcript)
            .await;

        assert_eq!(result.failure().unwrap().kind, ErrorKind::ParseFailure);
        assert!(!transcript.contains("Credentials Verified"));
        assert_eq!(device.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_mode_conflict() {
        let device = SimulatedDevice::new().in_config_mode();
        let transcript = Transcript::new();
        let result = engine(&device)
            .run(Workflow::Verify(profile(TransportKind::Ssh)), &transcript)
            .await;

        let failure = result.failure().unwrap();
        assert_eq!(failure.kind, ErrorKind::ConfigurationStateConflict);
        assert_eq!(
            transcript.lines().last().unwrap(),
            "Router was in config mode try again."
        );
        assert!(device.received().contains(&"end".to_string()));
        assert_eq!(device.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_console_port_lists_ports() {
        let device = SimulatedDevice::new()
            .failing_connect(SimulatedFailure::PortUnavailable)
            .serial_ports(&["COM1", "COM7"]);
        let transcript = Transcript::new();
        let result = engine(&device)
            .run(Workflow::Verify(profile(TransportKind::Console)), &transcript)
            .await;

        assert_eq!(result.failure().unwrap().kind, ErrorKind::PortUnavailable);
        assert_eq!(
            transcript.lines(),
            vec![
                "Verifying... (This may take a while on Console)",
                "...COM Port does not appear to be working.",
                "Try one of these:",
                "COM1",
                "COM7",
                "Console Error: Make sure you have connectivity.",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_console_drop_mid_session_lists_no_ports() {
        let device = SimulatedDevice::new()
            .hang_up_after(SHOW_VERSION_COMMAND)
            .serial_ports(&["COM1", "COM7"]);
        let transcript = Transcript::new();
        let result = engine(&device)
            .run(Workflow::Verify(profile(TransportKind::Console)), &transcript)
            .await;

        assert_eq!(result.failure().unwrap().kind, ErrorKind::PortUnavailable);
        assert!(!transcript.contains("Try one of these:"));
        assert!(!transcript.contains("COM7"));
        assert_eq!(
            transcript.lines().last().unwrap(),
            "Console Error: Make sure you have connectivity."
        );
        assert_eq!(device.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_credentials() {
        let device = SimulatedDevice::new();
        let profile = crate::profile::DeviceProfile::builder(TransportKind::Telnet, "10.0.0.1")
            .username("admin")
            .password("wrong")
            .build()
            .unwrap();
        let transcript = Transcript::new();
        let result = engine(&device)
            .run(Workflow::Verify(profile), &transcript)
            .await;

        assert_eq!(result.failure().unwrap().kind, ErrorKind::AuthRejected);
        assert_eq!(device.active(), 0);
    }
}
