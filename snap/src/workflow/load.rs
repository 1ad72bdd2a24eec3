//! Load: push a configuration file line by line and save it.

use log::warn;

use super::{ConfigurationPayload, Phase, Run, WorkflowResult, require_device};
use crate::driver::{DeviceSession, SendMode};
use crate::error::{Result, WorkflowError};
use crate::profile::VerifiedProfile;

pub(super) async fn run(
    run: &Run<'_>,
    device: Option<VerifiedProfile>,
    payload: &ConfigurationPayload,
) -> Result<WorkflowResult> {
    if payload.is_empty() {
        return Err(WorkflowError::EmptyPayload.into());
    }
    let profile = require_device(device)?;

    let mut session = run.session(&profile)?;
    let outcome = steps(run, &mut session, payload).await;
    run.close(&mut session).await;
    outcome?;

    run.emit("Load Complete");
    Ok(WorkflowResult::Success)
}

async fn steps(
    run: &Run<'_>,
    session: &mut DeviceSession,
    payload: &ConfigurationPayload,
) -> Result<()> {
    run.open(session).await?;
    run.emit("...connected...");
    run.escalate(session).await?;
    if session.kind().is_ip() {
        run.emit("...this may take a while...");
    }

    run.phase(Phase::ConfiguringMode);
    session.enter_config_mode().await?;
    session.use_load_timing();

    run.phase(Phase::Executing);
    for line in payload.lines() {
        run.emit(line.as_str());
        let response = session.send_command(line, SendMode::Synchronous).await?;
        // Complaints are reported, not fatal: the payload is not validated
        if let Some(complaint) = &response.failure_message {
            warn!("device rejected '{}': {}", line, complaint);
            run.emit(response.result.clone());
        }
    }

    run.phase(Phase::ExitingConfigMode);
    session.exit_config_mode().await?;

    let running = session
        .send_command("show running-config", SendMode::Synchronous)
        .await?;
    run.emit(running.result);
    session
        .send_command("write memory", SendMode::Synchronous)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::{ConfigurationPayload, Transcript, Workflow};
    use crate::classify::ErrorKind;
    use crate::transport::TransportKind;
    use crate::transport::simulated::SimulatedDevice;

    fn load(kind: TransportKind, text: &str) -> Workflow {
        Workflow::Load {
            device: verified(kind),
            payload: ConfigurationPayload::from_text(text),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_payload_never_connects() {
        let device = SimulatedDevice::new();
        let transcript = Transcript::new();
        let result = engine(&device)
            .run(load(TransportKind::Ssh, "\n\n"), &transcript)
            .await;

        assert_eq!(result.failure().unwrap().kind, ErrorKind::InvalidInput);
        assert_eq!(transcript.lines(), vec!["No config to load."]);
        assert_eq!(device.connects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_payload_checked_before_profile() {
        let device = SimulatedDevice::new();
        let transcript = Transcript::new();
        engine(&device)
            .run(
                Workflow::Load {
                    device: None,
                    payload: ConfigurationPayload::default(),
                },
                &transcript,
            )
            .await;
        assert_eq!(transcript.lines(), vec!["No config to load."]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_over_ssh() {
        let device = SimulatedDevice::new().running_config("hostname R2\ninterface Gi0/2");
        let transcript = Transcript::new();
        let result = engine(&device)
            .run(
                load(TransportKind::Ssh, "hostname R2\ninterface Gi0/2\n no shutdown"),
                &transcript,
            )
            .await;

        assert!(result.is_success());
        assert_eq!(
            transcript.lines(),
            vec![
                "...connected...",
                "...this may take a while...",
                "hostname R2",
                "interface Gi0/2",
                " no shutdown",
                "hostname R2\ninterface Gi0/2",
                "Load Complete",
            ]
        );

        let received = device.received();
        let config_at = received.iter().position(|l| l == "configure terminal").unwrap();
        let end_at = received.iter().position(|l| l == "end").unwrap();
        let write_at = received.iter().position(|l| l == "write memory").unwrap();
        assert!(config_at < end_at && end_at < write_at);
        assert_eq!(device.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_console_load_skips_ip_notice() {
        let device = SimulatedDevice::new();
        let transcript = Transcript::new();
        let result = engine(&device)
            .run(load(TransportKind::Console, "hostname R2"), &transcript)
            .await;

        assert!(result.is_success());
        assert!(!transcript.contains("this may take a while"));
        assert_eq!(transcript.lines().first().unwrap(), "...connected...");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_line_does_not_abort() {
        let device = SimulatedDevice::new().reject_config_line("bogus command");
        let transcript = Transcript::new();
        let result = engine(&device)
            .run(
                load(TransportKind::Telnet, "bogus command\nhostname R2"),
                &transcript,
            )
            .await;

        assert!(result.is_success());
        assert!(transcript.contains("% Invalid input"));
        assert!(device.received().contains(&"hostname R2".to_string()));
        assert_eq!(transcript.lines().last().unwrap(), "Load Complete");
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_aborts_remaining_lines() {
        let device = SimulatedDevice::new().stall_after("ip domain-name lab");
        let transcript = Transcript::new();
        let result = engine(&device)
            .run(
                load(
                    TransportKind::Console,
                    "hostname R2\nip domain-name lab\nip name-server 10.0.0.53",
                ),
                &transcript,
            )
            .await;

        assert_eq!(result.failure().unwrap().kind, ErrorKind::Timeout);
        assert_eq!(
            transcript.lines(),
            vec![
                "...connected...",
                "hostname R2",
                "ip domain-name lab",
                "Timeout Error: Make sure you are still connected",
            ]
        );

        // Lines already sent stay applied; nothing after the failure is sent
        let received = device.received();
        assert!(received.contains(&"hostname R2".to_string()));
        assert!(!received.contains(&"ip name-server 10.0.0.53".to_string()));
        assert!(!received.contains(&"end".to_string()));
        assert!(!received.contains(&"write memory".to_string()));
        assert_eq!(device.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_link_aborts_remaining_lines() {
        let device = SimulatedDevice::new().hang_up_after("hostname R2");
        let transcript = Transcript::new();
        let result = engine(&device)
            .run(
                load(TransportKind::Ssh, "hostname R2\nip domain-name lab"),
                &transcript,
            )
            .await;

        assert_eq!(result.failure().unwrap().kind, ErrorKind::HostUnreachable);
        assert_eq!(
            transcript.lines().last().unwrap(),
            "SSH Error: Make sure the IP address is correct."
        );
        assert!(!transcript.contains("Load Complete"));
        assert!(!device.received().contains(&"ip domain-name lab".to_string()));
        assert_eq!(device.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unverified_device_rejected() {
        let device = SimulatedDevice::new();
        let transcript = Transcript::new();
        let result = engine(&device)
            .run(
                Workflow::Load {
                    device: None,
                    payload: ConfigurationPayload::from_text("hostname R2"),
                },
                &transcript,
            )
            .await;

        assert_eq!(result.failure().unwrap().kind, ErrorKind::InvalidInput);
        assert_eq!(device.connects(), 0);
    }
}
