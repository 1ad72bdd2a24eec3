//! The five operator workflows and the engine that runs them.
//!
//! A workflow owns one [`DeviceSession`] for its whole run and always
//! disconnects it, whatever happens. Progress goes to a [`StatusSink`] as
//! operator text; the run ends with exactly one [`WorkflowResult`]. Errors
//! never leave the engine raw: they are classified, their message becomes
//! the final status event, and the result is [`WorkflowResult::Failed`].

mod backup;
mod command;
mod load;
pub mod status;
mod verify;
mod zeroize;

use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};

pub use status::{StatusEvent, StatusSink, Transcript};

use crate::classify::Failure;
use crate::config::WorkflowSettings;
use crate::driver::DeviceSession;
use crate::error::{Result, WorkflowError};
use crate::profile::{DeviceProfile, VerifiedProfile};
use crate::transport::{Connector, DefaultConnector, TransportKind};

/// The operator-facing triggers. The runner allows one in flight at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Verify,
    Load,
    Backup,
    Zeroize,
    Command,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Slot::Verify => "Verify",
            Slot::Load => "Load",
            Slot::Backup => "Backup",
            Slot::Zeroize => "Zeroize",
            Slot::Command => "Command",
        };
        f.write_str(name)
    }
}

/// Where a run is. Only logged; the sink sees operator text instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Authenticating,
    Escalating,
    ConfiguringMode,
    Executing,
    ExitingConfigMode,
    Disconnecting,
}

/// Terminal outcome of one run.
#[derive(Debug, Clone)]
pub enum WorkflowResult {
    Success,
    /// Verify succeeded; the profile may now be used by the other workflows.
    Verified(VerifiedProfile),
    Failed(Failure),
}

impl WorkflowResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, WorkflowResult::Failed(_))
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            WorkflowResult::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn verified(&self) -> Option<&VerifiedProfile> {
        match self {
            WorkflowResult::Verified(profile) => Some(profile),
            _ => None,
        }
    }
}

/// Configuration lines to push during Load, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationPayload {
    lines: Vec<String>,
}

impl ConfigurationPayload {
    /// Split `text` on line boundaries. Blank lines are dropped; nothing
    /// else is interpreted.
    pub fn from_text(text: &str) -> Self {
        let lines = text
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect();
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }
}

/// What an ad-hoc command run sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticCommand {
    Ping(String),
    Traceroute(String),
    Routes,
    Interfaces,
    Dmvpn,
    Ospf,
    Eigrp,
    /// Operator-entered command line.
    Custom(String),
}

impl DiagnosticCommand {
    /// The line sent to the device.
    pub fn command_line(&self) -> Result<String> {
        let with_target = |verb: &'static str, target: &str| -> Result<String> {
            let target = target.trim();
            if target.is_empty() {
                Err(WorkflowError::MissingTarget { command: verb }.into())
            } else {
                Ok(format!("{} {}", verb, target))
            }
        };

        match self {
            DiagnosticCommand::Ping(target) => with_target("ping", target),
            DiagnosticCommand::Traceroute(target) => with_target("traceroute", target),
            DiagnosticCommand::Routes => Ok("show ip route".to_string()),
            DiagnosticCommand::Interfaces => Ok("show ip interface brief".to_string()),
            DiagnosticCommand::Dmvpn => Ok("show crypto ikev2 sa".to_string()),
            DiagnosticCommand::Ospf => Ok("show ip ospf neighbor".to_string()),
            DiagnosticCommand::Eigrp => Ok("show ip eigrp neighbors".to_string()),
            DiagnosticCommand::Custom(line) => {
                let line = line.trim();
                if line.is_empty() {
                    Err(WorkflowError::EmptyCommand.into())
                } else {
                    Ok(line.to_string())
                }
            }
        }
    }
}

/// A workflow request.
///
/// Every variant except `Verify` takes the profile a previous Verify
/// returned; `None` stands for "no device set up yet" and is rejected.
#[derive(Debug)]
pub enum Workflow {
    Verify(DeviceProfile),
    Load {
        device: Option<VerifiedProfile>,
        payload: ConfigurationPayload,
    },
    Backup {
        device: Option<VerifiedProfile>,
    },
    Zeroize {
        device: Option<VerifiedProfile>,
    },
    Command {
        device: Option<VerifiedProfile>,
        command: DiagnosticCommand,
    },
}

impl Workflow {
    pub fn slot(&self) -> Slot {
        match self {
            Workflow::Verify(_) => Slot::Verify,
            Workflow::Load { .. } => Slot::Load,
            Workflow::Backup { .. } => Slot::Backup,
            Workflow::Zeroize { .. } => Slot::Zeroize,
            Workflow::Command { .. } => Slot::Command,
        }
    }

    /// Transport of the target device, if there is one.
    pub fn transport_kind(&self) -> Option<TransportKind> {
        match self {
            Workflow::Verify(profile) => Some(profile.kind()),
            Workflow::Load { device, .. }
            | Workflow::Backup { device }
            | Workflow::Zeroize { device }
            | Workflow::Command { device, .. } => device.as_ref().map(|d| d.kind()),
        }
    }
}

/// Runs workflows against devices reached through a [`Connector`].
pub struct Engine {
    connector: Arc<dyn Connector>,
    settings: WorkflowSettings,
}

impl Engine {
    pub fn new(connector: Arc<dyn Connector>, settings: WorkflowSettings) -> Self {
        Self {
            connector,
            settings,
        }
    }

    /// An engine that dials real hardware.
    pub fn with_settings(settings: WorkflowSettings) -> Self {
        Self::new(Arc::new(DefaultConnector), settings)
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn connector(&self) -> &dyn Connector {
        &*self.connector
    }

    /// Run `workflow` to completion, reporting progress to `sink`.
    ///
    /// Never fails: every error is classified and returned as
    /// [`WorkflowResult::Failed`] after its message was emitted.
    pub async fn run(&self, workflow: Workflow, sink: &dyn StatusSink) -> WorkflowResult {
        let slot = workflow.slot();
        // Without a device the failure cannot depend on the transport
        let kind = workflow
            .transport_kind()
            .unwrap_or(TransportKind::Console);
        let run = Run {
            slot,
            connector: &*self.connector,
            settings: &self.settings,
            sink,
        };

        info!("{} started", slot);
        let outcome = match workflow {
            Workflow::Verify(profile) => verify::run(&run, Arc::new(profile)).await,
            Workflow::Load { device, payload } => load::run(&run, device, &payload).await,
            Workflow::Backup { device } => backup::run(&run, device).await,
            Workflow::Zeroize { device } => zeroize::run(&run, device).await,
            Workflow::Command { device, command } => command::run(&run, device, &command).await,
        };

        match outcome {
            Ok(result) => {
                info!("{} finished", slot);
                result
            }
            Err(error) => {
                warn!("{} failed: {}", slot, error);
                let failure = Failure::classify(kind, &error);
                for line in failure.message.lines() {
                    run.emit(line);
                }
                WorkflowResult::Failed(failure)
            }
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Borrowed context shared by the workflow steps of one run.
pub(crate) struct Run<'a> {
    slot: Slot,
    connector: &'a dyn Connector,
    settings: &'a WorkflowSettings,
    sink: &'a dyn StatusSink,
}

impl Run<'_> {
    fn emit(&self, text: impl Into<String>) {
        self.sink.emit(StatusEvent::new(text));
    }

    fn phase(&self, phase: Phase) {
        debug!("{}: {:?}", self.slot, phase);
    }

    fn session(&self, profile: &Arc<DeviceProfile>) -> Result<DeviceSession> {
        DeviceSession::new(Arc::clone(profile), self.settings.timing.clone())
    }

    /// Connect and log in.
    async fn open(&self, session: &mut DeviceSession) -> Result<()> {
        self.phase(Phase::Connecting);
        session.connect(self.connector).await?;
        self.phase(Phase::Authenticating);
        session.authenticate().await
    }

    async fn escalate(&self, session: &mut DeviceSession) -> Result<()> {
        self.phase(Phase::Escalating);
        session.escalate().await
    }

    async fn close(&self, session: &mut DeviceSession) {
        self.phase(Phase::Disconnecting);
        session.disconnect().await;
    }
}

fn require_device(device: Option<VerifiedProfile>) -> Result<Arc<DeviceProfile>> {
    device
        .map(|d| Arc::clone(d.profile()))
        .ok_or_else(|| WorkflowError::NotVerified.into())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use super::*;
    use crate::transport::simulated::SimulatedDevice;

    pub(crate) fn profile(kind: TransportKind) -> DeviceProfile {
        let address = match kind {
            TransportKind::Console => "COM3",
            _ => "10.0.0.1",
        };
        DeviceProfile::builder(kind, address)
            .username("admin")
            .password("cisco")
            .build()
            .unwrap()
    }

    pub(crate) fn verified(kind: TransportKind) -> Option<VerifiedProfile> {
        Some(VerifiedProfile::new(Arc::new(profile(kind))))
    }

    pub(crate) fn engine(device: &SimulatedDevice) -> Engine {
        engine_with(device, WorkflowSettings::default())
    }

    pub(crate) fn engine_with(device: &SimulatedDevice, settings: WorkflowSettings) -> Engine {
        Engine::new(Arc::new(device.clone()), settings)
    }
}
