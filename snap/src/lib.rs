//! # Snap
//!
//! Async session orchestration for Cisco IOS configuration workflows.
//!
//! Snap drives routers over a local serial console, Telnet or SSH through
//! five workflows: Verify, Load, Backup, Zeroize and ad-hoc commands. Each
//! run owns one device session, streams operator-facing status lines while
//! it works, and ends with exactly one result. Failures are classified into
//! a small taxonomy with transport-specific operator text.
//!
//! ## Features
//!
//! - Serial consoles via tokio-serial, Telnet over tokio TCP, SSH via russh
//! - Login, privilege escalation and configuration mode driven by prompt
//!   patterns (scrapli-style tail search over ANSI-stripped output)
//! - IOS release gate with a flash image listing for outdated devices
//! - Background runner that allows one workflow in flight at a time
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snap::{DeviceProfile, Engine, SessionRunner, TransportKind, Workflow, WorkflowSettings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), snap::Error> {
//!     let profile = DeviceProfile::builder(TransportKind::Ssh, "192.168.1.1")
//!         .username("admin")
//!         .password("secret")
//!         .build()?;
//!
//!     let runner = SessionRunner::new(Engine::with_settings(WorkflowSettings::default()));
//!     let handle = runner.launch(Workflow::Verify(profile)).expect("nothing else running");
//!     let result = handle.finish(|event| println!("{}", event)).await;
//!
//!     if let Some(device) = result.verified() {
//!         println!("ready to work with {}", device.address());
//!     }
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod classify;
pub mod config;
pub mod driver;
pub mod error;
pub mod platform;
pub mod profile;
pub mod runner;
pub mod transport;
pub mod version;
pub mod workflow;

// Re-export main types for convenience
pub use classify::{ErrorKind, Failure};
pub use config::{Timing, WorkflowSettings};
pub use driver::{DeviceSession, Response, SendMode, SessionState};
pub use error::{Error, Result, RunnerError};
pub use profile::{DeviceProfile, ProfileBuilder, VerifiedProfile};
pub use runner::{RunnerEvent, SessionRunner, WorkflowHandle};
pub use transport::{Connector, DefaultConnector, HostKeyVerification, TransportKind};
pub use version::{GateVerdict, IosVersion, VersionGate};
pub use workflow::{
    ConfigurationPayload, DiagnosticCommand, Engine, Slot, StatusEvent, StatusSink, Transcript,
    Workflow, WorkflowResult,
};
