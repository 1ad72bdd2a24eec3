//! Transport layer: byte links to a device.
//!
//! Three concrete links exist, one per [`TransportKind`]:
//! - [`SerialTransport`] for a local console port (tokio-serial)
//! - [`TelnetTransport`] for Telnet over TCP
//! - [`SshTransport`] for SSH (russh)
//!
//! Everything above this layer talks to a `Box<dyn Transport>` and never
//! branches on the link type; the differences that matter higher up
//! (timing, wake-up, in-band login, reset support) are answered by
//! [`TransportKind`].

pub mod config;
mod serial;
#[cfg(any(test, feature = "simulator"))]
pub mod simulated;
mod ssh;
mod telnet;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

pub use config::{HostKeyVerification, SerialSettings, SshOptions};
pub use serial::SerialTransport;
pub use ssh::SshTransport;
pub use telnet::TelnetTransport;

use crate::error::Result;
use crate::profile::DeviceProfile;

/// The closed set of ways to reach a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// Local serial console (e.g. `COM3`, `/dev/ttyUSB0`).
    Console,
    /// Telnet to an IP address or hostname.
    Telnet,
    /// SSH to an IP address or hostname.
    Ssh,
}

impl TransportKind {
    /// Operator-facing name.
    pub fn label(self) -> &'static str {
        match self {
            TransportKind::Console => "Console",
            TransportKind::Telnet => "Telnet",
            TransportKind::Ssh => "SSH",
        }
    }

    /// Well-known TCP port, if the transport is IP based.
    pub fn default_port(self) -> Option<u16> {
        match self {
            TransportKind::Console => None,
            TransportKind::Telnet => Some(23),
            TransportKind::Ssh => Some(22),
        }
    }

    pub fn is_ip(self) -> bool {
        self.default_port().is_some()
    }

    /// Multiplier applied to command timeouts and timed-send intervals.
    ///
    /// Serial echo is slow, so the console gets more slack.
    pub fn delay_factor(self) -> u32 {
        match self {
            TransportKind::Console => 2,
            TransportKind::Telnet | TransportKind::Ssh => 1,
        }
    }

    /// Multiplier used while pushing configuration lines.
    pub fn load_delay_factor(self) -> u32 {
        match self {
            TransportKind::Console => 3,
            TransportKind::Telnet | TransportKind::Ssh => 2,
        }
    }

    /// Only a local console survives a reload and lets the operator watch
    /// the device come back with factory defaults.
    pub fn supports_factory_reset(self) -> bool {
        matches!(self, TransportKind::Console)
    }

    /// A console line is silent until it sees a keystroke.
    pub fn needs_wakeup(self) -> bool {
        matches!(self, TransportKind::Console)
    }

    /// Whether username/password are exchanged as text on the line rather
    /// than during a protocol handshake.
    pub fn authenticates_in_band(self) -> bool {
        !matches!(self, TransportKind::Ssh)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A bidirectional byte link to a device.
#[async_trait]
pub trait Transport: Send {
    /// Write raw bytes to the device.
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Wait for the next chunk of output.
    ///
    /// Pends until data arrives. Returns `TransportError::Disconnected`
    /// once the peer has closed the link.
    async fn read(&mut self) -> Result<Vec<u8>>;

    /// Release the link. Calling it more than once is harmless.
    async fn close(&mut self) -> Result<()>;
}

/// Opens links for device profiles.
///
/// The default implementation dials real hardware; tests substitute a
/// simulated device.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a link to the device described by `profile`.
    async fn connect(
        &self,
        profile: &DeviceProfile,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>>;

    /// Names of the serial ports currently visible on this host.
    fn serial_ports(&self) -> Vec<String>;
}

/// Connector that opens real serial ports, TCP sockets and SSH sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConnector;

#[async_trait]
impl Connector for DefaultConnector {
    async fn connect(
        &self,
        profile: &DeviceProfile,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>> {
        debug!("connecting to {} over {}", profile.address(), profile.kind());
        let transport: Box<dyn Transport> = match profile.kind() {
            TransportKind::Console => {
                Box::new(SerialTransport::open(profile.address(), profile.serial())?)
            }
            TransportKind::Telnet => Box::new(
                TelnetTransport::connect(profile.host(), profile.port(), timeout).await?,
            ),
            TransportKind::Ssh => Box::new(SshTransport::connect(profile, timeout).await?),
        };
        Ok(transport)
    }

    fn serial_ports(&self) -> Vec<String> {
        match tokio_serial::available_ports() {
            Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
            Err(e) => {
                warn!("Failed to enumerate serial ports: {}", e);
                Vec::new()
            }
        }
    }
}
