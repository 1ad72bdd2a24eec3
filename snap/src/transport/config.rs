//! Link settings shared by the transports.

use std::path::PathBuf;
use std::time::Duration;

pub use tokio_serial::{DataBits, FlowControl, Parity, StopBits};

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Default)]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys. Connection fails if the host
    /// is not already in known_hosts.
    Strict,

    /// Accept and auto-learn unknown keys, but reject changed keys.
    /// This is the default and matches common SSH client behavior.
    #[default]
    AcceptNew,

    /// Accept all keys without checking. For testing and lab use only.
    Disabled,
}

/// SSH-only options carried by a device profile.
#[derive(Debug, Clone, Default)]
pub struct SshOptions {
    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// Path to known_hosts file (None uses the user's default).
    pub known_hosts_path: Option<PathBuf>,

    /// Terminal width requested for the PTY.
    pub terminal_width: u32,

    /// Terminal height requested for the PTY.
    pub terminal_height: u32,
}

impl SshOptions {
    pub(crate) fn terminal_size(&self) -> (u32, u32) {
        let width = if self.terminal_width == 0 { 511 } else { self.terminal_width };
        let height = if self.terminal_height == 0 { 24 } else { self.terminal_height };
        (width, height)
    }
}

/// Serial line settings for console connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl SerialSettings {
    /// Read timeout handed to the OS driver. Reads are additionally bounded
    /// by the channel's own deadlines.
    pub(crate) const DRIVER_TIMEOUT: Duration = Duration::from_millis(100);
}

impl Default for SerialSettings {
    /// Cisco console default: 9600 8N1, no flow control.
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_defaults_are_cisco_console() {
        let settings = SerialSettings::default();
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.data_bits, DataBits::Eight);
        assert_eq!(settings.parity, Parity::None);
        assert_eq!(settings.stop_bits, StopBits::One);
    }

    #[test]
    fn test_terminal_size_falls_back() {
        let options = SshOptions::default();
        assert_eq!(options.terminal_size(), (511, 24));
    }
}
