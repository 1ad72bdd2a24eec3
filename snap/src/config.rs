//! Tunable timing and workflow settings.
//!
//! Everything here has a sensible default; a caller may deserialize
//! overrides from any serde format.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::transport::TransportKind;
use crate::version::IosVersion;

/// Base timeouts. Command and timed-send values are multiplied by the
/// transport's delay factor before use.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Time allowed to open the link.
    pub connect_timeout: Duration,

    /// Time allowed for each login exchange (banner, username, password).
    pub login_timeout: Duration,

    /// Time allowed for a synchronous command to return to a prompt.
    pub command_timeout: Duration,

    /// Pause used by timed sends.
    pub timed_interval: Duration,
}

impl Timing {
    pub fn command_timeout_for(&self, kind: TransportKind) -> Duration {
        self.command_timeout * kind.delay_factor()
    }

    pub fn load_timeout_for(&self, kind: TransportKind) -> Duration {
        self.command_timeout * kind.load_delay_factor()
    }

    pub fn timed_interval_for(&self, kind: TransportKind) -> Duration {
        self.timed_interval * kind.delay_factor()
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            login_timeout: Duration::from_secs(15),
            command_timeout: Duration::from_secs(15),
            timed_interval: Duration::from_secs(2),
        }
    }
}

/// Settings shared by every workflow run through an engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    pub timing: Timing,

    /// Oldest IOS release considered current.
    pub minimum_version: IosVersion,

    /// Where backup artifacts are written.
    pub backup_dir: PathBuf,

    /// Pause between erasing the startup configuration and reloading.
    pub erase_settle: Duration,

    /// How long a destructive step waits for its confirmation prompt
    /// (multiplied by the delay factor).
    pub confirm_window: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            timing: Timing::default(),
            minimum_version: IosVersion::new(15, 4),
            backup_dir: PathBuf::from("."),
            erase_settle: Duration::from_secs(5),
            confirm_window: Duration::from_secs(10),
        }
    }
}
