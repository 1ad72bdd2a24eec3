//! Turning errors into operator feedback.
//!
//! Every failure inside a workflow ends up here exactly once. Classification
//! is a pure function of the transport kind and the error, so each mapping
//! can be tested without a device.

use std::fmt;
use std::io;

use crate::error::{ChannelError, DriverError, Error, ProfileError, TransportError, WorkflowError};
use crate::transport::TransportKind;

/// Operator-facing failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The serial port is missing, busy or stopped answering.
    PortUnavailable,
    /// The IP endpoint cannot be reached.
    HostUnreachable,
    /// The device went quiet.
    Timeout,
    /// Username or password refused.
    AuthRejected,
    /// Logged in, but the account may not do this.
    PermissionDenied,
    /// The IOS release could not be read.
    ParseFailure,
    /// The device was already in configuration mode.
    ConfigurationStateConflict,
    /// The operation is not available over this transport.
    UnsupportedOperation,
    /// The request itself was incomplete.
    InvalidInput,
    Unknown,
}

/// A classified failure with the text shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classify `error` as seen over `transport`.
    pub fn classify(transport: TransportKind, error: &Error) -> Self {
        let kind = transport.classify(error);
        let message = specific_message(error).unwrap_or_else(|| match kind {
            ErrorKind::Unknown => format!(
                "{} Error: unexpected failure ({})",
                transport.label(),
                error
            ),
            _ => transport.describe(kind).to_string(),
        });
        Self { kind, message }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl TransportKind {
    /// Map an error onto the taxonomy. Never fails; anything unrecognized
    /// is [`ErrorKind::Unknown`].
    pub fn classify(self, error: &Error) -> ErrorKind {
        let console = self == TransportKind::Console;
        // A dead link means the cable or port on a console, the network otherwise
        let link_lost = if console {
            ErrorKind::PortUnavailable
        } else {
            ErrorKind::HostUnreachable
        };

        match error {
            Error::Transport(e) => match e {
                TransportError::PortUnavailable { .. } => ErrorKind::PortUnavailable,
                TransportError::ConnectionFailed { source, .. } => match source.kind() {
                    io::ErrorKind::TimedOut => ErrorKind::Timeout,
                    io::ErrorKind::PermissionDenied if console => ErrorKind::PortUnavailable,
                    _ => link_lost,
                },
                TransportError::Io(_) | TransportError::Disconnected => link_lost,
                TransportError::Timeout(_) => ErrorKind::Timeout,
                TransportError::AuthenticationFailed { .. } => ErrorKind::AuthRejected,
                TransportError::Ssh(ssh) => match ssh {
                    russh::Error::ConnectionTimeout
                    | russh::Error::KeepaliveTimeout
                    | russh::Error::InactivityTimeout => ErrorKind::Timeout,
                    russh::Error::IO(_) | russh::Error::Disconnect => link_lost,
                    russh::Error::NotAuthenticated => ErrorKind::AuthRejected,
                    _ => ErrorKind::Unknown,
                },
                TransportError::HostKeyUnknown { .. }
                | TransportError::HostKeyChanged { .. }
                | TransportError::KnownHosts(_) => ErrorKind::Unknown,
            },
            Error::Channel(e) => match e {
                ChannelError::PatternTimeout(_) => ErrorKind::Timeout,
                ChannelError::InvalidPattern(_) => ErrorKind::Unknown,
            },
            Error::Driver(e) => match e {
                DriverError::PrivilegeAcquisitionFailed { .. } => ErrorKind::PermissionDenied,
                _ => ErrorKind::Unknown,
            },
            Error::Profile(_) => ErrorKind::InvalidInput,
            Error::Workflow(e) => match e {
                WorkflowError::VersionParse { .. } => ErrorKind::ParseFailure,
                WorkflowError::ConfigModeActive => ErrorKind::ConfigurationStateConflict,
                WorkflowError::Unsupported { .. } => ErrorKind::UnsupportedOperation,
                WorkflowError::NotVerified
                | WorkflowError::EmptyPayload
                | WorkflowError::EmptyCommand
                | WorkflowError::MissingTarget { .. } => ErrorKind::InvalidInput,
                WorkflowError::NotConfirmed { .. } => ErrorKind::Unknown,
                WorkflowError::Artifact { source, .. } => match source.kind() {
                    io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
                    _ => ErrorKind::Unknown,
                },
            },
        }
    }

    /// The standard operator text for `kind` over this transport.
    pub fn describe(self, kind: ErrorKind) -> &'static str {
        use TransportKind::*;

        match (kind, self) {
            (ErrorKind::PortUnavailable, _) => "Console Error: Make sure you have connectivity.",
            (ErrorKind::HostUnreachable, Console) => {
                "Console Error: Make sure you have connectivity."
            }
            (ErrorKind::HostUnreachable | ErrorKind::Timeout, Telnet) => {
                "Telnet Error: Make sure the IP address is correct."
            }
            (ErrorKind::HostUnreachable | ErrorKind::Timeout, Ssh) => {
                "SSH Error: Make sure the IP address is correct."
            }
            (ErrorKind::Timeout, Console) => "Timeout Error: Make sure you are still connected",
            (ErrorKind::AuthRejected, _) => {
                "Check your username/password. Make sure you have an account on this device."
            }
            (ErrorKind::PermissionDenied, _) => {
                "User does not have permission to make these changes."
            }
            (ErrorKind::ParseFailure, _) => "Could not read the IOS version from the device.",
            (ErrorKind::ConfigurationStateConflict, _) => "Router was in config mode try again.",
            (ErrorKind::UnsupportedOperation, _) => "Not possible over this connection.",
            (ErrorKind::InvalidInput, _) => "All Fields must be Completed.",
            (ErrorKind::Unknown, _) => "Verify connection",
        }
    }
}

/// Text that depends on the error itself rather than only its category.
fn specific_message(error: &Error) -> Option<String> {
    let message = match error {
        Error::Profile(ProfileError::MissingField { .. }) => {
            "All Fields must be Completed.".to_string()
        }
        Error::Profile(ProfileError::InvalidSerialPort { .. }) => {
            "Com Port field requires COM1 or COM2 or COM3 etc...".to_string()
        }
        Error::Profile(ProfileError::InvalidPort { address }) => {
            format!("'{}' does not have a valid port number.", address)
        }
        Error::Workflow(e) => match e {
            WorkflowError::VersionParse { output } => format!(
                "Could not read the IOS version from the device output: {:?}",
                output
            ),
            WorkflowError::Unsupported { operation, .. } => {
                format!("{} only possible over Console.", operation)
            }
            WorkflowError::NotVerified => {
                "Enter Credentials on Router Info tab.\nOnce entered click Verify.".to_string()
            }
            WorkflowError::EmptyPayload => "No config to load.".to_string(),
            WorkflowError::EmptyCommand => "No command to run.".to_string(),
            WorkflowError::MissingTarget { command } => format!("No IP to {}.", command),
            WorkflowError::NotConfirmed { step, .. } => format!("{} fail", step),
            WorkflowError::Artifact { path, source } => format!(
                "Could not save backup to '{}': {}",
                path.display(),
                source
            ),
            WorkflowError::ConfigModeActive => return None,
        },
        _ => return None,
    };
    Some(message)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;

    fn failure(kind: TransportKind, error: impl Into<Error>) -> Failure {
        Failure::classify(kind, &error.into())
    }

    #[test]
    fn test_console_port_unavailable() {
        let f = failure(
            TransportKind::Console,
            TransportError::PortUnavailable {
                port: "COM9".to_string(),
                reason: "not found".to_string(),
            },
        );
        assert_eq!(f.kind, ErrorKind::PortUnavailable);
        assert_eq!(f.message, "Console Error: Make sure you have connectivity.");
    }

    #[test]
    fn test_timeouts_read_per_transport() {
        let timeout = || ChannelError::PatternTimeout(Duration::from_secs(30));
        assert_eq!(
            failure(TransportKind::Console, timeout()).message,
            "Timeout Error: Make sure you are still connected"
        );
        assert_eq!(
            failure(TransportKind::Telnet, timeout()).message,
            "Telnet Error: Make sure the IP address is correct."
        );
        let ssh = failure(TransportKind::Ssh, TransportError::Timeout(Duration::from_secs(10)));
        assert_eq!(ssh.kind, ErrorKind::Timeout);
        assert_eq!(ssh.message, "SSH Error: Make sure the IP address is correct.");
    }

    #[test]
    fn test_refused_connection() {
        let refused = || TransportError::ConnectionFailed {
            host: "10.0.0.1".to_string(),
            port: 23,
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(
            failure(TransportKind::Telnet, refused()).kind,
            ErrorKind::HostUnreachable
        );
        assert_eq!(
            failure(TransportKind::Console, TransportError::Disconnected).kind,
            ErrorKind::PortUnavailable
        );
    }

    #[test]
    fn test_auth_and_permission() {
        let auth = failure(
            TransportKind::Ssh,
            TransportError::AuthenticationFailed {
                user: "admin".to_string(),
            },
        );
        assert_eq!(auth.kind, ErrorKind::AuthRejected);
        assert!(auth.message.starts_with("Check your username/password."));

        let denied = failure(
            TransportKind::Telnet,
            DriverError::PrivilegeAcquisitionFailed {
                target: "privilege_exec".to_string(),
            },
        );
        assert_eq!(denied.kind, ErrorKind::PermissionDenied);
        assert_eq!(
            denied.to_string(),
            "User does not have permission to make these changes."
        );
    }

    #[test]
    fn test_workflow_messages() {
        let zeroize = failure(
            TransportKind::Ssh,
            WorkflowError::Unsupported {
                operation: "Zeroize",
                kind: TransportKind::Ssh,
            },
        );
        assert_eq!(zeroize.kind, ErrorKind::UnsupportedOperation);
        assert_eq!(zeroize.message, "Zeroize only possible over Console.");

        let conflict = failure(TransportKind::Console, WorkflowError::ConfigModeActive);
        assert_eq!(conflict.kind, ErrorKind::ConfigurationStateConflict);
        assert_eq!(conflict.message, "Router was in config mode try again.");

        let parse = failure(
            TransportKind::Ssh,
            WorkflowError::VersionParse {
                output: "version".to_string(),
            },
        );
        assert_eq!(parse.kind, ErrorKind::ParseFailure);

        let empty = failure(TransportKind::Ssh, WorkflowError::EmptyPayload);
        assert_eq!((empty.kind, empty.message.as_str()), (ErrorKind::InvalidInput, "No config to load."));

        let ping = failure(TransportKind::Ssh, WorkflowError::MissingTarget { command: "ping" });
        assert_eq!(ping.message, "No IP to ping.");
    }

    #[test]
    fn test_artifact_failures() {
        let denied = failure(
            TransportKind::Ssh,
            WorkflowError::Artifact {
                path: PathBuf::from("/backups/Backup Config 20240101-1200.txt"),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            },
        );
        assert_eq!(denied.kind, ErrorKind::PermissionDenied);
        assert!(denied.message.contains("Backup Config 20240101-1200.txt"));

        let missing = failure(
            TransportKind::Ssh,
            WorkflowError::Artifact {
                path: PathBuf::from("/nope/x.txt"),
                source: io::Error::from(io::ErrorKind::NotFound),
            },
        );
        assert_eq!(missing.kind, ErrorKind::Unknown);
    }

    #[test]
    fn test_unmapped_errors_are_unknown() {
        let f = failure(TransportKind::Ssh, DriverError::NotConnected);
        assert_eq!(f.kind, ErrorKind::Unknown);
        assert!(f.message.starts_with("SSH Error: unexpected failure"));

        let f = failure(
            TransportKind::Ssh,
            TransportError::HostKeyChanged {
                host: "r1".to_string(),
                port: 22,
                line: 4,
            },
        );
        assert_eq!(f.kind, ErrorKind::Unknown);
        assert!(f.message.contains("changed"));
    }
}
