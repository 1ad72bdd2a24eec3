//! Error types for snap.
//!
//! Errors are layered the same way the crate is: transport, channel,
//! driver, profile and workflow. None of them is shown to an operator
//! directly; [`crate::classify`] turns them into a [`crate::classify::Failure`].

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportKind;
use crate::workflow::Slot;

/// Main error type for snap operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Link-level errors (serial port, TCP, SSH handshake)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel operation errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Session/driver-level errors
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Invalid device profile
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    /// Workflow precondition or device-state errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),
}

/// Transport layer errors (connection setup, authentication on the wire).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Serial port could not be opened
    #[error("Serial port '{port}' unavailable: {reason}")]
    PortUnavailable { port: String, reason: String },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Host key not present in known_hosts (strict mode)
    #[error("Host key for {host}:{port} is unknown")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key differs from the one recorded in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Channel layer errors (pattern matching on device output).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Pattern matching timed out
    #[error("Pattern not found within {0:?}")]
    PatternTimeout(Duration),

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Driver layer errors (session state, privilege escalation).
#[derive(Error, Debug)]
pub enum DriverError {
    /// Session not connected
    #[error("Session not connected - call connect() first")]
    NotConnected,

    /// Session already connected
    #[error("Session already connected")]
    AlreadyConnected,

    /// Session connected but not yet authenticated
    #[error("Session not authenticated")]
    NotAuthenticated,

    /// Failed to acquire target privilege level
    #[error("Failed to acquire privilege level '{target}'")]
    PrivilegeAcquisitionFailed { target: String },

    /// Unknown privilege level detected
    #[error("Unknown privilege level from prompt: '{prompt}'")]
    UnknownPrivilege { prompt: String },

    /// No path found between privilege levels
    #[error("No path from privilege '{from}' to '{to}'")]
    NoPrivilegePath { from: String, to: String },
}

/// Device profile validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    /// A required field was left empty
    #[error("missing {field}")]
    MissingField { field: &'static str },

    /// Console profile with an address that is not a serial port name
    #[error("'{port}' is not a serial port name")]
    InvalidSerialPort { port: String },

    /// Address carried an unparsable port suffix
    #[error("invalid port in address '{address}'")]
    InvalidPort { address: String },
}

/// Workflow-level errors that are not transport failures.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// No numeric IOS version could be found in the device output
    #[error("could not parse IOS version from '{output}'")]
    VersionParse { output: String },

    /// The device was already in configuration mode during verification
    #[error("device was in configuration mode")]
    ConfigModeActive,

    /// Operation not possible over this transport
    #[error("{operation} is not supported over {kind}")]
    Unsupported {
        operation: &'static str,
        kind: TransportKind,
    },

    /// No device has been verified yet
    #[error("no verified device profile")]
    NotVerified,

    /// The configuration payload was empty
    #[error("configuration payload is empty")]
    EmptyPayload,

    /// The ad-hoc command was empty
    #[error("command is empty")]
    EmptyCommand,

    /// A diagnostic preset needs a target address
    #[error("{command} needs a target")]
    MissingTarget { command: &'static str },

    /// The device never presented the expected confirmation prompt
    #[error("{step} was not confirmed by the device within {window:?}")]
    NotConfirmed { step: &'static str, window: Duration },

    /// The backup artifact could not be written
    #[error("could not write '{}': {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors returned when launching a workflow on the runner.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerError {
    /// Another workflow is still in flight
    #[error("{running} is still running")]
    Busy { running: Slot },
}

/// Result type alias using snap's Error.
pub type Result<T> = std::result::Result<T, Error>;
