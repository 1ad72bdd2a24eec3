//! Device sessions: login, privilege and command execution.
//!
//! A [`DeviceSession`] sits on a [`DeviceChannel`](crate::channel::DeviceChannel)
//! and knows the device's dialogue (from a
//! [`PlatformDefinition`](crate::platform::PlatformDefinition)): how to log
//! in, how to move between privilege levels and how to tell when a command
//! is done.

mod privilege;
mod response;
mod session;

pub use privilege::{PrivilegeManager, Transition};
pub use response::Response;
pub use session::{DeviceSession, SendMode, SessionState};
