//! Platform definitions: prompt shapes, login dialogue and failure markers.
//!
//! Only Cisco IOS is defined, but nothing above this module looks at IOS
//! specifics directly; the session reads everything from a
//! [`PlatformDefinition`].

pub mod cisco_ios;
mod definition;
mod privilege_level;

pub use definition::PlatformDefinition;
pub use privilege_level::{Entry, PrivilegeLevel};
