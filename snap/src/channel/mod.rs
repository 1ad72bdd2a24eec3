//! Channel layer for pattern matching over a device link.
//!
//! This module turns the raw byte stream of a [`Transport`](crate::transport::Transport)
//! into prompt-delimited reads, with ANSI stripping and deadlines.

mod buffer;
mod device;
mod patterns;

pub use buffer::PatternBuffer;
pub use device::{DeviceChannel, TimedRead};
pub use patterns::{contains_any, first_match};
