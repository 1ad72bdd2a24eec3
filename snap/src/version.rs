//! IOS release detection and the minimum-version gate.
//!
//! Verify reads the `version` line of the running configuration, parses
//! the release number and compares it with a configured minimum. An old
//! release is not fatal: the operator gets a listing of the firmware
//! images on flash and a compatibility reminder, and verification goes on.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::{Result, WorkflowError};

/// Command whose output carries the release string (`version 15.4`).
pub const SHOW_VERSION_COMMAND: &str = "show running-config | include ^version";

/// Command listing firmware images on persistent storage.
pub const FLASH_IMAGES_COMMAND: &str = "dir flash: | include .bin";

/// Header emitted before the flash listing when the device is out of date.
pub const OUTDATED_BANNER: &str =
    "----ERROR----\n Old version of IOS Detected\n Correct version may be in flash:";

/// Fixed reminder emitted after the flash listing.
pub const COMPATIBILITY_REMINDER: &str = "\n>========== Reminder ==========<\n\
     Ensure the config you plan to load is compatible\n \
     with the version of IOS you are using.\n \
     If not contact the help desk.\n\
     >========== Reminder ==========<\n";

static VERSION_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bversion\s+([0-9]+)(?:\.([0-9]+))?").expect("valid version pattern")
});

/// An IOS release number, compared component-wise (`15.10 > 15.4`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
pub struct IosVersion {
    pub major: u32,
    pub minor: u32,
}

impl IosVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Extract the release number following the word `version`.
    ///
    /// There is no guessing: output without a numeric token is an error.
    pub fn parse_from_output(output: &str) -> Result<Self> {
        let parse_error = || WorkflowError::VersionParse {
            output: output.trim().to_string(),
        };

        let caps = VERSION_TOKEN.captures(output).ok_or_else(parse_error)?;
        let major = caps[1].parse().map_err(|_| parse_error())?;
        let minor = match caps.get(2) {
            Some(m) => m.as_str().parse().map_err(|_| parse_error())?,
            None => 0,
        };
        Ok(Self { major, minor })
    }
}

impl fmt::Display for IosVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Outcome of the version gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    /// Release is at or above the minimum.
    Supported(IosVersion),
    /// Release is below the minimum; run the diagnostic sub-flow.
    Outdated {
        found: IosVersion,
        minimum: IosVersion,
    },
}

impl GateVerdict {
    pub fn passes(&self) -> bool {
        matches!(self, GateVerdict::Supported(_))
    }

    pub fn found(&self) -> IosVersion {
        match *self {
            GateVerdict::Supported(v) => v,
            GateVerdict::Outdated { found, .. } => found,
        }
    }
}

/// Compares device releases against a minimum.
#[derive(Debug, Clone, Copy)]
pub struct VersionGate {
    minimum: IosVersion,
}

impl VersionGate {
    pub fn new(minimum: IosVersion) -> Self {
        Self { minimum }
    }

    pub fn minimum(&self) -> IosVersion {
        self.minimum
    }

    /// Parse `output` and judge it against the minimum.
    pub fn evaluate(&self, output: &str) -> Result<GateVerdict> {
        let found = IosVersion::parse_from_output(output)?;
        if found >= self.minimum {
            Ok(GateVerdict::Supported(found))
        } else {
            Ok(GateVerdict::Outdated {
                found,
                minimum: self.minimum,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn gate() -> VersionGate {
        VersionGate::new(IosVersion::new(15, 4))
    }

    #[test]
    fn test_current_release_passes() {
        let verdict = gate().evaluate("version 15.4").unwrap();
        assert_eq!(verdict, GateVerdict::Supported(IosVersion::new(15, 4)));
        assert!(verdict.passes());
        assert_eq!(verdict.found().to_string(), "15.4");
    }

    #[test]
    fn test_old_release_fails_gate() {
        let verdict = gate().evaluate("version 12.2").unwrap();
        assert!(!verdict.passes());
        assert_eq!(
            verdict,
            GateVerdict::Outdated {
                found: IosVersion::new(12, 2),
                minimum: IosVersion::new(15, 4),
            }
        );
    }

    #[test]
    fn test_components_compare_numerically() {
        assert!(gate().evaluate("version 15.10").unwrap().passes());
        assert!(gate().evaluate("version 16").unwrap().passes());
        assert!(!gate().evaluate("version 15.3").unwrap().passes());
    }

    #[test]
    fn test_banner_style_output() {
        let v = IosVersion::parse_from_output(
            "Cisco IOS Software, C2900 Software, Version 15.7(3)M5, RELEASE SOFTWARE",
        )
        .unwrap();
        assert_eq!(v, IosVersion::new(15, 7));
    }

    #[test]
    fn test_missing_token_is_parse_failure() {
        for output in ["version", "version abc", "", "hostname R1"] {
            match gate().evaluate(output) {
                Err(Error::Workflow(WorkflowError::VersionParse { .. })) => {}
                other => panic!("expected parse failure for {:?}, got {:?}", output, other),
            }
        }
    }

    #[test]
    fn test_reminder_text() {
        assert!(COMPATIBILITY_REMINDER.contains("compatible"));
        assert!(OUTDATED_BANNER.starts_with("----ERROR----"));
    }
}
