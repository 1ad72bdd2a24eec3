//! Cisco IOS platform definition.
//!
//! Privilege levels:
//! - `exec` - User EXEC mode with `>` prompt
//! - `privilege_exec` - Privileged EXEC mode with `#` prompt
//! - `configuration` - Configuration mode with `(config*)#` prompt
//!
//! # Prompt Examples
//!
//! ```text
//! R1>                     # exec mode
//! R1#                     # privilege_exec mode
//! R1(config)#             # configuration mode
//! R1(config-if)#          # config sub-mode (interface)
//! ```
//!
//! # Privilege Graph
//!
//! ```text
//! ┌──────┐  enable     ┌────────────────┐  configure terminal  ┌───────────────┐
//! │ exec ├──────────────► privilege_exec ├──────────────────────► configuration │
//! │  >   │   disable   │       #        │        end           │  (config*)#   │
//! └──────┘◄────────────┴────────────────┘◄─────────────────────┴───────────────┘
//! ```
//!
//! Prompts are matched only as the last line of the output, so a `#` or
//! `>` inside command output (banners, ACL remarks) is never mistaken for
//! one.

use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::platform::{PlatformDefinition, PrivilegeLevel};

pub const EXEC: &str = "exec";
pub const PRIVILEGE_EXEC: &str = "privilege_exec";
pub const CONFIGURATION: &str = "configuration";

static PLATFORM: Lazy<PlatformDefinition> = Lazy::new(build);

/// The shared Cisco IOS platform definition.
pub fn platform() -> &'static PlatformDefinition {
    &PLATFORM
}

fn build() -> PlatformDefinition {
    // Patterns below are literals; a typo is caught by the tests
    let exec = PrivilegeLevel::root(EXEC, r"(?:^|[\r\n])[\w.\-@/:]{1,63}>\s?$")
        .expect("valid exec prompt");

    let privilege_exec = PrivilegeLevel::child(
        PRIVILEGE_EXEC,
        r"(?:^|[\r\n])[\w.\-@/:]{1,63}#\s?$",
        EXEC,
        "enable",
        "disable",
    )
    .expect("valid privileged prompt")
    .requires_secret(r"(?i)password:\s?$")
    .expect("valid enable secret prompt")
    .excluding("(config");

    let configuration = PrivilegeLevel::child(
        CONFIGURATION,
        r"(?:^|[\r\n])[\w.\-@/:]{1,63}\(config[\w.\-@/:+]{0,63}\)#\s?$",
        PRIVILEGE_EXEC,
        "configure terminal",
        "end",
    )
    .expect("valid configuration prompt");

    let username = Regex::new(r"(?i)(?:user ?name|login):\s?$").expect("valid username prompt");
    let password = Regex::new(r"(?i)password:\s?$").expect("valid password prompt");

    PlatformDefinition::new("cisco_ios", username, password)
        .with_privilege(exec)
        .with_privilege(privilege_exec)
        .with_privilege(configuration)
        .with_default_privilege(PRIVILEGE_EXEC)
        .with_config_privilege(CONFIGURATION)
        .with_login_rejected("% Login invalid")
        .with_login_rejected("% Authentication failed")
        .with_login_rejected("Login incorrect")
        .with_login_rejected("% Bad passwords")
        .with_denied("% Access denied")
        .with_denied("% Bad secrets")
        .with_denied("% Authorization failed")
        .with_failure_pattern("% Invalid input")
        .with_failure_pattern("% Incomplete command")
        .with_failure_pattern("% Ambiguous command")
        .with_failure_pattern("% Unknown command")
        .with_failure_pattern("% Error")
        .with_on_open_command("terminal length 0")
        .with_on_open_command("terminal width 0")
}
