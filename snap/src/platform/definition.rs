//! Platform definition for device-family specific behavior.

use indexmap::IndexMap;
use regex::bytes::Regex;

use super::privilege_level::PrivilegeLevel;

/// Everything the session layer needs to know about a device family:
/// how its prompts look, how to log in, and how it reports errors.
#[derive(Debug, Clone)]
pub struct PlatformDefinition {
    /// Platform name (e.g., "cisco_ios").
    pub name: String,

    /// Privilege levels, root first.
    pub privilege_levels: IndexMap<String, PrivilegeLevel>,

    /// Level the workflows escalate to before doing anything.
    pub default_privilege: String,

    /// Level that accepts configuration lines.
    pub config_privilege: String,

    /// In-band login prompt for the username.
    pub username_prompt: Regex,

    /// In-band login prompt for the password.
    pub password_prompt: Regex,

    /// Output that means the login was refused.
    pub login_rejected_when_contains: Vec<String>,

    /// Output that means the account lacks the rights for a step.
    pub denied_when_contains: Vec<String>,

    /// Output that means a command was not accepted.
    pub failed_when_contains: Vec<String>,

    /// Commands to run once the session is authenticated.
    pub on_open_commands: Vec<String>,
}

impl PlatformDefinition {
    pub fn new(name: impl Into<String>, username_prompt: Regex, password_prompt: Regex) -> Self {
        Self {
            name: name.into(),
            privilege_levels: IndexMap::new(),
            default_privilege: String::new(),
            config_privilege: String::new(),
            username_prompt,
            password_prompt,
            login_rejected_when_contains: vec![],
            denied_when_contains: vec![],
            failed_when_contains: vec![],
            on_open_commands: vec![],
        }
    }

    pub fn with_privilege(mut self, level: PrivilegeLevel) -> Self {
        self.privilege_levels.insert(level.name.clone(), level);
        self
    }

    pub fn with_default_privilege(mut self, name: impl Into<String>) -> Self {
        self.default_privilege = name.into();
        self
    }

    pub fn with_config_privilege(mut self, name: impl Into<String>) -> Self {
        self.config_privilege = name.into();
        self
    }

    pub fn with_login_rejected(mut self, marker: impl Into<String>) -> Self {
        self.login_rejected_when_contains.push(marker.into());
        self
    }

    pub fn with_denied(mut self, marker: impl Into<String>) -> Self {
        self.denied_when_contains.push(marker.into());
        self
    }

    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failed_when_contains.push(pattern.into());
        self
    }

    pub fn with_on_open_command(mut self, command: impl Into<String>) -> Self {
        self.on_open_commands.push(command.into());
        self
    }

    pub fn get_privilege(&self, name: &str) -> Option<&PrivilegeLevel> {
        self.privilege_levels.get(name)
    }

    /// One regex matching the prompt of any privilege level.
    pub fn prompt_pattern(&self) -> Result<Regex, regex::Error> {
        let combined = self
            .privilege_levels
            .values()
            .map(|level| format!("(?:{})", level.prompt.as_str()))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&combined)
    }
}
