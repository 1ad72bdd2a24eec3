//! One rung of a device's privilege ladder.

use regex::bytes::Regex;

/// How a level is entered from its parent.
#[derive(Debug, Clone)]
pub struct Entry {
    pub command: String,

    /// Shown by the device when it wants a secret before letting the
    /// session in (`enable` → `Password:`).
    pub secret_prompt: Option<Regex>,
}

/// A privilege level, recognized by the shape of its prompt.
///
/// Levels hang off each other through `parent`: IOS user exec is the root,
/// privileged exec sits under it and configuration mode under that.
#[derive(Debug, Clone)]
pub struct PrivilegeLevel {
    pub name: String,

    /// End-anchored prompt pattern.
    pub prompt: Regex,

    pub parent: Option<String>,

    /// Absent on the root.
    pub entry: Option<Entry>,

    /// Command that returns to the parent.
    pub exit_command: Option<String>,

    /// Text that rules a prompt out even when `prompt` matches
    /// (`#` ends both privileged and configuration prompts).
    pub excludes: Vec<String>,
}

impl PrivilegeLevel {
    /// A level with no parent.
    pub fn root(name: impl Into<String>, prompt: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            prompt: Regex::new(prompt)?,
            parent: None,
            entry: None,
            exit_command: None,
            excludes: Vec::new(),
        })
    }

    /// A level entered from `parent` with `enter` and left with `exit`.
    pub fn child(
        name: impl Into<String>,
        prompt: &str,
        parent: impl Into<String>,
        enter: impl Into<String>,
        exit: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        let mut level = Self::root(name, prompt)?;
        level.parent = Some(parent.into());
        level.entry = Some(Entry {
            command: enter.into(),
            secret_prompt: None,
        });
        level.exit_command = Some(exit.into());
        Ok(level)
    }

    /// Entering this level may ask for a secret matching `prompt`.
    pub fn requires_secret(mut self, prompt: &str) -> Result<Self, regex::Error> {
        let secret_prompt = Some(Regex::new(prompt)?);
        if let Some(entry) = self.entry.as_mut() {
            entry.secret_prompt = secret_prompt;
        }
        Ok(self)
    }

    pub fn excluding(mut self, text: impl Into<String>) -> Self {
        self.excludes.push(text.into());
        self
    }

    /// Whether `prompt` belongs to this level.
    pub fn matches(&self, prompt: &str) -> bool {
        !self.excludes.iter().any(|text| prompt.contains(text.as_str()))
            && self.prompt.is_match(prompt.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excludes_disambiguate() {
        let level = PrivilegeLevel::child("privilege_exec", r"#\s?$", "exec", "enable", "disable")
            .unwrap()
            .excluding("(config");
        assert!(level.matches("R1#"));
        assert!(!level.matches("R1(config)#"));
    }

    #[test]
    fn test_secret_prompt_attaches_to_entry() {
        let level = PrivilegeLevel::child("privilege_exec", r"#\s?$", "exec", "enable", "disable")
            .unwrap()
            .requires_secret(r"(?i)password:\s?$")
            .unwrap();
        let entry = level.entry.unwrap();
        assert_eq!(entry.command, "enable");
        assert!(entry.secret_prompt.unwrap().is_match(b"Password: "));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(PrivilegeLevel::root("broken", r"(unclosed").is_err());
        assert!(
            PrivilegeLevel::child("x", ">", "exec", "enable", "disable")
                .unwrap()
                .requires_secret("[bad")
                .is_err()
        );
    }
}
