//! Privilege level tracking and navigation.

use indexmap::IndexMap;
use regex::bytes::Regex;

use crate::error::{DriverError, Result};
use crate::platform::PrivilegeLevel;

/// Tracks the session's privilege level and plans moves between levels.
///
/// Levels form a tree through `parent`; a move between two levels
/// climbs from the source to the nearest common ancestor, then descends
/// to the target.
#[derive(Debug, Clone)]
pub struct PrivilegeManager {
    levels: IndexMap<String, PrivilegeLevel>,
    current: Option<String>,
}

impl PrivilegeManager {
    pub fn new(levels: IndexMap<String, PrivilegeLevel>) -> Self {
        Self {
            levels,
            current: None,
        }
    }

    /// Determine the privilege level a prompt belongs to.
    ///
    /// Levels are tried in definition order; `excludes` rules out
    /// look-alikes.
    pub fn determine_from_prompt(&self, prompt: &str) -> Result<&PrivilegeLevel> {
        self.levels
            .values()
            .find(|level| level.matches(prompt))
            .ok_or_else(|| {
                DriverError::UnknownPrivilege {
                    prompt: prompt.to_string(),
                }
                .into()
            })
    }

    /// Record the level a prompt belongs to and return its name.
    pub fn update_from_prompt(&mut self, prompt: &str) -> Result<&str> {
        let name = self.determine_from_prompt(prompt)?.name.clone();
        self.current = Some(name);
        Ok(self.current.as_deref().unwrap_or_default())
    }

    pub fn current(&self) -> Option<&PrivilegeLevel> {
        self.current.as_ref().and_then(|name| self.levels.get(name))
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Forget the current level (the link is gone).
    pub fn reset(&mut self) {
        self.current = None;
    }

    pub fn get(&self, name: &str) -> Option<&PrivilegeLevel> {
        self.levels.get(name)
    }

    /// `name` followed by each of its ancestors up to the root.
    fn lineage(&self, name: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut next = Some(name.to_string());
        while let Some(level) = next.and_then(|n| self.levels.get(&n)) {
            // Parent cycles would otherwise loop forever
            if chain.contains(&level.name) {
                break;
            }
            chain.push(level.name.clone());
            next = level.parent.clone();
        }
        chain
    }

    /// Levels to traverse from `from` to `to`, both ends included.
    pub fn find_path(&self, from: &str, to: &str) -> Result<Vec<String>> {
        let no_path = || DriverError::NoPrivilegePath {
            from: from.to_string(),
            to: to.to_string(),
        };

        let up = self.lineage(from);
        let down = self.lineage(to);
        if up.is_empty() || down.is_empty() {
            return Err(no_path().into());
        }

        let (climb, common) = up
            .iter()
            .enumerate()
            .find_map(|(i, name)| down.iter().position(|d| d == name).map(|j| (i, j)))
            .ok_or_else(no_path)?;

        let mut path: Vec<String> = up[..=climb].to_vec();
        path.extend(down[..common].iter().rev().cloned());
        Ok(path)
    }

    /// How to step between two adjacent levels.
    pub fn get_transition(&self, from: &str, to: &str) -> Option<Transition> {
        let from_level = self.levels.get(from)?;
        let to_level = self.levels.get(to)?;

        if to_level.parent.as_deref() == Some(from) {
            let entry = to_level.entry.as_ref()?;
            return Some(Transition {
                command: entry.command.clone(),
                auth_prompt: entry.secret_prompt.clone(),
            });
        }

        if from_level.parent.as_deref() == Some(to) {
            return Some(Transition {
                command: from_level.exit_command.clone()?,
                auth_prompt: None,
            });
        }

        None
    }
}

/// A single step between adjacent privilege levels.
#[derive(Debug, Clone)]
pub struct Transition {
    /// Command that performs the step.
    pub command: String,

    /// Secret prompt the device may show after the command.
    pub auth_prompt: Option<Regex>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::cisco_ios::{self, CONFIGURATION, EXEC, PRIVILEGE_EXEC};

    fn manager() -> PrivilegeManager {
        PrivilegeManager::new(cisco_ios::platform().privilege_levels.clone())
    }

    #[test]
    fn test_determine_privilege() {
        let manager = manager();
        assert_eq!(manager.determine_from_prompt("R1>").unwrap().name, EXEC);
        assert_eq!(manager.determine_from_prompt("R1#").unwrap().name, PRIVILEGE_EXEC);
        assert_eq!(
            manager.determine_from_prompt("R1(config-if)#").unwrap().name,
            CONFIGURATION
        );
        assert!(manager.determine_from_prompt("Password:").is_err());
    }

    #[test]
    fn test_find_path() {
        let manager = manager();
        assert_eq!(
            manager.find_path(EXEC, CONFIGURATION).unwrap(),
            vec![EXEC, PRIVILEGE_EXEC, CONFIGURATION]
        );
        assert_eq!(
            manager.find_path(CONFIGURATION, EXEC).unwrap(),
            vec![CONFIGURATION, PRIVILEGE_EXEC, EXEC]
        );
        assert_eq!(manager.find_path(EXEC, EXEC).unwrap(), vec![EXEC]);
        assert!(manager.find_path(EXEC, "shell").is_err());
    }

    #[test]
    fn test_transitions() {
        let manager = manager();
        let up = manager.get_transition(EXEC, PRIVILEGE_EXEC).unwrap();
        assert_eq!(up.command, "enable");
        assert!(up.auth_prompt.is_some());

        let down = manager.get_transition(CONFIGURATION, PRIVILEGE_EXEC).unwrap();
        assert_eq!(down.command, "end");
        assert!(down.auth_prompt.is_none());

        assert!(manager.get_transition(EXEC, CONFIGURATION).is_none());
    }

    #[test]
    fn test_update_from_prompt() {
        let mut manager = manager();
        assert!(manager.current().is_none());
        assert_eq!(manager.update_from_prompt("R1(config)#").unwrap(), CONFIGURATION);
        assert_eq!(manager.current_name(), Some(CONFIGURATION));
        manager.reset();
        assert!(manager.current_name().is_none());
    }
}
