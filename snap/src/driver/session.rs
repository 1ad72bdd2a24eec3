//! One live connection to a device, owned by a single workflow run.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use regex::bytes::Regex;
use secrecy::ExposeSecret;
use tokio::time::Instant;

use super::privilege::PrivilegeManager;
use super::response::Response;
use crate::channel::{DeviceChannel, contains_any};
use crate::config::Timing;
use crate::error::{ChannelError, DriverError, Result, TransportError};
use crate::platform::{PlatformDefinition, cisco_ios};
use crate::profile::DeviceProfile;
use crate::transport::{Connector, TransportKind};

/// Upper bound on login exchanges (banner, username, password, retries).
const MAX_LOGIN_ROUNDS: usize = 6;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Authenticated,
    ConfigMode,
}

/// How [`DeviceSession::send_command`] decides a command is finished.
#[derive(Debug, Clone, Copy)]
pub enum SendMode<'a> {
    /// Wait for the device to return to a prompt.
    Synchronous,
    /// Collect output for a fixed window, ending early if `until` appears.
    /// Used where the prompt after a command cannot be predicted.
    Timed {
        window: Duration,
        until: Option<&'a Regex>,
    },
}

/// The per-workflow session state machine:
/// `Disconnected → Connected → Authenticated → [ConfigMode] → Disconnected`.
///
/// A session is never shared. [`disconnect`](Self::disconnect) is
/// infallible and idempotent so every exit path can call it.
pub struct DeviceSession {
    profile: Arc<DeviceProfile>,
    platform: &'static PlatformDefinition,
    timing: Timing,
    command_timeout: Duration,
    channel: Option<DeviceChannel>,
    state: SessionState,
    privilege: PrivilegeManager,
    prompt: Regex,
}

impl DeviceSession {
    pub fn new(profile: Arc<DeviceProfile>, timing: Timing) -> Result<Self> {
        let platform = cisco_ios::platform();
        let prompt = platform.prompt_pattern().map_err(ChannelError::from)?;
        let command_timeout = timing.command_timeout_for(profile.kind());
        Ok(Self {
            privilege: PrivilegeManager::new(platform.privilege_levels.clone()),
            profile,
            platform,
            timing,
            command_timeout,
            channel: None,
            state: SessionState::Disconnected,
            prompt,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn kind(&self) -> TransportKind {
        self.profile.kind()
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn current_privilege(&self) -> Option<&str> {
        self.privilege.current_name()
    }

    pub fn in_config_mode(&self) -> bool {
        self.state == SessionState::ConfigMode
    }

    /// Switch synchronous sends to the longer configuration-load timeout.
    pub fn use_load_timing(&mut self) {
        self.command_timeout = self.timing.load_timeout_for(self.kind());
    }

    fn channel(&mut self) -> Result<&mut DeviceChannel> {
        self.channel
            .as_mut()
            .ok_or_else(|| DriverError::NotConnected.into())
    }

    /// Open the link.
    pub async fn connect(&mut self, connector: &dyn Connector) -> Result<()> {
        if self.channel.is_some() {
            return Err(DriverError::AlreadyConnected.into());
        }

        let transport = connector
            .connect(&self.profile, self.timing.connect_timeout)
            .await?;
        self.channel = Some(DeviceChannel::new(transport));
        self.state = SessionState::Connected;
        debug!("{} link to {} open", self.kind(), self.profile.address());
        Ok(())
    }

    /// Log in and reach the first device prompt.
    ///
    /// SSH has already checked the credentials during the handshake;
    /// console and Telnet answer the device's username and password
    /// prompts here. Either way the session ends up at a prompt with
    /// paging disabled. Calling it again once authenticated does nothing.
    pub async fn authenticate(&mut self) -> Result<()> {
        match self.state {
            SessionState::Disconnected => return Err(DriverError::NotConnected.into()),
            SessionState::Authenticated | SessionState::ConfigMode => return Ok(()),
            SessionState::Connected => {}
        }

        let platform = self.platform;
        let profile = Arc::clone(&self.profile);
        let login_timeout = self.timing.login_timeout;
        let prompt = self.prompt.clone();
        let rejected = |data: &[u8]| {
            contains_any(
                &platform.login_rejected_when_contains,
                &String::from_utf8_lossy(data),
            )
            .is_some()
        };
        let auth_failed = || TransportError::AuthenticationFailed {
            user: profile.username().to_string(),
        };

        // Over SSH the handshake already carried the credentials
        let in_band = self.kind().authenticates_in_band();
        if self.kind().needs_wakeup() {
            self.channel()?.write_raw(b"\r\n").await?;
        }

        let mut sent_username = false;
        let mut sent_password = false;
        let mut reached = None;
        for _ in 0..MAX_LOGIN_ROUNDS {
            let (index, data) = self
                .channel()?
                .read_until_any(
                    &[&prompt, &platform.username_prompt, &platform.password_prompt],
                    login_timeout,
                )
                .await?;
            if rejected(&data) {
                return Err(auth_failed().into());
            }

            match index {
                0 => {
                    reached = Some(data);
                    break;
                }
                _ if !in_band => {
                    warn!("{} asked for a login after the handshake", self.profile.address());
                    return Err(auth_failed().into());
                }
                1 if !sent_username => {
                    debug!("answering username prompt");
                    self.channel()?.send(profile.username()).await?;
                    sent_username = true;
                }
                2 if !sent_password => {
                    debug!("answering password prompt");
                    self.channel()?
                        .send_hidden(profile.password().expose_secret())
                        .await?;
                    sent_password = true;
                }
                // The device asked again: the answer was refused
                _ => return Err(auth_failed().into()),
            }
        }

        let data = reached.ok_or_else(auth_failed)?;
        let prompt_text = self.extract_prompt(&data);
        self.record_prompt(&prompt_text);
        // A prompt we could not classify still means we are logged in
        if self.state == SessionState::Connected {
            self.state = SessionState::Authenticated;
        }
        info!(
            "logged in to {} as {} ({})",
            self.profile.address(),
            self.profile.username(),
            self.current_privilege().unwrap_or("unknown privilege")
        );

        for command in &platform.on_open_commands {
            let response = self.send_command(command, SendMode::Synchronous).await?;
            if let Some(message) = &response.failure_message {
                debug!("'{}' refused: {}", command, message);
            }
        }
        Ok(())
    }

    /// Reach privileged mode. Already privileged (or configuring) is fine.
    pub async fn escalate(&mut self) -> Result<()> {
        let platform = self.platform;
        let default = platform.default_privilege.as_str();
        if let Some(current) = self.current_privilege() {
            if current == default || self.is_descendant(default, current) {
                return Ok(());
            }
        }
        self.acquire_privilege(default).await
    }

    fn is_descendant(&self, ancestor: &str, name: &str) -> bool {
        let mut next = self.privilege.get(name).and_then(|l| l.parent.as_deref());
        while let Some(parent) = next {
            if parent == ancestor {
                return true;
            }
            next = self.privilege.get(parent).and_then(|l| l.parent.as_deref());
        }
        false
    }

    pub async fn enter_config_mode(&mut self) -> Result<()> {
        let platform = self.platform;
        let target = platform.config_privilege.as_str();
        self.acquire_privilege(target).await
    }

    /// Leave configuration mode; a no-op outside it.
    pub async fn exit_config_mode(&mut self) -> Result<()> {
        if !self.in_config_mode() {
            return Ok(());
        }
        let platform = self.platform;
        let target = platform.default_privilege.as_str();
        self.acquire_privilege(target).await
    }

    /// Walk the privilege graph to `target`, answering secret prompts.
    pub async fn acquire_privilege(&mut self, target: &str) -> Result<()> {
        self.require_authenticated()?;

        let current = self
            .current_privilege()
            .map(str::to_string)
            .ok_or_else(|| DriverError::UnknownPrivilege {
                prompt: String::new(),
            })?;
        if current == target {
            return Ok(());
        }

        let path = self.privilege.find_path(&current, target)?;
        for step in path.windows(2) {
            let (from, to) = (&step[0], &step[1]);
            let transition =
                self.privilege
                    .get_transition(from, to)
                    .ok_or_else(|| DriverError::NoPrivilegePath {
                        from: from.clone(),
                        to: to.clone(),
                    })?;
            debug!("privilege {} -> {} via '{}'", from, to, transition.command);

            let timeout = self.command_timeout;
            let prompt = self.prompt.clone();
            let secret = self.profile.enable_secret().expose_secret().to_string();
            let channel = self.channel()?;
            channel.send(&transition.command).await?;

            let mut data = Vec::new();
            match &transition.auth_prompt {
                Some(auth) => {
                    let (index, chunk) = channel.read_until_any(&[&prompt, auth], timeout).await?;
                    data.extend_from_slice(&chunk);
                    if index == 1 {
                        channel.send_hidden(&secret).await?;
                        let (index, chunk) =
                            channel.read_until_any(&[&prompt, auth], timeout).await?;
                        data.extend_from_slice(&chunk);
                        // Asked for the secret again: it was wrong
                        if index == 1 {
                            return Err(DriverError::PrivilegeAcquisitionFailed {
                                target: to.clone(),
                            }
                            .into());
                        }
                    }
                }
                None => data = channel.read_until_pattern(&prompt, timeout).await?,
            }

            let text = String::from_utf8_lossy(&data);
            if let Some(marker) = contains_any(&self.platform.denied_when_contains, &text) {
                warn!("device refused '{}': {}", transition.command, marker);
            }
            let prompt_text = self.extract_prompt(&data);
            self.record_prompt(&prompt_text);
            if self.current_privilege() != Some(to.as_str()) {
                return Err(DriverError::PrivilegeAcquisitionFailed { target: to.clone() }.into());
            }
        }
        Ok(())
    }

    /// Send one command line and collect its output.
    ///
    /// Synchronous sends update the tracked privilege from the returned
    /// prompt and flag device complaints in
    /// [`Response::failure_message`]; they are not errors.
    pub async fn send_command(&mut self, line: &str, mode: SendMode<'_>) -> Result<Response> {
        self.require_authenticated()?;

        let start = Instant::now();
        match mode {
            SendMode::Synchronous => {
                let timeout = self.command_timeout;
                let prompt = self.prompt.clone();
                let channel = self.channel()?;
                channel.send(line).await?;
                let data = channel.read_until_pattern(&prompt, timeout).await?;

                let prompt_text = self.extract_prompt(&data);
                self.record_prompt(&prompt_text);

                let response = Response::new(
                    line,
                    String::from_utf8_lossy(&data).into_owned(),
                    prompt_text,
                    start.elapsed(),
                );
                let failure = contains_any(&self.platform.failed_when_contains, &response.result)
                    .or_else(|| contains_any(&self.platform.denied_when_contains, &response.result))
                    .map(str::to_string);
                Ok(match failure {
                    Some(marker) => response.with_failure(marker),
                    None => response,
                })
            }
            SendMode::Timed { window, until } => {
                let channel = self.channel()?;
                channel.send(line).await?;
                let read = channel.read_for(window, until).await?;
                Ok(Response::timed(
                    line,
                    read.as_str().into_owned(),
                    read.matched,
                    start.elapsed(),
                ))
            }
        }
    }

    /// Close the link. Safe to call in any state, any number of times.
    pub async fn disconnect(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                warn!("error closing link to {}: {}", self.profile.address(), e);
            }
            debug!("{} link to {} closed", self.kind(), self.profile.address());
        }
        self.privilege.reset();
        self.state = SessionState::Disconnected;
    }

    fn require_authenticated(&self) -> Result<()> {
        match self.state {
            SessionState::Disconnected => Err(DriverError::NotConnected.into()),
            SessionState::Connected => Err(DriverError::NotAuthenticated.into()),
            SessionState::Authenticated | SessionState::ConfigMode => Ok(()),
        }
    }

    fn extract_prompt(&self, data: &[u8]) -> String {
        let offset = data.len().saturating_sub(256);
        self.prompt
            .find(&data[offset..])
            .map(|m| String::from_utf8_lossy(m.as_bytes()).trim().to_string())
            .unwrap_or_default()
    }

    /// Track privilege (and config mode) from the prompt just seen.
    fn record_prompt(&mut self, prompt: &str) {
        if prompt.is_empty() {
            return;
        }
        match self.privilege.update_from_prompt(prompt) {
            Ok(level) => {
                self.state = if level == self.platform.config_privilege {
                    SessionState::ConfigMode
                } else {
                    SessionState::Authenticated
                };
            }
            Err(e) => debug!("{}", e),
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if self.channel.is_some() {
            warn!(
                "session to {} dropped without disconnect",
                self.profile.address()
            );
        }
    }
}
