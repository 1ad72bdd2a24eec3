//! A scripted IOS router for tests and demos.
//!
//! [`SimulatedDevice`] is a [`Connector`] whose links behave like a small
//! Cisco IOS device: it echoes input, runs the login dialogue, tracks
//! privilege and configuration mode, and answers the commands the
//! workflows use. Counters record how many links were opened and how many
//! were open at once.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;

use super::{Connector, Transport, TransportKind};
use crate::error::{Result, TransportError};
use crate::profile::DeviceProfile;
use crate::version::{FLASH_IMAGES_COMMAND, SHOW_VERSION_COMMAND};

const INVALID_INPUT: &str = "% Invalid input detected at '^' marker.";
const LOGIN_BANNER: &str = "\r\nUser Access Verification\r\n\r\nUsername: ";

/// How a simulated connect attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedFailure {
    /// The serial port cannot be opened.
    PortUnavailable,
    /// The peer refused the TCP connection.
    Refused,
    /// Nothing answered within the connect timeout.
    TimedOut,
}

/// What happens to a link once it receives a given line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFault {
    /// The device goes quiet and never answers again.
    Stall,
    /// The link drops.
    HangUp,
}

#[derive(Debug, Default)]
struct Stats {
    connects: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    received: Mutex<Vec<String>>,
}

/// A scripted device. Clones share counters, so a test can keep one clone
/// and hand another to an engine.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    hostname: String,
    username: String,
    password: String,
    enable_secret: Option<String>,
    console_login: bool,
    start_privileged: bool,
    start_in_config: bool,
    version_line: String,
    running_config: String,
    flash_listing: String,
    failure: Option<SimulatedFailure>,
    unresponsive: bool,
    fault: Option<(String, LineFault)>,
    ssh_login: bool,
    erase_prompt: bool,
    reload_asks_save: bool,
    serial_ports: Vec<String>,
    outputs: HashMap<String, String>,
    rejected_config: HashSet<String>,
    stats: Arc<Stats>,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevice {
    /// A healthy router `R1` with login `admin` / `cisco`, running 15.4.
    pub fn new() -> Self {
        Self {
            hostname: "R1".to_string(),
            username: "admin".to_string(),
            password: "cisco".to_string(),
            enable_secret: None,
            console_login: true,
            start_privileged: false,
            start_in_config: false,
            version_line: "version 15.4".to_string(),
            running_config: "hostname R1\ninterface Gi0/1".to_string(),
            flash_listing: "    1  -rw-    33591768  c2900-universalk9-mz.SPA.151-4.M4.bin".to_string(),
            failure: None,
            unresponsive: false,
            fault: None,
            ssh_login: false,
            erase_prompt: true,
            reload_asks_save: false,
            serial_ports: vec!["COM1".to_string(), "COM4".to_string()],
            outputs: HashMap::new(),
            rejected_config: HashSet::new(),
            stats: Arc::new(Stats::default()),
        }
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn enable_secret(mut self, secret: impl Into<String>) -> Self {
        self.enable_secret = Some(secret.into());
        self
    }

    /// Console line without `login` configured: straight to a prompt.
    pub fn without_console_login(mut self) -> Self {
        self.console_login = false;
        self
    }

    /// Land in privileged mode after login.
    pub fn privileged(mut self) -> Self {
        self.start_privileged = true;
        self
    }

    /// Present a configuration prompt after login (a session left open).
    pub fn in_config_mode(mut self) -> Self {
        self.start_in_config = true;
        self
    }

    /// Release reported by the version command (`"12.2"` → `version 12.2`).
    pub fn version(mut self, version: &str) -> Self {
        self.version_line = format!("version {}", version);
        self
    }

    /// Exact output of the version command.
    pub fn version_line(mut self, line: impl Into<String>) -> Self {
        self.version_line = line.into();
        self
    }

    pub fn running_config(mut self, config: impl Into<String>) -> Self {
        self.running_config = config.into();
        self
    }

    pub fn flash_listing(mut self, listing: impl Into<String>) -> Self {
        self.flash_listing = listing.into();
        self
    }

    pub fn failing_connect(mut self, failure: SimulatedFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Accept the link but never print anything.
    pub fn unresponsive(mut self) -> Self {
        self.unresponsive = true;
        self
    }

    /// Go quiet as soon as `line` arrives, before answering it.
    pub fn stall_after(mut self, line: impl Into<String>) -> Self {
        self.fault = Some((line.into(), LineFault::Stall));
        self
    }

    /// Drop the link as soon as `line` arrives.
    pub fn hang_up_after(mut self, line: impl Into<String>) -> Self {
        self.fault = Some((line.into(), LineFault::HangUp));
        self
    }

    /// SSH sessions also print a `Username:` prompt after the handshake.
    pub fn login_prompt_over_ssh(mut self) -> Self {
        self.ssh_login = true;
        self
    }

    /// `write erase` is not recognized.
    pub fn without_erase_prompt(mut self) -> Self {
        self.erase_prompt = false;
        self
    }

    /// `reload` first asks whether to save the modified configuration.
    pub fn reload_asks_save(mut self) -> Self {
        self.reload_asks_save = true;
        self
    }

    pub fn serial_ports(mut self, ports: &[&str]) -> Self {
        self.serial_ports = ports.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Canned output for an exec command.
    pub fn output(mut self, command: impl Into<String>, output: impl Into<String>) -> Self {
        self.outputs.insert(command.into(), output.into());
        self
    }

    /// A configuration line the device answers with `% Invalid input`.
    pub fn reject_config_line(mut self, line: impl Into<String>) -> Self {
        self.rejected_config.insert(line.into());
        self
    }

    /// Links opened so far.
    pub fn connects(&self) -> usize {
        self.stats.connects.load(Ordering::SeqCst)
    }

    /// Links currently open.
    pub fn active(&self) -> usize {
        self.stats.active.load(Ordering::SeqCst)
    }

    /// Most links ever open at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.stats.max_active.load(Ordering::SeqCst)
    }

    /// Every line the device has received, secrets included.
    pub fn received(&self) -> Vec<String> {
        self.stats
            .received
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn secret(&self) -> &str {
        self.enable_secret.as_deref().unwrap_or(&self.password)
    }
}

#[async_trait]
impl Connector for SimulatedDevice {
    async fn connect(
        &self,
        profile: &DeviceProfile,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>> {
        match self.failure {
            Some(SimulatedFailure::PortUnavailable) => {
                return Err(TransportError::PortUnavailable {
                    port: profile.address().to_string(),
                    reason: "The system cannot find the file specified.".to_string(),
                }
                .into());
            }
            Some(SimulatedFailure::Refused) => {
                return Err(TransportError::ConnectionFailed {
                    host: profile.host().to_string(),
                    port: profile.port(),
                    source: io::Error::from(io::ErrorKind::ConnectionRefused),
                }
                .into());
            }
            Some(SimulatedFailure::TimedOut) => {
                tokio::time::sleep(timeout).await;
                return Err(TransportError::Timeout(timeout).into());
            }
            None => {}
        }

        let kind = profile.kind();
        if kind == TransportKind::Ssh {
            if profile.username() != self.username
                || profile.password().expose_secret() != self.password
            {
                return Err(TransportError::AuthenticationFailed {
                    user: profile.username().to_string(),
                }
                .into());
            }
        }

        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        let active = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_active.fetch_max(active, Ordering::SeqCst);

        Ok(Box::new(SimulatedLink::open(self.clone(), kind)))
    }

    fn serial_ports(&self) -> Vec<String> {
        self.serial_ports.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    /// Console line waiting for a keystroke.
    Asleep,
    Username,
    Password,
    Exec,
    EnableSecret,
    Privileged,
    Config(Option<&'static str>),
    ConfirmErase,
    SaveBeforeReload,
    ConfirmReload,
    Reloading,
}

/// One open link to a [`SimulatedDevice`].
struct SimulatedLink {
    device: SimulatedDevice,
    mode: Mode,
    output: VecDeque<Vec<u8>>,
    partial: String,
    after_cr: bool,
    pending_user: Option<String>,
    modified: bool,
    fault: Option<LineFault>,
    closed: bool,
}

impl SimulatedLink {
    fn open(device: SimulatedDevice, kind: TransportKind) -> Self {
        let mut link = Self {
            device,
            mode: Mode::Asleep,
            output: VecDeque::new(),
            partial: String::new(),
            after_cr: false,
            pending_user: None,
            modified: false,
            fault: None,
            closed: false,
        };
        match kind {
            TransportKind::Console => {}
            TransportKind::Telnet => link.greet(true),
            TransportKind::Ssh => {
                let login = link.device.ssh_login;
                link.greet(login);
            }
        }
        link
    }

    fn greet(&mut self, login: bool) {
        if self.device.unresponsive {
            return;
        }
        if login {
            self.mode = Mode::Username;
            self.emit(LOGIN_BANNER);
        } else {
            self.logged_in("\r\n");
        }
    }

    fn logged_in(&mut self, lead: &str) {
        self.mode = if self.device.start_in_config {
            Mode::Config(None)
        } else if self.device.start_privileged {
            Mode::Privileged
        } else {
            Mode::Exec
        };
        let prompt = self.prompt();
        self.emit(&format!("{}{}", lead, prompt));
    }

    fn prompt(&self) -> String {
        let suffix = match self.mode {
            Mode::Exec => ">".to_string(),
            Mode::Config(None) => "(config)#".to_string(),
            Mode::Config(Some(sub)) => format!("(config-{})#", sub),
            _ => "#".to_string(),
        };
        format!("{}{}", self.device.hostname, suffix)
    }

    fn emit(&mut self, text: &str) {
        self.output.push_back(text.as_bytes().to_vec());
    }

    /// Echo `line`, then print `body` (if any) and the current prompt.
    fn reply(&mut self, line: &str, body: &str) {
        let prompt = self.prompt();
        if body.is_empty() {
            self.emit(&format!("{}\r\n{}", line, prompt));
        } else {
            let body = body.replace('\n', "\r\n");
            self.emit(&format!("{}\r\n{}\r\n{}", line, body, prompt));
        }
    }

    fn handle_line(&mut self, line: &str) {
        if let Ok(mut received) = self.device.stats.received.lock() {
            received.push(line.to_string());
        }
        if self.device.unresponsive || self.fault.is_some() {
            return;
        }
        if let Some((trigger, fault)) = &self.device.fault {
            if trigger == line {
                self.fault = Some(*fault);
                return;
            }
        }

        let command = line.trim();
        match self.mode.clone() {
            Mode::Asleep => {
                if self.device.console_login {
                    self.mode = Mode::Username;
                    self.emit(LOGIN_BANNER);
                } else {
                    self.logged_in("\r\n");
                }
            }
            Mode::Username => {
                self.pending_user = Some(command.to_string());
                self.mode = Mode::Password;
                self.emit(&format!("{}\r\nPassword: ", line));
            }
            Mode::Password => {
                let ok = self.pending_user.take().as_deref() == Some(self.device.username.as_str())
                    && command == self.device.password;
                if ok {
                    self.logged_in("\r\n");
                } else {
                    self.mode = Mode::Username;
                    self.emit(&format!("\r\n% Login invalid\r\n{}", LOGIN_BANNER));
                }
            }
            Mode::EnableSecret => {
                if command == self.device.secret() {
                    self.mode = Mode::Privileged;
                    let prompt = self.prompt();
                    self.emit(&format!("\r\n{}", prompt));
                } else {
                    self.mode = Mode::Exec;
                    let prompt = self.prompt();
                    self.emit(&format!("\r\n% Access denied\r\n\r\n{}", prompt));
                }
            }
            Mode::Exec => self.exec_command(line, command),
            Mode::Privileged => self.privileged_command(line, command),
            Mode::Config(sub) => self.config_command(line, command, sub),
            Mode::ConfirmErase => {
                self.mode = Mode::Privileged;
                if command.is_empty() || command.eq_ignore_ascii_case("y") {
                    let prompt = self.prompt();
                    self.emit(&format!(
                        "{}\r\n[OK]\r\nErase of nvram: complete\r\n{}",
                        line, prompt
                    ));
                } else {
                    self.reply(line, "");
                }
            }
            Mode::SaveBeforeReload => {
                self.mode = Mode::ConfirmReload;
                if command.starts_with('y') {
                    self.emit(&format!("{}\r\nBuilding configuration...\r\n[OK]", line));
                } else {
                    self.emit(line);
                }
                self.emit("\r\nProceed with reload? [confirm]");
            }
            Mode::ConfirmReload => {
                if command.is_empty() || command.eq_ignore_ascii_case("y") {
                    self.mode = Mode::Reloading;
                    self.emit(&format!(
                        "{}\r\n\r\n*Mar  1 00:00:00.000: %SYS-5-RELOAD: Reload requested by console.\r\n",
                        line
                    ));
                } else {
                    self.mode = Mode::Privileged;
                    self.reply(line, "");
                }
            }
            Mode::Reloading => {}
        }
    }
}

impl SimulatedLink {
    fn exec_command(&mut self, line: &str, command: &str) {
        match command {
            "" => self.reply(line, ""),
            "enable" => {
                self.mode = Mode::EnableSecret;
                self.emit(&format!("{}\r\nPassword: ", line));
            }
            "terminal length 0" | "terminal width 0" => self.reply(line, ""),
            "configure terminal" => self.reply(line, INVALID_INPUT),
            _ => self.canned(line, command),
        }
    }

    fn privileged_command(&mut self, line: &str, command: &str) {
        match command {
            "" | "enable" | "terminal length 0" | "terminal width 0" => self.reply(line, ""),
            "disable" => {
                self.mode = Mode::Exec;
                self.reply(line, "");
            }
            "configure terminal" => {
                self.mode = Mode::Config(None);
                self.reply(
                    line,
                    "Enter configuration commands, one per line.  End with CNTL/Z.",
                );
            }
            SHOW_VERSION_COMMAND => {
                let version = self.device.version_line.clone();
                self.reply(line, &version);
            }
            FLASH_IMAGES_COMMAND => {
                let listing = self.device.flash_listing.clone();
                self.reply(line, &listing);
            }
            "show running-config" | "show run" => {
                let config = self.device.running_config.clone();
                self.reply(line, &config);
            }
            "write memory" | "write" => {
                self.modified = false;
                self.reply(line, "Building configuration...\n[OK]");
            }
            "write erase" if self.device.erase_prompt => {
                self.mode = Mode::ConfirmErase;
                self.emit(&format!(
                    "{}\r\nErasing the nvram filesystem will remove all configuration files! Continue? [confirm]",
                    line
                ));
            }
            "reload" => {
                if self.modified || self.device.reload_asks_save {
                    self.mode = Mode::SaveBeforeReload;
                    self.emit(&format!(
                        "{}\r\n\r\nSystem configuration has been modified. Save? [yes/no]: ",
                        line
                    ));
                } else {
                    self.mode = Mode::ConfirmReload;
                    self.emit(&format!("{}\r\nProceed with reload? [confirm]", line));
                }
            }
            _ => self.canned(line, command),
        }
    }

    fn config_command(&mut self, line: &str, command: &str, sub: Option<&'static str>) {
        match command {
            "end" => {
                self.mode = Mode::Privileged;
                self.reply(line, "");
            }
            "exit" => {
                self.mode = match sub {
                    Some(_) => Mode::Config(None),
                    None => Mode::Privileged,
                };
                self.reply(line, "");
            }
            _ if self.device.rejected_config.contains(command) => {
                self.reply(line, INVALID_INPUT);
            }
            _ => {
                self.modified = true;
                if command.starts_with("interface ") {
                    self.mode = Mode::Config(Some("if"));
                } else if command.starts_with("router ") {
                    self.mode = Mode::Config(Some("router"));
                } else if command.starts_with("line ") {
                    self.mode = Mode::Config(Some("line"));
                }
                self.reply(line, "");
            }
        }
    }

    fn canned(&mut self, line: &str, command: &str) {
        match self.device.outputs.get(command).cloned() {
            Some(output) => self.reply(line, &output),
            None => self.reply(line, INVALID_INPUT),
        }
    }

    fn feed(&mut self, data: &[u8]) {
        for &byte in data {
            match byte {
                b'\r' => {
                    self.after_cr = true;
                    let line = std::mem::take(&mut self.partial);
                    self.handle_line(&line);
                }
                b'\n' if self.after_cr => self.after_cr = false,
                b'\n' => {
                    let line = std::mem::take(&mut self.partial);
                    self.handle_line(&line);
                }
                _ => {
                    self.after_cr = false;
                    self.partial.push(byte as char);
                }
            }
        }
    }
}

#[async_trait]
impl Transport for SimulatedLink {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(TransportError::Disconnected.into());
        }
        self.feed(data);
        Ok(())
    }

    async fn read(&mut self) -> Result<Vec<u8>> {
        if self.closed {
            return Err(TransportError::Disconnected.into());
        }
        match self.output.pop_front() {
            Some(chunk) => Ok(chunk),
            None if self.fault == Some(LineFault::HangUp) => {
                Err(TransportError::Disconnected.into())
            }
            // Real links block until the device speaks
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

impl Drop for SimulatedLink {
    fn drop(&mut self) {
        self.device.stats.active.fetch_sub(1, Ordering::SeqCst);
    }
}
