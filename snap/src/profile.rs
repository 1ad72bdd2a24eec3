//! Device profiles: who to talk to, how, and with which credentials.
//!
//! A [`DeviceProfile`] is immutable once built. A successful Verify run
//! turns it into a [`VerifiedProfile`], which every other workflow
//! requires.

use std::ops::Deref;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::SecretString;

use crate::error::{ProfileError, Result};
use crate::transport::{HostKeyVerification, SerialSettings, SshOptions, TransportKind};

/// Serial port names accepted for console profiles.
static SERIAL_PORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:COM[0-9]+|/dev/(?:tty|cu)[\w.\-]+)$").expect("valid serial port pattern")
});

/// Everything needed to open a session to one device.
#[derive(Debug)]
pub struct DeviceProfile {
    kind: TransportKind,
    address: String,
    host: String,
    port: u16,
    username: String,
    password: SecretString,
    enable_secret: Option<SecretString>,
    serial: SerialSettings,
    ssh: SshOptions,
}

impl DeviceProfile {
    /// Start building a profile for `address` reached over `kind`.
    ///
    /// For [`TransportKind::Console`] the address is the serial port name
    /// (`COM3`, `/dev/ttyUSB0`); otherwise it is a hostname or IP address,
    /// optionally followed by `:port`.
    pub fn builder(kind: TransportKind, address: impl Into<String>) -> ProfileBuilder {
        ProfileBuilder::new(kind, address)
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// The address exactly as entered (port name or host[:port]).
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Host part of an IP address; the port name for console profiles.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port (0 for console profiles).
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }

    /// Secret for `enable`; falls back to the login password.
    pub fn enable_secret(&self) -> &SecretString {
        self.enable_secret.as_ref().unwrap_or(&self.password)
    }

    pub fn serial(&self) -> &SerialSettings {
        &self.serial
    }

    pub fn ssh_options(&self) -> &SshOptions {
        &self.ssh
    }
}

/// Builder for [`DeviceProfile`].
///
/// # Example
///
/// ```rust
/// use snap::profile::DeviceProfile;
/// use snap::transport::TransportKind;
///
/// let profile = DeviceProfile::builder(TransportKind::Console, "COM3")
///     .username("admin")
///     .password("secret")
///     .build()
///     .unwrap();
/// assert_eq!(profile.address(), "COM3");
/// ```
pub struct ProfileBuilder {
    kind: TransportKind,
    address: String,
    username: String,
    password: String,
    enable_secret: Option<String>,
    serial: SerialSettings,
    ssh: SshOptions,
}

impl ProfileBuilder {
    fn new(kind: TransportKind, address: impl Into<String>) -> Self {
        Self {
            kind,
            address: address.into(),
            username: String::new(),
            password: String::new(),
            enable_secret: None,
            serial: SerialSettings::default(),
            ssh: SshOptions::default(),
        }
    }

    /// Set the login username.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Set the login password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set a separate `enable` secret.
    pub fn enable_secret(mut self, secret: impl Into<String>) -> Self {
        self.enable_secret = Some(secret.into());
        self
    }

    /// Set serial line parameters (console only).
    pub fn serial(mut self, settings: SerialSettings) -> Self {
        self.serial = settings;
        self
    }

    /// Set the SSH host key policy.
    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.ssh.host_key_verification = mode;
        self
    }

    /// Set the SSH options wholesale.
    pub fn ssh_options(mut self, options: SshOptions) -> Self {
        self.ssh = options;
        self
    }

    /// Validate and build the profile.
    pub fn build(self) -> Result<DeviceProfile> {
        let address = self.address.trim().to_string();
        if address.is_empty() {
            return Err(ProfileError::MissingField { field: "address" }.into());
        }
        if self.username.is_empty() {
            return Err(ProfileError::MissingField { field: "username" }.into());
        }
        if self.password.is_empty() {
            return Err(ProfileError::MissingField { field: "password" }.into());
        }

        let (host, port) = match self.kind.default_port() {
            None => {
                if !SERIAL_PORT.is_match(&address) {
                    return Err(ProfileError::InvalidSerialPort { port: address }.into());
                }
                (address.clone(), 0)
            }
            Some(default_port) => split_host_port(&address, default_port)?,
        };

        Ok(DeviceProfile {
            kind: self.kind,
            address,
            host,
            port,
            username: self.username,
            password: SecretString::from(self.password),
            enable_secret: self.enable_secret.map(SecretString::from),
            serial: self.serial,
            ssh: self.ssh,
        })
    }
}

/// Split `host[:port]`, `[v6]:port` or a bare IPv6 literal.
fn split_host_port(address: &str, default_port: u16) -> Result<(String, u16)> {
    let invalid = || ProfileError::InvalidPort {
        address: address.to_string(),
    };

    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        let port = match tail.strip_prefix(':') {
            Some(p) => p.parse().map_err(|_| invalid())?,
            None if tail.is_empty() => default_port,
            None => return Err(invalid().into()),
        };
        return Ok((host.to_string(), port));
    }

    match address.matches(':').count() {
        0 => Ok((address.to_string(), default_port)),
        1 => {
            let (host, port) = address.split_once(':').ok_or_else(invalid)?;
            let port = port.parse().map_err(|_| invalid())?;
            if host.is_empty() {
                return Err(invalid().into());
            }
            Ok((host.to_string(), port))
        }
        // Unbracketed IPv6 literal
        _ => Ok((address.to_string(), default_port)),
    }
}

/// A profile that passed Verify against a live device.
///
/// Only the Verify workflow creates these; Load, Backup, Zeroize and
/// ad-hoc commands refuse to run without one.
#[derive(Debug, Clone)]
pub struct VerifiedProfile(Arc<DeviceProfile>);

impl VerifiedProfile {
    pub(crate) fn new(profile: Arc<DeviceProfile>) -> Self {
        Self(profile)
    }

    /// Shared handle to the underlying profile.
    pub fn profile(&self) -> &Arc<DeviceProfile> {
        &self.0
    }
}

impl Deref for VerifiedProfile {
    type Target = DeviceProfile;

    fn deref(&self) -> &DeviceProfile {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use secrecy::ExposeSecret;

    fn profile_error(result: Result<DeviceProfile>) -> ProfileError {
        match result {
            Err(Error::Profile(e)) => e,
            other => panic!("expected profile error, got {:?}", other.map(|p| p.kind())),
        }
    }

    #[test]
    fn test_console_accepts_com_and_dev_paths() {
        for port in ["COM1", "com12", "/dev/ttyUSB0", "/dev/cu.usbserial-1420"] {
            let profile = DeviceProfile::builder(TransportKind::Console, port)
                .username("admin")
                .password("pw")
                .build()
                .unwrap();
            assert_eq!(profile.host(), port);
            assert_eq!(profile.port(), 0);
        }
    }

    #[test]
    fn test_console_rejects_ip_address() {
        let err = profile_error(
            DeviceProfile::builder(TransportKind::Console, "192.168.0.1")
                .username("admin")
                .password("pw")
                .build(),
        );
        assert_eq!(
            err,
            ProfileError::InvalidSerialPort {
                port: "192.168.0.1".to_string()
            }
        );
    }

    #[test]
    fn test_missing_fields() {
        let err = profile_error(
            DeviceProfile::builder(TransportKind::Telnet, "  ")
                .username("admin")
                .password("pw")
                .build(),
        );
        assert_eq!(err, ProfileError::MissingField { field: "address" });

        let err = profile_error(
            DeviceProfile::builder(TransportKind::Ssh, "10.0.0.1")
                .password("pw")
                .build(),
        );
        assert_eq!(err, ProfileError::MissingField { field: "username" });

        let err = profile_error(
            DeviceProfile::builder(TransportKind::Ssh, "10.0.0.1")
                .username("admin")
                .build(),
        );
        assert_eq!(err, ProfileError::MissingField { field: "password" });
    }

    #[test]
    fn test_default_and_explicit_ports() {
        let ssh = DeviceProfile::builder(TransportKind::Ssh, "10.0.0.1")
            .username("u")
            .password("p")
            .build()
            .unwrap();
        assert_eq!((ssh.host(), ssh.port()), ("10.0.0.1", 22));

        let telnet = DeviceProfile::builder(TransportKind::Telnet, "lab-r1:2001")
            .username("u")
            .password("p")
            .build()
            .unwrap();
        assert_eq!((telnet.host(), telnet.port()), ("lab-r1", 2001));

        let v6 = DeviceProfile::builder(TransportKind::Ssh, "[2001:db8::1]:830")
            .username("u")
            .password("p")
            .build()
            .unwrap();
        assert_eq!((v6.host(), v6.port()), ("2001:db8::1", 830));

        let bare_v6 = DeviceProfile::builder(TransportKind::Ssh, "2001:db8::1")
            .username("u")
            .password("p")
            .build()
            .unwrap();
        assert_eq!((bare_v6.host(), bare_v6.port()), ("2001:db8::1", 22));
    }

    #[test]
    fn test_bad_port_rejected() {
        let err = profile_error(
            DeviceProfile::builder(TransportKind::Telnet, "10.0.0.1:telnet")
                .username("u")
                .password("p")
                .build(),
        );
        assert!(matches!(err, ProfileError::InvalidPort { .. }));
    }

    #[test]
    fn test_enable_secret_falls_back_to_password() {
        let profile = DeviceProfile::builder(TransportKind::Ssh, "r1")
            .username("u")
            .password("login")
            .build()
            .unwrap();
        assert_eq!(profile.enable_secret().expose_secret(), "login");

        let profile = DeviceProfile::builder(TransportKind::Ssh, "r1")
            .username("u")
            .password("login")
            .enable_secret("enable")
            .build()
            .unwrap();
        assert_eq!(profile.enable_secret().expose_secret(), "enable");
    }

    #[test]
    fn test_debug_redacts_password() {
        let profile = DeviceProfile::builder(TransportKind::Ssh, "r1")
            .username("u")
            .password("hunter2")
            .build()
            .unwrap();
        assert!(!format!("{:?}", profile).contains("hunter2"));
    }
}
