//! SSH connection configuration.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys.
    Strict,

    /// Accept and learn unknown keys, reject changed keys.
    AcceptNew,

    /// Accept all keys without checking. Network gear is frequently
    /// re-imaged, so this is the default for device channels.
    #[default]
    Disabled,
}

/// SSH connection configuration.
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Target host (hostname or IP address).
    pub host: String,

    /// SSH port (default: 22).
    pub port: u16,

    /// Username for authentication.
    pub username: String,

    /// Authentication method.
    pub auth: AuthMethod,

    /// Timeout for TCP connect plus SSH handshake.
    pub connect_timeout: Duration,

    /// Terminal width for the PTY.
    pub terminal_width: u32,

    /// Terminal height for the PTY.
    pub terminal_height: u32,

    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// Path to known_hosts file, `None` for the user default.
    pub known_hosts_path: Option<PathBuf>,

    /// Capacity (in chunks) of the byte queue between the socket pump and
    /// the session reader.
    pub read_queue_capacity: usize,
}

impl SshConfig {
    /// Create a config with password authentication and default settings.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            auth: AuthMethod::Password(password),
            connect_timeout: Duration::from_secs(30),
            terminal_width: 511,
            terminal_height: 24,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            read_queue_capacity: 256,
        }
    }

    /// `host:port`, used in log lines.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Authentication method for SSH connections.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    /// No authentication (lab devices only).
    None,

    /// Password authentication.
    Password(SecretString),

    /// Private key authentication.
    PrivateKey {
        /// Path to the private key file.
        path: PathBuf,
        /// Optional passphrase for encrypted keys.
        passphrase: Option<SecretString>,
    },
}
