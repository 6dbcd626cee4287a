//! Per-device configuration.
//!
//! Durations are configured in whole seconds; the accessors hand out
//! [`Duration`]s. A zero keepalive interval disables keepalives; an empty
//! keepalive command sends a bare newline.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

use crate::cli::DEFAULT_CACHE_CAPACITY;
use crate::error::{ConfigError, Result};
use crate::transport::{AuthMethod, HostKeyVerification, SshConfig};

/// Everything needed to build a stack for one device.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Device identifier, used as the log prefix.
    pub id: String,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub username: String,

    #[serde(default = "empty_secret", deserialize_with = "secret_string")]
    pub password: SecretString,

    /// Private key file; takes precedence over the password for login.
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,

    /// Flavour name; `None` selects `default`.
    #[serde(default)]
    pub flavour: Option<String>,

    #[serde(default)]
    pub keepalive_command: String,

    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    #[serde(default = "default_quiet_period")]
    pub reconnect_quiet_period_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    #[serde(default)]
    pub host_key_verification: HostKeyVerification,

    #[serde(default)]
    pub known_hosts_path: Option<PathBuf>,
}

fn default_port() -> u16 {
    22
}
fn default_keepalive_interval() -> u64 {
    60
}
fn default_command_timeout() -> u64 {
    30
}
fn default_quiet_period() -> u64 {
    5
}
fn default_connect_timeout() -> u64 {
    30
}
fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}
fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

fn secret_string<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

impl DeviceConfig {
    /// A config with every optional field at its default.
    pub fn new(
        id: impl Into<String>,
        host: impl Into<String>,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port: default_port(),
            username: username.into(),
            password,
            private_key_path: None,
            flavour: None,
            keepalive_command: String::new(),
            keepalive_interval_secs: default_keepalive_interval(),
            command_timeout_secs: default_command_timeout(),
            reconnect_quiet_period_secs: default_quiet_period(),
            connect_timeout_secs: default_connect_timeout(),
            cache_capacity: default_cache_capacity(),
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
        }
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn reconnect_quiet_period(&self) -> Duration {
        Duration::from_secs(self.reconnect_quiet_period_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn keepalive_enabled(&self) -> bool {
        self.keepalive_interval_secs > 0
    }

    /// Check the fields the stack cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::Missing("id").into());
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing("host").into());
        }
        if self.username.is_empty() {
            return Err(ConfigError::Missing("username").into());
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid {
                field: "port",
                message: "must be non-zero".to_string(),
            }
            .into());
        }
        if self.command_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "command_timeout_secs",
                message: "must be at least one second".to_string(),
            }
            .into());
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "connect_timeout_secs",
                message: "must be at least one second".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// SSH settings for one connection attempt.
    pub fn ssh_config(&self) -> SshConfig {
        let mut ssh = SshConfig::new(
            self.host.clone(),
            self.port,
            self.username.clone(),
            self.password.clone(),
        );
        ssh.auth = match &self.private_key_path {
            Some(path) => AuthMethod::PrivateKey {
                path: path.clone(),
                passphrase: self.has_password().then(|| self.password.clone()),
            },
            None if self.has_password() => AuthMethod::Password(self.password.clone()),
            None => AuthMethod::None,
        };
        ssh.connect_timeout = self.connect_timeout();
        ssh.host_key_verification = self.host_key_verification.clone();
        ssh.known_hosts_path = self.known_hosts_path.clone();
        ssh
    }

    fn has_password(&self) -> bool {
        !self.password.expose_secret().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> DeviceConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let config = parse(r#"{"id": "sw1", "host": "10.0.0.2", "username": "admin"}"#);

        assert_eq!(config.port, 22);
        assert!(config.flavour.is_none());
        assert_eq!(config.keepalive_interval(), Duration::from_secs(60));
        assert_eq!(config.command_timeout(), Duration::from_secs(30));
        assert_eq!(config.reconnect_quiet_period(), Duration::from_secs(5));
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.cache_capacity, 64);
        assert_eq!(config.host_key_verification, HostKeyVerification::Disabled);
        assert!(config.keepalive_command.is_empty());
        assert!(config.keepalive_enabled());
        assert!(config.validate().is_ok());
        assert!(matches!(config.ssh_config().auth, AuthMethod::None));
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r#"{
                "id": "edge",
                "host": "edge.lab",
                "port": 2222,
                "username": "ubnt",
                "password": "hunter2",
                "flavour": "ubiquiti",
                "keepalive_command": "show clock",
                "keepalive_interval_secs": 20,
                "host_key_verification": "accept_new"
            }"#,
        );

        assert_eq!(config.flavour.as_deref(), Some("ubiquiti"));
        assert_eq!(config.password.expose_secret(), "hunter2");
        assert!(config.keepalive_enabled());

        let ssh = config.ssh_config();
        assert_eq!(ssh.socket_addr(), "edge.lab:2222");
        assert_eq!(ssh.host_key_verification, HostKeyVerification::AcceptNew);
        match ssh.auth {
            AuthMethod::Password(pw) => assert_eq!(pw.expose_secret(), "hunter2"),
            other => panic!("unexpected auth {other:?}"),
        }
    }

    #[test]
    fn test_zero_interval_disables_keepalive() {
        let config = parse(
            r#"{"id": "sw1", "host": "10.0.0.2", "username": "admin",
                "keepalive_command": "show clock", "keepalive_interval_secs": 0}"#,
        );
        assert!(!config.keepalive_enabled());
        assert_eq!(config.keepalive_interval(), Duration::ZERO);
    }

    #[test]
    fn test_password_not_in_debug_output() {
        let config = parse(
            r#"{"id": "sw1", "host": "h", "username": "u", "password": "hunter2"}"#,
        );
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn test_key_auth_uses_password_as_passphrase() {
        let mut config = DeviceConfig::new("r1", "r1.lab", "admin", SecretString::from("pp".to_string()));
        config.private_key_path = Some(PathBuf::from("/keys/id_ed25519"));

        match config.ssh_config().auth {
            AuthMethod::PrivateKey { path, passphrase } => {
                assert_eq!(path, PathBuf::from("/keys/id_ed25519"));
                assert_eq!(passphrase.unwrap().expose_secret(), "pp");
            }
            other => panic!("unexpected auth {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DeviceConfig::new("r1", "", "admin", SecretString::from("x".to_string()));
        assert!(matches!(
            config.validate(),
            Err(crate::Error::Config(ConfigError::Missing("host")))
        ));

        config.host = "r1.lab".into();
        config.command_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(crate::Error::Config(ConfigError::Invalid {
                field: "command_timeout_secs",
                ..
            }))
        ));
    }

    #[test]
    fn test_missing_required_field_fails_to_parse() {
        assert!(serde_json::from_str::<DeviceConfig>(r#"{"id": "x", "host": "h"}"#).is_err());
    }
}
