//! SSH transport implementation using russh.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, warn};
use russh::client::{self, Handle};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, load_secret_key};
use secrecy::ExposeSecret;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use super::config::{AuthMethod, HostKeyVerification, SshConfig};
use crate::error::{ChannelError, Result, TransportError};
use crate::session::{Session, SessionChannel};

const READ_CHUNK_SIZE: usize = 8192;

/// An authenticated SSH connection to one device.
pub struct SshTransport {
    session: Handle<SshHandler>,
    config: SshConfig,
}

impl SshTransport {
    /// Connect to the SSH server and authenticate.
    pub async fn connect(config: SshConfig) -> Result<Self> {
        debug!("connecting to {}", config.socket_addr());
        let ssh_config = Arc::new(client::Config::default());

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));
        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            host_key_verification: config.host_key_verification.clone(),
            known_hosts_path: config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        let mut session = tokio::time::timeout(
            config.connect_timeout,
            client::connect(ssh_config, (config.host.as_str(), config.port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.connect_timeout))?
        .map_err(|e| {
            // Prefer the detailed host-key error over russh's generic one.
            let stored = match host_key_error.lock() {
                Ok(mut slot) => slot.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            stored.unwrap_or(TransportError::Ssh(e))
        })?;

        Self::authenticate(&mut session, &config).await?;
        info!("connected to {} as {}", config.socket_addr(), config.username);

        Ok(Self { session, config })
    }

    /// Open a PTY shell and wire it to a [`SessionChannel`].
    ///
    /// A pump task reads the shell and feeds a bounded chunk queue; it is
    /// the only producer for the returned session.
    pub async fn open_shell(self, id: impl Into<String>) -> Result<SshSession> {
        let id = id.into();
        let channel = self
            .session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_pty(
                true,
                "xterm",
                self.config.terminal_width,
                self.config.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(|e| ChannelError::ShellOpenFailed(e.to_string()))?;

        channel
            .request_shell(true)
            .await
            .map_err(|e| ChannelError::ShellOpenFailed(e.to_string()))?;

        let (mut reader, writer) = tokio::io::split(channel.into_stream());
        let (tx, rx) = mpsc::channel::<Bytes>(self.config.read_queue_capacity);

        let pump_id = id.clone();
        let pump = tokio::spawn(async move {
            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => {
                        debug!("[{}] shell reached EOF", pump_id);
                        break;
                    }
                    Ok(n) => {
                        if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("[{}] shell read failed: {}", pump_id, e);
                        break;
                    }
                }
            }
        });

        let channel = SessionChannel::new(id.clone(), writer, rx).with_pump(pump);
        Ok(SshSession {
            id,
            channel,
            transport: tokio::sync::Mutex::new(Some(self)),
        })
    }

    async fn authenticate(session: &mut Handle<SshHandler>, config: &SshConfig) -> Result<()> {
        let success = match &config.auth {
            AuthMethod::None => session
                .authenticate_none(&config.username)
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::Password(password) => session
                .authenticate_password(&config.username, password.expose_secret())
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::PrivateKey { path, passphrase } => {
                let key = load_secret_key(
                    path,
                    passphrase.as_ref().map(|p| p.expose_secret()),
                )
                .map_err(|e| TransportError::Key(e.to_string()))?;

                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .map_err(TransportError::Ssh)?
                    .flatten();

                session
                    .authenticate_publickey(
                        &config.username,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await
                    .map_err(TransportError::Ssh)?
                    .success()
            }
        };

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            }
            .into());
        }

        Ok(())
    }

    /// Disconnect the SSH connection.
    pub async fn close(self) -> Result<()> {
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

/// A shell session on an SSH connection.
///
/// Closing stops the pump, waits for readers to observe the closure and
/// only then disconnects the SSH connection.
pub struct SshSession {
    id: String,
    channel: SessionChannel,
    transport: tokio::sync::Mutex<Option<SshTransport>>,
}

impl SshSession {
    /// Connect, authenticate and open a shell in one step.
    pub async fn open(id: impl Into<String>, config: SshConfig) -> Result<Self> {
        SshTransport::connect(config).await?.open_shell(id).await
    }
}

#[async_trait]
impl Session for SshSession {
    async fn write(&self, text: &str) -> Result<()> {
        self.channel.write(text).await
    }

    async fn read(&self, timeout: Duration) -> Result<String> {
        self.channel.read(timeout).await
    }

    async fn read_until_output(&self, marker: &str) -> Result<String> {
        self.channel.read_until_output(marker).await
    }

    async fn clear_buffer(&self) -> Result<()> {
        self.channel.clear_buffer().await
    }

    async fn close(&self) -> Result<()> {
        self.channel.close().await?;
        if let Some(transport) = self.transport.lock().await.take() {
            if let Err(e) = transport.close().await {
                debug!("[{}] disconnect failed: {}", self.id, e);
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.channel.is_open()
    }
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    /// `Ok(true)` if the key matches, `Ok(false)` if the host is unknown.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> std::result::Result<bool, TransportError> {
        let result = match &self.known_hosts_path {
            Some(path) => russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path),
            None => russh::keys::check_known_hosts(&self.host, self.port, pubkey),
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    fn learn_host_key(&self, pubkey: &PublicKey) -> std::result::Result<(), TransportError> {
        let result = match &self.known_hosts_path {
            Some(path) => {
                russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
            }
            None => russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey),
        };
        result.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }

    fn reject(&self, error: TransportError) -> bool {
        match self.host_key_error.lock() {
            Ok(mut slot) => *slot = Some(error),
            Err(poisoned) => *poisoned.into_inner() = Some(error),
        }
        false
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let verdict = match self.host_key_verification {
            HostKeyVerification::Disabled => true,
            HostKeyVerification::AcceptNew => match self.check_known_hosts(server_public_key) {
                Ok(true) => true,
                Ok(false) => {
                    if let Err(e) = self.learn_host_key(server_public_key) {
                        warn!("failed to save host key for {}: {}", self.host, e);
                    }
                    true
                }
                Err(e) => self.reject(e),
            },
            HostKeyVerification::Strict => match self.check_known_hosts(server_public_key) {
                Ok(true) => true,
                Ok(false) => self.reject(TransportError::HostKeyUnknown {
                    host: self.host.clone(),
                    port: self.port,
                }),
                Err(e) => self.reject(e),
            },
        };
        Ok(verdict)
    }
}
