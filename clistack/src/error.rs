//! Error types for clistack.
//!
//! Errors are grouped by the layer that raises them, and every error maps
//! onto one of three caller-facing kinds (see [`ErrorKind`]).

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for clistack operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Session channel errors (framing, prompt resolution)
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Command execution errors raised by the layers
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Flavour lookup/definition errors
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Invalid device or stack configuration
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Caller-facing classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No usable session; the current stack is dead.
    Disconnected,

    /// The command failed remotely or while writing/reading it.
    CommandExecutionFailed,

    /// The timeout layer's deadline fired before the command completed.
    CommandTimedOut,
}

impl ErrorKind {
    /// A timed out command is also an execution failure.
    pub fn is_execution_failure(self) -> bool {
        matches!(
            self,
            ErrorKind::CommandExecutionFailed | ErrorKind::CommandTimedOut
        )
    }
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_) => ErrorKind::Disconnected,
            Error::Channel(ChannelError::Closed) => ErrorKind::Disconnected,
            Error::Command(CommandError::Disconnected) => ErrorKind::Disconnected,
            Error::Command(CommandError::TimedOut { .. }) => ErrorKind::CommandTimedOut,
            _ => ErrorKind::CommandExecutionFailed,
        }
    }

    /// Shorthand for `kind() == ErrorKind::Disconnected`.
    pub fn is_disconnected(&self) -> bool {
        self.kind() == ErrorKind::Disconnected
    }

    /// Shorthand for `kind() == ErrorKind::CommandTimedOut`.
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::CommandTimedOut
    }

    pub(crate) fn disconnected() -> Self {
        CommandError::Disconnected.into()
    }
}

/// Transport layer errors (SSH connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host is not present in known_hosts and verification is strict
    #[error("Host key for {host}:{port} is unknown")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key does not match the known_hosts entry
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// Connecting timed out
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Session channel errors.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Failed to open the PTY or shell
    #[error("Failed to open shell: {0}")]
    ShellOpenFailed(String),

    /// Channel closed, either by us or by the device
    #[error("Channel closed")]
    Closed,

    /// The prompt never stabilised
    #[error("Prompt not resolved after {attempts} attempts")]
    PromptNotResolved { attempts: u32 },

    /// Flavour initialisation handshake failed
    #[error("Initialisation failed: {0}")]
    InitializationFailed(String),
}

/// Errors produced by the command layers themselves.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Layer has been destroyed or has no stack to run on
    #[error("Not connected")]
    Disconnected,

    /// Generic execution failure
    #[error("Command '{command}' failed: {message}")]
    ExecutionFailed { command: String, message: String },

    /// Deadline of the timeout layer elapsed
    #[error("Command '{command}' timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },
}

/// Flavour errors.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Flavour name not present in the registry
    #[error("Unknown flavour: '{name}'")]
    UnknownFlavour { name: String },

    /// Flavour registered twice
    #[error("Flavour '{name}' already registered")]
    AlreadyRegistered { name: String },

    /// Invalid flavour definition
    #[error("Invalid flavour definition: {message}")]
    InvalidDefinition { message: String },
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required field is missing or empty
    #[error("Missing required field '{0}'")]
    Missing(&'static str),

    /// A field has an unusable value
    #[error("Invalid value for '{field}': {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Result type alias using clistack's Error.
pub type Result<T> = std::result::Result<T, Error>;
