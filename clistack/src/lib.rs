//! # clistack
//!
//! Async command execution for network devices that only offer an
//! interactive SSH shell.
//!
//! A device shell is a byte stream with no message boundaries. clistack
//! frames commands between their echo and the next prompt, and wraps that
//! in composable layers that each add one guarantee:
//!
//! - **Prompt-aware**: per-vendor handshake, prompt discovery, framing
//! - **Read cache**: bounded LRU memoisation of read output
//! - **Queue**: many callers, one command in flight, strict FIFO
//! - **Timeout**: per-command deadline seen by the caller
//! - **Keepalive**: periodic command on an idle session
//! - **Reconnecting**: rebuild the whole stack after any failure
//! - **Logging**: one log line per command
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clistack::{Cli, CliBuilder, DeviceConfig, ReadCommand};
//! use secrecy::SecretString;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), clistack::Error> {
//!     let mut config = DeviceConfig::new(
//!         "edge1",
//!         "192.168.1.1",
//!         "ubnt",
//!         SecretString::from("ubnt".to_string()),
//!     );
//!     config.flavour = Some("ubiquiti".into());
//!
//!     let stack = CliBuilder::new(config).build()?;
//!     let output = stack
//!         .cli
//!         .execute_read(ReadCommand::create("show version"))
//!         .await?;
//!     println!("{output}");
//!
//!     stack.cli.destroy().await?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod flavour;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use builder::{CliBuilder, CliStack, SessionConnector};
pub use cli::{Cli, ReadCache, execute_multiline};
pub use command::{Command, ReadCommand, WriteCommand};
pub use config::DeviceConfig;
pub use error::{Error, ErrorKind, Result};
pub use flavour::{Flavour, FlavourRegistry};
pub use session::Session;
pub use transport::{AuthMethod, HostKeyVerification, SshConfig};
