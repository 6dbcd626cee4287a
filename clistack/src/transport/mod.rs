//! SSH transport layer wrapping russh.
//!
//! Connection setup, authentication, host key checks and the shell pump
//! that feeds a [`SessionChannel`](crate::session::SessionChannel).

pub mod config;
mod ssh;

pub use config::{AuthMethod, HostKeyVerification, SshConfig};
pub use ssh::{SshSession, SshTransport};
