//! Device flavours: per-vendor session handshake plus prompt resolution.
//!
//! A flavour is selected by name from configuration and applied once per
//! physical session, before any command runs. Flavours are code-defined
//! and kept in a [`FlavourRegistry`] owned by whoever builds the stacks.

mod initializer;
mod registry;
mod resolver;
pub mod vendors;

pub use initializer::{CommandsInitializer, NoopInitializer, UbiquitiInitializer};
pub use registry::FlavourRegistry;
pub use resolver::{DefaultPromptResolver, PatternPromptResolver};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::Result;
use crate::session::Session;

/// Per-device values an initializer may need.
#[derive(Debug, Clone, Copy)]
pub struct InitContext<'a> {
    /// Device id, for log lines.
    pub id: &'a str,

    /// Device password, for enable-style handshakes.
    pub password: Option<&'a SecretString>,
}

/// One-time session handshake (disable paging, enter enable mode, ...).
#[async_trait]
pub trait CliInitializer: Send + Sync {
    async fn initialize(&self, session: &dyn Session, ctx: InitContext<'_>) -> Result<()>;
}

/// Strategy that determines the shell prompt of a fresh session.
#[async_trait]
pub trait PromptResolver: Send + Sync {
    async fn resolve_prompt(&self, session: &dyn Session) -> Result<String>;
}

/// A named `{initializer, prompt resolver}` pair.
#[derive(Clone)]
pub struct Flavour {
    /// Flavour name as used in configuration (e.g. "default", "ubiquiti").
    pub name: String,

    pub initializer: Arc<dyn CliInitializer>,

    pub resolver: Arc<dyn PromptResolver>,
}

impl Flavour {
    /// A flavour with no handshake and the default prompt resolver.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initializer: Arc::new(NoopInitializer),
            resolver: Arc::new(DefaultPromptResolver::default()),
        }
    }

    pub fn with_initializer(mut self, initializer: Arc<dyn CliInitializer>) -> Self {
        self.initializer = initializer;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn PromptResolver>) -> Self {
        self.resolver = resolver;
        self
    }
}

impl fmt::Debug for Flavour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flavour")
            .field("name", &self.name)
            .field("initializer", &"<CliInitializer>")
            .field("resolver", &"<PromptResolver>")
            .finish()
    }
}
