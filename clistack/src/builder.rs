//! Assembly of the default stack for one device.

use std::sync::Arc;

use futures_core::future::BoxFuture;
use log::{debug, warn};
use secrecy::ExposeSecret;

use crate::cli::{
    Cli, CliFactory, KeepaliveCli, LoggingCli, PromptAwareCli, QueuedCli, ReadCache,
    ReadCachingCli, ReconnectingCli, TimeoutTrackingCli,
};
use crate::config::DeviceConfig;
use crate::error::Result;
use crate::flavour::{Flavour, FlavourRegistry, InitContext};
use crate::session::Session;
use crate::transport::SshSession;

/// Opens one physical session for a device.
pub type SessionConnector =
    Arc<dyn Fn(Arc<DeviceConfig>) -> BoxFuture<'static, Result<Arc<dyn Session>>> + Send + Sync>;

/// A built stack plus a handle to its read cache.
///
/// The cache outlives reconnects; clear it when device state may have
/// changed underneath cached reads.
pub struct CliStack {
    pub cli: Arc<dyn Cli>,
    pub cache: ReadCache,
}

/// Builder for the per-device command stack.
///
/// # Example
///
/// ```rust,no_run
/// use clistack::{Cli, CliBuilder, DeviceConfig, ReadCommand};
/// use secrecy::SecretString;
///
/// # async fn example() -> Result<(), clistack::Error> {
/// let config = DeviceConfig::new("edge1", "192.168.1.1", "ubnt", SecretString::from("ubnt".to_string()));
/// let stack = CliBuilder::new(config).build()?;
///
/// let output = stack.cli.execute_read(ReadCommand::create("show version")).await?;
/// println!("{output}");
/// stack.cli.destroy().await?;
/// # Ok(())
/// # }
/// ```
pub struct CliBuilder {
    config: DeviceConfig,
    flavours: Option<FlavourRegistry>,
    cache: Option<ReadCache>,
}

impl CliBuilder {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            flavours: None,
            cache: None,
        }
    }

    /// Look flavours up in `registry` instead of the built-in set.
    pub fn flavours(mut self, registry: FlavourRegistry) -> Self {
        self.flavours = Some(registry);
        self
    }

    /// Use a shared cache instead of a private one sized from the config.
    pub fn cache(mut self, cache: ReadCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the stack over SSH.
    ///
    /// Connecting starts in the background immediately, so this must be
    /// called inside a Tokio runtime. Commands issued before the session is
    /// up wait for it.
    pub fn build(self) -> Result<CliStack> {
        self.build_with_connector(ssh_connector())
    }

    /// Build the stack over sessions produced by `connector`.
    pub fn build_with_connector(self, connector: SessionConnector) -> Result<CliStack> {
        self.config.validate()?;

        let registry = match self.flavours {
            Some(registry) => registry,
            None => FlavourRegistry::with_builtins()?,
        };
        let flavour = registry.resolve(self.config.flavour.as_deref())?;
        let cache = self
            .cache
            .unwrap_or_else(|| ReadCache::new(self.config.cache_capacity));

        let config = Arc::new(self.config);
        debug!(
            "[{}] building stack for {}:{} as '{}'",
            config.id, config.host, config.port, flavour.name
        );

        let factory: CliFactory = {
            let config = config.clone();
            let cache = cache.clone();
            Arc::new(move || -> BoxFuture<'static, Result<Arc<dyn Cli>>> {
                Box::pin(build_lower(
                    config.clone(),
                    flavour.clone(),
                    cache.clone(),
                    connector.clone(),
                ))
            })
        };

        let reconnecting = Arc::new(ReconnectingCli::new(
            config.id.clone(),
            factory,
            config.reconnect_quiet_period(),
        ));
        let cli = Arc::new(LoggingCli::new(config.id.clone(), reconnecting));

        Ok(CliStack { cli, cache })
    }
}

fn ssh_connector() -> SessionConnector {
    Arc::new(
        |config: Arc<DeviceConfig>| -> BoxFuture<'static, Result<Arc<dyn Session>>> {
            Box::pin(async move {
                let session = SshSession::open(config.id.clone(), config.ssh_config()).await?;
                Ok(Arc::new(session) as Arc<dyn Session>)
            })
        },
    )
}

/// One connection attempt: session, handshake, then the layers that live
/// and die with it.
async fn build_lower(
    config: Arc<DeviceConfig>,
    flavour: Flavour,
    cache: ReadCache,
    connector: SessionConnector,
) -> Result<Arc<dyn Cli>> {
    let id = config.id.as_str();
    let session = connector(config.clone()).await?;

    let password = &config.password;
    let ctx = InitContext {
        id,
        password: (!password.expose_secret().is_empty()).then_some(password),
    };
    let prompt_aware = match PromptAwareCli::connect(id, session.clone(), &flavour, ctx).await {
        Ok(cli) => cli,
        Err(e) => {
            if let Err(close_err) = session.close().await {
                warn!("[{}] closing session after failed setup: {}", id, close_err);
            }
            return Err(e);
        }
    };

    let cached = Arc::new(ReadCachingCli::new(id, Arc::new(prompt_aware), cache));
    let queued = Arc::new(QueuedCli::new(id, cached));
    let timed = Arc::new(TimeoutTrackingCli::new(id, queued, config.command_timeout()));
    let keepalive = KeepaliveCli::new(
        id,
        timed,
        config.keepalive_command.clone(),
        config.keepalive_interval(),
    );
    Ok(Arc::new(keepalive))
}
