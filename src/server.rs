// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Manager
//!
//! `Server` owns the single broker connection and the single channel every
//! publisher and subscriber works on. Build one per process, share it behind
//! an `Arc` and drive it from the host's startup and shutdown hooks:
//!
//! ```no_run
//! # async fn run() -> Result<(), kanina::errors::AmqpError> {
//! use kanina::server::Server;
//!
//! let server = Server::lapin();
//! server.start().await?;
//! // publish and subscribe
//! server.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! The lifecycle is `off -> starting -> started -> stopping -> off`. Calling
//! `start` again at any point reopens: a fresh connection and channel replace
//! the current ones, which are then closed. Nothing is retried; supervising a
//! broken connection is up to the host.

use crate::{
    channel::{AmqpChannel, AmqpConnection, Connector},
    config::{BrokerConfig, ConfigSource},
    errors::AmqpError,
    exchange::ExchangeDefinition,
    logging::Logger,
    transport::LapinConnector,
};
use parking_lot::RwLock;
use std::{collections::HashSet, fmt, sync::Arc};
use tracing::{error, info, warn, Level};

/// Lifecycle state of a `Server`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServerStatus {
    #[default]
    Off,
    Starting,
    Started,
    Stopping,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerStatus::Off => write!(f, "off"),
            ServerStatus::Starting => write!(f, "starting"),
            ServerStatus::Started => write!(f, "started"),
            ServerStatus::Stopping => write!(f, "stopping"),
        }
    }
}

#[derive(Default)]
struct ServerState {
    status: ServerStatus,
    config: Option<BrokerConfig>,
    connection: Option<Arc<dyn AmqpConnection>>,
    channel: Option<Arc<dyn AmqpChannel>>,
    // Exact definitions declared on the current connection.
    declared_exchanges: HashSet<ExchangeDefinition>,
}

/// Owns the broker connection and channel.
pub struct Server {
    connector: Arc<dyn Connector>,
    source: ConfigSource,
    logger: Logger,
    state: RwLock<ServerState>,
}

impl Server {
    /// Creates a server that reads its configuration from the default
    /// `ConfigSource`.
    ///
    /// # Parameters
    /// * `connector` - Opens the broker connection on `start`
    ///
    /// # Returns
    /// A server in the `Off` state
    pub fn new(connector: Arc<dyn Connector>) -> Server {
        Server::builder().connector(connector).build()
    }

    /// Creates a server backed by lapin.
    pub fn lapin() -> Server {
        Server::builder().build()
    }

    /// Starts a `ServerBuilder` to set the connector, the configuration or
    /// loud mode.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Current lifecycle state, `Off` before the first `start`.
    pub fn status(&self) -> ServerStatus {
        self.state.read().status
    }

    /// The configuration in use, once loaded or provided.
    pub fn config(&self) -> Option<BrokerConfig> {
        self.state.read().config.clone()
    }

    /// The stdout echo used for lifecycle messages.
    pub fn logger(&self) -> Logger {
        self.logger
    }

    /// The live connection.
    ///
    /// # Returns
    /// The connection, or `AmqpError::ConnectionNotOpen` when the server is off
    pub fn connection(&self) -> Result<Arc<dyn AmqpConnection>, AmqpError> {
        self.state
            .read()
            .connection
            .clone()
            .ok_or(AmqpError::ConnectionNotOpen)
    }

    /// The shared channel.
    ///
    /// # Returns
    /// The channel, or `AmqpError::ChannelNotOpen` when the server is off
    pub fn channel(&self) -> Result<Arc<dyn AmqpChannel>, AmqpError> {
        self.state
            .read()
            .channel
            .clone()
            .ok_or(AmqpError::ChannelNotOpen)
    }

    /// Loads the configuration if none is cached, opens a connection and opens
    /// the channel. Any previous connection is closed once the new one is up.
    ///
    /// A failure leaves the server `Off`: a connection opened by a previous
    /// `start` is closed as well.
    ///
    /// # Returns
    /// `ServerStatus::Started` on success, or the configuration, connection
    /// or channel error
    pub async fn start(&self) -> Result<ServerStatus, AmqpError> {
        self.set_status(ServerStatus::Starting);

        match self.open().await {
            Ok(previous) => {
                if let Some(conn) = previous {
                    self.close_quietly(conn).await;
                }
                Ok(self.set_status(ServerStatus::Started))
            }
            Err(err) => {
                self.say(Level::ERROR, &format!("Failed to start: {}", err));
                if let Some(conn) = self.release() {
                    self.close_quietly(conn).await;
                }
                self.set_status(ServerStatus::Off);
                Err(err)
            }
        }
    }

    /// Closes the connection. Safe to call any number of times.
    ///
    /// # Returns
    /// Always `ServerStatus::Off`; close failures are logged
    pub async fn stop(&self) -> ServerStatus {
        self.set_status(ServerStatus::Stopping);

        if let Some(conn) = self.release() {
            self.close_quietly(conn).await;
        }

        self.set_status(ServerStatus::Off)
    }

    /// Opens a fresh channel on the live connection and makes it the shared
    /// channel.
    ///
    /// # Returns
    /// The new channel, or `AmqpError::ConnectionNotOpen` when the server is off
    pub async fn open_channel(&self) -> Result<Arc<dyn AmqpChannel>, AmqpError> {
        let connection = self.state.read().connection.clone();
        let channel = self.create_channel(connection.as_ref()).await?;

        self.state.write().channel = Some(channel.clone());
        Ok(channel)
    }

    pub(crate) fn is_exchange_declared(&self, def: &ExchangeDefinition) -> bool {
        self.state.read().declared_exchanges.contains(def)
    }

    /// Whether any definition named `name` was declared on this connection.
    pub(crate) fn has_exchange_named(&self, name: &str) -> bool {
        self.state
            .read()
            .declared_exchanges
            .iter()
            .any(|def| def.name == name)
    }

    pub(crate) fn mark_exchange_declared(&self, def: &ExchangeDefinition) {
        self.state.write().declared_exchanges.insert(def.clone());
    }

    async fn open(&self) -> Result<Option<Arc<dyn AmqpConnection>>, AmqpError> {
        let cfg = self.load_config()?;

        let connection = self.connector.connect(&cfg).await?;
        self.say(Level::INFO, &format!("Opened connection to {}", cfg.host));

        let channel = match self.create_channel(Some(&connection)).await {
            Ok(channel) => channel,
            Err(err) => {
                self.close_quietly(connection).await;
                return Err(err);
            }
        };
        self.say(Level::INFO, "Opened channel");

        let mut state = self.state.write();
        state.declared_exchanges.clear();
        state.channel = Some(channel);
        Ok(state.connection.replace(connection))
    }

    // Drops the channel and the registry, hands back the connection to close.
    fn release(&self) -> Option<Arc<dyn AmqpConnection>> {
        let mut state = self.state.write();
        state.channel = None;
        state.declared_exchanges.clear();
        state.connection.take()
    }

    async fn create_channel(
        &self,
        connection: Option<&Arc<dyn AmqpConnection>>,
    ) -> Result<Arc<dyn AmqpChannel>, AmqpError> {
        match connection {
            Some(conn) => conn.create_channel().await,
            None => Err(AmqpError::ConnectionNotOpen),
        }
    }

    fn load_config(&self) -> Result<BrokerConfig, AmqpError> {
        if let Some(cfg) = self.state.read().config.clone() {
            return Ok(cfg);
        }

        match self.source.load()? {
            Some(cfg) => {
                self.say(Level::INFO, "Loaded config.");
                self.state.write().config = Some(cfg.clone());
                Ok(cfg)
            }
            None => {
                self.say(
                    Level::WARN,
                    &format!(
                        "{} not found for {}! Not loading any configuration",
                        self.source.path().display(),
                        self.source.environment()
                    ),
                );
                Ok(BrokerConfig::default())
            }
        }
    }

    async fn close_quietly(&self, conn: Arc<dyn AmqpConnection>) {
        if let Err(err) = conn.close().await {
            self.say(Level::WARN, &format!("Failed to close connection: {}", err));
        }
    }

    fn set_status(&self, status: ServerStatus) -> ServerStatus {
        self.state.write().status = status;
        self.say(Level::INFO, &format!("Status changed to {}", status));
        status
    }

    fn say(&self, level: Level, text: &str) {
        self.logger.echo(text);

        match level {
            Level::ERROR => error!("{}", text),
            Level::WARN => warn!("{}", text),
            _ => info!("{}", text),
        }
    }
}

/// Builder for `Server`.
#[derive(Default)]
pub struct ServerBuilder {
    connector: Option<Arc<dyn Connector>>,
    source: Option<ConfigSource>,
    config: Option<BrokerConfig>,
    loud: bool,
}

impl ServerBuilder {
    /// Replaces the lapin connector, mostly for tests.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Reads the configuration from `source` on the first `start`.
    pub fn config_source(mut self, source: ConfigSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Uses `cfg` instead of loading one.
    pub fn config(mut self, cfg: BrokerConfig) -> Self {
        self.config = Some(cfg);
        self
    }

    /// Echoes lifecycle messages to standard output.
    pub fn loud(mut self) -> Self {
        self.loud = true;
        self
    }

    /// Builds the server.
    ///
    /// # Returns
    /// A server in the `Off` state, backed by lapin unless a connector was set
    pub fn build(self) -> Server {
        Server {
            connector: self
                .connector
                .unwrap_or_else(|| Arc::new(LapinConnector)),
            source: self.source.unwrap_or_default(),
            logger: Logger::new(self.loud),
            state: RwLock::new(ServerState {
                config: self.config,
                ..ServerState::default()
            }),
        }
    }
}
