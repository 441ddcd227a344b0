// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Subscriptions
//!
//! A subscription declares (or attaches to) a queue, optionally binds it to an
//! exchange and runs a handler for every message the queue receives:
//!
//! ```no_run
//! # async fn run(server: &kanina::server::Server) -> Result<(), kanina::errors::AmqpError> {
//! use kanina::subscription::{SubscribeOptions, Subscription};
//!
//! Subscription::subscribe_fn(
//!     server,
//!     SubscribeOptions::default().bind("users").routing_key("users.#"),
//!     |payload| println!("{}", payload.text()),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! Binding to an exchange that does not exist yet creates it as a direct
//! exchange. Topic or fanout exchanges must be declared beforehand, for
//! instance by delivering a message of a kind that publishes to them.
//!
//! Consumers run in automatic acknowledgement mode and handlers receive the
//! decoded payload only.

use crate::{
    consumer::Payload,
    dispatcher::{FnHandler, SubscriptionHandler},
    errors::AmqpError,
    queue::{QueueBinding, QueueDefinition, DEFAULT_BINDING_KEY},
    server::Server,
    topology::Topology,
};
use std::sync::Arc;
use tracing::info;

/// What a subscription consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    queue: String,
    bind: Option<String>,
    durable: bool,
    routing_key: String,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        SubscribeOptions {
            queue: String::new(),
            bind: None,
            durable: false,
            routing_key: DEFAULT_BINDING_KEY.to_owned(),
        }
    }
}

impl SubscribeOptions {
    /// Consumes from the named queue. Leave unset for a broker-named queue.
    pub fn queue(mut self, name: &str) -> Self {
        self.queue = name.to_owned();
        self
    }

    /// Binds the queue to the named exchange.
    pub fn bind(mut self, exchange: &str) -> Self {
        self.bind = Some(exchange.to_owned());
        self
    }

    /// Makes the queue, and an exchange created for the binding, durable.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Binding pattern, `#` unless set.
    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }
}

/// A queue this process consumes from, or is about to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    queue: String,
}

impl Subscription {
    /// Declares the queue, binds it when the options name an exchange and
    /// starts consuming with `handler`.
    ///
    /// # Parameters
    /// * `server` - A started server
    /// * `options` - Queue, binding and durability
    /// * `handler` - Invoked once for every message of the queue
    ///
    /// # Returns
    /// The subscription, holding the queue name the broker resolved
    pub async fn subscribe(
        server: &Server,
        options: SubscribeOptions,
        handler: Arc<dyn SubscriptionHandler>,
    ) -> Result<Subscription, AmqpError> {
        let subscription =
            Subscription::create_queue(server, &options.queue, options.durable).await?;

        if let Some(exchange) = &options.bind {
            subscription
                .create_binding(server, exchange, options.durable, &options.routing_key)
                .await?;
        }

        subscription.consume(server, handler).await?;
        Ok(subscription)
    }

    /// `subscribe` with a closure as the handler.
    pub async fn subscribe_fn<F>(
        server: &Server,
        options: SubscribeOptions,
        f: F,
    ) -> Result<Subscription, AmqpError>
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        Subscription::subscribe(server, options, FnHandler::new(f)).await
    }

    /// Creates the queue or attaches to an existing one. An empty name gets a
    /// broker-generated queue.
    ///
    /// # Parameters
    /// * `server` - A started server
    /// * `name` - Queue name, or `""`
    /// * `durable` - Whether the queue survives broker restarts
    ///
    /// # Returns
    /// A subscription that does not consume yet
    pub async fn create_queue(
        server: &Server,
        name: &str,
        durable: bool,
    ) -> Result<Subscription, AmqpError> {
        let def = QueueDefinition::new(name).with_durable(durable);
        let queue = Topology::new(server).declare_queue(&def).await?;

        Ok(Subscription { queue })
    }

    /// Ensures the exchange exists and binds this queue to it. Does nothing
    /// for an empty exchange name.
    ///
    /// # Parameters
    /// * `server` - A started server
    /// * `exchange` - Exchange to bind to, created as direct when missing
    /// * `durable` - Durability of a created exchange
    /// * `routing_key` - Binding pattern
    pub async fn create_binding(
        &self,
        server: &Server,
        exchange: &str,
        durable: bool,
        routing_key: &str,
    ) -> Result<(), AmqpError> {
        if exchange.is_empty() {
            return Ok(());
        }

        let topology = Topology::new(server);
        topology.ensure_exchange(exchange, durable).await?;
        topology
            .bind_queue(
                &QueueBinding::new(&self.queue)
                    .exchange(exchange)
                    .routing_key(routing_key),
            )
            .await
    }

    /// Starts handing every message of this queue to `handler`.
    pub async fn consume(
        &self,
        server: &Server,
        handler: Arc<dyn SubscriptionHandler>,
    ) -> Result<(), AmqpError> {
        server.channel()?.basic_consume(&self.queue, handler).await?;
        info!(queue = %self.queue, "subscribed");
        Ok(())
    }

    /// Name of the queue, as assigned by the broker for anonymous queues.
    pub fn queue_name(&self) -> &str {
        &self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::{MockAmqpChannel, MockAmqpConnection, MockConnector},
        exchange::ExchangeKind,
        server::test_support::started,
    };
    use parking_lot::Mutex;
    use serde_json::json;

    type HandlerSlot = Arc<Mutex<Option<Arc<dyn SubscriptionHandler>>>>;

    fn capture_handler(channel: &mut MockAmqpChannel, queue: &'static str) -> HandlerSlot {
        let slot: HandlerSlot = Arc::new(Mutex::new(None));
        let sink = slot.clone();
        channel
            .expect_basic_consume()
            .withf(move |name, _| name.to_string() == queue)
            .times(1)
            .returning(move |_, handler| {
                *sink.lock() = Some(handler);
                Ok(())
            });
        slot
    }

    #[test]
    fn should_default_to_an_anonymous_unbound_queue() {
        let options = SubscribeOptions::default();
        assert_eq!(options.queue, "");
        assert_eq!(options.bind, None);
        assert!(!options.durable);
        assert_eq!(options.routing_key, "#");
    }

    #[tokio::test]
    async fn should_watch_a_named_queue() {
        let mut channel = MockAmqpChannel::new();
        channel
            .expect_queue_declare()
            .withf(|def| def.name() == "subscription.watch" && !def.is_durable())
            .times(1)
            .returning(|def| Ok(def.name().to_owned()));
        channel.expect_queue_bind().times(0);
        let slot = capture_handler(&mut channel, "subscription.watch");

        let server = started(channel, MockAmqpConnection::new()).await;
        let received = Arc::new(Mutex::new(None));
        let sink = received.clone();
        let subscription = Subscription::subscribe_fn(
            &server,
            SubscribeOptions::default().queue("subscription.watch"),
            move |payload| *sink.lock() = payload.get("string").cloned(),
        )
        .await
        .expect("subscribe");
        assert_eq!(subscription.queue_name(), "subscription.watch");

        let handler = slot.lock().take().expect("consumer registered");
        handler.exec(Payload::Json(json!({"string": "success"}))).await;
        assert_eq!(*received.lock(), Some(json!("success")));
    }

    #[tokio::test]
    async fn should_bind_a_broker_named_queue_to_a_new_direct_exchange() {
        let mut channel = MockAmqpChannel::new();
        let mut seq = mockall::Sequence::new();
        channel
            .expect_queue_declare()
            .withf(|def| def.is_anonymous())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("amq.gen-1".to_owned()));
        channel
            .expect_exchange_declare()
            .withf(|def| def.name() == "ex1" && def.exchange_kind() == ExchangeKind::Direct)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        channel
            .expect_queue_bind()
            .withf(|binding| {
                binding.queue_name() == "amq.gen-1"
                    && binding.exchange_name() == "ex1"
                    && binding.key() == "#"
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let slot = capture_handler(&mut channel, "amq.gen-1");

        let mut conn = MockAmqpConnection::new();
        conn.expect_exchange_exists()
            .times(1)
            .returning(|_| Ok(false));

        let server = started(channel, conn).await;
        let subscription = Subscription::subscribe(
            &server,
            SubscribeOptions::default().bind("ex1"),
            Arc::new(crate::dispatcher::MockSubscriptionHandler::new()),
        )
        .await
        .expect("subscribe");

        assert_eq!(subscription.queue_name(), "amq.gen-1");
        assert!(slot.lock().is_some());
    }

    #[tokio::test]
    async fn should_bind_with_a_custom_pattern_to_an_existing_exchange() {
        let mut channel = MockAmqpChannel::new();
        channel
            .expect_queue_declare()
            .withf(|def| def.name() == "audit" && def.is_durable())
            .returning(|def| Ok(def.name().to_owned()));
        channel.expect_exchange_declare().times(0);
        channel
            .expect_queue_bind()
            .withf(|binding| binding.exchange_name() == "events" && binding.key() == "a.b.#")
            .times(1)
            .returning(|_| Ok(()));
        let _slot = capture_handler(&mut channel, "audit");

        let mut conn = MockAmqpConnection::new();
        conn.expect_exchange_exists().returning(|_| Ok(true));

        let server = started(channel, conn).await;
        Subscription::subscribe_fn(
            &server,
            SubscribeOptions::default()
                .queue("audit")
                .bind("events")
                .durable()
                .routing_key("a.b.#"),
            |_| {},
        )
        .await
        .expect("subscribe");
    }

    #[tokio::test]
    async fn should_create_a_durable_queue_without_consuming() {
        let mut channel = MockAmqpChannel::new();
        channel
            .expect_queue_declare()
            .withf(|def| def.name() == "durable_queue" && def.is_durable())
            .times(1)
            .returning(|def| Ok(def.name().to_owned()));
        channel.expect_basic_consume().times(0);

        let server = started(channel, MockAmqpConnection::new()).await;
        let subscription = Subscription::create_queue(&server, "durable_queue", true)
            .await
            .expect("create queue");
        assert_eq!(subscription.queue_name(), "durable_queue");
    }

    #[tokio::test]
    async fn should_skip_bindings_without_an_exchange() {
        let mut channel = MockAmqpChannel::new();
        channel.expect_queue_bind().times(0);
        let mut conn = MockAmqpConnection::new();
        conn.expect_exchange_exists().times(0);

        let server = started(channel, conn).await;
        Subscription {
            queue: "q".to_owned(),
        }
        .create_binding(&server, "", false, "#")
        .await
        .expect("no-op binding");
    }

    #[tokio::test]
    async fn should_surface_consumer_failures() {
        let mut channel = MockAmqpChannel::new();
        channel
            .expect_queue_declare()
            .returning(|def| Ok(def.name().to_owned()));
        channel
            .expect_basic_consume()
            .returning(|queue, _| Err(AmqpError::BindingConsumerError(queue.to_owned())));

        let server = started(channel, MockAmqpConnection::new()).await;
        let result =
            Subscription::subscribe_fn(&server, SubscribeOptions::default().queue("q"), |_| {})
                .await;
        assert_eq!(result, Err(AmqpError::BindingConsumerError("q".to_owned())));
    }

    #[tokio::test]
    async fn should_refuse_to_subscribe_before_start() {
        let server = Server::new(Arc::new(MockConnector::new()));
        let result = Subscription::subscribe_fn(&server, SubscribeOptions::default(), |_| {}).await;
        assert_eq!(result, Err(AmqpError::ChannelNotOpen));
    }
}
