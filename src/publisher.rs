// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Publisher
//!
//! A message kind is described once by a `MessageDefinition`: the exchange it
//! goes to, its routing key and whether its deliveries are persistent. Each
//! `Message` pairs a definition with a payload and is published with
//! `deliver`.
//!
//! ```no_run
//! # async fn run(server: &kanina::server::Server) -> Result<(), kanina::errors::AmqpError> {
//! use kanina::publisher::MessageDefinition;
//!
//! let user_created = MessageDefinition::new()
//!     .topic("users")
//!     .routing_key("users.created")
//!     .persistent();
//!
//! user_created.message(serde_json::json!({"id": 42})).deliver(server).await?;
//! # Ok(())
//! # }
//! ```
//!
//! A definition that names no exchange publishes through the broker's
//! default exchange, which delivers to the queue named by the routing key.

use crate::{
    channel::OutboundMessage,
    errors::AmqpError,
    exchange::{ExchangeDefinition, ExchangeKind},
    otel,
    server::Server,
    topology::Topology,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, info};
use uuid::Uuid;

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Where and how the messages of one kind are published.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageDefinition {
    exchange: ExchangeDefinition,
    routing_key: String,
    persistent: bool,
}

impl MessageDefinition {
    /// Default exchange, empty routing key, transient deliveries.
    pub fn new() -> MessageDefinition {
        MessageDefinition::default()
    }

    /// Publishes to the given exchange.
    pub fn exchange(mut self, def: ExchangeDefinition) -> Self {
        self.exchange = def;
        self
    }

    /// Publishes to a direct exchange named `name`.
    pub fn direct(self, name: &str) -> Self {
        self.exchange(ExchangeDefinition::new(name).kind(ExchangeKind::Direct))
    }

    /// Publishes to a fanout exchange named `name`.
    pub fn fanout(self, name: &str) -> Self {
        self.exchange(ExchangeDefinition::new(name).kind(ExchangeKind::Fanout))
    }

    /// Publishes to a topic exchange named `name`.
    pub fn topic(self, name: &str) -> Self {
        self.exchange(ExchangeDefinition::new(name).kind(ExchangeKind::Topic))
    }

    /// Declares the exchange as durable.
    pub fn durable(mut self) -> Self {
        self.exchange = self.exchange.durable();
        self
    }

    /// Sets the routing key every message of this kind is published with.
    ///
    /// # Parameters
    /// * `key` - Routing key; for the default exchange, the target queue name
    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }

    /// Marks every delivery of this kind for storage on disk.
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    /// Lets the broker drop deliveries of this kind on restart. The default.
    pub fn transient(mut self) -> Self {
        self.persistent = false;
        self
    }

    /// The exchange messages of this kind are published to.
    pub fn exchange_definition(&self) -> &ExchangeDefinition {
        &self.exchange
    }

    pub fn key(&self) -> &str {
        &self.routing_key
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Wraps a payload into a message of this kind.
    ///
    /// # Parameters
    /// * `payload` - Any serializable value, published as JSON
    ///
    /// # Returns
    /// A `Message` ready to `deliver`
    pub fn message<T: Serialize>(&self, payload: T) -> Message<T> {
        Message::new(self, payload)
    }
}

/// Implemented by application types that are always published the same way.
pub trait MessageKind: Serialize + Sized {
    /// Where and how values of this type are published.
    fn definition() -> MessageDefinition;

    /// Wraps `self` into a message of its kind.
    fn into_message(self) -> Message<Self> {
        Message::new(&Self::definition(), self)
    }
}

/// A payload about to be published.
#[derive(Debug, Clone)]
pub struct Message<T> {
    definition: MessageDefinition,
    payload: T,
}

impl<T: Serialize> Message<T> {
    /// Creates a message.
    ///
    /// # Parameters
    /// * `definition` - The kind of the message, copied into it
    /// * `payload` - The value to publish
    pub fn new(definition: &MessageDefinition, payload: T) -> Message<T> {
        Message {
            definition: definition.clone(),
            payload,
        }
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn definition(&self) -> &MessageDefinition {
        &self.definition
    }

    /// The JSON body that `deliver` publishes.
    ///
    /// # Returns
    /// The encoded bytes or `AmqpError::SerializePayloadError`
    pub fn encode(&self) -> Result<Vec<u8>, AmqpError> {
        serde_json::to_vec(&self.payload).map_err(|err| {
            error!(error = err.to_string(), "error serializing payload");
            AmqpError::SerializePayloadError(err.to_string())
        })
    }

    /// Publishes the message on the server's channel, declaring the exchange
    /// first if this connection has not seen it yet.
    ///
    /// The trace context of the caller is injected in the message headers.
    ///
    /// # Parameters
    /// * `server` - A started server
    ///
    /// # Returns
    /// Ok(()) once published, or `AmqpError::ChannelNotOpen`, a declaration,
    /// serialization or publishing error
    pub async fn deliver(&self, server: &Server) -> Result<(), AmqpError>
    where
        T: Sync,
    {
        let channel = server.channel()?;
        let exchange = &self.definition.exchange;

        Topology::new(server).declare_exchange(exchange).await?;

        let mut headers = BTreeMap::new();
        otel::inject_current(&mut headers);

        let msg = OutboundMessage {
            exchange: exchange.name.clone(),
            routing_key: self.definition.routing_key.clone(),
            body: self.encode()?,
            content_type: JSON_CONTENT_TYPE.to_owned(),
            message_id: Uuid::new_v4().to_string(),
            persistent: self.definition.persistent,
            headers,
        };

        channel.basic_publish(&msg).await?;

        info!(
            exchange = %exchange.name,
            kind = %exchange.kind,
            routing_key = %msg.routing_key,
            persistent = msg.persistent,
            "delivered message"
        );
        Ok(())
    }
}
