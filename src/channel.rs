// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Transport Seam
//!
//! The connection manager, publisher and subscriber never talk to lapin
//! directly. They go through the three traits of this module, which the
//! `transport` module implements on top of lapin and which tests replace with
//! mockall mocks.
//!
//! - `Connector`: opens a connection from a `BrokerConfig`
//! - `AmqpConnection`: owns the socket, opens channels, probes exchanges
//! - `AmqpChannel`: declare, bind, publish and consume

use crate::{
    config::BrokerConfig,
    dispatcher::SubscriptionHandler,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::{collections::BTreeMap, sync::Arc};

/// Delivery mode flag for messages the broker may drop on restart.
pub const DELIVERY_MODE_TRANSIENT: u8 = 1;
/// Delivery mode flag for messages the broker writes to disk.
pub const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// A message ready to be handed to `basic.publish`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub message_id: String,
    pub persistent: bool,
    pub headers: BTreeMap<String, String>,
}

impl OutboundMessage {
    pub fn delivery_mode(&self) -> u8 {
        if self.persistent {
            DELIVERY_MODE_PERSISTENT
        } else {
            DELIVERY_MODE_TRANSIENT
        }
    }
}

/// A message pushed by the broker to one of our consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundDelivery {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    /// String-valued headers; other header types are dropped.
    pub headers: BTreeMap<String, String>,
}

impl InboundDelivery {
    pub fn new(body: &[u8]) -> InboundDelivery {
        InboundDelivery {
            body: body.to_vec(),
            ..InboundDelivery::default()
        }
    }
}

/// Opens broker connections.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, cfg: &BrokerConfig) -> Result<Arc<dyn AmqpConnection>, AmqpError>;
}

/// A live connection to the broker.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AmqpConnection: Send + Sync {
    async fn create_channel(&self) -> Result<Arc<dyn AmqpChannel>, AmqpError>;

    /// Checks whether an exchange exists without disturbing the shared channel.
    async fn exchange_exists(&self, name: &str) -> Result<bool, AmqpError>;

    /// Closes the connection. Closing an already closed connection is a no-op.
    async fn close(&self) -> Result<(), AmqpError>;

    fn is_open(&self) -> bool;
}

/// The channel every declaration, publish and consume runs on.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AmqpChannel: Send + Sync {
    async fn exchange_declare(&self, def: &ExchangeDefinition) -> Result<(), AmqpError>;

    /// Declares the queue and returns its name, which the broker picks for an
    /// anonymous queue.
    async fn queue_declare(&self, def: &QueueDefinition) -> Result<String, AmqpError>;

    async fn queue_bind(&self, binding: &QueueBinding) -> Result<(), AmqpError>;

    async fn basic_publish(&self, msg: &OutboundMessage) -> Result<(), AmqpError>;

    /// Registers an auto-ack consumer on the queue. Each delivery is handed to
    /// `handler` until the channel closes.
    async fn basic_consume(
        &self,
        queue: &str,
        handler: Arc<dyn SubscriptionHandler>,
    ) -> Result<(), AmqpError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_persistence_to_delivery_mode() {
        let mut msg = OutboundMessage {
            exchange: String::new(),
            routing_key: "q1".to_owned(),
            body: b"\"test\"".to_vec(),
            content_type: "application/json".to_owned(),
            message_id: "id".to_owned(),
            persistent: false,
            headers: BTreeMap::new(),
        };
        assert_eq!(msg.delivery_mode(), DELIVERY_MODE_TRANSIENT);

        msg.persistent = true;
        assert_eq!(msg.delivery_mode(), DELIVERY_MODE_PERSISTENT);
    }
}
