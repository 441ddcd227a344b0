// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # lapin Transport
//!
//! Implements the transport seam of the `channel` module on top of lapin.
//! Every lapin error is logged here and converted into the matching
//! `AmqpError` variant.

use crate::{
    channel::{AmqpChannel, AmqpConnection, Connector, InboundDelivery, OutboundMessage},
    config::BrokerConfig,
    dispatcher::{spawn_consumer, SubscriptionHandler},
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    message::Delivery,
    options::{
        BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable, LongString, ShortString},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, error};
use uuid::Uuid;

const REPLY_SUCCESS: u16 = 200;

/// Opens connections with lapin.
#[derive(Debug, Clone, Copy, Default)]
pub struct LapinConnector;

#[async_trait]
impl Connector for LapinConnector {
    async fn connect(&self, cfg: &BrokerConfig) -> Result<Arc<dyn AmqpConnection>, AmqpError> {
        debug!("creating amqp connection...");
        let mut options = ConnectionProperties::default();
        if let Some(name) = &cfg.connection_name {
            options = options.with_connection_name(LongString::from(name.clone()));
        }

        let conn = match Connection::connect(&cfg.uri(), options).await {
            Ok(c) => Ok(c),
            Err(err) => {
                error!(error = err.to_string(), host = %cfg.host, "failure to connect");
                Err(AmqpError::ConnectionError(err.to_string()))
            }
        }?;
        debug!("amqp connected");

        Ok(Arc::new(LapinConnection { conn }))
    }
}

/// A lapin connection.
pub struct LapinConnection {
    conn: Connection,
}

impl LapinConnection {
    async fn open_channel(&self) -> Result<Channel, AmqpError> {
        match self.conn.create_channel().await {
            Ok(c) => Ok(c),
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                Err(AmqpError::ChannelError(err.to_string()))
            }
        }
    }
}

#[async_trait]
impl AmqpConnection for LapinConnection {
    async fn create_channel(&self) -> Result<Arc<dyn AmqpChannel>, AmqpError> {
        debug!("creating amqp channel...");
        let channel = self.open_channel().await?;
        debug!(id = channel.id(), "channel created");

        Ok(Arc::new(LapinChannel { channel }))
    }

    async fn exchange_exists(&self, name: &str) -> Result<bool, AmqpError> {
        // A failed passive declare closes the channel it ran on.
        let probe = self.open_channel().await?;

        let exists = probe
            .exchange_declare(
                name,
                lapin::ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    passive: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .is_ok();

        if exists {
            if let Err(err) = probe.close(REPLY_SUCCESS, "OK").await {
                debug!(error = err.to_string(), "failure to close probe channel");
            }
        }

        debug!(name, exists, "probed exchange");
        Ok(exists)
    }

    async fn close(&self) -> Result<(), AmqpError> {
        if !self.is_open() {
            return Ok(());
        }

        match self.conn.close(REPLY_SUCCESS, "OK").await {
            Err(err) => {
                error!(error = err.to_string(), "failure to close connection");
                Err(AmqpError::ConnectionError(err.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn is_open(&self) -> bool {
        self.conn.status().connected()
    }
}

/// A lapin channel.
pub struct LapinChannel {
    channel: Channel,
}

#[async_trait]
impl AmqpChannel for LapinChannel {
    async fn exchange_declare(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        debug!("creating exchange: {}", def.name);

        match self
            .channel
            .exchange_declare(
                &def.name,
                def.kind.into(),
                ExchangeDeclareOptions {
                    durable: def.durable,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = %def.name,
                    "error to declare the exchange"
                );
                Err(AmqpError::DeclareExchangeError(def.name.clone()))
            }
            _ => {
                debug!("exchange: {} was created", def.name);
                Ok(())
            }
        }
    }

    async fn queue_declare(&self, def: &QueueDefinition) -> Result<String, AmqpError> {
        debug!("creating queue: {}", def.name);

        match self
            .channel
            .queue_declare(
                &def.name,
                QueueDeclareOptions {
                    durable: def.durable,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), name = %def.name, "error to declare the queue");
                Err(AmqpError::DeclareQueueError(def.name.clone()))
            }
            Ok(queue) => {
                let name = queue.name().as_str().to_owned();
                debug!("queue: {} was created", name);
                Ok(name)
            }
        }
    }

    async fn queue_bind(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        debug!(
            "binding queue: {} to the exchange: {} with the key: {}",
            binding.queue_name, binding.exchange_name, binding.routing_key
        );

        match self
            .channel
            .queue_bind(
                &binding.queue_name,
                &binding.exchange_name,
                &binding.routing_key,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to bind queue to exchange");
                Err(AmqpError::BindingExchangeToQueueError(
                    binding.exchange_name.clone(),
                    binding.queue_name.clone(),
                ))
            }
            _ => Ok(()),
        }
    }

    async fn basic_publish(&self, msg: &OutboundMessage) -> Result<(), AmqpError> {
        let headers = msg
            .headers
            .iter()
            .map(|(key, value)| {
                (
                    ShortString::from(key.clone()),
                    AMQPValue::LongString(LongString::from(value.clone())),
                )
            })
            .collect::<BTreeMap<_, _>>();

        match self
            .channel
            .basic_publish(
                &msg.exchange,
                &msg.routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                &msg.body,
                BasicProperties::default()
                    .with_content_type(ShortString::from(msg.content_type.clone()))
                    .with_message_id(ShortString::from(msg.message_id.clone()))
                    .with_delivery_mode(msg.delivery_mode())
                    .with_headers(FieldTable::from(headers)),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(AmqpError::PublishingError(err.to_string()))
            }
            _ => Ok(()),
        }
    }

    async fn basic_consume(
        &self,
        queue: &str,
        handler: Arc<dyn SubscriptionHandler>,
    ) -> Result<(), AmqpError> {
        let tag = format!("kanina-{}", Uuid::new_v4());

        let consumer = match self
            .channel
            .basic_consume(
                queue,
                &tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: true,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to create the consumer");
                Err(AmqpError::BindingConsumerError(queue.to_owned()))
            }
            Ok(c) => Ok(c),
        }?;

        debug!(queue, tag = %tag, "consumer registered");

        let deliveries = consumer.map(into_inbound as fn(_) -> _);
        spawn_consumer(queue.to_owned(), deliveries, handler);

        Ok(())
    }
}

fn into_inbound(result: lapin::Result<Delivery>) -> Result<InboundDelivery, AmqpError> {
    let delivery = result.map_err(|err| AmqpError::ChannelError(err.to_string()))?;

    Ok(InboundDelivery {
        exchange: delivery.exchange.to_string(),
        routing_key: delivery.routing_key.to_string(),
        headers: string_headers(delivery.properties.headers()),
        body: delivery.data,
    })
}

fn string_headers(table: &Option<FieldTable>) -> BTreeMap<String, String> {
    let Some(table) = table else {
        return BTreeMap::new();
    };

    table
        .inner()
        .iter()
        .filter_map(|(key, value)| {
            let text = match value {
                AMQPValue::LongString(v) => String::from_utf8_lossy(v.as_bytes()).into_owned(),
                AMQPValue::ShortString(v) => v.to_string(),
                _ => return None,
            };
            Some((key.to_string(), text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_keep_only_string_headers() {
        let mut table = FieldTable::default();
        table.insert(
            ShortString::from("traceparent"),
            AMQPValue::LongString(LongString::from("00-abc-def-01")),
        );
        table.insert(ShortString::from("x-retries"), AMQPValue::LongInt(3));

        let headers = string_headers(&Some(table));
        assert_eq!(headers.len(), 1);
        assert_eq!(
            headers.get("traceparent").map(String::as_str),
            Some("00-abc-def-01")
        );
        assert!(string_headers(&None).is_empty());
    }
}
