// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types
//!
//! Every fallible operation of the crate returns `AmqpError`. Infrastructure
//! faults (configuration, connection, channel, declaration, publish) are
//! surfaced to the caller of the operation that triggered them. Payload decode
//! failures never show up here: they are absorbed by the consumer and handed
//! to the subscription handler as a raw payload.

use thiserror::Error;

/// Represents errors that can occur while talking to the broker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmqpError {
    /// The configuration file exists but could not be read or parsed
    #[error("failure to load configuration: {0}")]
    ConfigError(String),

    /// Error establishing a connection to the broker
    #[error("failure to connect: {0}")]
    ConnectionError(String),

    /// The connection was requested, or a channel opened, before `Server::start`
    #[error("connection needs to be opened before opening a channel")]
    ConnectionNotOpen,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel: {0}")]
    ChannelError(String),

    /// The channel was requested before `Server::start`
    #[error("channel is not open")]
    ChannelNotOpen,

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a queue to an exchange
    #[error("failure to bind exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// Error registering a consumer on a queue
    #[error("failure to declare consumer `{0}`")]
    BindingConsumerError(String),

    /// The payload could not be turned into JSON
    #[error("failure to serialize payload: {0}")]
    SerializePayloadError(String),

    /// Error publishing a message
    #[error("failure to publish: {0}")]
    PublishingError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_render_both_names_of_a_failed_binding() {
        let err = AmqpError::BindingExchangeToQueueError("orders".into(), "audit".into());
        assert_eq!(
            err.to_string(),
            "failure to bind exchange `orders` to queue `audit`"
        );
    }

    #[test]
    fn should_explain_channel_before_connection() {
        assert_eq!(
            AmqpError::ConnectionNotOpen.to_string(),
            "connection needs to be opened before opening a channel"
        );
    }
}
