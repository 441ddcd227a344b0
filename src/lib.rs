// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Publish/subscribe over an AMQP 0-9-1 broker.
//!
//! - `server::Server` owns the connection and the shared channel
//! - `publisher::MessageDefinition` describes a message kind, `Message` delivers it
//! - `subscription::Subscription` declares queues and bindings and runs handlers

mod otel;

pub mod channel;
pub mod config;
pub mod consumer;
pub mod dispatcher;
pub mod errors;
pub mod exchange;
pub mod logging;
pub mod publisher;
pub mod queue;
pub mod server;
pub mod subscription;
pub mod topology;
pub mod transport;

pub use consumer::Payload;
pub use errors::AmqpError;
pub use publisher::{Message, MessageDefinition, MessageKind};
pub use server::{Server, ServerStatus};
pub use subscription::{SubscribeOptions, Subscription};
