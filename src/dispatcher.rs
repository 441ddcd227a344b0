// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Subscription Dispatcher
//!
//! Each registered consumer gets its own tokio task that pulls deliveries off
//! the consumer stream and hands them to `consumer::consume`. Handlers of
//! different subscriptions therefore run concurrently with each other and with
//! any publish in flight.
//!
//! A handler that panics takes its consumer task down with it; nothing here
//! catches it.

use crate::{channel::InboundDelivery, consumer, consumer::Payload, errors::AmqpError, otel};
use async_trait::async_trait;
use futures_util::{stream::Stream, StreamExt};
#[cfg(test)]
use mockall::automock;
use opentelemetry::global;
use std::{fmt, sync::Arc};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Application code run once for every message a subscription receives.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SubscriptionHandler: Send + Sync {
    /// Handles one delivery.
    ///
    /// # Parameters
    /// * `payload` - The decoded body, or the raw bytes when it is not JSON
    async fn exec(&self, payload: Payload);
}

/// Adapts a plain closure into a `SubscriptionHandler`.
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(Payload) + Send + Sync + 'static,
{
    /// Wraps a closure.
    ///
    /// # Parameters
    /// * `f` - Called with the payload of every delivery
    ///
    /// # Returns
    /// The handler, ready to pass to `Subscription::subscribe`
    pub fn new(f: F) -> Arc<FnHandler<F>> {
        Arc::new(FnHandler { f })
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> SubscriptionHandler for FnHandler<F>
where
    F: Fn(Payload) + Send + Sync + 'static,
{
    async fn exec(&self, payload: Payload) {
        (self.f)(payload)
    }
}

/// Spawns the delivery loop of one consumer. The loop ends with the stream,
/// which lapin closes together with the channel.
pub(crate) fn spawn_consumer<S>(
    queue: String,
    mut deliveries: S,
    handler: Arc<dyn SubscriptionHandler>,
) -> JoinHandle<()>
where
    S: Stream<Item = Result<InboundDelivery, AmqpError>> + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let tracer = global::tracer(otel::CONSUMER_TRACER);

        while let Some(result) = deliveries.next().await {
            match result {
                Ok(delivery) => consumer::consume(&tracer, &delivery, handler.as_ref()).await,
                Err(err) => error!(error = err.to_string(), queue = %queue, "errors consume msg"),
            }
        }

        debug!(queue = %queue, "consumer stream closed");
    })
}
