// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Delivery Decoding and Dispatch
//!
//! A delivery body is decoded as JSON. When that fails the subscription keeps
//! running: the handler receives the untouched bytes together with the decode
//! error instead.

use crate::{channel::InboundDelivery, dispatcher::SubscriptionHandler, otel};
use opentelemetry::{
    global::BoxedTracer,
    trace::{Span, Status},
    KeyValue,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::borrow::Cow;
use tracing::{debug, warn};

/// The body of a delivery as handed to a subscription handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The body parsed as JSON.
    Json(Value),
    /// The body did not parse; `error` says why.
    Raw { body: Vec<u8>, error: String },
}

impl Payload {
    pub fn is_json(&self) -> bool {
        matches!(self, Payload::Json(_))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Raw { .. } => None,
        }
    }

    /// Looks up a top-level field of a JSON object payload.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.as_json().and_then(|value| value.get(field))
    }

    /// Converts a JSON payload into a typed value.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.as_json().map(|value| T::deserialize(value))
    }

    /// The raw bytes of an undecodable payload.
    pub fn raw(&self) -> Option<&[u8]> {
        match self {
            Payload::Raw { body, .. } => Some(body),
            Payload::Json(_) => None,
        }
    }

    /// The body as text: JSON is re-serialized, raw bytes are decoded lossily.
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Payload::Json(value) => Cow::Owned(value.to_string()),
            Payload::Raw { body, .. } => String::from_utf8_lossy(body),
        }
    }
}

/// Decodes a delivery body.
///
/// # Parameters
/// * `body` - The bytes of the delivery
///
/// # Returns
/// `Payload::Json` when the body parses, `Payload::Raw` otherwise
pub fn decode(body: &[u8]) -> Payload {
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => Payload::Json(value),
        Err(err) => {
            warn!(
                error = err.to_string(),
                "JSON data wasn't received, returning plain payload"
            );
            Payload::Raw {
                body: body.to_vec(),
                error: err.to_string(),
            }
        }
    }
}

/// Decodes one delivery and hands it to the handler, inside a consumer span.
pub(crate) async fn consume(
    tracer: &BoxedTracer,
    delivery: &InboundDelivery,
    handler: &dyn SubscriptionHandler,
) {
    let (_ctx, mut span) = otel::new_span(&delivery.headers, tracer, &delivery.routing_key);
    span.set_attribute(KeyValue::new(
        "messaging.destination.name",
        delivery.exchange.clone(),
    ));

    debug!(
        exchange = %delivery.exchange,
        routing_key = %delivery.routing_key,
        "received delivery"
    );

    let payload = decode(&delivery.body);
    if let Payload::Raw { error, .. } = &payload {
        span.set_status(Status::Error {
            description: Cow::from(error.clone()),
        });
    }

    handler.exec(payload).await;
    span.end();
}
