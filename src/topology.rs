// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Topology Management
//!
//! Declarations shared by the publisher and the subscriber. All of them go
//! through the server's shared channel and are safe to repeat: the broker
//! accepts a redeclaration with identical arguments, and an exchange
//! definition already declared on the current connection is skipped
//! altogether. A definition that conflicts with an earlier one still reaches
//! the broker, which rejects it.

use crate::{
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
    server::Server,
};
use tracing::debug;

/// Declares exchanges, queues and bindings on a server's channel.
pub struct Topology<'tp> {
    server: &'tp Server,
}

impl<'tp> Topology<'tp> {
    /// Creates a topology helper working on `server`'s shared channel.
    pub fn new(server: &'tp Server) -> Topology<'tp> {
        Topology { server }
    }

    /// Declares the exchange unless it is the default exchange or the very
    /// same definition was already declared on this connection. A definition
    /// that differs in kind or durability from an earlier one is sent to the
    /// broker, which rejects the mismatch.
    ///
    /// # Parameters
    /// * `def` - The exchange to declare
    ///
    /// # Returns
    /// Ok(()) on success or `AmqpError::DeclareExchangeError`
    pub async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        if def.is_default() || self.server.is_exchange_declared(def) {
            return Ok(());
        }

        self.server.channel()?.exchange_declare(def).await?;
        self.server.mark_exchange_declared(def);
        Ok(())
    }

    /// Makes sure an exchange named `name` exists. A missing one is declared
    /// as a direct exchange with the given durability; an existing one is
    /// left as it is, whatever its type.
    ///
    /// # Parameters
    /// * `name` - Exchange name
    /// * `durable` - Durability used when the exchange has to be created
    ///
    /// # Returns
    /// Ok(()) once the exchange exists, or the probe or declaration error
    pub async fn ensure_exchange(&self, name: &str, durable: bool) -> Result<(), AmqpError> {
        if self.server.has_exchange_named(name) {
            return Ok(());
        }

        // Its definition is unknown, so nothing is recorded.
        if self.server.connection()?.exchange_exists(name).await? {
            debug!(name, "exchange already exists");
            return Ok(());
        }

        let mut def = ExchangeDefinition::new(name).direct();
        if durable {
            def = def.durable();
        }
        self.declare_exchange(&def).await
    }

    /// Declares the queue, or attaches to it when it exists.
    ///
    /// # Returns
    /// The name the broker knows the queue by
    pub async fn declare_queue(&self, def: &QueueDefinition) -> Result<String, AmqpError> {
        self.server.channel()?.queue_declare(def).await
    }

    /// Binds a queue to an exchange with the binding's routing key.
    pub async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        self.server.channel()?.queue_bind(binding).await
    }
}
