// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Definitions
//!
//! Exchanges are the routing entities of the broker. A message kind publishes
//! to exactly one exchange, described by an `ExchangeDefinition`. The broker's
//! nameless exchange is addressed through the `DEFAULT_EXCHANGE` sentinel:
//! it routes a message straight to the queue whose name equals the routing key
//! and is never declared by this crate.

use std::fmt;

/// Name of the broker's built-in direct exchange.
pub const DEFAULT_EXCHANGE: &str = "";

/// Represents the exchange types supported by the publisher and subscriber.
///
/// - Direct: routes on an exact routing key match
/// - Fanout: broadcasts to every bound queue, ignoring the routing key
/// - Topic: routes on dot-separated wildcard patterns (`*`, `#`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeKind::Direct => write!(f, "direct"),
            ExchangeKind::Fanout => write!(f, "fanout"),
            ExchangeKind::Topic => write!(f, "topic"),
        }
    }
}

/// Definition of an exchange: name, type and durability.
///
/// Built with chained calls, starting either from `ExchangeDefinition::new`
/// or from `ExchangeDefinition::default()`, which is the default exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExchangeDefinition {
    pub(crate) name: String,
    pub(crate) kind: ExchangeKind,
    pub(crate) durable: bool,
}

impl Default for ExchangeDefinition {
    fn default() -> Self {
        ExchangeDefinition::new(DEFAULT_EXCHANGE)
    }
}

impl ExchangeDefinition {
    /// Creates a non-durable direct exchange definition.
    ///
    /// # Parameters
    /// * `name` - Exchange name, `DEFAULT_EXCHANGE` for the broker's own
    ///
    /// # Returns
    /// A new ExchangeDefinition
    pub fn new(name: &str) -> ExchangeDefinition {
        ExchangeDefinition {
            name: name.to_owned(),
            kind: ExchangeKind::Direct,
            durable: false,
        }
    }

    /// Sets the exchange type.
    ///
    /// # Parameters
    /// * `kind` - Direct, fanout or topic
    pub fn kind(mut self, kind: ExchangeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the exchange type to Direct.
    pub fn direct(mut self) -> Self {
        self.kind = ExchangeKind::Direct;
        self
    }

    /// Sets the exchange type to Fanout.
    pub fn fanout(mut self) -> Self {
        self.kind = ExchangeKind::Fanout;
        self
    }

    /// Sets the exchange type to Topic.
    pub fn topic(mut self) -> Self {
        self.kind = ExchangeKind::Topic;
        self
    }

    /// Makes the exchange durable, surviving broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Returns the exchange name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exchange_kind(&self) -> ExchangeKind {
        self.kind
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    /// Whether this definition points at the broker's built-in exchange.
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_EXCHANGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_default_to_the_nameless_direct_exchange() {
        let def = ExchangeDefinition::default();
        assert_eq!(def.name(), "");
        assert_eq!(def.exchange_kind(), ExchangeKind::Direct);
        assert!(!def.is_durable());
        assert!(def.is_default());
    }

    #[test]
    fn should_keep_the_last_kind_set() {
        let def = ExchangeDefinition::new("events").fanout().topic().durable();
        assert_eq!(def.exchange_kind(), ExchangeKind::Topic);
        assert!(def.is_durable());
        assert!(!def.is_default());
    }

    #[test]
    fn should_map_to_lapin_kinds() {
        let kind: lapin::ExchangeKind = ExchangeKind::Fanout.into();
        assert!(matches!(kind, lapin::ExchangeKind::Fanout));
        assert_eq!(ExchangeKind::Topic.to_string(), "topic");
    }
}
