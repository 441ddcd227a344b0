// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Diagnostics
//!
//! Everything the crate reports goes through `tracing`, under the target of
//! the module that emits it. `Logger` adds the optional "loud" mode, which
//! echoes lifecycle lines to standard output for hosts that do not install a
//! subscriber. `init` installs a plain fmt subscriber filtered by `RUST_LOG`
//! for hosts that want one.

use tracing_subscriber::EnvFilter;

/// Prefix of every line echoed to standard output.
pub const LOG_PREFIX: &str = "KANINA";

/// Installs a global fmt subscriber.
///
/// # Parameters
/// * `default_filter` - Directives used when `RUST_LOG` is unset or invalid,
///   e.g. `"kanina=info"`
///
/// # Returns
/// `false` when a global subscriber was already installed
pub fn init(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Echoes lifecycle messages to standard output when loud.
///
/// The structured event itself is emitted by the caller, so that it carries
/// the caller's target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Logger {
    loud: bool,
}

impl Logger {
    /// Creates a logger.
    ///
    /// # Parameters
    /// * `loud` - Whether lifecycle lines are also printed to stdout
    pub fn new(loud: bool) -> Logger {
        Logger { loud }
    }

    pub fn is_loud(&self) -> bool {
        self.loud
    }

    /// Renders a line the way `echo` prints it.
    pub fn line(&self, text: &str) -> String {
        format!("{}: {}", LOG_PREFIX, text)
    }

    /// Prints `text` to stdout when loud, does nothing otherwise.
    pub fn echo(&self, text: &str) {
        if self.loud {
            println!("{}", self.line(text));
        }
    }
}
