//! Error types for command parsing and session dispatch.

use altid_config::{Capability, ConfigError};
use altid_store::StoreError;
use thiserror::Error;

/// Errors raised by the command grammars, the tab registry and the session.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The verb is neither registered nor handled by a default handler.
    #[error("unknown command: {name}")]
    UnknownCommand {
        /// Verb as written.
        name: String,
    },
    /// A control line could not be parsed or lacks a required argument.
    #[error("malformed command '{line}': {reason}")]
    MalformedCommand {
        /// Offending line.
        line: String,
        /// What was wrong with it.
        reason: &'static str,
    },
    /// A command listing could not be parsed.
    #[error("malformed listing at line {line}: {reason}")]
    MalformedListing {
        /// One-based line number.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },
    /// A command name or alias is already registered.
    #[error("command name already registered: {name}")]
    DuplicateCommand {
        /// Clashing name.
        name: String,
    },
    /// The configuration requires a handler the service did not provide.
    #[error("required capability '{capability}' was not provided")]
    MissingCapability {
        /// Capability without a handler.
        capability: Capability,
    },
    /// A service callback reported a failure.
    #[error("{verb}: {message}")]
    Handler {
        /// Verb being handled.
        verb: String,
        /// Callback's message.
        message: String,
    },
    /// The session is no longer accepting lines.
    #[error("control session closed")]
    SessionClosed,
    /// The session configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ControlError {
    /// Builds a [`ControlError::MalformedCommand`].
    pub fn malformed(line: impl Into<String>, reason: &'static str) -> Self {
        Self::MalformedCommand {
            line: line.into(),
            reason,
        }
    }

    /// Builds a [`ControlError::UnknownCommand`].
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownCommand { name: name.into() }
    }

    /// Builds a [`ControlError::Handler`].
    pub fn handler(verb: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            verb: verb.into(),
            message: message.into(),
        }
    }

    pub(crate) fn listing(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedListing {
            line,
            reason: reason.into(),
        }
    }
}

/// Convenience alias for control results.
pub type Result<T> = std::result::Result<T, ControlError>;
