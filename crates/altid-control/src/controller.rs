//! Service callbacks invoked by the control session.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use altid_config::{Capability, CapabilitySet};

use crate::command::Command;
use crate::error::Result;
use crate::invocation::Invocation;
use crate::session::SessionContext;

/// Business logic behind a service's buffers.
///
/// Callbacks run on the dispatch task after the store has been updated, one
/// at a time, so they never race buffer creation or deletion. An error is
/// written to the `errors` file and the loop carries on.
pub trait Controller: Send + Sync + 'static {
    /// `name` was created.
    fn open(&self, context: &SessionContext, name: &str) -> Result<()> {
        let _ = (context, name);
        Ok(())
    }

    /// `name` was deleted.
    fn close(&self, context: &SessionContext, name: &str) -> Result<()> {
        let _ = (context, name);
        Ok(())
    }

    /// `to` was replaced by `from`.
    fn link(&self, context: &SessionContext, to: &str, from: &str) -> Result<()> {
        let _ = (context, to, from);
        Ok(())
    }

    /// A registered service command was issued.
    fn run(&self, context: &SessionContext, command: &Command) -> Result<()>;

    /// The session is shutting down.
    fn quit(&self, context: &SessionContext) {
        let _ = context;
    }
}

/// Handles verbs that match no registered command.
pub trait DefaultHandler: Send + Sync + 'static {
    /// Handles `invocation`, whose `from` names an existing buffer.
    fn handle(&self, context: &SessionContext, invocation: &Invocation) -> Result<()>;
}

/// Receives text typed into a buffer's `input` file.
pub trait InputHandler: Send + Sync + 'static {
    /// Handles `input` written to `buffer`.
    fn handle_input(&self, context: &SessionContext, buffer: &str, input: &[u8]) -> Result<()>;
}

/// Optional handlers a service provides.
#[derive(Default, Clone)]
pub struct Handlers {
    pub(crate) default: Option<Arc<dyn DefaultHandler>>,
    pub(crate) input: Option<Arc<dyn InputHandler>>,
}

impl Handlers {
    /// Capabilities backed by a handler.
    #[must_use]
    pub fn capabilities(&self) -> CapabilitySet {
        let mut provided = CapabilitySet::new();
        if self.default.is_some() {
            provided.insert(Capability::DefaultHandler);
        }
        if self.input.is_some() {
            provided.insert(Capability::Input);
        }
        provided
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("default", &self.default.is_some())
            .field("input", &self.input.is_some())
            .finish()
    }
}

static NEXT_CLIENT: AtomicU64 = AtomicU64::new(1);

/// Identity a transport assigns to one connected client.
///
/// Only used to remember which buffer the client has selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    /// Allocates an identifier not handed out before in this process.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CLIENT.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ClientId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}
