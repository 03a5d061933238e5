//! ctl socket transport.
//!
//! A background thread accepts connections on the configured endpoint. Each
//! connection is one client of the control session, and every line it sends
//! is a control line.

mod errors;
mod handler;
mod listener;

pub use self::errors::ListenerError;
pub(crate) use self::handler::{ConnectionHandler, ConnectionStream, ControlLineHandler};
#[cfg(test)]
pub(crate) use self::listener::ListenerHandle;
pub(crate) use self::listener::SocketListener;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
