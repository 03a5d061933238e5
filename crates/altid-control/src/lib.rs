//! Command grammars, tab tracking and the control session of an Altid
//! service.
//!
//! A service builds a [`ControlSession`] with [`SessionBuilder`], spawns
//! [`ControlSession::run`] and feeds it lines through the returned
//! [`SessionHandle`]. The session owns the service's
//! [`BufferStore`](altid_store::BufferStore), keeps the `ctl`, `tabs`,
//! `errors` and `event` files current, and calls back into the service's
//! [`Controller`] after each buffer lifecycle change.

mod command;
mod controller;
mod error;
mod invocation;
mod listing;
mod session;
mod tabs;

pub use command::{Command, CommandTable, Heading};
pub use controller::{ClientId, Controller, DefaultHandler, Handlers, InputHandler};
pub use error::{ControlError, Result};
pub use invocation::Invocation;
pub use session::{ControlSession, SessionBuilder, SessionContext, SessionHandle, SessionState};
pub use tabs::{Tab, TabRegistry};

pub(crate) const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");
