//! The `altidd` daemon.
//!
//! Bootstraps an Altid service from layered configuration, installs
//! structured telemetry, and serves the control session over a ctl socket.
//! The bundled service is an echo service: every buffer opened over the
//! socket is titled after itself, and any verb the session does not claim is
//! written into the named buffer's feed.
//!
//! Bootstrap reports each stage through a [`HealthReporter`] so failures are
//! visible before the socket is ever bound.

mod bootstrap;
mod cli;
mod echo;
mod health;
mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoadError, ConfigLoader, Daemon, ServeError, StaticConfigLoader,
    bootstrap_with,
};
pub use cli::Cli;
pub use echo::EchoController;
pub use health::{HealthReporter, StructuredHealthReporter};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::ListenerError;

#[cfg(test)]
mod tests;
