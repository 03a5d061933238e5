//! Lifecycle reporting for the daemon.

use altid_config::Config;

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer for bootstrap and shutdown milestones.
///
/// Tests substitute a recording implementation; the binary uses
/// [`StructuredHealthReporter`].
pub trait HealthReporter: Send + Sync {
    /// Bootstrap is about to load configuration.
    fn bootstrap_starting(&self);

    /// Configuration, telemetry and the socket directory are ready.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Bootstrap stopped at `error`.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// The control session for `service` has shut down.
    fn session_closed(&self, service: &str);
}

/// Reports each milestone as a `tracing` event carrying an `event` field.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(target: HEALTH_TARGET, event = "bootstrap_starting", "bootstrapping");
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            service = %config.service(),
            socket = %config.ctl_socket(),
            log_format = %config.log_format(),
            log_dir = ?config.log_dir(),
            required = ?config.required_capabilities(),
            "bootstrap complete"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(target: HEALTH_TARGET, event = "bootstrap_failed", %error, "bootstrap failed");
    }

    fn session_closed(&self, service: &str) {
        tracing::info!(target: HEALTH_TARGET, event = "session_closed", service, "session closed");
    }
}
