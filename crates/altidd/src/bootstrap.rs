//! Daemon bootstrap orchestration.

use std::io;
use std::sync::Arc;

use altid_config::{Config, ConfigError, SocketPreparationError};
use altid_control::{ControlError, SessionBuilder};
use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use crate::echo::EchoController;
use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::{ControlLineHandler, ListenerError, SocketListener};

const DAEMON_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::daemon");

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the service configuration.
    fn load(&self) -> Result<Config, ConfigLoadError>;
}

/// Loader returning a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, ConfigLoadError> {
        self.config.validate()?;
        Ok(self.config.clone())
    }
}

/// Errors raised while assembling the configuration.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that was read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The configuration file is not valid JSON for [`Config`].
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that was parsed.
        path: Utf8PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// The merged configuration failed validation.
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: ConfigLoadError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Socket preparation failed.
    #[error("failed to prepare ctl socket: {source}")]
    Socket {
        /// Filesystem error reported while preparing the socket directory.
        #[source]
        source: SocketPreparationError,
    },
}

/// Errors that end [`Daemon::serve`].
#[derive(Debug, Error)]
pub enum ServeError {
    /// The control session could not be built.
    #[error("failed to build control session: {source}")]
    Session {
        /// Underlying control error.
        #[source]
        source: ControlError,
    },
    /// The ctl listener failed.
    #[error("ctl listener failed: {source}")]
    Listener {
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
    /// The dispatch task panicked.
    #[error("control session task failed: {source}")]
    Task {
        /// Join failure.
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Result of a successful bootstrap invocation.
pub struct Daemon {
    config: Config,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Runs the echo service until a client writes `quit`.
    ///
    /// Each connection to the ctl socket is one client; every line it sends
    /// is a control line.
    pub async fn serve(&self) -> Result<(), ServeError> {
        let (session, handle) = SessionBuilder::new(EchoController)
            .with_default_handler(EchoController)
            .build(&self.config)
            .map_err(|source| ServeError::Session { source })?;
        let listener = SocketListener::bind(self.config.ctl_socket())
            .map_err(|source| ServeError::Listener { source })?;
        let listening = listener
            .start(Arc::new(ControlLineHandler::new(handle.clone())))
            .map_err(|source| ServeError::Listener { source })?;

        let dispatch = tokio::spawn(session.run());
        info!(target: DAEMON_TARGET, service = %self.config.service(), "serving");
        handle.wait_closed().await;

        listening.shutdown();
        match tokio::task::spawn_blocking(move || listening.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(target: DAEMON_TARGET, %error, "listener did not stop cleanly"),
            Err(error) => warn!(target: DAEMON_TARGET, %error, "listener join failed"),
        }
        dispatch.await.map_err(|source| ServeError::Task { source })?;
        self.reporter.session_closed(self.config.service());
        Ok(())
    }
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Bootstraps the daemon using the supplied collaborators.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    if let Err(source) = config.ctl_socket().prepare_filesystem() {
        let error = BootstrapError::Socket { source };
        reporter.bootstrap_failed(&error);
        return Err(error);
    }

    reporter.bootstrap_succeeded(&config);
    Ok(Daemon {
        config,
        telemetry,
        reporter,
    })
}
