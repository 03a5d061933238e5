//! Shared doubles for the daemon suites.

use std::sync::Mutex;

use altid_config::{Config, SocketEndpoint};
use camino::Utf8PathBuf;
use tempfile::TempDir;

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;

/// Lifecycle events observed by [`RecordingHealthReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    SessionClosed(String),
}

/// Reporter that keeps every event for later assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn session_closed(&self, service: &str) {
        self.record(HealthEvent::SessionClosed(service.to_owned()));
    }
}

/// A temporary directory holding the ctl socket and buffer logs.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("temp dir"),
        }
    }

    pub fn root(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.dir.path().to_path_buf()).expect("utf8 temp dir")
    }

    pub fn socket(&self) -> Utf8PathBuf {
        self.root().join("altid.sock")
    }

    /// An echo service configuration rooted in this directory.
    pub fn config(&self) -> Config {
        Config::default()
            .with_service("echo")
            .with_log_filter("warn")
            .with_log_dir(self.root())
            .with_ctl_socket(SocketEndpoint::unix(self.socket()))
    }
}
