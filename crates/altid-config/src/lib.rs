//! Shared configuration for Altid services.
//!
//! A [`Config`] is built once when a service starts and handed by reference to
//! the store, the control session and the daemon plumbing. There is no global
//! configuration state: everything that varies between deployments is a field
//! here, with serde defaults so partial documents deserialise cleanly.

mod capability;
mod defaults;
mod logging;
mod socket;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use capability::{Capability, CapabilityParseError, CapabilitySet};
pub use defaults::{
    DEFAULT_CTL_QUEUE, DEFAULT_LISTING_PAGE, DEFAULT_LOG_FILTER, DEFAULT_SERVICE,
    DEFAULT_STREAM_QUEUE, DEFAULT_TCP_PORT, ctl_socket_for,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Resolved service configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "defaults::default_service")]
    service: String,
    #[serde(default = "defaults::default_log_filter")]
    log_filter: String,
    #[serde(default = "defaults::default_log_format")]
    log_format: LogFormat,
    #[serde(default)]
    log_dir: Option<Utf8PathBuf>,
    #[serde(default = "defaults::default_ctl_socket")]
    ctl_socket: SocketEndpoint,
    #[serde(default = "default_ctl_queue")]
    ctl_queue: usize,
    #[serde(default = "default_stream_queue")]
    stream_queue: usize,
    #[serde(default = "default_listing_page")]
    listing_page: usize,
    #[serde(default)]
    required_capabilities: CapabilitySet,
}

const fn default_ctl_queue() -> usize {
    DEFAULT_CTL_QUEUE
}

const fn default_stream_queue() -> usize {
    DEFAULT_STREAM_QUEUE
}

const fn default_listing_page() -> usize {
    DEFAULT_LISTING_PAGE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: defaults::default_service(),
            log_filter: defaults::default_log_filter(),
            log_format: defaults::default_log_format(),
            log_dir: None,
            ctl_socket: defaults::default_ctl_socket(),
            ctl_queue: DEFAULT_CTL_QUEUE,
            stream_queue: DEFAULT_STREAM_QUEUE,
            listing_page: DEFAULT_LISTING_PAGE,
            required_capabilities: CapabilitySet::default(),
        }
    }
}

impl Config {
    /// Service name, used for the default socket and in logs.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Telemetry output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Directory holding per-buffer backing logs, when log-backed storage is on.
    #[must_use]
    pub fn log_dir(&self) -> Option<&Utf8Path> {
        self.log_dir.as_deref()
    }

    /// Endpoint the ctl transport listens on.
    #[must_use]
    pub const fn ctl_socket(&self) -> &SocketEndpoint {
        &self.ctl_socket
    }

    /// Inbound ctl queue capacity.
    #[must_use]
    pub const fn ctl_queue(&self) -> usize {
        self.ctl_queue
    }

    /// Per-subscriber delivery capacity.
    #[must_use]
    pub const fn stream_queue(&self) -> usize {
        self.stream_queue
    }

    /// Root listing channel capacity.
    #[must_use]
    pub const fn listing_page(&self) -> usize {
        self.listing_page
    }

    /// Capabilities the control session must be given.
    #[must_use]
    pub const fn required_capabilities(&self) -> &CapabilitySet {
        &self.required_capabilities
    }

    /// Renames the service. The ctl socket follows unless it was set explicitly.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        let service = service.into();
        if self.ctl_socket == defaults::default_ctl_socket() {
            self.ctl_socket = ctl_socket_for(&service);
        }
        self.service = service;
        self
    }

    /// Replaces the tracing filter.
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Replaces the telemetry format.
    #[must_use]
    pub const fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Enables log-backed storage under `dir`.
    #[must_use]
    pub fn with_log_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Replaces the ctl endpoint.
    #[must_use]
    pub fn with_ctl_socket(mut self, endpoint: SocketEndpoint) -> Self {
        self.ctl_socket = endpoint;
        self
    }

    /// Replaces the inbound ctl queue capacity.
    #[must_use]
    pub const fn with_ctl_queue(mut self, capacity: usize) -> Self {
        self.ctl_queue = capacity;
        self
    }

    /// Replaces the per-subscriber delivery capacity.
    #[must_use]
    pub const fn with_stream_queue(mut self, capacity: usize) -> Self {
        self.stream_queue = capacity;
        self
    }

    /// Replaces the root listing channel capacity.
    #[must_use]
    pub const fn with_listing_page(mut self, capacity: usize) -> Self {
        self.listing_page = capacity;
        self
    }

    /// Replaces the set of mandatory capabilities.
    #[must_use]
    pub fn with_required_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.required_capabilities = capabilities;
        self
    }

    /// Checks values that serde cannot constrain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.trim().is_empty() {
            return Err(ConfigError::EmptyService);
        }
        if self.service.contains('/') {
            return Err(ConfigError::InvalidService {
                name: self.service.clone(),
            });
        }
        for (field, value) in [
            ("ctl_queue", self.ctl_queue),
            ("stream_queue", self.stream_queue),
            ("listing_page", self.listing_page),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroCapacity { field });
            }
        }
        Ok(())
    }
}

/// Errors reported by [`Config::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The service name is blank.
    #[error("service name must not be empty")]
    EmptyService,
    /// The service name cannot be used as a file name.
    #[error("service name '{name}' must not contain '/'")]
    InvalidService {
        /// Rejected name.
        name: String,
    },
    /// A queue capacity is zero.
    #[error("{field} must be greater than zero")]
    ZeroCapacity {
        /// Field holding the zero.
        field: &'static str,
    },
}
