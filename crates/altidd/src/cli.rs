//! Command-line and environment configuration for the daemon.

use altid_config::{CapabilitySet, Config, LogFormat, SocketEndpoint};
use camino::Utf8PathBuf;
use clap::Parser;

use crate::bootstrap::{ConfigLoadError, ConfigLoader};

/// Serves an Altid echo service over a ctl socket.
///
/// Settings are layered: built-in defaults, then the JSON file given with
/// `--config`, then flags or their `ALTID_*` environment variables.
#[derive(Parser, Debug, Default, Clone)]
#[command(name = "altidd", version)]
pub struct Cli {
    /// JSON configuration file.
    #[arg(long, env = "ALTID_CONFIG", value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,
    /// Service name.
    #[arg(long, env = "ALTID_SERVICE")]
    pub service: Option<String>,
    /// Tracing filter directives.
    #[arg(long, env = "ALTID_LOG_FILTER", value_name = "FILTER")]
    pub log_filter: Option<String>,
    /// Log output format: `json` or `compact`.
    #[arg(long, env = "ALTID_LOG_FORMAT", value_name = "FORMAT")]
    pub log_format: Option<LogFormat>,
    /// Directory for buffer logs and the persisted tab list.
    #[arg(long, env = "ALTID_LOG_DIR", value_name = "DIR")]
    pub log_dir: Option<Utf8PathBuf>,
    /// ctl endpoint, e.g. `unix:///run/altid/irc.sock` or `tcp://127.0.0.1:5640`.
    #[arg(long, env = "ALTID_SOCKET", value_name = "URL")]
    pub socket: Option<SocketEndpoint>,
    /// Inbound control line queue capacity.
    #[arg(long, env = "ALTID_CTL_QUEUE")]
    pub ctl_queue: Option<usize>,
    /// Per-subscriber stream delivery capacity.
    #[arg(long, env = "ALTID_STREAM_QUEUE")]
    pub stream_queue: Option<usize>,
    /// Root listing page capacity.
    #[arg(long, env = "ALTID_LISTING_PAGE")]
    pub listing_page: Option<usize>,
    /// Comma-separated capabilities the session must provide.
    #[arg(long, env = "ALTID_REQUIRE", value_name = "LIST")]
    pub require: Option<CapabilitySet>,
}

impl Cli {
    /// Applies the flags that were given on top of `base`.
    #[must_use]
    pub fn apply(&self, base: Config) -> Config {
        let mut config = base;
        if let Some(service) = &self.service {
            config = config.with_service(service.clone());
        }
        if let Some(filter) = &self.log_filter {
            config = config.with_log_filter(filter.clone());
        }
        if let Some(format) = self.log_format {
            config = config.with_log_format(format);
        }
        if let Some(dir) = &self.log_dir {
            config = config.with_log_dir(dir.clone());
        }
        if let Some(socket) = &self.socket {
            config = config.with_ctl_socket(socket.clone());
        }
        if let Some(capacity) = self.ctl_queue {
            config = config.with_ctl_queue(capacity);
        }
        if let Some(capacity) = self.stream_queue {
            config = config.with_stream_queue(capacity);
        }
        if let Some(capacity) = self.listing_page {
            config = config.with_listing_page(capacity);
        }
        if let Some(required) = &self.require {
            config = config.with_required_capabilities(required.clone());
        }
        config
    }

    fn base(&self) -> Result<Config, ConfigLoadError> {
        let Some(path) = &self.config else {
            return Ok(Config::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigLoadError::Parse {
            path: path.clone(),
            source,
        })
    }
}

impl ConfigLoader for Cli {
    fn load(&self) -> Result<Config, ConfigLoadError> {
        let config = self.apply(self.base()?);
        config.validate()?;
        Ok(config)
    }
}
