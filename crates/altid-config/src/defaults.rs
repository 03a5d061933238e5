#[cfg(unix)]
use std::env;

use camino::Utf8PathBuf;

#[cfg(unix)]
use dirs::runtime_dir;

use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// Service name used when none is configured.
pub const DEFAULT_SERVICE: &str = "altid";

/// Default tracing filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Capacity of the inbound ctl line queue.
pub const DEFAULT_CTL_QUEUE: usize = 64;

/// Capacity of each subscriber's delivery channel.
pub const DEFAULT_STREAM_QUEUE: usize = 256;

/// Capacity of the channel feeding a paged root listing.
pub const DEFAULT_LISTING_PAGE: usize = 16;

/// TCP port used where Unix sockets are unavailable.
pub const DEFAULT_TCP_PORT: u16 = 5640;

pub(crate) fn default_service() -> String {
    DEFAULT_SERVICE.to_owned()
}

pub(crate) fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

pub(crate) const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

pub(crate) fn default_ctl_socket() -> SocketEndpoint {
    ctl_socket_for(DEFAULT_SERVICE)
}

/// Default ctl endpoint for `service`: `<runtime dir>/altid/<service>.sock`.
#[must_use]
pub fn ctl_socket_for(service: &str) -> SocketEndpoint {
    ctl_socket_inner(service)
}

#[cfg(unix)]
fn ctl_socket_inner(service: &str) -> SocketEndpoint {
    let mut base = runtime_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(temp_base);
    base.push("altid");
    SocketEndpoint::unix(base.join(format!("{service}.sock")))
}

#[cfg(not(unix))]
fn ctl_socket_inner(_service: &str) -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
}

#[cfg(unix)]
fn temp_base() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}
