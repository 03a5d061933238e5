//! Errors raised by the ctl socket listener.

use std::io;
use std::net::SocketAddr;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Failures while binding or running the listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The TCP host name did not resolve.
    #[error("could not resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    /// Resolution succeeded but yielded nothing to bind.
    #[error("{host}:{port} resolved to no addresses")]
    ResolveEmpty { host: String, port: u16 },
    #[error("could not bind ctl socket at tcp://{addr}: {source}")]
    BindTcp {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("could not switch the ctl socket to non-blocking mode: {source}")]
    NonBlocking {
        #[source]
        source: io::Error,
    },
    #[cfg(not(unix))]
    #[error("unix sockets are not available here: {path}")]
    UnsupportedUnix { path: Utf8PathBuf },
    #[cfg(unix)]
    #[error("could not bind ctl socket at unix://{path}: {source}")]
    BindUnix {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    /// Another process is still serving on the socket path.
    #[cfg(unix)]
    #[error("ctl socket {path} is served by another process")]
    UnixInUse { path: Utf8PathBuf },
    #[cfg(unix)]
    #[error("{path} exists and is not a socket")]
    UnixNotSocket { path: Utf8PathBuf },
    /// The existing path could not be probed.
    #[cfg(unix)]
    #[error("could not inspect existing ctl socket {path}: {source}")]
    UnixProbe {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[cfg(unix)]
    #[error("could not remove stale ctl socket {path}: {source}")]
    UnixCleanup {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("listener thread panicked")]
    ThreadPanic,
}
