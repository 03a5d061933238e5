use std::fmt;
use std::fs::DirBuilder;
use std::io;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Where the service accepts control-line connections.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum SocketEndpoint {
    /// Unix domain socket at `path`.
    Unix {
        /// Socket file location.
        path: Utf8PathBuf,
    },
    /// TCP socket bound to `host:port`.
    Tcp {
        /// Host name or address.
        host: String,
        /// Port, `0` for an ephemeral one.
        port: u16,
    },
}

impl SocketEndpoint {
    /// Unix endpoint at `path`.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// TCP endpoint at `host:port`.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Socket file path for Unix endpoints.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path),
            Self::Tcp { .. } => None,
        }
    }

    /// Creates the parent directory of a Unix socket, owner-only.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(path) = self.unix_path() else {
            return Ok(());
        };
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .ok_or_else(|| SocketPreparationError::MissingParent {
                path: path.to_path_buf(),
            })?;

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        match builder.create(parent.as_std_path()) {
            Err(source) if source.kind() != io::ErrorKind::AlreadyExists => {
                Err(SocketPreparationError::CreateDirectory {
                    path: parent.to_path_buf(),
                    source,
                })
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(formatter, "unix://{path}"),
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        match url.scheme() {
            "unix" if url.path().is_empty() => {
                Err(SocketParseError::MissingUnixPath(input.to_owned()))
            }
            "unix" => Ok(Self::unix(url.path())),
            "tcp" => {
                let host = url
                    .host_str()
                    .ok_or_else(|| SocketParseError::MissingHost(input.to_owned()))?;
                let port = url
                    .port()
                    .ok_or_else(|| SocketParseError::MissingPort(input.to_owned()))?;
                Ok(Self::tcp(host, port))
            }
            other => Err(SocketParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

/// Errors raised while parsing a [`SocketEndpoint`].
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// Only `unix://` and `tcp://` are understood.
    #[error("unsupported socket scheme '{0}'")]
    UnsupportedScheme(String),
    /// `tcp://` without a host.
    #[error("missing TCP host in '{0}'")]
    MissingHost(String),
    /// `tcp://` without a port.
    #[error("missing TCP port in '{0}'")]
    MissingPort(String),
    /// `unix://` without a path.
    #[error("missing Unix socket path in '{0}'")]
    MissingUnixPath(String),
    /// The text was not a URL at all.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// Errors raised while creating socket directories.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// The socket path has no parent component.
    #[error("socket path '{path}' has no parent directory")]
    MissingParent {
        /// Offending socket path.
        path: Utf8PathBuf,
    },
    /// Directory creation failed.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_unix_endpoints_as_urls() {
        let endpoint = SocketEndpoint::unix("/run/altid/irc.sock");
        assert_eq!(endpoint.to_string(), "unix:///run/altid/irc.sock");
    }

    #[test]
    fn parses_tcp_endpoints() {
        let endpoint: SocketEndpoint = "tcp://127.0.0.1:5640".parse().expect("endpoint");
        assert_eq!(endpoint, SocketEndpoint::tcp("127.0.0.1", 5640));
    }

    #[test]
    fn rejects_unknown_schemes() {
        let error = "udp://localhost:1"
            .parse::<SocketEndpoint>()
            .expect_err("udp should be rejected");
        assert!(matches!(error, SocketParseError::UnsupportedScheme(_)));
    }

    #[test]
    fn prepares_socket_parent_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        let endpoint = SocketEndpoint::unix(root.join("nested/altid.sock"));
        endpoint.prepare_filesystem().expect("prepare socket dir");
        assert!(root.join("nested").is_dir());
    }
}
