//! Per-connection handling for the ctl socket.

use std::io::{self, Read};
use std::net::TcpStream;

use altid_control::{ClientId, ControlError, SessionHandle};
use tracing::{debug, warn};

use super::LISTENER_TARGET;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// Upper bound on a single control line, newline excluded.
const MAX_LINE_BYTES: usize = 64 * 1024;
const READ_CHUNK: usize = 4096;

/// Stream types accepted by the listener.
pub(crate) enum ConnectionStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

/// Handles accepted socket connections.
pub(crate) trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection on its own thread until it ends.
    fn handle(&self, stream: ConnectionStream);
}

/// Forwards every line a connection writes to the control session.
///
/// Each connection is a distinct client, so buffer selections made over one
/// connection do not move another's. Blank lines are skipped. The client's
/// selection is released when the peer hangs up.
pub(crate) struct ControlLineHandler {
    session: SessionHandle,
}

impl ControlLineHandler {
    pub(crate) const fn new(session: SessionHandle) -> Self {
        Self { session }
    }

    fn forward(&self, client: ClientId, stream: ConnectionStream) {
        let mut lines = LineReader::new(stream);
        loop {
            let line = match lines.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => return,
                Err(error) => {
                    warn!(target: LISTENER_TARGET, %client, %error, "dropping ctl connection");
                    return;
                }
            };
            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            match self.session.blocking_send_from(client, text) {
                Ok(()) => {}
                Err(ControlError::SessionClosed) => {
                    debug!(target: LISTENER_TARGET, %client, "session closed under connection");
                    return;
                }
                Err(error) => {
                    warn!(target: LISTENER_TARGET, %client, %error, "control line rejected");
                }
            }
        }
    }
}

impl ConnectionHandler for ControlLineHandler {
    fn handle(&self, stream: ConnectionStream) {
        let client = ClientId::next();
        debug!(target: LISTENER_TARGET, %client, "client connected");
        self.forward(client, stream);
        self.session.disconnect(client);
        debug!(target: LISTENER_TARGET, %client, "client disconnected");
    }
}

/// Splits a byte stream into newline-terminated lines.
///
/// A final line without a terminator is still yielded at end of stream.
pub(crate) struct LineReader<R> {
    source: R,
    pending: Vec<u8>,
    eof: bool,
}

impl<R: Read> LineReader<R> {
    pub(crate) const fn new(source: R) -> Self {
        Self {
            source,
            pending: Vec::new(),
            eof: false,
        }
    }

    /// Returns the next line without its `\n`, or `None` once the stream ends.
    pub(crate) fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(position) = self.pending.iter().position(|byte| *byte == b'\n') {
                let mut line: Vec<u8> = self.pending.drain(..=position).collect();
                line.pop();
                return Ok(Some(line));
            }
            if self.pending.len() > MAX_LINE_BYTES {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "control line exceeds maximum size",
                ));
            }
            if self.eof {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.pending)));
            }
            self.fill()?;
        }
    }

    fn fill(&mut self) -> io::Result<()> {
        let mut chunk = [0_u8; READ_CHUNK];
        loop {
            match self.source.read(&mut chunk) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(());
                }
                Ok(read) => {
                    self.pending.extend_from_slice(&chunk[..read]);
                    return Ok(());
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => return Err(error),
            }
        }
    }
}
