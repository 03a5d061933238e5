//! The control session: one dispatch task per service.
//!
//! Lines written to `ctl` are queued through a [`SessionHandle`] and
//! processed strictly in order by [`ControlSession::run`], which is the only
//! place buffers are created, deleted or linked. Failures are appended to the
//! `errors` file as `<verb>: <message>` and never end the loop; only `quit`,
//! cancellation or the closure of every handle does.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use altid_config::{Capability, Config};
use altid_store::{BufferStore, ByteLog, ContentKind, SESSION_FILES, StoreError};
use camino::Utf8PathBuf;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::SESSION_TARGET;
use crate::command::{Command, CommandTable};
use crate::controller::{ClientId, Controller, DefaultHandler, Handlers, InputHandler};
use crate::error::{ControlError, Result};
use crate::invocation::Invocation;
use crate::tabs::TabRegistry;

/// File name the tab list is persisted under in the log directory.
const TABS_FILE: &str = "tabs";

/// Lifecycle of the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Built but not yet waiting for lines, or between lines.
    Idle,
    /// Waiting for the next line.
    Listening,
    /// Handling a line.
    Dispatch,
    /// Shut down; no further lines are accepted.
    Closed,
}

#[derive(Debug)]
struct Inbound {
    client: Option<ClientId>,
    line: String,
}

enum Flow {
    Continue,
    Quit,
}

/// Assembles a [`ControlSession`] from a controller and optional handlers.
pub struct SessionBuilder {
    controller: Arc<dyn Controller>,
    commands: Vec<Command>,
    handlers: Handlers,
    content: ContentKind,
}

impl SessionBuilder {
    /// Starts a session around `controller`.
    pub fn new(controller: impl Controller) -> Self {
        Self {
            controller: Arc::new(controller),
            commands: Vec::new(),
            handlers: Handlers::default(),
            content: ContentKind::default(),
        }
    }

    /// Registers service commands next to the built-in ones.
    #[must_use]
    pub fn with_commands(mut self, commands: impl IntoIterator<Item = Command>) -> Self {
        self.commands.extend(commands);
        self
    }

    /// Handles verbs no registered command answers to.
    #[must_use]
    pub fn with_default_handler(mut self, handler: impl DefaultHandler) -> Self {
        self.handlers.default = Some(Arc::new(handler));
        self
    }

    /// Receives writes to buffers' `input` files.
    #[must_use]
    pub fn with_input_handler(mut self, handler: impl InputHandler) -> Self {
        self.handlers.input = Some(Arc::new(handler));
        self
    }

    /// Names buffers' content file `main` instead of `feed`.
    #[must_use]
    pub const fn with_content(mut self, content: ContentKind) -> Self {
        self.content = content;
        self
    }

    /// Validates `config`, creates the session files and returns the
    /// dispatch loop together with a handle for feeding it.
    ///
    /// Fails with [`ControlError::MissingCapability`] when the configuration
    /// requires a handler that was not supplied.
    pub fn build(self, config: &Config) -> Result<(ControlSession, SessionHandle)> {
        config.validate()?;
        let provided = self.handlers.capabilities();
        if let Some(capability) = config.required_capabilities().missing_from(&provided).next() {
            return Err(ControlError::MissingCapability { capability });
        }

        let mut commands = CommandTable::defaults();
        commands.register(self.commands)?;

        let root = CancellationToken::new();
        let store = BufferStore::new(config, root.child_token()).with_content(self.content);
        for file in SESSION_FILES {
            store.open(file)?;
        }
        let session_log = |name: &str| -> Result<Arc<ByteLog>> {
            Ok(Arc::clone(store.open(name)?.log()))
        };
        let ctl = session_log("ctl")?;
        ctl.replace(commands.to_string().as_bytes())?;
        let errors = session_log("errors")?;
        let events = session_log("event")?;

        let tabs_file = config.log_dir().map(|dir| dir.join(TABS_FILE));
        let tabs = TabRegistry::recover(
            &read_tabs(tabs_file.as_ref()),
            Some(session_log("tabs")?),
        );

        let (state, _) = watch::channel(SessionState::Idle);
        let (sender, receiver) = mpsc::channel(config.ctl_queue());
        let context = Arc::new(SessionContext {
            service: config.service().to_owned(),
            store,
            tabs,
            commands: RwLock::new(commands),
            ctl,
            errors,
            events,
            focus: Mutex::default(),
            input: self.handlers.input.clone(),
            root,
            done: CancellationToken::new(),
            state,
            tabs_file,
        });
        info!(
            target: SESSION_TARGET,
            service = %context.service,
            capabilities = %provided,
            "control session built"
        );

        let session = ControlSession {
            context: Arc::clone(&context),
            inbound: receiver,
            controller: self.controller,
            default: self.handlers.default,
        };
        let handle = SessionHandle {
            context,
            inbound: sender,
        };
        Ok((session, handle))
    }
}

fn read_tabs(path: Option<&Utf8PathBuf>) -> String {
    let Some(path) = path else {
        return String::new();
    };
    match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == io::ErrorKind::NotFound => String::new(),
        Err(error) => {
            warn!(target: SESSION_TARGET, %error, path = %path, "ignoring unreadable tabs file");
            String::new()
        }
    }
}

/// State shared by the dispatch loop, its handles and service callbacks.
pub struct SessionContext {
    service: String,
    store: BufferStore,
    tabs: TabRegistry,
    commands: RwLock<CommandTable>,
    ctl: Arc<ByteLog>,
    errors: Arc<ByteLog>,
    events: Arc<ByteLog>,
    focus: Mutex<HashMap<ClientId, String>>,
    input: Option<Arc<dyn InputHandler>>,
    root: CancellationToken,
    done: CancellationToken,
    state: watch::Sender<SessionState>,
    tabs_file: Option<Utf8PathBuf>,
}

impl SessionContext {
    /// Service name from the configuration.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Buffer store backing the file tree.
    #[must_use]
    pub const fn store(&self) -> &BufferStore {
        &self.store
    }

    /// Tab registry backing the `tabs` file.
    #[must_use]
    pub const fn tabs(&self) -> &TabRegistry {
        &self.tabs
    }

    /// Copy of the current command table.
    #[must_use]
    pub fn commands(&self) -> CommandTable {
        self.commands.read().clone()
    }

    /// Registers more service commands and re-renders `ctl`.
    pub fn register_commands(&self, commands: impl IntoIterator<Item = Command>) -> Result<()> {
        let mut table = self.commands.write();
        table.register(commands)?;
        self.ctl.replace(table.to_string().as_bytes())?;
        Ok(())
    }

    /// Buffer `client` has selected.
    #[must_use]
    pub fn current_buffer(&self, client: ClientId) -> Option<String> {
        self.focus.lock().get(&client).cloned()
    }

    /// Marks new content in `buffer`.
    pub fn activity(&self, buffer: &str) {
        self.tabs.activity(buffer);
    }

    /// Appends `from` and `message` to `buffer`'s notification file and
    /// flags its tab.
    pub fn notify(&self, buffer: &str, from: &str, message: &str) -> Result<()> {
        let path = format!("/{buffer}/notification");
        self.store
            .open(&path)?
            .write(format!("{from}\n{message}\n").as_bytes())?;
        self.tabs.alert(buffer);
        self.event(&format!("notification {path}"));
        Ok(())
    }

    /// Writes `input` to `buffer`'s input file and hands it to the input
    /// handler.
    pub fn input(&self, buffer: &str, input: &[u8]) -> Result<()> {
        let handler = self.input.as_ref().ok_or(ControlError::MissingCapability {
            capability: Capability::Input,
        })?;
        self.store.open(&format!("/{buffer}/input"))?.write(input)?;
        handler.handle_input(self, buffer, input)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Appends one line to the `event` file.
    pub fn event(&self, line: &str) {
        if let Err(error) = self.events.write(format!("{line}\n").as_bytes()) {
            debug!(target: SESSION_TARGET, %error, line, "event dropped");
        }
    }

    fn report(&self, verb: &str, error: &ControlError) {
        let message = match error {
            ControlError::Handler { message, .. } => message.clone(),
            other => other.to_string(),
        };
        warn!(target: SESSION_TARGET, verb, error = %message, "command failed");
        if let Err(error) = self.errors.write(format!("{verb}: {message}\n").as_bytes()) {
            warn!(target: SESSION_TARGET, %error, "errors file unavailable");
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    /// Moves `client` onto `buffer`, releasing its previous selection.
    fn focus(&self, client: ClientId, buffer: &str) {
        let previous = self.focus.lock().insert(client, buffer.to_owned());
        if let Some(previous) = previous {
            if previous == buffer {
                return;
            }
            self.tabs.done(&previous);
        }
        self.tabs.active(buffer);
    }

    fn release(&self, client: ClientId) {
        if let Some(previous) = self.focus.lock().remove(&client) {
            self.tabs.done(&previous);
        }
    }

    fn retarget(&self, from: &str, to: &str) {
        let mut focus = self.focus.lock();
        for buffer in focus.values_mut().filter(|buffer| buffer.as_str() == from) {
            to.clone_into(buffer);
        }
    }

    fn forget(&self, buffer: &str) {
        self.focus.lock().retain(|_, selected| selected != buffer);
    }

    fn persist_tabs(&self) {
        let Some(path) = &self.tabs_file else {
            return;
        };
        if let Err(error) = std::fs::write(path, self.tabs.render()) {
            warn!(target: SESSION_TARGET, %error, path = %path, "failed to persist tabs");
        }
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("service", &self.service)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Cloneable entry point for transports and service code.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    context: Arc<SessionContext>,
    inbound: mpsc::Sender<Inbound>,
}

impl SessionHandle {
    /// Queues one control line with no client identity.
    pub async fn send_line(&self, line: impl Into<String>) -> Result<()> {
        self.enqueue(None, line.into()).await
    }

    /// Queues one control line on behalf of `client`.
    pub async fn send_from(&self, client: ClientId, line: impl Into<String>) -> Result<()> {
        self.enqueue(Some(client), line.into()).await
    }

    /// Queues a line from outside any async runtime, waiting for room.
    ///
    /// Must not be called from within a Tokio runtime.
    pub fn blocking_send_from(&self, client: ClientId, line: impl Into<String>) -> Result<()> {
        self.inbound
            .blocking_send(Inbound {
                client: Some(client),
                line: line.into(),
            })
            .map_err(|_| ControlError::SessionClosed)
    }

    /// Queues every non-empty line in `bytes`, as written to `ctl`.
    pub async fn write_ctl(&self, bytes: &[u8]) -> Result<usize> {
        let text = String::from_utf8_lossy(bytes);
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            self.enqueue(None, line.to_owned()).await?;
        }
        Ok(bytes.len())
    }

    /// Releases whatever buffer `client` had selected.
    pub fn disconnect(&self, client: ClientId) {
        self.context.release(client);
    }

    /// Delivers `input` to `buffer` through the input handler.
    pub fn input(&self, buffer: &str, input: &[u8]) -> Result<()> {
        self.context.input(buffer, input)
    }

    /// See [`SessionContext::notify`].
    pub fn notify(&self, buffer: &str, from: &str, message: &str) -> Result<()> {
        self.context.notify(buffer, from, message)
    }

    /// See [`SessionContext::activity`].
    pub fn activity(&self, buffer: &str) {
        self.context.activity(buffer);
    }

    /// Shared session state.
    #[must_use]
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Buffer store backing the file tree.
    #[must_use]
    pub fn store(&self) -> &BufferStore {
        self.context.store()
    }

    /// Tab registry backing the `tabs` file.
    #[must_use]
    pub fn tabs(&self) -> &TabRegistry {
        self.context.tabs()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.context.state()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.context.state.subscribe()
    }

    /// Resolves once the session has shut down.
    pub async fn wait_closed(&self) {
        self.context.done.cancelled().await;
    }

    /// Whether the session has shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.context.done.is_cancelled()
    }

    /// Asks the session to shut down as if `quit` had been written.
    pub fn cancel(&self) {
        self.context.root.cancel();
    }

    async fn enqueue(&self, client: Option<ClientId>, line: String) -> Result<()> {
        self.inbound
            .send(Inbound { client, line })
            .await
            .map_err(|_| ControlError::SessionClosed)
    }
}

/// The dispatch loop. Drive it with [`ControlSession::run`].
pub struct ControlSession {
    context: Arc<SessionContext>,
    inbound: mpsc::Receiver<Inbound>,
    controller: Arc<dyn Controller>,
    default: Option<Arc<dyn DefaultHandler>>,
}

impl ControlSession {
    /// Shared session state.
    #[must_use]
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Processes lines until `quit`, cancellation, or every handle is gone,
    /// then tears the session down.
    pub async fn run(mut self) {
        info!(target: SESSION_TARGET, service = %self.context.service, "control session started");
        loop {
            self.context.set_state(SessionState::Listening);
            let next = tokio::select! {
                biased;
                () = self.context.root.cancelled() => None,
                inbound = self.inbound.recv() => inbound,
            };
            let Some(inbound) = next else {
                break;
            };
            self.context.set_state(SessionState::Dispatch);
            let flow = self.dispatch(inbound);
            self.context.set_state(SessionState::Idle);
            if matches!(flow, Flow::Quit) {
                break;
            }
        }
        self.shutdown();
    }

    fn dispatch(&self, inbound: Inbound) -> Flow {
        let invocation = match Invocation::parse(&inbound.line) {
            Ok(invocation) => invocation,
            Err(error) => {
                warn!(target: SESSION_TARGET, %error, line = %inbound.line, "dropping malformed ctl line");
                return Flow::Continue;
            }
        };
        let verb = invocation.name.clone();
        let builtin = self
            .context
            .commands
            .read()
            .resolve(&verb)
            .map(|command| command.name.clone());
        debug!(target: SESSION_TARGET, %verb, client = ?inbound.client, "dispatching");

        let outcome = match builtin.as_deref() {
            Some("quit") => return Flow::Quit,
            Some("open") => self.open(inbound.client, &invocation),
            Some("close") => self.close(&invocation),
            Some("buffer") => self.select(inbound.client, &invocation),
            Some("link") => self.link(&invocation),
            Some(_) => self.run_command(&invocation),
            None => self.fallback(&invocation),
        };
        match outcome {
            Ok(()) => {}
            Err(ControlError::MalformedCommand { line, reason }) => {
                warn!(target: SESSION_TARGET, %line, reason, "dropping malformed ctl line");
            }
            Err(error) => self.context.report(&verb, &error),
        }
        Flow::Continue
    }

    fn open(&self, client: Option<ClientId>, invocation: &Invocation) -> Result<()> {
        let name = required_target(invocation)?;
        self.context.store.create_buffer(name)?;
        self.context.tabs.tab(name);
        if let Some(client) = client {
            self.context.focus(client, name);
        }
        self.context.event(&format!("open {name}"));
        self.controller.open(&self.context, name)
    }

    fn close(&self, invocation: &Invocation) -> Result<()> {
        let name = required_target(invocation)?;
        let detached = self.context.store.close_buffer(name)?;
        self.context.tabs.remove(name);
        self.context.forget(name);
        debug!(target: SESSION_TARGET, buffer = name, detached, "buffer closed");
        self.context.event(&format!("close {name}"));
        self.controller.close(&self.context, name)
    }

    fn select(&self, client: Option<ClientId>, invocation: &Invocation) -> Result<()> {
        let name = required_target(invocation)?;
        if !self.context.store.has_buffer(name) {
            return Err(StoreError::BufferNotFound {
                name: name.to_owned(),
            }
            .into());
        }
        if let Some(client) = client {
            self.context.focus(client, name);
        }
        Ok(())
    }

    /// Replaces `to` with `from`, making sure `from` exists before `to` goes.
    fn link(&self, invocation: &Invocation) -> Result<()> {
        let (Some(to), false) = (invocation.from.as_deref(), invocation.args.is_empty()) else {
            return Err(ControlError::malformed(
                invocation.name.clone(),
                "link needs <to> and <from>",
            ));
        };
        let from = invocation.args.join(" ");
        if from == to {
            return Err(ControlError::malformed(
                invocation.name.clone(),
                "link source and destination are the same",
            ));
        }
        let store = &self.context.store;

        let staged = store.ensure_buffer(&from)?;
        if let Err(error) = store.close_buffer(to) {
            if staged && let Err(rollback) = store.delete_buffer(&from) {
                warn!(target: SESSION_TARGET, error = %rollback, buffer = %from, "link rollback failed");
            }
            return Err(error.into());
        }

        if !self.context.tabs.rename(to, &from) {
            self.context.tabs.tab(&from);
        }
        self.context.retarget(to, &from);
        self.context.event(&format!("link {to} {from}"));
        self.controller.link(&self.context, to, &from)
    }

    fn run_command(&self, invocation: &Invocation) -> Result<()> {
        let command = self.context.commands.read().resolve_invocation(invocation)?;
        self.controller.run(&self.context, &command)
    }

    fn fallback(&self, invocation: &Invocation) -> Result<()> {
        match (&self.default, invocation.from.as_deref()) {
            (Some(handler), Some(buffer)) if self.context.store.has_buffer(buffer) => {
                handler.handle(&self.context, invocation)
            }
            _ => Err(ControlError::unknown(&invocation.name)),
        }
    }

    fn shutdown(self) {
        let context = &self.context;
        context.root.cancel();
        self.controller.quit(context);
        context.persist_tabs();
        context.store.teardown();
        context.set_state(SessionState::Closed);
        context.done.cancel();
        info!(target: SESSION_TARGET, service = %context.service, "control session closed");
    }
}

impl std::fmt::Debug for ControlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlSession")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Buffer named by `verb <buffer> [rest]`; trailing words never pick it.
fn required_target(invocation: &Invocation) -> Result<&str> {
    invocation
        .from
        .as_deref()
        .or_else(|| invocation.target())
        .ok_or_else(|| ControlError::malformed(invocation.name.clone(), "missing buffer name"))
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
