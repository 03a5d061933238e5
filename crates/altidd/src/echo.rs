//! The built-in echo service.

use altid_control::{Command, ControlError, Controller, DefaultHandler, Invocation, SessionContext};
use tracing::debug;

const ECHO_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::echo");

/// Titles new buffers after themselves and echoes any unmatched verb's text
/// into the named buffer's feed.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoController;

impl Controller for EchoController {
    fn open(&self, context: &SessionContext, name: &str) -> altid_control::Result<()> {
        context
            .store()
            .open(&format!("/{name}/title"))?
            .log()
            .replace(name.as_bytes())?;
        Ok(())
    }

    fn run(&self, _: &SessionContext, command: &Command) -> altid_control::Result<()> {
        Err(ControlError::unknown(command.name.clone()))
    }
}

impl DefaultHandler for EchoController {
    fn handle(&self, context: &SessionContext, invocation: &Invocation) -> altid_control::Result<()> {
        let Some(buffer) = invocation.from.as_deref() else {
            return Err(ControlError::unknown(invocation.name.clone()));
        };
        let feed = format!("/{buffer}/{}", context.store().content().file_name());
        context
            .store()
            .open(&feed)?
            .write(format!("{}\n", invocation.text).as_bytes())?;
        context.activity(buffer);
        debug!(target: ECHO_TARGET, buffer, verb = %invocation.name, "echoed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use altid_config::Config;
    use altid_control::{SessionBuilder, SessionHandle};

    use super::*;

    fn text(handle: &SessionHandle, path: &str) -> String {
        let bytes = handle
            .store()
            .open(path)
            .expect("open")
            .log()
            .snapshot()
            .expect("snapshot");
        String::from_utf8(bytes).expect("utf8")
    }

    #[test]
    fn opened_buffers_are_titled_and_echoed_into() {
        let (session, handle) = SessionBuilder::new(EchoController)
            .with_default_handler(EchoController)
            .build(&Config::default())
            .expect("build");
        let context = session.context();
        context.store().create_buffer("irc").expect("create");

        EchoController.open(context, "irc").expect("open callback");
        let invocation = Invocation::parse("say irc hello there").expect("parse");
        EchoController
            .handle(context, &invocation)
            .expect("echo");

        assert_eq!(text(&handle, "/irc/title"), "irc");
        assert_eq!(text(&handle, "/irc/feed"), "Welcome!\nhello there\n");
        assert_eq!(handle.tabs().get("irc").map(|tab| tab.unread), Some(1));
    }
}
