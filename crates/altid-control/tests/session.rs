//! Behavioural tests driving a running control session through its handle.

use std::sync::Arc;
use std::time::Duration;

use altid_config::Config;
use altid_control::{
    ClientId, Command, ControlError, ControlSession, Controller, DefaultHandler, Heading,
    InputHandler, Invocation, SessionBuilder, SessionContext, SessionHandle, SessionState,
};
use camino::Utf8PathBuf;
use parking_lot::Mutex;
use rstest::{fixture, rstest};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
    settled: Arc<Notify>,
}

impl Recorder {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn push(&self, call: String) {
        self.calls.lock().push(call);
    }
}

impl Controller for Recorder {
    fn open(&self, _: &SessionContext, name: &str) -> altid_control::Result<()> {
        self.push(format!("open {name}"));
        Ok(())
    }

    fn close(&self, _: &SessionContext, name: &str) -> altid_control::Result<()> {
        self.push(format!("close {name}"));
        Ok(())
    }

    fn link(&self, _: &SessionContext, to: &str, from: &str) -> altid_control::Result<()> {
        self.push(format!("link {to} {from}"));
        Ok(())
    }

    fn run(&self, _: &SessionContext, command: &Command) -> altid_control::Result<()> {
        match command.name.as_str() {
            "ping" => {
                self.settled.notify_one();
                Ok(())
            }
            "fail" => Err(ControlError::handler("fail", "refused by server")),
            other => {
                self.push(format!(
                    "run {other} {} {}",
                    command.from.as_deref().unwrap_or("-"),
                    command.args.join(",")
                ));
                Ok(())
            }
        }
    }

    fn quit(&self, _: &SessionContext) {
        self.push("quit".to_owned());
    }
}

struct FeedEcho;

impl DefaultHandler for FeedEcho {
    fn handle(&self, context: &SessionContext, invocation: &Invocation) -> altid_control::Result<()> {
        let buffer = invocation.from.as_deref().unwrap_or_default();
        context
            .store()
            .open(&format!("/{buffer}/feed"))?
            .write(format!("{}\n", invocation.text).as_bytes())?;
        context.activity(buffer);
        Ok(())
    }
}

#[derive(Clone, Default)]
struct Typed {
    seen: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl InputHandler for Typed {
    fn handle_input(
        &self,
        _: &SessionContext,
        buffer: &str,
        input: &[u8],
    ) -> altid_control::Result<()> {
        self.seen.lock().push((buffer.to_owned(), input.to_vec()));
        Ok(())
    }
}

struct Running {
    handle: SessionHandle,
    recorder: Recorder,
    task: JoinHandle<()>,
}

impl Running {
    async fn send(&self, line: &str) {
        self.handle.send_line(line).await.expect("queue line");
    }

    /// Waits until every line queued so far has been dispatched.
    async fn settle(&self) {
        self.send("ping").await;
        timeout(WAIT, self.recorder.settled.notified())
            .await
            .expect("session should dispatch ping");
    }

    fn read(&self, path: &str) -> String {
        let bytes = self
            .handle
            .store()
            .open(path)
            .expect("open")
            .log()
            .snapshot()
            .expect("snapshot");
        String::from_utf8(bytes).expect("utf8")
    }

    async fn quit(self) {
        self.send("quit").await;
        timeout(WAIT, self.handle.wait_closed())
            .await
            .expect("session should close");
        timeout(WAIT, self.task)
            .await
            .expect("task should finish")
            .expect("task should not panic");
    }
}

fn builder(recorder: &Recorder) -> SessionBuilder {
    SessionBuilder::new(recorder.clone()).with_commands([
        Command::new("ping", Heading::Service),
        Command::new("fail", Heading::Default).arg("buffer"),
        Command::new("me", Heading::Action).arg("text"),
    ])
}

fn spawn(builder: SessionBuilder, recorder: Recorder, config: &Config) -> Running {
    let (session, handle): (ControlSession, SessionHandle) =
        builder.build(config).expect("build session");
    let task = tokio::spawn(session.run());
    Running {
        handle,
        recorder,
        task,
    }
}

#[fixture]
fn recorder() -> Recorder {
    Recorder::default()
}

#[rstest]
#[tokio::test]
async fn open_creates_buffer_tab_and_event(recorder: Recorder) {
    let running = spawn(builder(&recorder), recorder.clone(), &Config::default());
    running.send("open irc").await;
    running.settle().await;

    assert!(running.handle.store().has_buffer("irc"));
    assert_eq!(running.read("/irc/feed"), "Welcome!\n");
    assert_eq!(running.read("/tabs"), "0 irc\n");
    assert_eq!(running.read("/event"), "open irc\n");
    assert_eq!(recorder.calls(), ["open irc"]);
    running.quit().await;
}

#[rstest]
#[tokio::test]
async fn store_failures_go_to_the_errors_file(recorder: Recorder) {
    let running = spawn(builder(&recorder), recorder.clone(), &Config::default());
    running.send("open irc").await;
    running.send("join irc").await;
    running.send("close ghost").await;
    running.send("fail irc").await;
    running.settle().await;

    assert_eq!(
        running.read("/errors"),
        "join: buffer already exists: irc\n\
         close: no such buffer: ghost\n\
         fail: refused by server\n"
    );
    assert_eq!(recorder.calls(), ["open irc"]);
    running.quit().await;
}

#[rstest]
#[tokio::test]
async fn malformed_and_unknown_lines_do_not_stop_the_loop(recorder: Recorder) {
    let running = spawn(builder(&recorder), recorder.clone(), &Config::default());
    running.send("open").await;
    running.send("dance").await;
    running.send(r#"open "unterminated"#).await;
    running.settle().await;

    assert_eq!(running.read("/errors"), "dance: unknown command: dance\n");
    assert!(running.handle.store().buffers().is_empty());

    running.send("open irc").await;
    running.settle().await;
    assert!(running.handle.store().has_buffer("irc"));

    let handle = running.handle.clone();
    running.quit().await;
    assert_eq!(handle.state(), SessionState::Closed);
    assert!(handle.is_closed());
    assert_eq!(recorder.calls().last().map(String::as_str), Some("quit"));
    assert!(matches!(
        handle.send_line("open late").await,
        Err(ControlError::SessionClosed)
    ));
}

#[rstest]
#[tokio::test]
async fn closing_a_buffer_ends_its_streams(recorder: Recorder) {
    let running = spawn(builder(&recorder), recorder.clone(), &Config::default());
    running.send("open irc").await;
    running.settle().await;

    let mut feed = running.handle.store().stream("/irc/feed").expect("stream");
    running.send("part irc").await;
    running.settle().await;

    let mut seen = Vec::new();
    while let Some(chunk) = timeout(WAIT, feed.recv()).await.expect("stream should end") {
        seen.extend_from_slice(&chunk);
    }
    assert_eq!(seen, b"Welcome!\n");
    assert!(!running.handle.store().has_buffer("irc"));
    assert_eq!(running.read("/tabs"), "");
    assert_eq!(running.read("/event"), "open irc\nclose irc\n");
    assert_eq!(recorder.calls(), ["open irc", "close irc"]);
    running.quit().await;
}

#[rstest]
#[tokio::test]
async fn link_replaces_the_destination_in_place(recorder: Recorder) {
    let running = spawn(builder(&recorder), recorder.clone(), &Config::default());
    running.send("open first").await;
    running.send("open old").await;
    running.send("open last").await;
    running.send("link old new").await;
    running.settle().await;

    let store = running.handle.store();
    assert!(!store.has_buffer("old"));
    assert!(store.has_buffer("new"));
    assert_eq!(running.read("/tabs"), "0 first\n0 new\n0 last\n");
    assert!(running.read("/event").ends_with("link old new\n"));
    assert_eq!(recorder.calls().last().map(String::as_str), Some("link old new"));
    running.quit().await;
}

#[rstest]
#[tokio::test]
async fn link_with_quoted_names(recorder: Recorder) {
    let running = spawn(builder(&recorder), recorder.clone(), &Config::default());
    running.send(r#"open "my buffer""#).await;
    running.send(r#"link "my buffer" "new buffer""#).await;
    running.settle().await;

    assert!(running.handle.store().has_buffer("new buffer"));
    assert!(!running.handle.store().has_buffer("my buffer"));
    running.quit().await;
}

#[rstest]
#[tokio::test]
async fn failed_link_rolls_back_the_staged_source(recorder: Recorder) {
    let running = spawn(builder(&recorder), recorder.clone(), &Config::default());
    running.send("link ghost fresh").await;
    running.settle().await;

    assert!(!running.handle.store().has_buffer("fresh"));
    assert_eq!(running.read("/errors"), "link: no such buffer: ghost\n");
    running.quit().await;
}

#[rstest]
#[tokio::test]
async fn buffer_switches_track_each_client(recorder: Recorder) {
    let running = spawn(builder(&recorder), recorder.clone(), &Config::default());
    let alice = ClientId::next();
    let bob = ClientId::next();
    running.send("open a").await;
    running.send("open b").await;
    running.handle.send_from(alice, "buffer a").await.expect("send");
    running.handle.send_from(bob, "buffer a").await.expect("send");
    running.handle.send_from(alice, "buffer b").await.expect("send");
    running.handle.send_from(alice, "buffer ghost").await.expect("send");
    running.settle().await;

    let tabs = running.handle.tabs();
    assert_eq!(tabs.get("a").map(|tab| (tab.active, tab.refs)), Some((true, 1)));
    assert_eq!(tabs.get("b").map(|tab| (tab.active, tab.refs)), Some((true, 1)));
    assert_eq!(
        running.handle.context().current_buffer(alice).as_deref(),
        Some("b")
    );
    assert_eq!(running.read("/errors"), "buffer: no such buffer: ghost\n");

    running.handle.disconnect(bob);
    assert_eq!(tabs.get("a").map(|tab| tab.active), Some(false));
    running.quit().await;
}

#[rstest]
#[tokio::test]
async fn trailing_words_never_pick_the_target_buffer(recorder: Recorder) {
    let running = spawn(builder(&recorder), recorder.clone(), &Config::default());
    running.send("open irc").await;
    running.send("open now").await;
    running.send("close irc now").await;
    running.send("open alpha beta").await;
    running.settle().await;

    let store = running.handle.store();
    assert!(!store.has_buffer("irc"));
    assert!(store.has_buffer("now"));
    assert!(store.has_buffer("alpha"));
    assert!(!store.has_buffer("beta"));
    assert_eq!(
        recorder.calls(),
        ["open irc", "open now", "close irc", "open alpha"]
    );
    running.quit().await;
}

#[rstest]
#[tokio::test]
async fn linking_onto_a_selected_buffer_keeps_both_clients(recorder: Recorder) {
    let running = spawn(builder(&recorder), recorder.clone(), &Config::default());
    let alice = ClientId::next();
    let bob = ClientId::next();
    running.handle.send_from(alice, "open x").await.expect("send");
    running.handle.send_from(bob, "open y").await.expect("send");
    running.send("link y x").await;
    running.settle().await;

    let tabs = running.handle.tabs();
    assert_eq!(tabs.get("x").map(|tab| (tab.active, tab.refs)), Some((true, 2)));
    assert!(tabs.get("y").is_none());
    assert_eq!(running.read("/tabs"), "0 x\n");
    assert_eq!(
        running.handle.context().current_buffer(bob).as_deref(),
        Some("x")
    );

    running.handle.disconnect(alice);
    assert_eq!(tabs.get("x").map(|tab| (tab.active, tab.refs)), Some((true, 1)));
    running.handle.disconnect(bob);
    assert_eq!(tabs.get("x").map(|tab| tab.active), Some(false));
    running.quit().await;
}

#[rstest]
#[tokio::test]
async fn registered_commands_reach_the_controller(recorder: Recorder) {
    let running = spawn(builder(&recorder), recorder.clone(), &Config::default());
    running.send("open irc").await;
    running.send("me irc waves hello").await;
    running.settle().await;

    assert_eq!(recorder.calls(), ["open irc", "run me irc waves,hello"]);
    running.quit().await;
}

#[rstest]
#[tokio::test]
async fn unmatched_verbs_fall_through_to_the_default_handler(recorder: Recorder) {
    let running = spawn(
        builder(&recorder).with_default_handler(FeedEcho),
        recorder.clone(),
        &Config::default(),
    );
    running.send("open irc").await;
    running.send("msg irc hello   world").await;
    running.send("msg ghost hello").await;
    running.settle().await;

    assert_eq!(running.read("/irc/feed"), "Welcome!\nhello   world\n");
    assert_eq!(running.read("/tabs"), "1 irc\n");
    assert_eq!(running.read("/errors"), "msg: unknown command: msg\n");
    running.quit().await;
}

#[rstest]
#[tokio::test]
async fn notifications_alert_the_tab(recorder: Recorder) {
    let running = spawn(builder(&recorder), recorder.clone(), &Config::default());
    running.send("open irc").await;
    running.settle().await;

    running.handle.notify("irc", "halfwit", "ping!").expect("notify");
    assert_eq!(running.read("/irc/notification"), "halfwit\nping!\n");
    assert_eq!(running.read("/tabs"), "!0 irc\n");
    assert!(running.read("/event").ends_with("notification /irc/notification\n"));
    assert!(running.handle.notify("ghost", "x", "y").is_err());
    running.quit().await;
}

#[rstest]
#[tokio::test]
async fn input_reaches_the_input_handler(recorder: Recorder) {
    let typed = Typed::default();
    let running = spawn(
        builder(&recorder).with_input_handler(typed.clone()),
        recorder.clone(),
        &Config::default(),
    );
    running.send("open irc").await;
    running.settle().await;

    running.handle.input("irc", b"hello\n").expect("input");
    assert_eq!(running.read("/irc/input"), "hello\n");
    assert_eq!(
        typed.seen.lock().as_slice(),
        [("irc".to_owned(), b"hello\n".to_vec())]
    );
    running.quit().await;
}

#[rstest]
#[tokio::test]
async fn ctl_writes_are_split_into_lines(recorder: Recorder) {
    let running = spawn(builder(&recorder), recorder.clone(), &Config::default());
    let written = running
        .handle
        .write_ctl(b"open a\n\nopen b\r\nopen c")
        .await
        .expect("write ctl");
    assert_eq!(written, 22);
    running.settle().await;

    assert_eq!(running.handle.store().buffers(), ["a", "b", "c"]);
    running.quit().await;
}

#[rstest]
#[tokio::test]
async fn cancellation_closes_the_session(recorder: Recorder) {
    let running = spawn(builder(&recorder), recorder.clone(), &Config::default());
    running.send("open irc").await;
    running.settle().await;
    let mut feed = running.handle.store().stream("/irc/feed").expect("stream");

    running.handle.cancel();
    timeout(WAIT, running.handle.wait_closed())
        .await
        .expect("session should close");
    assert_eq!(running.handle.state(), SessionState::Closed);
    while timeout(WAIT, feed.recv()).await.expect("stream should end").is_some() {}
    assert!(running.handle.store().list().is_empty());
}

#[rstest]
#[tokio::test]
async fn dropping_every_handle_ends_the_session(recorder: Recorder) {
    let running = spawn(builder(&recorder), recorder.clone(), &Config::default());
    let Running { handle, task, .. } = running;
    drop(handle);
    timeout(WAIT, task)
        .await
        .expect("session should end")
        .expect("task should not panic");
    assert_eq!(recorder.calls(), ["quit"]);
}

#[rstest]
#[tokio::test]
async fn tabs_survive_a_restart_when_logging(recorder: Recorder) {
    let dir = tempfile::tempdir().expect("temp dir");
    let log_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
    let config = Config::default().with_log_dir(log_dir.clone());

    let running = spawn(builder(&recorder), recorder.clone(), &config);
    running.send("open irc").await;
    running.send("open #rust").await;
    running.settle().await;
    running.handle.notify("#rust", "bob", "hey").expect("notify");
    running.quit().await;

    let persisted = std::fs::read_to_string(log_dir.join("tabs")).expect("tabs file");
    assert_eq!(persisted, "0 irc\n!0 #rust\n");

    let again = Recorder::default();
    let restarted = spawn(builder(&again), again.clone(), &config);
    assert_eq!(restarted.read("/tabs"), "0 irc\n!0 #rust\n");
    let irc = restarted.handle.tabs().get("irc").expect("recovered tab");
    assert!(!irc.active);
    assert_eq!(irc.refs, 0);
    restarted.quit().await;
}
