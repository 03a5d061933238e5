//! Per-buffer activity tracking rendered into the `tabs` file.

use std::fmt;
use std::sync::Arc;

use altid_store::ByteLog;
use parking_lot::Mutex;
use tracing::warn;

use crate::SESSION_TARGET;

/// Activity state of one buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tab {
    /// Buffer name.
    pub name: String,
    /// Whether some client currently has the buffer selected.
    pub active: bool,
    /// Whether something in the buffer demands attention.
    pub alert: bool,
    /// Writes seen while inactive.
    pub unread: u32,
    /// Clients with the buffer selected.
    pub refs: u32,
}

impl Tab {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    /// Reads one `tabs` line: either `[!]<unread> <name>` or a bare name.
    fn recover(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (alert, rest) = match line.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let parsed = rest
            .split_once(' ')
            .and_then(|(count, name)| Some((count.parse::<u32>().ok()?, name.trim())))
            .filter(|(_, name)| !name.is_empty());
        Some(match parsed {
            Some((unread, name)) => Self {
                alert,
                unread,
                ..Self::new(name)
            },
            None => Self::new(line),
        })
    }

    fn merge(&mut self, other: Self) {
        self.refs = self.refs.saturating_add(other.refs);
        self.alert |= other.alert;
        self.active = self.refs > 0;
        self.unread = if self.active {
            0
        } else {
            self.unread.saturating_add(other.unread)
        };
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.alert {
            f.write_str("!")?;
        }
        write!(f, "{} {}", self.unread, self.name)
    }
}

/// Insertion-ordered set of [`Tab`]s.
///
/// Every mutation re-renders the attached `tabs` log, when there is one, so
/// readers always see the complete current state.
#[derive(Debug, Default)]
pub struct TabRegistry {
    tabs: Mutex<Vec<Tab>>,
    sink: Option<Arc<ByteLog>>,
}

impl TabRegistry {
    /// Registry without a backing file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that renders into `sink` after each change.
    #[must_use]
    pub fn with_sink(sink: Arc<ByteLog>) -> Self {
        Self {
            tabs: Mutex::default(),
            sink: Some(sink),
        }
    }

    /// Rebuilds a registry from `tabs` file contents.
    ///
    /// Recovered tabs start inactive with no references.
    #[must_use]
    pub fn recover(contents: &str, sink: Option<Arc<ByteLog>>) -> Self {
        let mut tabs: Vec<Tab> = Vec::new();
        for tab in contents.lines().filter_map(Tab::recover) {
            if !tabs.iter().any(|existing| existing.name == tab.name) {
                tabs.push(tab);
            }
        }
        let registry = Self {
            tabs: Mutex::new(tabs),
            sink,
        };
        registry.publish(&registry.tabs.lock());
        registry
    }

    /// Gets or creates the tab for `name`.
    pub fn tab(&self, name: &str) -> Tab {
        self.update(name, |_| {})
    }

    /// Forgets `name`; reports whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        let mut tabs = self.tabs.lock();
        let before = tabs.len();
        tabs.retain(|tab| tab.name != name);
        let removed = tabs.len() != before;
        if removed {
            self.publish(&tabs);
        }
        removed
    }

    /// Records one more client selecting `name`.
    pub fn active(&self, name: &str) -> Tab {
        self.update(name, |tab| {
            tab.refs = tab.refs.saturating_add(1);
            tab.active = true;
        })
    }

    /// Records one client leaving `name`; the last one makes it inactive.
    pub fn done(&self, name: &str) -> Tab {
        self.update(name, |tab| {
            tab.refs = tab.refs.saturating_sub(1);
            if tab.refs == 0 {
                tab.active = false;
                tab.unread = 0;
            }
        })
    }

    /// Notes new content in `name`.
    ///
    /// Inactive tabs count it as unread; active tabs clear unread and alert.
    pub fn activity(&self, name: &str) -> Tab {
        self.update(name, |tab| {
            if tab.active {
                tab.unread = 0;
                tab.alert = false;
            } else {
                tab.unread = tab.unread.saturating_add(1);
            }
        })
    }

    /// Flags `name` as demanding attention.
    pub fn alert(&self, name: &str) -> Tab {
        self.update(name, |tab| tab.alert = true)
    }

    /// Renames `from` to `to` in place; reports whether `from` existed.
    ///
    /// An existing tab called `to` is folded into the renamed one: client
    /// references and unread counts add up and either alert carries over.
    pub fn rename(&self, from: &str, to: &str) -> bool {
        let mut tabs = self.tabs.lock();
        if !tabs.iter().any(|tab| tab.name == from) {
            return false;
        }
        if from != to {
            let absorbed = tabs
                .iter()
                .position(|tab| tab.name == to)
                .map(|index| tabs.remove(index));
            if let Some(tab) = tabs.iter_mut().find(|tab| tab.name == from) {
                to.clone_into(&mut tab.name);
                if let Some(other) = absorbed {
                    tab.merge(other);
                }
            }
        }
        self.publish(&tabs);
        true
    }

    /// Copy of every tab in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Tab> {
        self.tabs.lock().clone()
    }

    /// Tab called `name`, if registered.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Tab> {
        self.tabs.lock().iter().find(|tab| tab.name == name).cloned()
    }

    /// Current `tabs` file text.
    #[must_use]
    pub fn render(&self) -> String {
        render(&self.tabs.lock())
    }

    fn update(&self, name: &str, change: impl FnOnce(&mut Tab)) -> Tab {
        let mut tabs = self.tabs.lock();
        let index = match tabs.iter().position(|tab| tab.name == name) {
            Some(index) => index,
            None => {
                tabs.push(Tab::new(name));
                tabs.len() - 1
            }
        };
        let tab = match tabs.get_mut(index) {
            Some(tab) => {
                change(tab);
                tab.clone()
            }
            None => Tab::new(name),
        };
        self.publish(&tabs);
        tab
    }

    fn publish(&self, tabs: &[Tab]) {
        let Some(sink) = &self.sink else {
            return;
        };
        if let Err(error) = sink.replace(render(tabs).as_bytes()) {
            warn!(target: SESSION_TARGET, %error, "failed to render tabs");
        }
    }
}

fn render(tabs: &[Tab]) -> String {
    tabs.iter().map(|tab| format!("{tab}\n")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn sink() -> Arc<ByteLog> {
        Arc::new(ByteLog::new("/tabs"))
    }

    fn rendered(sink: &ByteLog) -> String {
        String::from_utf8(sink.snapshot().expect("snapshot")).expect("utf8")
    }

    #[test]
    fn one_done_undoes_one_active() {
        let tabs = TabRegistry::new();
        tabs.activity("irc");
        tabs.active("irc");
        let tab = tabs.done("irc");
        assert!(!tab.active);
        assert_eq!(tab.unread, 0);
    }

    #[test]
    fn tabs_stay_active_while_referenced() {
        let tabs = TabRegistry::new();
        tabs.active("irc");
        tabs.active("irc");
        let tab = tabs.done("irc");
        assert!(tab.active);
        assert_eq!(tab.refs, 1);
    }

    #[test]
    fn done_saturates_at_zero() {
        let tabs = TabRegistry::new();
        let tab = tabs.done("irc");
        assert_eq!(tab.refs, 0);
        assert!(!tab.active);
    }

    #[test]
    fn activity_counts_only_while_inactive() {
        let tabs = TabRegistry::new();
        tabs.activity("irc");
        tabs.alert("irc");
        assert_eq!(tabs.activity("irc").unread, 2);

        tabs.active("irc");
        let tab = tabs.activity("irc");
        assert_eq!(tab.unread, 0);
        assert!(!tab.alert);
    }

    #[rstest]
    fn every_change_rerenders_the_sink(sink: Arc<ByteLog>) {
        let tabs = TabRegistry::with_sink(Arc::clone(&sink));
        tabs.tab("irc");
        tabs.activity("#rust");
        tabs.alert("#rust");
        assert_eq!(rendered(&sink), "0 irc\n!1 #rust\n");

        tabs.remove("irc");
        assert_eq!(rendered(&sink), "!1 #rust\n");
        assert_eq!(tabs.render(), "!1 #rust\n");
    }

    #[rstest]
    fn rename_keeps_position(sink: Arc<ByteLog>) {
        let tabs = TabRegistry::with_sink(Arc::clone(&sink));
        tabs.tab("a");
        tabs.tab("b");
        tabs.tab("c");
        assert!(tabs.rename("b", "d"));
        assert_eq!(rendered(&sink), "0 a\n0 d\n0 c\n");
        assert!(!tabs.rename("ghost", "x"));
    }

    #[test]
    fn rename_onto_an_existing_tab_merges_them() {
        let tabs = TabRegistry::new();
        tabs.active("a");
        tabs.tab("b");
        tabs.active("c");
        tabs.alert("c");
        assert!(tabs.rename("a", "c"));

        let snapshot = tabs.snapshot();
        let names: Vec<&str> = snapshot.iter().map(|tab| tab.name.as_str()).collect();
        assert_eq!(names, ["c", "b"]);
        let merged = &snapshot[0];
        assert_eq!(merged.refs, 2);
        assert!(merged.active);
        assert!(merged.alert);

        let tab = tabs.done("c");
        assert!(tab.active, "one client still has the merged tab selected");
        assert_eq!(tab.refs, 1);
    }

    #[test]
    fn merging_inactive_tabs_adds_their_unread_counts() {
        let tabs = TabRegistry::new();
        tabs.activity("a");
        tabs.activity("c");
        tabs.activity("c");
        tabs.rename("a", "c");
        let tab = tabs.get("c").expect("merged tab");
        assert_eq!(tab.unread, 3);
        assert!(!tab.active);
    }

    #[rstest]
    fn recovery_accepts_rendered_and_bare_lines(sink: Arc<ByteLog>) {
        let tabs = TabRegistry::recover("!3 #rust\n0 irc\nbare name\n\nirc\n", Some(sink));
        let snapshot = tabs.snapshot();
        assert_eq!(snapshot.len(), 3);

        let rust = &snapshot[0];
        assert_eq!(rust.name, "#rust");
        assert!(rust.alert);
        assert_eq!(rust.unread, 3);
        assert!(!rust.active);
        assert_eq!(rust.refs, 0);

        assert_eq!(snapshot[2].name, "bare name");
        assert_eq!(tabs.render(), "!3 #rust\n0 irc\n0 bare name\n");
    }
}
