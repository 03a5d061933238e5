//! Command records and the registry served through the `ctl` file.

use std::fmt;

use strum::{Display, EnumString};

use crate::error::{ControlError, Result};
use crate::invocation::Invocation;
use crate::listing;

/// Display group of a command.
///
/// Variant order is the order headings appear in a listing.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, EnumString, Display,
)]
#[strum(ascii_case_insensitive)]
pub enum Heading {
    /// Buffer management; listed as `general:`.
    #[default]
    #[strum(serialize = "general")]
    Default,
    /// Media commands; listed as `media:`.
    #[strum(serialize = "media")]
    Media,
    /// Emotes and similar actions; listed as `emotes:`.
    #[strum(serialize = "emotes")]
    Action,
    /// Service-wide commands; listed as `service:`.
    #[strum(serialize = "service")]
    Service,
}

impl Heading {
    /// Every heading in listing order.
    pub const ALL: [Self; 4] = [Self::Default, Self::Media, Self::Action, Self::Service];
}

/// A registered command, or a resolved invocation of one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    /// Verb.
    pub name: String,
    /// One-line help text.
    pub description: String,
    /// Display group.
    pub heading: Heading,
    /// Argument placeholders when registered; actual arguments once resolved.
    pub args: Vec<String>,
    /// Alternative verbs.
    pub aliases: Vec<String>,
    /// Buffer the invocation was issued from.
    pub from: Option<String>,
}

impl Command {
    /// Command called `name` under `heading`.
    pub fn new(name: impl Into<String>, heading: Heading) -> Self {
        Self {
            name: name.into(),
            heading,
            ..Self::default()
        }
    }

    /// Sets the help text.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Appends an argument placeholder.
    #[must_use]
    pub fn arg(mut self, placeholder: impl Into<String>) -> Self {
        self.args.push(placeholder.into());
        self
    }

    /// Appends an alias.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Whether `verb` is this command's name or one of its aliases.
    #[must_use]
    pub fn answers_to(&self, verb: &str) -> bool {
        self.name == verb || self.aliases.iter().any(|alias| alias == verb)
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Registered commands, kept sorted by heading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandTable {
    commands: Vec<Command>,
}

impl CommandTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding the buffer management commands every service accepts.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            commands: vec![
                Command::new("open", Heading::Default)
                    .alias("join")
                    .arg("buffer")
                    .describe("Open and change buffers to a given service"),
                Command::new("close", Heading::Default)
                    .alias("part")
                    .arg("buffer")
                    .describe("Close a buffer and return to the last opened previously"),
                Command::new("buffer", Heading::Default)
                    .arg("buffer")
                    .describe("Change to the named buffer"),
                Command::new("link", Heading::Default)
                    .arg("to")
                    .arg("from")
                    .describe(
                        "Overwrite the current <to> buffer with <from>, switching to from after. This destroys <to>",
                    ),
                Command::new("quit", Heading::Default).describe("Exits the service"),
            ],
        }
    }

    /// Adds `commands`, keeping every name and alias unique.
    ///
    /// Nothing is added if any name clashes.
    pub fn register(&mut self, commands: impl IntoIterator<Item = Command>) -> Result<()> {
        let incoming: Vec<Command> = commands.into_iter().collect();
        let mut seen: Vec<&str> = self.commands.iter().flat_map(Command::names).collect();
        for command in &incoming {
            for name in command.names() {
                if seen.contains(&name) {
                    return Err(ControlError::DuplicateCommand {
                        name: name.to_owned(),
                    });
                }
                seen.push(name);
            }
        }
        self.commands.extend(incoming);
        self.commands.sort_by_key(|command| command.heading);
        Ok(())
    }

    /// Command answering to `verb`.
    #[must_use]
    pub fn resolve(&self, verb: &str) -> Option<&Command> {
        self.commands.iter().find(|command| command.answers_to(verb))
    }

    /// Registered commands in listing order.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of registered commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Parses `line` and resolves its verb.
    ///
    /// The returned command carries the invocation's arguments and, except
    /// for service commands, the buffer it came from.
    pub fn build_from(&self, line: &str) -> Result<Command> {
        let invocation = Invocation::parse(line)?;
        self.resolve_invocation(&invocation)
    }

    /// Resolves an already parsed invocation.
    pub fn resolve_invocation(&self, invocation: &Invocation) -> Result<Command> {
        let registered = self
            .resolve(&invocation.name)
            .ok_or_else(|| ControlError::unknown(&invocation.name))?;
        let mut command = registered.clone();
        command.args.clone_from(&invocation.args);
        command.from = match command.heading {
            Heading::Service => None,
            _ => invocation.from.clone(),
        };
        Ok(command)
    }

    /// Parses a listing as served by the `ctl` file.
    pub fn parse_listing(text: &str) -> Result<Self> {
        let mut table = Self::new();
        table.register(listing::parse(text)?)?;
        Ok(table)
    }
}

impl fmt::Display for CommandTable {
    /// Renders the listing grammar understood by [`CommandTable::parse_listing`].
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        listing::write(formatter, &self.commands)
    }
}
