//! Reading and writing the command listing served by `ctl`.
//!
//! ```text
//! general:
//! 	open|join	<buffer> 	# Open and change buffers to a given service
//! 	quit	# Exits the service
//! media:
//! 	play	<track> 	# Play the named track
//! ```
//!
//! Lines without leading whitespace are headings and must end in a colon.
//! Indented lines are entries: a name, optional `|alias` suffixes, then any
//! mix of `<placeholder>` and bare-word arguments, then an optional
//! `# description` running to the end of the line.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::command::{Command, Heading};
use crate::error::{ControlError, Result};

/// Writes `commands` grouped under their headings.
pub(crate) fn write(out: &mut impl fmt::Write, commands: &[Command]) -> fmt::Result {
    for heading in Heading::ALL {
        let mut group = commands
            .iter()
            .filter(|command| command.heading == heading)
            .peekable();
        if group.peek().is_none() {
            continue;
        }
        writeln!(out, "{heading}:")?;
        for command in group {
            write_entry(out, command)?;
        }
    }
    Ok(())
}

fn write_entry(out: &mut impl fmt::Write, command: &Command) -> fmt::Result {
    write!(out, "\t{}", command.name)?;
    for alias in &command.aliases {
        write!(out, "|{alias}")?;
    }
    if !command.args.is_empty() {
        out.write_char('\t')?;
        for arg in &command.args {
            write!(out, "<{arg}> ")?;
        }
    }
    if !command.description.is_empty() {
        write!(out, "\t# {}", command.description)?;
    }
    out.write_char('\n')
}

/// Parses a listing into commands in the order they appear.
pub(crate) fn parse(text: &str) -> Result<Vec<Command>> {
    let mut lexer = Lexer::new(text);
    let mut state = State::LineStart;
    while state != State::Finished {
        state = lexer.step(state)?;
    }
    Ok(lexer.commands)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    LineStart,
    Heading,
    Name,
    Alias,
    Fields,
    Placeholder,
    Word,
    Description,
    Finished,
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    heading: Option<Heading>,
    entry: Option<Command>,
    commands: Vec<Command>,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 1,
            heading: None,
            entry: None,
            commands: Vec::new(),
        }
    }

    fn step(&mut self, state: State) -> Result<State> {
        match state {
            State::LineStart => self.line_start(),
            State::Heading => self.heading(),
            State::Name => self.name(),
            State::Alias => self.alias(),
            State::Fields => Ok(self.fields()),
            State::Placeholder => self.placeholder(),
            State::Word => Ok(self.word()),
            State::Description => Ok(self.description()),
            State::Finished => Ok(State::Finished),
        }
    }

    fn line_start(&mut self) -> Result<State> {
        match self.chars.peek() {
            None => Ok(State::Finished),
            Some('\n') => Ok(self.end_line()),
            Some(' ' | '\t') => {
                self.skip_blanks();
                if matches!(self.chars.peek(), None | Some('\n')) {
                    return Ok(self.end_line());
                }
                let heading = self
                    .heading
                    .ok_or_else(|| ControlError::listing(self.line, "entry before any heading"))?;
                self.entry = Some(Command {
                    heading,
                    ..Command::default()
                });
                Ok(State::Name)
            }
            Some(_) => Ok(State::Heading),
        }
    }

    fn heading(&mut self) -> Result<State> {
        let token = self.take_until(|c| c == '\n');
        let token = token.trim_end();
        let Some(name) = token.strip_suffix(':') else {
            return Err(ControlError::listing(
                self.line,
                format!("heading '{token}' has no trailing colon"),
            ));
        };
        let heading = name
            .parse::<Heading>()
            .map_err(|_| ControlError::listing(self.line, format!("unknown heading '{name}'")))?;
        self.heading = Some(heading);
        Ok(self.end_line())
    }

    fn name(&mut self) -> Result<State> {
        let name = self.take_until(|c| c == '|' || is_field_break(c));
        if name.is_empty() {
            return Err(ControlError::listing(self.line, "entry has no command name"));
        }
        if let Some(entry) = self.entry.as_mut() {
            entry.name = name;
        }
        Ok(self.after_name())
    }

    fn alias(&mut self) -> Result<State> {
        let alias = self.take_until(|c| c == '|' || is_field_break(c));
        if alias.is_empty() {
            return Err(ControlError::listing(self.line, "empty alias"));
        }
        if let Some(entry) = self.entry.as_mut() {
            entry.aliases.push(alias);
        }
        Ok(self.after_name())
    }

    fn after_name(&mut self) -> State {
        if self.chars.peek() == Some(&'|') {
            self.chars.next();
            State::Alias
        } else {
            State::Fields
        }
    }

    fn fields(&mut self) -> State {
        self.skip_blanks();
        match self.chars.peek() {
            None | Some('\n') => self.end_line(),
            Some('#') => {
                self.chars.next();
                State::Description
            }
            Some('<') => {
                self.chars.next();
                State::Placeholder
            }
            Some(_) => State::Word,
        }
    }

    fn placeholder(&mut self) -> Result<State> {
        let arg = self.take_until(|c| c == '>' || c == '\n');
        if self.chars.next() != Some('>') {
            return Err(ControlError::listing(self.line, "unterminated '<'"));
        }
        self.push_arg(arg);
        Ok(State::Fields)
    }

    fn word(&mut self) -> State {
        let arg = self.take_until(is_field_break);
        self.push_arg(arg);
        State::Fields
    }

    fn description(&mut self) -> State {
        let text = self.take_until(|c| c == '\n');
        if let Some(entry) = self.entry.as_mut() {
            entry.description = text.trim().to_owned();
        }
        self.end_line()
    }

    fn push_arg(&mut self, arg: String) {
        if let Some(entry) = self.entry.as_mut() {
            entry.args.push(arg);
        }
    }

    /// Finishes the current line, emitting any entry it held.
    fn end_line(&mut self) -> State {
        if let Some(entry) = self.entry.take() {
            self.commands.push(entry);
        }
        match self.chars.next() {
            Some(_) => {
                self.line += 1;
                State::LineStart
            }
            None => State::Finished,
        }
    }

    fn skip_blanks(&mut self) {
        while self.chars.next_if(|c| matches!(c, ' ' | '\t')).is_some() {}
    }

    fn take_until(&mut self, stop: impl Fn(char) -> bool) -> String {
        let mut token = String::new();
        while let Some(c) = self.chars.next_if(|c| !stop(*c)) {
            token.push(c);
        }
        token
    }
}

const fn is_field_break(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandTable;
    use rstest::rstest;

    const LISTING: &str = "general:\n\
        \topen|join\t<buffer> \t# Open and change buffers to a given service\n\
        \tquit\t# Exits the service\n\
        \n\
        media:\n\
        \tplay\ttrack\t# Play the named track\n\
        \tpause\n";

    #[test]
    fn entries_are_tokenised_field_by_field() {
        let commands = parse(LISTING).expect("parse");
        assert_eq!(commands.len(), 4);

        let open = &commands[0];
        assert_eq!(open.name, "open");
        assert_eq!(open.aliases, ["join"]);
        assert_eq!(open.args, ["buffer"]);
        assert_eq!(open.description, "Open and change buffers to a given service");
        assert_eq!(open.heading, Heading::Default);

        let play = &commands[2];
        assert_eq!(play.heading, Heading::Media);
        assert_eq!(play.args, ["track"]);

        let pause = &commands[3];
        assert!(pause.args.is_empty());
        assert!(pause.description.is_empty());
    }

    #[test]
    fn multiple_aliases_are_collected() {
        let commands = parse("emotes:\n\tme|action|emote\t<text> \n").expect("parse");
        assert_eq!(commands[0].aliases, ["action", "emote"]);
        assert_eq!(commands[0].heading, Heading::Action);
    }

    #[rstest]
    #[case("\topen\n", 1, "entry before any heading")]
    #[case("general:\n\topen\nchat:\n", 3, "unknown heading 'chat'")]
    #[case("general\n", 1, "heading 'general' has no trailing colon")]
    #[case("general:\n\topen\t<buffer\n", 2, "unterminated '<'")]
    fn malformed_listings_report_the_line(
        #[case] text: &str,
        #[case] expected_line: usize,
        #[case] expected_reason: &str,
    ) {
        let error = parse(text).expect_err("listing should be rejected");
        match error {
            ControlError::MalformedListing { line, reason } => {
                assert_eq!(line, expected_line);
                assert_eq!(reason, expected_reason);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn default_table_prints_in_the_listing_grammar() {
        let printed = CommandTable::defaults().to_string();
        assert!(printed.starts_with("general:\n\topen|join\t<buffer> \t# Open"));
        assert!(printed.ends_with("\tquit\t# Exits the service\n"));
    }

    #[test]
    fn printed_tables_parse_back_to_the_same_commands() {
        let mut table = CommandTable::defaults();
        table
            .register([
                Command::new("nick", Heading::Service)
                    .arg("name")
                    .describe("Change your nickname"),
                Command::new("me", Heading::Action)
                    .alias("action")
                    .arg("text")
                    .describe("Send an action"),
                Command::new("play", Heading::Media).arg("track").arg("volume"),
                Command::new("stop", Heading::Media),
            ])
            .expect("register");

        let reparsed = CommandTable::parse_listing(&table.to_string()).expect("reparse");
        assert_eq!(reparsed, table);
    }

    #[test]
    fn empty_headings_are_not_printed() {
        let mut table = CommandTable::new();
        table
            .register([Command::new("nick", Heading::Service)])
            .expect("register");
        assert_eq!(table.to_string(), "service:\n\tnick\n");
    }
}
