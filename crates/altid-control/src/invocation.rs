//! Parsing a single control line into verb, origin buffer and arguments.

use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::{ControlError, Result};

/// One parsed control line.
///
/// `from` is the buffer the line refers to. When nothing follows it, the
/// segment is treated as the sole argument instead, so `open foo` yields
/// `args == ["foo"]` and no `from`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Verb.
    pub name: String,
    /// Buffer the line was issued from.
    pub from: Option<String>,
    /// Whitespace-separated arguments.
    pub args: Vec<String>,
    /// Raw text following the `from` segment.
    pub text: String,
}

impl Invocation {
    /// Parses `line`, ignoring a trailing line ending.
    ///
    /// A `from` segment wrapped in double quotes may contain spaces. An
    /// argument list opening with a quote is read up to the closing quote and
    /// then split on whitespace; any other argument list is split as is.
    pub fn parse(line: &str) -> Result<Self> {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.trim().is_empty() {
            return Err(ControlError::malformed(line, "empty line"));
        }
        let mut cursor = Cursor::new(trimmed);

        cursor.skip_blanks();
        let name = cursor.word().to_owned();
        cursor.skip_blanks();
        if cursor.at_end() {
            return Ok(Self {
                name,
                ..Self::default()
            });
        }

        let from = cursor
            .segment()
            .ok_or_else(|| ControlError::malformed(line, "unterminated quote"))?
            .to_owned();
        cursor.skip_blanks();
        let text = cursor.rest().to_owned();
        if text.is_empty() {
            return Ok(Self {
                name,
                from: None,
                args: vec![from],
                text,
            });
        }

        let args = match text.strip_prefix('"') {
            Some(quoted) => quoted
                .split_once('"')
                .map(|(inner, _)| inner)
                .ok_or_else(|| ControlError::malformed(line, "unterminated quote"))?,
            None => text.as_str(),
        }
        .split_whitespace()
        .map(ToOwned::to_owned)
        .collect();

        Ok(Self {
            name,
            from: Some(from),
            args,
            text,
        })
    }

    /// First argument; for `verb <word>` lines this is the only word given.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

struct Cursor<'a> {
    line: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Cursor<'a> {
    fn new(line: &'a str) -> Self {
        Self {
            line,
            chars: line.char_indices().peekable(),
        }
    }

    fn position(&mut self) -> usize {
        self.chars.peek().map_or(self.line.len(), |(index, _)| *index)
    }

    fn at_end(&mut self) -> bool {
        self.chars.peek().is_none()
    }

    fn skip_blanks(&mut self) {
        while self.chars.next_if(|(_, c)| matches!(c, ' ' | '\t')).is_some() {}
    }

    fn word(&mut self) -> &'a str {
        let start = self.position();
        while self.chars.next_if(|(_, c)| !matches!(c, ' ' | '\t')).is_some() {}
        let end = self.position();
        self.line.get(start..end).unwrap_or_default()
    }

    /// Next word, or the contents of a double-quoted run.
    fn segment(&mut self) -> Option<&'a str> {
        if self.chars.next_if(|(_, c)| *c == '"').is_none() {
            return Some(self.word());
        }
        let start = self.position();
        while self.chars.next_if(|(_, c)| *c != '"').is_some() {}
        let end = self.position();
        self.chars.next()?;
        self.line.get(start..end)
    }

    fn rest(&mut self) -> &'a str {
        let start = self.position();
        self.line.get(start..).unwrap_or_default()
    }
}
