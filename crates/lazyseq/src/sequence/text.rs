//! Pattern matching and splitting over textual sequences.
//!
//! Scanners hold byte offsets into the shared text and are created per
//! traversal, so a sequence of matches re-scans from the start every time it
//! is traversed and an abandoned scan is never resumed.

use core::fmt;
use core::ops::Range;
use std::sync::Arc;

use fancy_regex::Regex;

use super::{Entry, Node, Sequence, SequenceCursor, TextSource, Visit};
use crate::error::{Error, Result};
use crate::value::{Key, Value};

/// Compiled regular expression. A global pattern yields every match; a
/// non-global one only the first.
#[derive(Clone)]
pub struct Pattern {
    regex: Regex,
    global: bool,
}

impl Pattern {
    /// Compiles `source`; an invalid pattern is a configuration error.
    pub fn new(source: &str) -> Result<Self> {
        Ok(Self { regex: Regex::new(source)?, global: false })
    }

    pub fn global(source: &str) -> Result<Self> {
        Ok(Self { regex: Regex::new(source)?, global: true })
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.regex.as_str(), if self.global { "g" } else { "" })
    }
}

#[derive(Debug, Clone)]
pub enum Delimiter {
    Literal(Arc<str>),
    Pattern(Pattern),
}

impl From<&str> for Delimiter {
    fn from(s: &str) -> Self {
        Delimiter::Literal(Arc::from(s))
    }
}

impl From<Pattern> for Delimiter {
    fn from(p: Pattern) -> Self {
        Delimiter::Pattern(p)
    }
}

fn scan_error(e: fancy_regex::Error) -> Error {
    Error::traversal(format!("pattern scan failed: {e}")).with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
}

fn char_width_at(text: &str, at: usize) -> usize {
    text.get(at..).and_then(|rest| rest.chars().next()).map_or(1, char::len_utf8)
}

fn piece(text: &Arc<str>, range: Range<usize>) -> Value {
    Value::from(&text[range])
}

/// Produces successive match ranges.
struct MatchScanner {
    text: Arc<str>,
    pattern: Pattern,
    pos: usize,
    done: bool,
}

impl MatchScanner {
    fn new(text: Arc<str>, pattern: Pattern) -> Self {
        Self { text, pattern, pos: 0, done: false }
    }

    fn next_range(&mut self) -> Result<Option<Range<usize>>> {
        if self.done || self.pos > self.text.len() {
            return Ok(None);
        }
        let Some(m) = self.pattern.regex.find_from_pos(&self.text, self.pos).map_err(scan_error)? else {
            self.done = true;
            return Ok(None);
        };
        if !self.pattern.global {
            self.done = true;
        }
        self.pos = if m.start() == m.end() { m.end() + char_width_at(&self.text, m.end()) } else { m.end() };
        Ok(Some(m.start()..m.end()))
    }
}

/// Produces successive split pieces with the usual text-split rules: an
/// empty literal splits into characters, a delimiter at the end yields a
/// trailing empty piece, and a zero-length pattern match never splits at the
/// position the previous piece ended.
struct Splitter {
    text: Arc<str>,
    delimiter: Delimiter,
    last: usize,
    search: usize,
    done: bool,
}

impl Splitter {
    fn new(text: Arc<str>, delimiter: Delimiter) -> Self {
        Self { text, delimiter, last: 0, search: 0, done: false }
    }

    fn next_range(&mut self) -> Result<Option<Range<usize>>> {
        if self.done {
            return Ok(None);
        }
        let len = self.text.len();
        match &self.delimiter {
            Delimiter::Literal(d) if d.is_empty() => {
                if self.last >= len {
                    self.done = true;
                    return Ok(None);
                }
                let start = self.last;
                self.last += char_width_at(&self.text, start);
                Ok(Some(start..self.last))
            }
            Delimiter::Literal(d) => match self.text[self.last..].find(&**d) {
                Some(offset) => {
                    let start = self.last;
                    self.last = start + offset + d.len();
                    Ok(Some(start..start + offset))
                }
                None => {
                    self.done = true;
                    Ok(Some(self.last..len))
                }
            },
            Delimiter::Pattern(p) => {
                if len == 0 {
                    self.done = true;
                    let matches_empty = p.regex.find(&self.text).map_err(scan_error)?.is_some();
                    return Ok(if matches_empty { None } else { Some(0..0) });
                }
                while self.search < len {
                    let Some(m) = p.regex.find_from_pos(&self.text, self.search).map_err(scan_error)? else {
                        break;
                    };
                    if m.start() >= len {
                        break;
                    }
                    if m.end() == self.last {
                        self.search = m.start() + char_width_at(&self.text, m.start());
                        continue;
                    }
                    let range = self.last..m.start();
                    self.last = m.end();
                    self.search = m.end();
                    return Ok(Some(range));
                }
                self.done = true;
                Ok(Some(self.last..len))
            }
        }
    }
}

pub(super) fn each_matches(text: &Arc<str>, pattern: &Pattern, visit: &mut Visit<'_>) -> Result<bool> {
    let mut scanner = MatchScanner::new(text.clone(), pattern.clone());
    let mut i = 0usize;
    while let Some(range) = scanner.next_range()? {
        if visit(piece(text, range), Key::Index(i))?.is_stop() {
            return Ok(false);
        }
        i += 1;
    }
    Ok(true)
}

pub(super) fn each_split(text: &Arc<str>, delimiter: &Delimiter, visit: &mut Visit<'_>) -> Result<bool> {
    let mut splitter = Splitter::new(text.clone(), delimiter.clone());
    let mut i = 0usize;
    while let Some(range) = splitter.next_range()? {
        if visit(piece(text, range), Key::Index(i))?.is_stop() {
            return Ok(false);
        }
        i += 1;
    }
    Ok(true)
}

pub(super) struct MatchCursor {
    scanner: MatchScanner,
    next: usize,
}

impl MatchCursor {
    pub(super) fn new(text: Arc<str>, pattern: Pattern) -> Self {
        Self { scanner: MatchScanner::new(text, pattern), next: 0 }
    }
}

impl SequenceCursor for MatchCursor {
    fn next_entry(&mut self) -> Result<Option<Entry>> {
        let Some(range) = self.scanner.next_range()? else {
            return Ok(None);
        };
        let idx = self.next;
        self.next += 1;
        Ok(Some((piece(&self.scanner.text, range), Key::Index(idx))))
    }
}

pub(super) struct SplitCursor {
    splitter: Splitter,
    next: usize,
}

impl SplitCursor {
    pub(super) fn new(text: Arc<str>, delimiter: Delimiter) -> Self {
        Self { splitter: Splitter::new(text, delimiter), next: 0 }
    }
}

impl SequenceCursor for SplitCursor {
    fn next_entry(&mut self) -> Result<Option<Entry>> {
        let Some(range) = self.splitter.next_range()? else {
            return Ok(None);
        };
        let idx = self.next;
        self.next += 1;
        Ok(Some((piece(&self.splitter.text, range), Key::Index(idx))))
    }
}

impl Sequence {
    fn text_source(&self, op: &str) -> Result<&TextSource> {
        match self.node() {
            Node::Text(text) => Ok(text),
            _ => Err(Error::configuration(format!("`{op}` needs a textual sequence, got `{}`", self.operator_name()))),
        }
    }

    /// Lazy pieces of the text between occurrences of `delimiter`.
    pub fn split(&self, delimiter: impl Into<Delimiter>) -> Result<Sequence> {
        let text = self.text_source("split")?.shared().clone();
        Ok(self.derive(Node::Split { text, delimiter: delimiter.into() }))
    }

    /// Lazy matched substrings: all of them for a global pattern, at most one
    /// otherwise.
    pub fn matches(&self, pattern: &Pattern) -> Result<Sequence> {
        let text = self.text_source("matches")?.shared().clone();
        Ok(self.derive(Node::Matches { text, pattern: pattern.clone() }))
    }

    /// Character at `i`, `Undefined` past the end.
    pub fn char_at(&self, i: usize) -> Result<Value> {
        Ok(self.text_source("char_at")?.char_at(i).map(Value::from).unwrap_or_default())
    }

    /// Characters `start..end` (clamped) as a new textual sequence.
    pub fn substring(&self, start: usize, end: Option<usize>) -> Result<Sequence> {
        let text = self.text_source("substring")?;
        let len = text.char_len();
        let end = end.unwrap_or(len).min(len);
        let start = start.min(end);
        let slice = &text.as_str()[text.byte_offset(start)..text.byte_offset(end)];
        Ok(self.derive(Node::Text(TextSource::new(Arc::from(slice)))))
    }
}
