//! Deferred sequence graph.
//!
//! A [`Sequence`] is an immutable handle to one node of a transformation
//! chain. Nodes form a closed set of variants; each variant knows how to
//! traverse itself by pushing elements into a visitor ([`Sequence::each`]) and
//! by handing out a pull cursor ([`Sequence::cursor`]). Random-access variants
//! additionally answer `get(i)` without walking their parent, which is what
//! lets `map`, `take`, `drop`, `reverse` and `zip` fuse into index arithmetic.

mod cached;
mod cursor;
mod keyed;
mod set_ops;
mod source;
mod terminal;
mod text;
mod transform;

use core::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Tuning;
use crate::error::{Error, Result};
use crate::memo::MemoCell;
use crate::registry::Behavior;
use crate::value::{Key, ObjectMap, Value};

pub(crate) use cached::Plan;
pub use cursor::{Cursor, Entry, Iter, SequenceCursor};
pub(crate) use cursor::{VecCursor, traverse_cursor};
pub use source::{Source, VecSource, generate, range, range_by, repeat, wrap};
pub(crate) use source::TextSource;
pub use text::{Delimiter, Pattern};

/// Continuation signal returned by every visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

impl Flow {
    pub fn is_stop(self) -> bool {
        self == Flow::Stop
    }
}

impl From<bool> for Flow {
    /// `true` keeps going, `false` stops.
    fn from(keep_going: bool) -> Self {
        if keep_going { Flow::Continue } else { Flow::Stop }
    }
}

/// Push-traversal visitor: receives each element with its index or key.
pub type Visit<'a> = dyn FnMut(Value, Key) -> Result<Flow> + 'a;

pub(crate) type Selector = Arc<dyn Fn(&Value, &Key) -> Result<Value> + Send + Sync>;
pub(crate) type Predicate = Arc<dyn Fn(&Value, &Key) -> Result<bool> + Send + Sync>;
pub(crate) type Generator = Arc<dyn Fn(usize) -> Result<Value> + Send + Sync>;
pub(crate) type Combiner = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;
pub(crate) type Inspector = Arc<dyn Fn(&Value, &Key) -> Result<()> + Send + Sync>;

/// Contract a sequence satisfies beyond plain traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `get(i)` and a known `length()`.
    Indexed,
    /// Key/value pairs in the source's key order; `get_key(name)`.
    Keyed,
    /// Indexed over the characters of a text; adds `split` and `matches`.
    Textual,
    /// Index rule with an optional length; `get(i)` for any `i`.
    Generated,
    /// Delivered through scheduled steps; only `each_async` traverses it.
    Async,
    /// Traversal only.
    Generic,
}

/// How a node answers positional reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    /// No positional reads: elements exist only by traversal.
    Sequential,
    /// `get(i)` is valid, `len` elements.
    Bounded(usize),
    /// `get(i)` is valid for every `i`.
    Unbounded,
}

impl Access {
    pub(crate) fn is_random(self) -> bool {
        !matches!(self, Access::Sequential)
    }
}

pub(crate) enum Node {
    Array(Arc<Vec<Value>>),
    Object(Arc<ObjectMap>),
    Text(TextSource),
    Generated { rule: Generator, len: Option<usize> },
    External(Arc<dyn Source>),
    Map { parent: Sequence, f: Selector },
    Filter { parent: Sequence, p: Predicate },
    Take { parent: Sequence, n: usize },
    Drop { parent: Sequence, n: usize },
    Reverse { parent: Sequence },
    Concat { parent: Sequence, others: Vec<Sequence> },
    Flatten { parent: Sequence },
    Zip { parent: Sequence, others: Vec<Sequence>, combine: Option<Combiner> },
    Chunk { parent: Sequence, size: usize },
    Consecutive { parent: Sequence, size: usize },
    Tap { parent: Sequence, f: Inspector },
    Lines { parent: Sequence },
    Uniq { parent: Sequence, key: Option<Selector> },
    Without { parent: Sequence, excluded: Sequence },
    Intersection { parent: Sequence, others: Vec<Sequence> },
    Cached { parent: Sequence, plan: Plan, cache: MemoCell<Arc<Vec<Entry>>> },
    Matches { text: Arc<str>, pattern: Pattern },
    Split { text: Arc<str>, delimiter: Delimiter },
    Custom { parent: Sequence, name: Arc<str>, behavior: Arc<Behavior>, args: Arc<[Value]> },
    Async { parent: Sequence, interval: Option<Duration> },
}

impl Node {
    fn name(&self) -> &str {
        match self {
            Node::Array(_) => "array",
            Node::Object(_) => "object",
            Node::Text(_) => "text",
            Node::Generated { .. } => "generated",
            Node::External(_) => "external",
            Node::Map { .. } => "map",
            Node::Filter { .. } => "filter",
            Node::Take { .. } => "take",
            Node::Drop { .. } => "drop",
            Node::Reverse { .. } => "reverse",
            Node::Concat { .. } => "concat",
            Node::Flatten { .. } => "flatten",
            Node::Zip { .. } => "zip",
            Node::Chunk { .. } => "chunk",
            Node::Consecutive { .. } => "consecutive",
            Node::Tap { .. } => "tap",
            Node::Lines { .. } => "lines",
            Node::Uniq { .. } => "uniq",
            Node::Without { .. } => "without",
            Node::Intersection { .. } => "intersection",
            Node::Cached { plan, .. } => plan.name(),
            Node::Matches { .. } => "matches",
            Node::Split { .. } => "split",
            Node::Custom { name, .. } => name,
            Node::Async { .. } => "async",
        }
    }

    fn parent(&self) -> Option<&Sequence> {
        match self {
            Node::Array(_)
            | Node::Object(_)
            | Node::Text(_)
            | Node::Generated { .. }
            | Node::External(_)
            | Node::Matches { .. }
            | Node::Split { .. } => None,
            Node::Map { parent, .. }
            | Node::Filter { parent, .. }
            | Node::Take { parent, .. }
            | Node::Drop { parent, .. }
            | Node::Reverse { parent }
            | Node::Concat { parent, .. }
            | Node::Flatten { parent }
            | Node::Zip { parent, .. }
            | Node::Chunk { parent, .. }
            | Node::Consecutive { parent, .. }
            | Node::Tap { parent, .. }
            | Node::Lines { parent }
            | Node::Uniq { parent, .. }
            | Node::Without { parent, .. }
            | Node::Intersection { parent, .. }
            | Node::Cached { parent, .. }
            | Node::Custom { parent, .. }
            | Node::Async { parent, .. } => Some(parent),
        }
    }
}

/// Immutable handle to a deferred chain of transformations.
///
/// Cloning is cheap. Building a sequence never reads its source; elements are
/// produced only when a terminal operation (`each`, `to_vec`, `get`, ...)
/// drives the chain.
#[derive(Clone)]
pub struct Sequence {
    node: Arc<Node>,
    tuning: Tuning,
}

impl Sequence {
    pub(crate) fn from_node(node: Node) -> Self {
        Self { node: Arc::new(node), tuning: Tuning::default() }
    }

    /// New node downstream of `self`, inheriting its tuning.
    pub(crate) fn derive(&self, node: Node) -> Self {
        Self { node: Arc::new(node), tuning: self.tuning }
    }

    pub(crate) fn node(&self) -> &Node {
        &self.node
    }

    pub fn tuning(&self) -> Tuning {
        self.tuning
    }

    /// Same chain, with `tuning` used by operators added from here on.
    #[must_use]
    pub fn with_tuning(&self, tuning: Tuning) -> Self {
        Self { node: self.node.clone(), tuning }
    }

    pub fn ptr_eq(&self, other: &Sequence) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    pub(crate) fn address(&self) -> usize {
        Arc::as_ptr(&self.node).cast::<()>() as usize
    }

    /// Name of the operator (or source kind) at the head of the chain.
    pub fn operator_name(&self) -> &str {
        self.node.name()
    }

    pub fn is_async(&self) -> bool {
        match &*self.node {
            Node::Async { .. } => true,
            node => node.parent().is_some_and(Sequence::is_async),
        }
    }

    pub(crate) fn async_interval(&self) -> Option<Option<Duration>> {
        match &*self.node {
            Node::Async { interval, .. } => Some(*interval),
            node => node.parent().and_then(Sequence::async_interval),
        }
    }

    pub fn capability(&self) -> Capability {
        if self.is_async() {
            return Capability::Async;
        }
        match &*self.node {
            Node::Array(_) => Capability::Indexed,
            Node::Object(_) => Capability::Keyed,
            Node::Text(_) => Capability::Textual,
            Node::Generated { .. } => Capability::Generated,
            Node::Filter { parent, .. } if parent.capability() == Capability::Keyed => Capability::Keyed,
            Node::Cached { plan, .. } if plan.is_keyed() => Capability::Keyed,
            _ => match self.access() {
                Access::Bounded(_) => Capability::Indexed,
                Access::Unbounded => Capability::Generated,
                Access::Sequential => Capability::Generic,
            },
        }
    }

    pub(crate) fn access(&self) -> Access {
        match &*self.node {
            Node::Array(items) => Access::Bounded(items.len()),
            Node::Text(text) => Access::Bounded(text.char_len()),
            Node::Generated { len, .. } => len.map_or(Access::Unbounded, Access::Bounded),
            Node::Map { parent, .. } => parent.access(),
            Node::Take { parent, n } => match parent.access() {
                Access::Bounded(len) => Access::Bounded(len.min(*n)),
                Access::Unbounded => Access::Bounded(*n),
                Access::Sequential => Access::Sequential,
            },
            Node::Drop { parent, n } => match parent.access() {
                Access::Bounded(len) => Access::Bounded(len.saturating_sub(*n)),
                other => other,
            },
            Node::Reverse { parent } => parent.access(),
            Node::Zip { parent, others, .. } => transform::zip_access(parent, others),
            _ => Access::Sequential,
        }
    }

    /// Number of elements, when it is known without traversal.
    ///
    /// `None` for unbounded generated sequences and for every sequence whose
    /// length can only be learned by walking it (see [`Sequence::size`]).
    pub fn length(&self) -> Option<usize> {
        match self.access() {
            Access::Bounded(len) => Some(len),
            Access::Unbounded | Access::Sequential => None,
        }
    }

    /// Positional read for random-access nodes. Out-of-bounds reads yield
    /// `Undefined`; callers guarantee `self.access().is_random()`.
    pub(crate) fn get_at(&self, i: usize) -> Result<Value> {
        if let Access::Bounded(len) = self.access() {
            if i >= len {
                return Ok(Value::Undefined);
            }
        }
        match &*self.node {
            Node::Array(items) => Ok(items.get(i).cloned().unwrap_or_default()),
            Node::Text(text) => Ok(text.char_at(i).map(Value::from).unwrap_or_default()),
            Node::Generated { rule, .. } => rule(i),
            Node::Map { parent, f } => {
                let v = parent.get_at(i)?;
                f(&v, &parent.key_at(i))
            }
            Node::Take { parent, .. } => parent.get_at(i),
            Node::Drop { parent, n } => match i.checked_add(*n) {
                Some(j) => parent.get_at(j),
                None => Ok(Value::Undefined),
            },
            Node::Reverse { parent } => match parent.access() {
                Access::Bounded(len) => parent.get_at(len - 1 - i),
                _ => Err(Error::data("reverse of an unbounded sequence has no positions")),
            },
            Node::Zip { parent, others, combine } => transform::zip_get(parent, others, combine.as_ref(), i),
            _ => Err(Error::data(format!("`{}` does not support positional access", self.node.name()))),
        }
    }

    /// Key delivered alongside `get_at(i)` during traversal.
    pub(crate) fn key_at(&self, i: usize) -> Key {
        match &*self.node {
            Node::Take { parent, .. } | Node::Zip { parent, .. } => parent.key_at(i),
            Node::Drop { parent, n } => parent.key_at(i.saturating_add(*n)),
            _ => Key::Index(i),
        }
    }

    /// Index loop shared by every random-access node.
    pub(crate) fn each_indexed(&self, visit: &mut Visit<'_>) -> Result<bool> {
        let bound = match self.access() {
            Access::Bounded(len) => Some(len),
            Access::Unbounded => None,
            Access::Sequential => return Err(Error::data("index traversal of a sequential node")),
        };
        let mut i = 0usize;
        while bound.is_none_or(|len| i < len) {
            let value = self.get_at(i)?;
            if visit(value, self.key_at(i))?.is_stop() {
                return Ok(false);
            }
            i += 1;
        }
        Ok(true)
    }

    /// Push traversal without the asynchronous-chain guard; every operator
    /// drives its upstream through this.
    pub(crate) fn each_dyn(&self, visit: &mut Visit<'_>) -> Result<bool> {
        match &*self.node {
            Node::Array(items) => source::each_array(items, visit),
            Node::Object(map) => source::each_object(map, visit),
            Node::Text(text) => source::each_text(text, visit),
            Node::Generated { .. } => self.each_indexed(visit),
            Node::External(src) => src.each(visit),
            Node::Map { parent, f } => transform::each_map(self, parent, f, visit),
            Node::Filter { parent, p } => transform::each_filter(parent, p, visit),
            Node::Take { parent, n } => transform::each_take(self, parent, *n, visit),
            Node::Drop { parent, n } => transform::each_drop(self, parent, *n, visit),
            Node::Reverse { .. } => self.each_indexed(visit),
            Node::Concat { parent, others } => transform::each_concat(parent, others, visit),
            Node::Flatten { parent } => transform::each_flatten(parent, visit),
            Node::Zip { parent, others, combine } => transform::each_zip(self, parent, others, combine.as_ref(), visit),
            Node::Chunk { parent, size } => transform::each_chunk(parent, *size, visit),
            Node::Consecutive { parent, size } => transform::each_consecutive(parent, *size, visit),
            Node::Tap { parent, f } => transform::each_tap(parent, f, visit),
            Node::Lines { parent } => transform::each_lines(parent, visit),
            Node::Uniq { parent, key } => set_ops::each_uniq(parent, key.as_ref(), self.tuning, visit),
            Node::Without { parent, excluded } => set_ops::each_without(parent, excluded, self.tuning, visit),
            Node::Intersection { parent, others } => set_ops::each_intersection(parent, others, self.tuning, visit),
            Node::Cached { .. } => {
                let entries = self.materialized()?;
                cursor::each_entries(&entries, visit)
            }
            Node::Matches { text, pattern } => text::each_matches(text, pattern, visit),
            Node::Split { text, delimiter } => text::each_split(text, delimiter, visit),
            Node::Custom { parent, behavior, args, .. } => behavior.run_each(parent, args, visit),
            Node::Async { parent, .. } => parent.each_dyn(visit),
        }
    }

    /// Pull cursor without the asynchronous-chain guard.
    pub(crate) fn cursor_dyn(&self) -> Result<Box<dyn SequenceCursor>> {
        if self.access().is_random() {
            return Ok(Box::new(cursor::IndexCursor::new(self.clone())));
        }
        match &*self.node {
            Node::Object(map) => Ok(Box::new(cursor::ObjectCursor::new(map.clone()))),
            Node::External(_) => cursor::buffered(self),
            Node::Map { parent, f } => Ok(Box::new(transform::MapCursor::new(parent.cursor_dyn()?, f.clone()))),
            Node::Filter { parent, p } => Ok(Box::new(transform::FilterCursor::new(parent.cursor_dyn()?, p.clone()))),
            Node::Take { parent, n } => {
                if *n == 0 {
                    return Ok(Box::new(VecCursor::empty()));
                }
                Ok(Box::new(transform::TakeCursor::new(parent.cursor_dyn()?, *n)))
            }
            Node::Drop { parent, n } => Ok(Box::new(transform::DropCursor::new(parent.cursor_dyn()?, *n))),
            Node::Concat { parent, others } => Ok(Box::new(transform::ConcatCursor::new(parent, others)?)),
            Node::Flatten { parent } => Ok(Box::new(transform::FlattenCursor::new(parent.cursor_dyn()?))),
            Node::Zip { parent, others, combine } => {
                Ok(Box::new(transform::ZipCursor::new(parent, others, combine.clone())?))
            }
            Node::Chunk { parent, size } => Ok(Box::new(transform::ChunkCursor::new(parent.cursor_dyn()?, *size))),
            Node::Consecutive { parent, size } => {
                Ok(Box::new(transform::ConsecutiveCursor::new(parent.cursor_dyn()?, *size)))
            }
            Node::Tap { parent, f } => Ok(Box::new(transform::TapCursor::new(parent.cursor_dyn()?, f.clone()))),
            Node::Lines { parent } => Ok(Box::new(transform::LinesCursor::new(parent.cursor_dyn()?))),
            Node::Uniq { parent, key } => Ok(Box::new(set_ops::UniqCursor::new(parent, key.clone(), self.tuning)?)),
            Node::Without { parent, excluded } => {
                Ok(Box::new(set_ops::WithoutCursor::new(parent, excluded, self.tuning)?))
            }
            Node::Intersection { parent, others } => {
                Ok(Box::new(set_ops::IntersectionCursor::new(parent, others, self.tuning)?))
            }
            Node::Cached { .. } => Ok(Box::new(VecCursor::new(self.materialized()?))),
            Node::Matches { text, pattern } => Ok(Box::new(text::MatchCursor::new(text.clone(), pattern.clone()))),
            Node::Split { text, delimiter } => Ok(Box::new(text::SplitCursor::new(text.clone(), delimiter.clone()))),
            Node::Custom { parent, behavior, args, .. } => behavior.open_cursor(parent, args),
            Node::Async { parent, .. } => parent.cursor_dyn(),
            Node::Array(_) | Node::Text(_) | Node::Generated { .. } | Node::Reverse { .. } => {
                Err(Error::data(format!("`{}` lost positional access", self.node.name())))
            }
        }
    }

    fn ensure_sync(&self) -> Result<()> {
        if self.is_async() {
            return Err(Error::configuration(
                "an asynchronous sequence cannot be traversed synchronously; use each_async",
            ));
        }
        Ok(())
    }

    /// Push traversal: calls `visitor` with every element and its index or
    /// key until the sequence ends (`Ok(true)`) or the visitor returns
    /// [`Flow::Stop`] (`Ok(false)`). An error from the visitor or from any
    /// selector upstream aborts the traversal and is returned as-is.
    pub fn each<F>(&self, mut visitor: F) -> Result<bool>
    where
        F: FnMut(Value, Key) -> Result<Flow>,
    {
        self.ensure_sync()?;
        self.each_dyn(&mut visitor)
    }

    /// Pull traversal. Every call starts a fresh, independent traversal.
    pub fn cursor(&self) -> Result<Cursor> {
        self.ensure_sync()?;
        Ok(Cursor::new(self.cursor_dyn()?))
    }

    /// Iterator over element values (keys dropped).
    pub fn iter(&self) -> Result<Iter> {
        self.ensure_sync()?;
        Ok(Iter::new(self.cursor_dyn()?))
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chain = vec![self.node.name().to_string()];
        let mut cur = self.node.parent();
        while let Some(seq) = cur {
            chain.push(seq.node.name().to_string());
            cur = seq.node.parent();
        }
        chain.reverse();
        write!(f, "Sequence({})", chain.join(" -> "))
    }
}

impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// Handle an operator implementation receives for its upstream.
///
/// Unlike the public traversal entry points it does not refuse asynchronous
/// chains, so custom operators keep working underneath `asynchronous()`.
pub struct Upstream<'a>(&'a Sequence);

impl<'a> Upstream<'a> {
    pub(crate) fn new(seq: &'a Sequence) -> Self {
        Self(seq)
    }

    pub fn sequence(&self) -> &Sequence {
        self.0
    }

    pub fn each<F>(&self, mut visitor: F) -> Result<bool>
    where
        F: FnMut(Value, Key) -> Result<Flow>,
    {
        self.0.each_dyn(&mut visitor)
    }

    pub fn cursor(&self) -> Result<Box<dyn SequenceCursor>> {
        self.0.cursor_dyn()
    }

    pub fn length(&self) -> Option<usize> {
        self.0.length()
    }
}
