use std::sync::Arc;

use super::{Access, Flow, Sequence, Visit};
use crate::error::Result;
use crate::value::{Key, ObjectMap, Value};

/// One delivered element together with its index or key.
pub type Entry = (Value, Key);

/// Pull-side traversal contract.
///
/// Every node of a chain hands out one of these; downstream cursors own
/// their upstream cursor and pull from it on demand, so no element is
/// produced before it is asked for.
pub trait SequenceCursor: Send {
    /// Produce the next entry, `Ok(None)` at the end.
    fn next_entry(&mut self) -> Result<Option<Entry>>;
}

impl<F> SequenceCursor for F
where
    F: FnMut() -> Result<Option<Entry>> + Send,
{
    fn next_entry(&mut self) -> Result<Option<Entry>> {
        self()
    }
}

/// Public pull iterator: `advance()` moves to the next element, `current()`
/// and `key()` read it.
///
/// Once `advance()` has returned `false` or an error, the cursor stays
/// exhausted.
pub struct Cursor {
    inner: Box<dyn SequenceCursor>,
    slot: Option<Entry>,
    done: bool,
}

impl Cursor {
    pub(crate) fn new(inner: Box<dyn SequenceCursor>) -> Self {
        Self { inner, slot: None, done: false }
    }

    pub fn advance(&mut self) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        match self.inner.next_entry() {
            Ok(Some(entry)) => {
                self.slot = Some(entry);
                Ok(true)
            }
            Ok(None) => {
                self.finish();
                Ok(false)
            }
            Err(e) => {
                self.finish();
                Err(e)
            }
        }
    }

    fn finish(&mut self) {
        self.done = true;
        self.slot = None;
    }

    /// Element at the current position; `None` before the first `advance()`
    /// and after the end.
    pub fn current(&self) -> Option<&Value> {
        self.slot.as_ref().map(|(v, _)| v)
    }

    pub fn key(&self) -> Option<&Key> {
        self.slot.as_ref().map(|(_, k)| k)
    }

    pub fn into_inner(self) -> Box<dyn SequenceCursor> {
        self.inner
    }
}

impl core::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Cursor").field("slot", &self.slot).field("done", &self.done).finish()
    }
}

/// Value iterator returned by [`Sequence::iter`]. Fused after the first error.
pub struct Iter {
    inner: Box<dyn SequenceCursor>,
    done: bool,
}

impl Iter {
    pub(crate) fn new(inner: Box<dyn SequenceCursor>) -> Self {
        Self { inner, done: false }
    }
}

impl Iterator for Iter {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.inner.next_entry() {
            Ok(Some((v, _))) => Some(Ok(v)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl core::iter::FusedIterator for Iter {}

/// Drive a visitor from a cursor.
pub(crate) fn traverse_cursor(cursor: &mut dyn SequenceCursor, visit: &mut Visit<'_>) -> Result<bool> {
    while let Some((v, k)) = cursor.next_entry()? {
        if visit(v, k)?.is_stop() {
            return Ok(false);
        }
    }
    Ok(true)
}

pub(crate) fn each_entries(entries: &[Entry], visit: &mut Visit<'_>) -> Result<bool> {
    for (v, k) in entries {
        if visit(v.clone(), k.clone())?.is_stop() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Cursor over any random-access node.
pub(crate) struct IndexCursor {
    seq: Sequence,
    next: usize,
    bound: Option<usize>,
}

impl IndexCursor {
    pub(crate) fn new(seq: Sequence) -> Self {
        let bound = match seq.access() {
            Access::Bounded(len) => Some(len),
            Access::Unbounded | Access::Sequential => None,
        };
        Self { seq, next: 0, bound }
    }
}

impl SequenceCursor for IndexCursor {
    fn next_entry(&mut self) -> Result<Option<Entry>> {
        if self.bound.is_some_and(|len| self.next >= len) {
            return Ok(None);
        }
        let i = self.next;
        let value = self.seq.get_at(i)?;
        self.next += 1;
        Ok(Some((value, self.seq.key_at(i))))
    }
}

pub(crate) struct ObjectCursor {
    map: Arc<ObjectMap>,
    pos: usize,
}

impl ObjectCursor {
    pub(crate) fn new(map: Arc<ObjectMap>) -> Self {
        Self { map, pos: 0 }
    }
}

impl SequenceCursor for ObjectCursor {
    fn next_entry(&mut self) -> Result<Option<Entry>> {
        let Some((k, v)) = self.map.entry_at(self.pos) else {
            return Ok(None);
        };
        self.pos += 1;
        Ok(Some((v.clone(), Key::Field(Value::Text(k.clone())))))
    }
}

/// Cursor over already-materialized entries.
pub(crate) struct VecCursor {
    entries: Arc<Vec<Entry>>,
    pos: usize,
}

impl VecCursor {
    pub(crate) fn new(entries: Arc<Vec<Entry>>) -> Self {
        Self { entries, pos: 0 }
    }

    pub(crate) fn empty() -> Self {
        Self::new(Arc::new(Vec::new()))
    }
}

impl SequenceCursor for VecCursor {
    fn next_entry(&mut self) -> Result<Option<Entry>> {
        let entry = self.entries.get(self.pos).cloned();
        if entry.is_some() {
            self.pos += 1;
        }
        Ok(entry)
    }
}

/// Pull cursor for nodes that can only push: runs one full traversal up
/// front and replays it.
pub(crate) fn buffered(seq: &Sequence) -> Result<Box<dyn SequenceCursor>> {
    let mut entries = Vec::new();
    seq.each_dyn(&mut |v, k| {
        entries.push((v, k));
        Ok(Flow::Continue)
    })?;
    tracing::trace!(op = seq.operator_name(), len = entries.len(), "buffered push-only traversal");
    Ok(Box::new(VecCursor::new(Arc::new(entries))))
}
