//! Streaming element-wise operators.
//!
//! Each operator gets a push implementation (`each_*`) and a pull cursor.
//! Operators whose node stays random-access (`map`, `take`, `drop`, `zip`
//! over random-access parents) delegate to the shared index loop instead.

use std::collections::VecDeque;
use std::sync::Arc;

use super::{Access, Combiner, Entry, Flow, Inspector, Node, Plan, Predicate, Selector, Sequence, SequenceCursor, Visit};
use crate::error::{Error, Result};
use crate::value::{Key, Value};

impl Sequence {
    /// Element-wise transform. Over a random-access parent the result stays
    /// random-access and `get(i)` applies `f` to `parent.get(i)` directly.
    #[must_use]
    pub fn map<F, V>(&self, f: F) -> Sequence
    where
        F: Fn(&Value) -> V + Send + Sync + 'static,
        V: Into<Value>,
    {
        self.try_map(move |v, _| Ok(f(v).into()))
    }

    /// Fallible `map` whose selector also sees the element's key.
    #[must_use]
    pub fn try_map<F>(&self, f: F) -> Sequence
    where
        F: Fn(&Value, &Key) -> Result<Value> + Send + Sync + 'static,
    {
        let f: Selector = Arc::new(f);
        self.derive(Node::Map { parent: self.clone(), f })
    }

    /// Keeps elements satisfying `p`, delivered with the parent's keys.
    #[must_use]
    pub fn filter<F>(&self, p: F) -> Sequence
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.try_filter(move |v, _| Ok(p(v)))
    }

    #[must_use]
    pub fn try_filter<F>(&self, p: F) -> Sequence
    where
        F: Fn(&Value, &Key) -> Result<bool> + Send + Sync + 'static,
    {
        let p: Predicate = Arc::new(p);
        self.derive(Node::Filter { parent: self.clone(), p })
    }

    /// At most the first `n` elements. Never pulls element `n + 1`; `take(0)`
    /// never touches the source.
    #[must_use]
    pub fn take(&self, n: usize) -> Sequence {
        self.derive(Node::Take { parent: self.clone(), n })
    }

    /// Everything after the first `n` elements, keeping the parent's keys.
    #[must_use]
    pub fn drop(&self, n: usize) -> Sequence {
        self.derive(Node::Drop { parent: self.clone(), n })
    }

    #[must_use]
    pub fn rest(&self) -> Sequence {
        self.drop(1)
    }

    /// Reversed order. Random-access and bounded parents are reversed by
    /// index arithmetic; anything else is materialized once.
    #[must_use]
    pub fn reverse(&self) -> Sequence {
        match self.access() {
            Access::Bounded(_) => self.derive(Node::Reverse { parent: self.clone() }),
            Access::Unbounded | Access::Sequential => self.cached(Plan::Reverse),
        }
    }

    /// Self followed by each of `others`, wrapped with [`super::wrap`].
    #[must_use]
    pub fn concat<I, S>(&self, others: I) -> Sequence
    where
        I: IntoIterator<Item = S>,
        S: Into<Value>,
    {
        let others = others.into_iter().map(super::wrap).collect();
        self.derive(Node::Concat { parent: self.clone(), others })
    }

    /// Expands nested arrays and sequences at any depth.
    #[must_use]
    pub fn flatten(&self) -> Sequence {
        self.derive(Node::Flatten { parent: self.clone() })
    }

    /// Index-aligned arrays `[self_i, other1_i, ...]`, ending with the
    /// shortest input.
    ///
    /// Unless every input is random-access, the other inputs are only checked
    /// after the next element of `self` has been pulled, so a shorter other
    /// input costs one extra element from `self`.
    #[must_use]
    pub fn zip<I, S>(&self, others: I) -> Sequence
    where
        I: IntoIterator<Item = S>,
        S: Into<Value>,
    {
        let others = others.into_iter().map(super::wrap).collect();
        self.derive(Node::Zip { parent: self.clone(), others, combine: None })
    }

    /// `zip` with the aligned values combined by `f` instead of collected.
    #[must_use]
    pub fn zip_with<I, S, F, V>(&self, others: I, f: F) -> Sequence
    where
        I: IntoIterator<Item = S>,
        S: Into<Value>,
        F: Fn(&[Value]) -> V + Send + Sync + 'static,
        V: Into<Value>,
    {
        let others = others.into_iter().map(super::wrap).collect();
        let combine: Combiner = Arc::new(move |row| Ok(f(row).into()));
        self.derive(Node::Zip { parent: self.clone(), others, combine: Some(combine) })
    }

    /// Drops falsy elements.
    #[must_use]
    pub fn compact(&self) -> Sequence {
        self.filter(Value::is_truthy)
    }

    /// Maps objects to their `field` (`Undefined` when missing or not an object).
    #[must_use]
    pub fn pluck(&self, field: &str) -> Sequence {
        let field: Arc<str> = Arc::from(field);
        self.map(move |v| v.as_object().and_then(|o| o.get(&field)).cloned().unwrap_or_default())
    }

    /// Arrays of `size` consecutive elements; the last one may be shorter.
    pub fn chunk(&self, size: usize) -> Result<Sequence> {
        if size == 0 {
            return Err(Error::configuration("chunk size must be at least 1"));
        }
        Ok(self.derive(Node::Chunk { parent: self.clone(), size }))
    }

    /// Sliding windows of `size` elements.
    pub fn consecutive(&self, size: usize) -> Result<Sequence> {
        if size == 0 {
            return Err(Error::configuration("window size must be at least 1"));
        }
        Ok(self.derive(Node::Consecutive { parent: self.clone(), size }))
    }

    /// Calls `f` for every element passing through.
    #[must_use]
    pub fn tap<F>(&self, f: F) -> Sequence
    where
        F: Fn(&Value, &Key) + Send + Sync + 'static,
    {
        let f: Inspector = Arc::new(move |v, k| {
            f(v, k);
            Ok(())
        });
        self.derive(Node::Tap { parent: self.clone(), f })
    }

    /// Re-chunks a sequence of text chunks into lines. A trailing `\r` is
    /// trimmed from each line; a final line without terminator is kept when
    /// non-empty.
    #[must_use]
    pub fn lines(&self) -> Sequence {
        self.derive(Node::Lines { parent: self.clone() })
    }
}

pub(super) fn each_map(seq: &Sequence, parent: &Sequence, f: &Selector, visit: &mut Visit<'_>) -> Result<bool> {
    if parent.access().is_random() {
        return seq.each_indexed(visit);
    }
    let mut i = 0usize;
    parent.each_dyn(&mut |v, k| {
        let out = f(&v, &k)?;
        let idx = i;
        i += 1;
        visit(out, Key::Index(idx))
    })
}

pub(super) fn each_filter(parent: &Sequence, p: &Predicate, visit: &mut Visit<'_>) -> Result<bool> {
    parent.each_dyn(&mut |v, k| if p(&v, &k)? { visit(v, k) } else { Ok(Flow::Continue) })
}

pub(super) fn each_take(seq: &Sequence, parent: &Sequence, n: usize, visit: &mut Visit<'_>) -> Result<bool> {
    if n == 0 {
        return Ok(true);
    }
    if parent.access().is_random() {
        return seq.each_indexed(visit);
    }
    let mut taken = 0usize;
    let mut stopped = false;
    parent.each_dyn(&mut |v, k| {
        taken += 1;
        if visit(v, k)?.is_stop() {
            stopped = true;
            return Ok(Flow::Stop);
        }
        Ok(Flow::from(taken < n))
    })?;
    Ok(!stopped)
}

pub(super) fn each_drop(seq: &Sequence, parent: &Sequence, n: usize, visit: &mut Visit<'_>) -> Result<bool> {
    if parent.access().is_random() {
        return seq.each_indexed(visit);
    }
    let mut skipped = 0usize;
    parent.each_dyn(&mut |v, k| {
        if skipped < n {
            skipped += 1;
            return Ok(Flow::Continue);
        }
        visit(v, k)
    })
}

pub(super) fn each_concat(parent: &Sequence, others: &[Sequence], visit: &mut Visit<'_>) -> Result<bool> {
    let mut i = 0usize;
    let mut emit = |v: Value, _: Key| {
        let idx = i;
        i += 1;
        visit(v, Key::Index(idx))
    };
    if !parent.each_dyn(&mut emit)? {
        return Ok(false);
    }
    for other in others {
        if !other.each_dyn(&mut emit)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn flatten_into(value: Value, counter: &mut usize, visit: &mut Visit<'_>) -> Result<bool> {
    match value {
        Value::Array(items) => {
            for item in items.iter() {
                if !flatten_into(item.clone(), counter, visit)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Value::Seq(seq) => seq.each_dyn(&mut |v, _| Ok(Flow::from(flatten_into(v, counter, visit)?))),
        leaf => {
            let idx = *counter;
            *counter += 1;
            Ok(!visit(leaf, Key::Index(idx))?.is_stop())
        }
    }
}

pub(super) fn each_flatten(parent: &Sequence, visit: &mut Visit<'_>) -> Result<bool> {
    let mut counter = 0usize;
    parent.each_dyn(&mut |v, _| Ok(Flow::from(flatten_into(v, &mut counter, visit)?)))
}

pub(super) fn zip_access(parent: &Sequence, others: &[Sequence]) -> Access {
    let mut acc = parent.access();
    for other in others {
        acc = match (acc, other.access()) {
            (Access::Sequential, _) | (_, Access::Sequential) => return Access::Sequential,
            (Access::Bounded(a), Access::Bounded(b)) => Access::Bounded(a.min(b)),
            (Access::Bounded(a), Access::Unbounded) | (Access::Unbounded, Access::Bounded(a)) => Access::Bounded(a),
            (Access::Unbounded, Access::Unbounded) => Access::Unbounded,
        };
    }
    acc
}

fn combine_row(row: Vec<Value>, combine: Option<&Combiner>) -> Result<Value> {
    match combine {
        Some(f) => f(&row),
        None => Ok(Value::array(row)),
    }
}

pub(super) fn zip_get(parent: &Sequence, others: &[Sequence], combine: Option<&Combiner>, i: usize) -> Result<Value> {
    let mut row = Vec::with_capacity(others.len() + 1);
    row.push(parent.get_at(i)?);
    for other in others {
        row.push(other.get_at(i)?);
    }
    combine_row(row, combine)
}

pub(super) fn each_zip(
    seq: &Sequence,
    parent: &Sequence,
    others: &[Sequence],
    combine: Option<&Combiner>,
    visit: &mut Visit<'_>,
) -> Result<bool> {
    if seq.access().is_random() {
        return seq.each_indexed(visit);
    }
    let mut cursors = others.iter().map(Sequence::cursor_dyn).collect::<Result<Vec<_>>>()?;
    let mut exhausted = false;
    let completed = parent.each_dyn(&mut |v, k| {
        let mut row = Vec::with_capacity(cursors.len() + 1);
        row.push(v);
        for cursor in &mut cursors {
            match cursor.next_entry()? {
                Some((other, _)) => row.push(other),
                None => {
                    exhausted = true;
                    return Ok(Flow::Stop);
                }
            }
        }
        visit(combine_row(row, combine)?, k)
    })?;
    Ok(completed || exhausted)
}

pub(super) fn each_chunk(parent: &Sequence, size: usize, visit: &mut Visit<'_>) -> Result<bool> {
    let mut buf = Vec::with_capacity(size);
    let mut i = 0usize;
    let completed = parent.each_dyn(&mut |v, _| {
        buf.push(v);
        if buf.len() < size {
            return Ok(Flow::Continue);
        }
        let idx = i;
        i += 1;
        visit(Value::array(buf.drain(..)), Key::Index(idx))
    })?;
    if !completed {
        return Ok(false);
    }
    if buf.is_empty() {
        return Ok(true);
    }
    Ok(!visit(Value::array(buf), Key::Index(i))?.is_stop())
}

pub(super) fn each_consecutive(parent: &Sequence, size: usize, visit: &mut Visit<'_>) -> Result<bool> {
    let mut window = VecDeque::with_capacity(size);
    let mut i = 0usize;
    parent.each_dyn(&mut |v, _| {
        window.push_back(v);
        if window.len() < size {
            return Ok(Flow::Continue);
        }
        let out = Value::array(window.iter().cloned());
        window.pop_front();
        let idx = i;
        i += 1;
        visit(out, Key::Index(idx))
    })
}

pub(super) fn each_tap(parent: &Sequence, f: &Inspector, visit: &mut Visit<'_>) -> Result<bool> {
    parent.each_dyn(&mut |v, k| {
        f(&v, &k)?;
        visit(v, k)
    })
}

fn take_line(pending: &mut String) -> Option<String> {
    let pos = pending.find('\n')?;
    let rest = pending.split_off(pos + 1);
    let mut line = std::mem::replace(pending, rest);
    line.pop();
    if line.ends_with('\r') {
        line.pop();
    }
    Some(line)
}

fn take_tail(pending: &mut String) -> Option<String> {
    if pending.is_empty() {
        return None;
    }
    let mut line = std::mem::take(pending);
    if line.ends_with('\r') {
        line.pop();
    }
    Some(line)
}

pub(super) fn each_lines(parent: &Sequence, visit: &mut Visit<'_>) -> Result<bool> {
    let mut pending = String::new();
    let mut i = 0usize;
    let mut emit = |line: String| {
        let idx = i;
        i += 1;
        visit(Value::from(line), Key::Index(idx))
    };
    let completed = parent.each_dyn(&mut |chunk, _| {
        pending.push_str(&chunk.to_string());
        while let Some(line) = take_line(&mut pending) {
            if emit(line)?.is_stop() {
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    })?;
    if !completed {
        return Ok(false);
    }
    match take_tail(&mut pending) {
        Some(line) => Ok(!emit(line)?.is_stop()),
        None => Ok(true),
    }
}

pub(super) struct MapCursor {
    inner: Box<dyn SequenceCursor>,
    f: Selector,
    next: usize,
}

impl MapCursor {
    pub(super) fn new(inner: Box<dyn SequenceCursor>, f: Selector) -> Self {
        Self { inner, f, next: 0 }
    }
}

impl SequenceCursor for MapCursor {
    fn next_entry(&mut self) -> Result<Option<Entry>> {
        let Some((v, k)) = self.inner.next_entry()? else {
            return Ok(None);
        };
        let out = (self.f)(&v, &k)?;
        let idx = self.next;
        self.next += 1;
        Ok(Some((out, Key::Index(idx))))
    }
}

pub(super) struct FilterCursor {
    inner: Box<dyn SequenceCursor>,
    p: Predicate,
}

impl FilterCursor {
    pub(super) fn new(inner: Box<dyn SequenceCursor>, p: Predicate) -> Self {
        Self { inner, p }
    }
}

impl SequenceCursor for FilterCursor {
    fn next_entry(&mut self) -> Result<Option<Entry>> {
        while let Some((v, k)) = self.inner.next_entry()? {
            if (self.p)(&v, &k)? {
                return Ok(Some((v, k)));
            }
        }
        Ok(None)
    }
}

pub(super) struct TakeCursor {
    inner: Box<dyn SequenceCursor>,
    remaining: usize,
}

impl TakeCursor {
    pub(super) fn new(inner: Box<dyn SequenceCursor>, n: usize) -> Self {
        Self { inner, remaining: n }
    }
}

impl SequenceCursor for TakeCursor {
    fn next_entry(&mut self) -> Result<Option<Entry>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let entry = self.inner.next_entry()?;
        self.remaining = if entry.is_some() { self.remaining - 1 } else { 0 };
        Ok(entry)
    }
}

pub(super) struct DropCursor {
    inner: Box<dyn SequenceCursor>,
    to_skip: usize,
}

impl DropCursor {
    pub(super) fn new(inner: Box<dyn SequenceCursor>, n: usize) -> Self {
        Self { inner, to_skip: n }
    }
}

impl SequenceCursor for DropCursor {
    fn next_entry(&mut self) -> Result<Option<Entry>> {
        while self.to_skip > 0 {
            self.to_skip -= 1;
            if self.inner.next_entry()?.is_none() {
                self.to_skip = 0;
                return Ok(None);
            }
        }
        self.inner.next_entry()
    }
}

/// Later sources are only opened once the previous one is exhausted.
pub(super) struct ConcatCursor {
    current: Option<Box<dyn SequenceCursor>>,
    pending: VecDeque<Sequence>,
    next: usize,
}

impl ConcatCursor {
    pub(super) fn new(parent: &Sequence, others: &[Sequence]) -> Result<Self> {
        Ok(Self { current: Some(parent.cursor_dyn()?), pending: others.iter().cloned().collect(), next: 0 })
    }
}

impl SequenceCursor for ConcatCursor {
    fn next_entry(&mut self) -> Result<Option<Entry>> {
        loop {
            let Some(cursor) = self.current.as_mut() else {
                return Ok(None);
            };
            if let Some((v, _)) = cursor.next_entry()? {
                let idx = self.next;
                self.next += 1;
                return Ok(Some((v, Key::Index(idx))));
            }
            self.current = match self.pending.pop_front() {
                Some(seq) => Some(seq.cursor_dyn()?),
                None => None,
            };
        }
    }
}

enum Frame {
    Array(Arc<Vec<Value>>, usize),
    Cursor(Box<dyn SequenceCursor>),
}

pub(super) struct FlattenCursor {
    stack: Vec<Frame>,
    next: usize,
}

impl FlattenCursor {
    pub(super) fn new(root: Box<dyn SequenceCursor>) -> Self {
        Self { stack: vec![Frame::Cursor(root)], next: 0 }
    }
}

impl SequenceCursor for FlattenCursor {
    fn next_entry(&mut self) -> Result<Option<Entry>> {
        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };
            let item = match frame {
                Frame::Array(items, pos) => {
                    let item = items.get(*pos).cloned();
                    *pos += 1;
                    item
                }
                Frame::Cursor(cursor) => cursor.next_entry()?.map(|(v, _)| v),
            };
            match item {
                None => {
                    self.stack.pop();
                }
                Some(Value::Array(items)) => self.stack.push(Frame::Array(items, 0)),
                Some(Value::Seq(seq)) => self.stack.push(Frame::Cursor(seq.cursor_dyn()?)),
                Some(leaf) => {
                    let idx = self.next;
                    self.next += 1;
                    return Ok(Some((leaf, Key::Index(idx))));
                }
            }
        }
    }
}

pub(super) struct ZipCursor {
    parent: Box<dyn SequenceCursor>,
    others: Vec<Box<dyn SequenceCursor>>,
    combine: Option<Combiner>,
    done: bool,
}

impl ZipCursor {
    pub(super) fn new(parent: &Sequence, others: &[Sequence], combine: Option<Combiner>) -> Result<Self> {
        Ok(Self {
            parent: parent.cursor_dyn()?,
            others: others.iter().map(Sequence::cursor_dyn).collect::<Result<Vec<_>>>()?,
            combine,
            done: false,
        })
    }
}

impl SequenceCursor for ZipCursor {
    fn next_entry(&mut self) -> Result<Option<Entry>> {
        if self.done {
            return Ok(None);
        }
        let Some((v, k)) = self.parent.next_entry()? else {
            self.done = true;
            return Ok(None);
        };
        let mut row = Vec::with_capacity(self.others.len() + 1);
        row.push(v);
        for cursor in &mut self.others {
            let Some((other, _)) = cursor.next_entry()? else {
                self.done = true;
                return Ok(None);
            };
            row.push(other);
        }
        Ok(Some((combine_row(row, self.combine.as_ref())?, k)))
    }
}

pub(super) struct ChunkCursor {
    inner: Box<dyn SequenceCursor>,
    size: usize,
    next: usize,
    done: bool,
}

impl ChunkCursor {
    pub(super) fn new(inner: Box<dyn SequenceCursor>, size: usize) -> Self {
        Self { inner, size, next: 0, done: false }
    }
}

impl SequenceCursor for ChunkCursor {
    fn next_entry(&mut self) -> Result<Option<Entry>> {
        if self.done {
            return Ok(None);
        }
        let mut buf = Vec::with_capacity(self.size);
        while buf.len() < self.size {
            match self.inner.next_entry()? {
                Some((v, _)) => buf.push(v),
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let idx = self.next;
        self.next += 1;
        Ok(Some((Value::array(buf), Key::Index(idx))))
    }
}

pub(super) struct ConsecutiveCursor {
    inner: Box<dyn SequenceCursor>,
    window: VecDeque<Value>,
    size: usize,
    next: usize,
}

impl ConsecutiveCursor {
    pub(super) fn new(inner: Box<dyn SequenceCursor>, size: usize) -> Self {
        Self { inner, window: VecDeque::with_capacity(size), size, next: 0 }
    }
}

impl SequenceCursor for ConsecutiveCursor {
    fn next_entry(&mut self) -> Result<Option<Entry>> {
        if self.window.len() == self.size {
            self.window.pop_front();
        }
        while self.window.len() < self.size {
            let Some((v, _)) = self.inner.next_entry()? else {
                return Ok(None);
            };
            self.window.push_back(v);
        }
        let idx = self.next;
        self.next += 1;
        Ok(Some((Value::array(self.window.iter().cloned()), Key::Index(idx))))
    }
}

pub(super) struct TapCursor {
    inner: Box<dyn SequenceCursor>,
    f: Inspector,
}

impl TapCursor {
    pub(super) fn new(inner: Box<dyn SequenceCursor>, f: Inspector) -> Self {
        Self { inner, f }
    }
}

impl SequenceCursor for TapCursor {
    fn next_entry(&mut self) -> Result<Option<Entry>> {
        let entry = self.inner.next_entry()?;
        if let Some((v, k)) = &entry {
            (self.f)(v, k)?;
        }
        Ok(entry)
    }
}

pub(super) struct LinesCursor {
    inner: Box<dyn SequenceCursor>,
    pending: String,
    exhausted: bool,
    next: usize,
}

impl LinesCursor {
    pub(super) fn new(inner: Box<dyn SequenceCursor>) -> Self {
        Self { inner, pending: String::new(), exhausted: false, next: 0 }
    }

    fn emit(&mut self, line: String) -> Option<Entry> {
        let idx = self.next;
        self.next += 1;
        Some((Value::from(line), Key::Index(idx)))
    }
}

impl SequenceCursor for LinesCursor {
    fn next_entry(&mut self) -> Result<Option<Entry>> {
        loop {
            if let Some(line) = take_line(&mut self.pending) {
                return Ok(self.emit(line));
            }
            if self.exhausted {
                return Ok(take_tail(&mut self.pending).and_then(|line| self.emit(line)));
            }
            match self.inner.next_entry()? {
                Some((chunk, _)) => self.pending.push_str(&chunk.to_string()),
                None => self.exhausted = true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::sequence::{Capability, generate, wrap};

    fn entries(seq: &Sequence) -> Vec<(Value, Key)> {
        let mut out = Vec::new();
        seq.each(|v, k| {
            out.push((v, k));
            Ok(Flow::Continue)
        })
        .unwrap();
        out
    }

    fn pulled(seq: &Sequence) -> Vec<(Value, Key)> {
        let mut cursor = seq.cursor_dyn().unwrap();
        let mut out = Vec::new();
        while let Some(entry) = cursor.next_entry().unwrap() {
            out.push(entry);
        }
        out
    }

    #[test]
    fn map_over_indexed_stays_indexed() {
        let seq = wrap(vec![1, 2, 3]).map(|v| v.as_number().unwrap_or(0.0) * 2.0).map(|v| v.clone());
        assert_eq!(seq.capability(), Capability::Indexed);
        assert_eq!(seq.length(), Some(3));
        assert_eq!(seq.get_at(2).unwrap(), Value::from(6));
        assert_eq!(seq.get_at(3).unwrap(), Value::Undefined);
    }

    #[test]
    fn drop_over_indexed_passes_ancestor_index() {
        let got = entries(&wrap(vec![10, 20, 30]).drop(1));
        assert_eq!(got, vec![(Value::from(20), Key::Index(1)), (Value::from(30), Key::Index(2))]);
        assert_eq!(got, pulled(&wrap(vec![10, 20, 30]).drop(1)));
    }

    #[test]
    fn take_over_unbounded_never_pulls_extra() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let seq = generate(
            move |i| {
                seen.fetch_add(1, Ordering::SeqCst);
                i
            },
            None,
        )
        .filter(|v| v.as_number().is_some_and(|n| n % 2.0 == 1.0))
        .take(3);
        let got: Vec<_> = entries(&seq).into_iter().map(|(v, _)| v).collect();
        assert_eq!(got, vec![Value::from(1), Value::from(3), Value::from(5)]);
        assert_eq!(counter.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn take_reports_completion_when_it_ends_itself() {
        let seq = generate(|i| i, None).filter(|_| true).take(2);
        assert!(seq.each(|_, _| Ok(Flow::Continue)).unwrap());
        assert!(!seq.each(|_, _| Ok(Flow::Stop)).unwrap());
    }

    #[test]
    fn concat_skips_later_sources_after_stop() {
        let touched = Arc::new(AtomicUsize::new(0));
        let t = touched.clone();
        let later = generate(
            move |i| {
                t.fetch_add(1, Ordering::SeqCst);
                i
            },
            Some(3),
        );
        let seq = wrap(vec![1, 2]).concat([later]);
        let mut seen = 0;
        let completed = seq
            .each(|_, _| {
                seen += 1;
                Ok(Flow::from(seen < 2))
            })
            .unwrap();
        assert!(!completed);
        assert_eq!(touched.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn concat_renumbers() {
        let keys: Vec<_> = entries(&wrap(vec![1]).concat([vec![2, 3]])).into_iter().map(|(_, k)| k).collect();
        assert_eq!(keys, vec![Key::Index(0), Key::Index(1), Key::Index(2)]);
    }

    #[test]
    fn flatten_cursor_matches_push() {
        let nested = Value::from(vec![Value::from(1), Value::from(vec![Value::from(2), wrap(vec![3, 4]).into()])]);
        let seq = wrap(vec![nested, Value::from(5)]).flatten();
        assert_eq!(entries(&seq), pulled(&seq));
        assert_eq!(entries(&seq).len(), 5);
    }

    #[test]
    fn zip_over_sequential_input_stops_at_shortest() {
        let seq = wrap(vec![1, 2, 3]).filter(|_| true).zip([vec![10, 20]]);
        assert_eq!(seq.capability(), Capability::Generic);
        let rows: Vec<_> = entries(&seq).into_iter().map(|(v, _)| v).collect();
        assert_eq!(rows, vec![Value::from(vec![1, 10]), Value::from(vec![2, 20])]);
        assert!(seq.each(|_, _| Ok(Flow::Continue)).unwrap());
    }

    #[test]
    fn chunk_and_consecutive() {
        let chunks: Vec<_> = entries(&wrap(vec![1, 2, 3, 4, 5]).chunk(2).unwrap()).into_iter().map(|(v, _)| v).collect();
        assert_eq!(chunks, vec![Value::from(vec![1, 2]), Value::from(vec![3, 4]), Value::from(vec![5])]);
        let windows = wrap(vec![1, 2, 3]).consecutive(2).unwrap();
        assert_eq!(entries(&windows), pulled(&windows));
        assert_eq!(entries(&windows).len(), 2);
        assert!(wrap(vec![1]).chunk(0).unwrap_err().is_configuration());
    }

    #[test]
    fn lines_rejoins_chunks() {
        let seq = wrap(vec!["ab\r\nc", "d\n", "e"]).lines();
        let got: Vec<_> = entries(&seq).into_iter().map(|(v, _)| v).collect();
        assert_eq!(got, vec![Value::from("ab"), Value::from("cd"), Value::from("e")]);
        assert_eq!(entries(&seq), pulled(&seq));
    }
}
