//! Dedup and membership operators.
//!
//! Every operator here compares with [`Value::same_value`]. The strategy is
//! picked per traversal from the known input length and the chain's
//! [`Tuning`]; it never changes which elements come out.
//!
//! - `uniq` over `N` known elements: an inline seen-list for small `N`, a heap
//!   seen-list for mid-size `N`, a [`ValueSet`] above that or when `N` is
//!   unknown.
//! - `intersection`/`without` against a collection of known length `M`:
//!   positional scans while `M` is small, otherwise a [`ValueSet`] filled on
//!   demand from a cursor over the other collection.

use smallvec::SmallVec;

use super::{Access, Entry, Flow, Node, Selector, Sequence, SequenceCursor, Visit};
use crate::config::{DEFAULT_UNIQ_LINEAR_MAX, Tuning};
use crate::error::Result;
use crate::value::{Key, Value};
use crate::value_set::ValueSet;

impl Sequence {
    /// Distinct elements in first-occurrence order.
    #[must_use]
    pub fn uniq(&self) -> Sequence {
        self.derive(Node::Uniq { parent: self.clone(), key: None })
    }

    /// Elements with a distinct `f(element)`, first occurrence kept.
    #[must_use]
    pub fn uniq_by<F, K>(&self, f: F) -> Sequence
    where
        F: Fn(&Value) -> K + Send + Sync + 'static,
        K: Into<Value>,
    {
        let key: Selector = std::sync::Arc::new(move |v, _| Ok(f(v).into()));
        self.derive(Node::Uniq { parent: self.clone(), key: Some(key) })
    }

    /// Distinct elements of self followed by those of `others`.
    #[must_use]
    pub fn union<I, S>(&self, others: I) -> Sequence
    where
        I: IntoIterator<Item = S>,
        S: Into<Value>,
    {
        self.concat(others).uniq()
    }

    /// Distinct elements of self present in every one of `others`.
    #[must_use]
    pub fn intersection<I, S>(&self, others: I) -> Sequence
    where
        I: IntoIterator<Item = S>,
        S: Into<Value>,
    {
        let others = others.into_iter().map(super::wrap).collect();
        self.derive(Node::Intersection { parent: self.clone(), others })
    }

    /// Elements not equal to any of `values`.
    #[must_use]
    pub fn without<I, V>(&self, values: I) -> Sequence
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let excluded = values.into_iter().map(Into::into).collect::<Sequence>();
        self.derive(Node::Without { parent: self.clone(), excluded })
    }

    /// Elements not present in `other`.
    #[must_use]
    pub fn difference(&self, other: impl Into<Value>) -> Sequence {
        self.derive(Node::Without { parent: self.clone(), excluded: super::wrap(other) })
    }
}

/// Accepted-so-far bookkeeping for `uniq`.
pub(crate) enum Seen {
    Inline(SmallVec<[Value; DEFAULT_UNIQ_LINEAR_MAX]>),
    List(Vec<Value>),
    Hashed(ValueSet),
}

impl Seen {
    pub(crate) fn for_len(len: Option<usize>, tuning: Tuning) -> Self {
        let seen = match len {
            Some(n) if n <= tuning.uniq_linear_max => Seen::Inline(SmallVec::new()),
            Some(n) if n <= tuning.uniq_list_max => Seen::List(Vec::with_capacity(n)),
            _ => Seen::Hashed(ValueSet::with_capacity(len.unwrap_or(0))),
        };
        tracing::debug!(tier = seen.tier(), len = ?len, "uniq strategy");
        seen
    }

    pub(crate) fn tier(&self) -> &'static str {
        match self {
            Seen::Inline(_) => "inline",
            Seen::List(_) => "list",
            Seen::Hashed(_) => "hashed",
        }
    }

    /// Records `v`; `true` when it had not been seen.
    pub(crate) fn insert(&mut self, v: &Value) -> bool {
        match self {
            Seen::Inline(items) => {
                if items.iter().any(|x| x.same_value(v)) {
                    return false;
                }
                items.push(v.clone());
                true
            }
            Seen::List(items) => {
                if items.iter().any(|x| x.same_value(v)) {
                    return false;
                }
                items.push(v.clone());
                true
            }
            Seen::Hashed(set) => set.insert(v),
        }
    }
}

fn dedup_key(v: &Value, k: &Key, key: Option<&Selector>) -> Result<Value> {
    match key {
        Some(f) => f(v, k),
        None => Ok(v.clone()),
    }
}

pub(super) fn each_uniq(parent: &Sequence, key: Option<&Selector>, tuning: Tuning, visit: &mut Visit<'_>) -> Result<bool> {
    let mut seen = Seen::for_len(parent.length(), tuning);
    let mut i = 0usize;
    parent.each_dyn(&mut |v, k| {
        if !seen.insert(&dedup_key(&v, &k, key)?) {
            return Ok(Flow::Continue);
        }
        let idx = i;
        i += 1;
        visit(v, Key::Index(idx))
    })
}

/// Containment test against another collection.
pub(crate) enum Membership {
    /// Positional scan over a short random-access collection.
    Linear { other: Sequence, len: usize },
    Lazy(LazyMembership),
}

impl Membership {
    pub(crate) fn new(other: &Sequence, tuning: Tuning) -> Result<Self> {
        let membership = match other.access() {
            Access::Bounded(len) if len <= tuning.membership_linear_max => {
                Membership::Linear { other: other.clone(), len }
            }
            _ => Membership::Lazy(LazyMembership::new(other.cursor_dyn()?)),
        };
        tracing::debug!(
            linear = matches!(membership, Membership::Linear { .. }),
            len = ?other.length(),
            "membership strategy"
        );
        Ok(membership)
    }

    pub(crate) fn contains(&mut self, v: &Value) -> Result<bool> {
        match self {
            Membership::Linear { other, len } => {
                for i in 0..*len {
                    if other.get_at(i)?.same_value(v) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Membership::Lazy(lazy) => lazy.contains(v),
        }
    }
}

/// [`ValueSet`] populated from a cursor only as far as lookups require.
///
/// A lookup first consults the values pulled so far and only then advances
/// the cursor, stopping at the first match, so an unbounded or expensive
/// collection is consumed no further than needed.
pub(crate) struct LazyMembership {
    cursor: Option<Box<dyn SequenceCursor>>,
    seen: ValueSet,
}

impl LazyMembership {
    pub(crate) fn new(cursor: Box<dyn SequenceCursor>) -> Self {
        Self { cursor: Some(cursor), seen: ValueSet::new() }
    }

    pub(crate) fn contains(&mut self, v: &Value) -> Result<bool> {
        if self.seen.contains(v) {
            return Ok(true);
        }
        while let Some(cursor) = self.cursor.as_mut() {
            let Some((x, _)) = cursor.next_entry()? else {
                self.cursor = None;
                break;
            };
            let hit = x.same_value(v);
            self.seen.insert(&x);
            if hit {
                return Ok(true);
            }
        }
        Ok(false)
    }

    #[cfg(test)]
    fn pulled(&self) -> usize {
        self.seen.len()
    }
}

pub(super) fn each_without(parent: &Sequence, excluded: &Sequence, tuning: Tuning, visit: &mut Visit<'_>) -> Result<bool> {
    let mut membership = Membership::new(excluded, tuning)?;
    let mut i = 0usize;
    parent.each_dyn(&mut |v, _| {
        if membership.contains(&v)? {
            return Ok(Flow::Continue);
        }
        let idx = i;
        i += 1;
        visit(v, Key::Index(idx))
    })
}

fn in_all(memberships: &mut [Membership], v: &Value) -> Result<bool> {
    for m in memberships.iter_mut() {
        if !m.contains(v)? {
            return Ok(false);
        }
    }
    Ok(true)
}

pub(super) fn each_intersection(
    parent: &Sequence,
    others: &[Sequence],
    tuning: Tuning,
    visit: &mut Visit<'_>,
) -> Result<bool> {
    let mut memberships = others.iter().map(|o| Membership::new(o, tuning)).collect::<Result<Vec<_>>>()?;
    let mut seen = Seen::for_len(parent.length(), tuning);
    let mut i = 0usize;
    parent.each_dyn(&mut |v, _| {
        if !in_all(&mut memberships, &v)? || !seen.insert(&v) {
            return Ok(Flow::Continue);
        }
        let idx = i;
        i += 1;
        visit(v, Key::Index(idx))
    })
}

pub(super) struct UniqCursor {
    inner: Box<dyn SequenceCursor>,
    key: Option<Selector>,
    seen: Seen,
    next: usize,
}

impl UniqCursor {
    pub(super) fn new(parent: &Sequence, key: Option<Selector>, tuning: Tuning) -> Result<Self> {
        Ok(Self { inner: parent.cursor_dyn()?, key, seen: Seen::for_len(parent.length(), tuning), next: 0 })
    }
}

impl SequenceCursor for UniqCursor {
    fn next_entry(&mut self) -> Result<Option<Entry>> {
        while let Some((v, k)) = self.inner.next_entry()? {
            if self.seen.insert(&dedup_key(&v, &k, self.key.as_ref())?) {
                let idx = self.next;
                self.next += 1;
                return Ok(Some((v, Key::Index(idx))));
            }
        }
        Ok(None)
    }
}

pub(super) struct WithoutCursor {
    inner: Box<dyn SequenceCursor>,
    membership: Membership,
    next: usize,
}

impl WithoutCursor {
    pub(super) fn new(parent: &Sequence, excluded: &Sequence, tuning: Tuning) -> Result<Self> {
        Ok(Self { inner: parent.cursor_dyn()?, membership: Membership::new(excluded, tuning)?, next: 0 })
    }
}

impl SequenceCursor for WithoutCursor {
    fn next_entry(&mut self) -> Result<Option<Entry>> {
        while let Some((v, _)) = self.inner.next_entry()? {
            if !self.membership.contains(&v)? {
                let idx = self.next;
                self.next += 1;
                return Ok(Some((v, Key::Index(idx))));
            }
        }
        Ok(None)
    }
}

pub(super) struct IntersectionCursor {
    inner: Box<dyn SequenceCursor>,
    memberships: Vec<Membership>,
    seen: Seen,
    next: usize,
}

impl IntersectionCursor {
    pub(super) fn new(parent: &Sequence, others: &[Sequence], tuning: Tuning) -> Result<Self> {
        Ok(Self {
            inner: parent.cursor_dyn()?,
            memberships: others.iter().map(|o| Membership::new(o, tuning)).collect::<Result<Vec<_>>>()?,
            seen: Seen::for_len(parent.length(), tuning),
            next: 0,
        })
    }
}

impl SequenceCursor for IntersectionCursor {
    fn next_entry(&mut self) -> Result<Option<Entry>> {
        while let Some((v, _)) = self.inner.next_entry()? {
            if in_all(&mut self.memberships, &v)? && self.seen.insert(&v) {
                let idx = self.next;
                self.next += 1;
                return Ok(Some((v, Key::Index(idx))));
            }
        }
        Ok(None)
    }
}
