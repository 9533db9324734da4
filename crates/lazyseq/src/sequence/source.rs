//! Starting points of a chain: the entry adapter, generated sources and the
//! external-source contract.

use std::sync::Arc;

use super::{Flow, Generator, Node, Sequence, Visit};
use crate::error::Result;
use crate::memo::MemoCell;
use crate::value::{Key, ObjectMap, Value};

/// External collaborator that can push its elements into a visitor.
///
/// This is the minimum a stream or file adapter has to provide to be wrapped
/// with [`Sequence::from_source`]. Implementations must honor [`Flow::Stop`]
/// by returning `Ok(false)` without producing further elements.
pub trait Source: Send + Sync {
    fn each(&self, visit: &mut Visit<'_>) -> Result<bool>;
}

/// Text with lazily computed character offsets.
pub(crate) struct TextSource {
    text: Arc<str>,
    offsets: MemoCell<Vec<usize>>,
}

impl TextSource {
    pub(crate) fn new(text: Arc<str>) -> Self {
        Self { text, offsets: MemoCell::new() }
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.text
    }

    pub(crate) fn shared(&self) -> &Arc<str> {
        &self.text
    }

    fn offsets(&self) -> &[usize] {
        self.offsets.get_or_init(|| self.text.char_indices().map(|(at, _)| at).collect())
    }

    pub(crate) fn char_len(&self) -> usize {
        if self.text.is_ascii() { self.text.len() } else { self.offsets().len() }
    }

    /// Byte offset of character `i`; `i == char_len()` maps to the end.
    pub(crate) fn byte_offset(&self, i: usize) -> usize {
        if self.text.is_ascii() {
            return i.min(self.text.len());
        }
        self.offsets().get(i).copied().unwrap_or(self.text.len())
    }

    pub(crate) fn char_at(&self, i: usize) -> Option<&str> {
        if i >= self.char_len() {
            return None;
        }
        let start = self.byte_offset(i);
        let end = self.byte_offset(i + 1);
        self.text.get(start..end)
    }
}

pub(crate) fn each_array(items: &[Value], visit: &mut Visit<'_>) -> Result<bool> {
    for (i, v) in items.iter().enumerate() {
        if visit(v.clone(), Key::Index(i))?.is_stop() {
            return Ok(false);
        }
    }
    Ok(true)
}

pub(crate) fn each_object(map: &ObjectMap, visit: &mut Visit<'_>) -> Result<bool> {
    for (k, v) in map.iter() {
        if visit(v.clone(), Key::Field(Value::Text(k.clone())))?.is_stop() {
            return Ok(false);
        }
    }
    Ok(true)
}

pub(crate) fn each_text(text: &TextSource, visit: &mut Visit<'_>) -> Result<bool> {
    for (i, c) in text.as_str().chars().enumerate() {
        if visit(Value::from(c), Key::Index(i))?.is_stop() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Entry adapter: picks the starting capability from the shape of `source`.
///
/// Arrays become indexed, objects keyed, text textual; a sequence is returned
/// as-is. `Undefined` and `Null` give an empty sequence and any other scalar
/// a single-element one. Nothing is read from the source.
pub fn wrap(source: impl Into<Value>) -> Sequence {
    match source.into() {
        Value::Array(items) => Sequence::from_node(Node::Array(items)),
        Value::Object(map) => Sequence::from_node(Node::Object(map)),
        Value::Text(text) => Sequence::from_node(Node::Text(TextSource::new(text))),
        Value::Seq(seq) => seq,
        Value::Undefined | Value::Null => Sequence::empty(),
        scalar => Sequence::from_node(Node::Array(Arc::new(vec![scalar]))),
    }
}

/// Sequence whose element `i` is `f(i)`; unbounded when `len` is `None`.
pub fn generate<F, V>(f: F, len: Option<usize>) -> Sequence
where
    F: Fn(usize) -> V + Send + Sync + 'static,
    V: Into<Value>,
{
    let rule: Generator = Arc::new(move |i| Ok(f(i).into()));
    Sequence::from_node(Node::Generated { rule, len })
}

/// `start, start+1, ...` up to but excluding `stop`.
pub fn range(start: i64, stop: i64) -> Sequence {
    range_by(start, stop, 1)
}

/// `start, start+step, ...` up to but excluding `stop`. A zero step, or a
/// step pointing away from `stop`, gives an empty sequence.
#[allow(clippy::cast_possible_wrap)]
pub fn range_by(start: i64, stop: i64, step: i64) -> Sequence {
    let len = match step {
        s if s > 0 && stop > start => stop.abs_diff(start).div_ceil(s.unsigned_abs()),
        s if s < 0 && stop < start => start.abs_diff(stop).div_ceil(s.unsigned_abs()),
        _ => 0,
    };
    let len = usize::try_from(len).unwrap_or(usize::MAX);
    generate(move |i| start.wrapping_add((i as i64).wrapping_mul(step)), Some(len))
}

/// `value` repeated `count` times, forever when `count` is `None`.
pub fn repeat(value: impl Into<Value>, count: Option<usize>) -> Sequence {
    let value = value.into();
    generate(move |_| value.clone(), count)
}

impl Sequence {
    pub fn empty() -> Sequence {
        Sequence::from_node(Node::Array(Arc::new(Vec::new())))
    }

    /// Wrap an external collaborator. The source is not touched until a
    /// terminal operation runs.
    pub fn from_source(source: Arc<dyn Source>) -> Sequence {
        Sequence::from_node(Node::External(source))
    }
}

impl FromIterator<Value> for Sequence {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Sequence::from_node(Node::Array(Arc::new(iter.into_iter().collect())))
    }
}

impl<F> Source for F
where
    F: Fn(&mut Visit<'_>) -> Result<bool> + Send + Sync,
{
    fn each(&self, visit: &mut Visit<'_>) -> Result<bool> {
        self(visit)
    }
}

/// External source over a fixed list, mostly useful to exercise the
/// push-only path.
pub struct VecSource(pub Vec<Value>);

impl Source for VecSource {
    fn each(&self, visit: &mut Visit<'_>) -> Result<bool> {
        for (i, v) in self.0.iter().enumerate() {
            if visit(v.clone(), Key::Index(i))? == Flow::Stop {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::Capability;

    #[test]
    fn wrap_picks_capability() {
        assert_eq!(wrap(vec![1, 2]).capability(), Capability::Indexed);
        assert_eq!(wrap(ObjectMap::new()).capability(), Capability::Keyed);
        assert_eq!(wrap("abc").capability(), Capability::Textual);
        assert_eq!(wrap(Value::Null).length(), Some(0));
        assert_eq!(wrap(7).length(), Some(1));
    }

    #[test]
    fn wrap_of_sequence_is_identity() {
        let seq = wrap(vec![1]);
        assert!(wrap(seq.clone()).ptr_eq(&seq));
    }

    #[test]
    fn text_indexes_by_character() {
        let text = TextSource::new(Arc::from("héllo"));
        assert_eq!(text.char_len(), 5);
        assert_eq!(text.char_at(1), Some("é"));
        assert_eq!(text.char_at(5), None);
    }

    #[test]
    fn range_lengths() {
        assert_eq!(range(0, 5).length(), Some(5));
        assert_eq!(range_by(0, 10, 3).length(), Some(4));
        assert_eq!(range_by(5, 0, -2).length(), Some(3));
        assert_eq!(range_by(0, 5, 0).length(), Some(0));
        assert_eq!(range_by(0, 5, -1).length(), Some(0));
    }

    #[test]
    fn unbounded_generate_has_unknown_length() {
        let seq = generate(|i| i * 2, None);
        assert_eq!(seq.capability(), Capability::Generated);
        assert_eq!(seq.length(), None);
    }
}
