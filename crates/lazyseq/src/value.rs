//! Dynamically typed elements flowing through sequences.

use core::cmp::Ordering;
use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use crate::sequence::Sequence;

/// Element model shared by every sequence.
///
/// Composite variants are reference counted, so cloning a value never copies
/// the underlying collection. Reference identity of composites is what the
/// dedup operators compare (see [`Value::same_value`]).
#[derive(Clone, Default)]
pub enum Value {
    /// The "absent" value: out-of-bounds reads, missing keys.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Text(Arc<str>),
    Array(Arc<Vec<Value>>),
    Object(Arc<ObjectMap>),
    Seq(Sequence),
}

/// Position or key an element is delivered with.
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    Index(usize),
    Field(Value),
}

impl Key {
    pub fn index(&self) -> Option<usize> {
        match self {
            Key::Index(i) => Some(*i),
            Key::Field(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Index(i) => Value::from(*i),
            Key::Field(v) => v.clone(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(i) => write!(f, "{i}"),
            Key::Field(v) => write!(f, "{v}"),
        }
    }
}

/// Insertion-ordered mapping from text keys to values.
#[derive(Clone, Default)]
pub struct ObjectMap {
    entries: Vec<(Arc<str>, Value)>,
    index: HashMap<Arc<str>, usize>,
}

impl ObjectMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite; an overwritten key keeps its original position.
    pub fn insert(&mut self, key: impl Into<Arc<str>>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if let Some(&pos) = self.index.get(&key) {
            self.entries[pos].1 = value;
        } else {
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub(crate) fn entry_at(&self, pos: usize) -> Option<&(Arc<str>, Value)> {
        self.entries.get(pos)
    }
}

impl<K: Into<Arc<str>>, V: Into<Value>> FromIterator<(K, V)> for ObjectMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = ObjectMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl fmt::Debug for ObjectMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter().map(|(k, v)| (k, v))).finish()
    }
}

impl PartialEq for ObjectMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Value {
    pub fn text(s: impl AsRef<str>) -> Self {
        Value::Text(Arc::from(s.as_ref()))
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Arc::new(items.into_iter().collect()))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(&**s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectMap> {
        match self {
            Value::Object(map) => Some(&**map),
            _ => None,
        }
    }

    /// JS-style truthiness: `undefined`, `null`, `false`, `0`, `NaN` and `""` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Seq(_) => true,
        }
    }

    /// Equality used by every dedup and membership operator.
    ///
    /// Scalars compare by value with `NaN == NaN` and `0 == -0`; text compares
    /// by content; composites compare by reference identity only.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Seq(a), Value::Seq(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Number(_) => 1,
            Value::Text(_) => 2,
            Value::Array(_) => 3,
            Value::Object(_) => 4,
            Value::Seq(_) => 5,
            Value::Null => 6,
            Value::Undefined => 7,
        }
    }

    /// Total order used by sorting, `min` and `max`.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => {
                a.partial_cmp(b).unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
            }
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y) {
                        Ordering::Equal => {}
                        ord => return ord,
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

fn fmt_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        #[allow(clippy::cast_possible_truncation)]
        let int = n as i64;
        write!(f, "{int}")
    } else {
        write!(f, "{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined | Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => fmt_number(*n, f),
            Value::Text(s) => f.write_str(s),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Object(_) => f.write_str("[object]"),
            Value::Seq(_) => f.write_str("[sequence]"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => fmt_number(*n, f),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(map) => write!(f, "{map:?}"),
            Value::Seq(seq) => write!(f, "{seq:?}"),
        }
    }
}

/// Structural equality, intended for assertions and caller-side comparisons.
/// The engine itself uses [`Value::same_value`].
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                #[allow(clippy::cast_precision_loss, clippy::cast_lossless)]
                fn from(n: $t) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::Text(s)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        let mut buf = [0u8; 4];
        Value::Text(Arc::from(&*c.encode_utf8(&mut buf)))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(Arc::new(items.into_iter().map(Into::into).collect()))
    }
}

impl From<ObjectMap> for Value {
    fn from(map: ObjectMap) -> Self {
        Value::Object(Arc::new(map))
    }
}

impl From<Sequence> for Value {
    fn from(seq: Sequence) -> Self {
        Value::Seq(seq)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Undefined, Into::into)
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Value::array(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_value_distinguishes_types() {
        assert!(!Value::from(1).same_value(&Value::from("1")));
        assert!(!Value::from(true).same_value(&Value::from("true")));
        assert!(Value::from(f64::NAN).same_value(&Value::from(f64::NAN)));
        assert!(Value::from(0.0).same_value(&Value::from(-0.0)));
    }

    #[test]
    fn same_value_compares_composites_by_identity() {
        let a = Value::from(vec![1, 2]);
        let b = Value::from(vec![1, 2]);
        assert_eq!(a, b);
        assert!(!a.same_value(&b));
        assert!(a.same_value(&a.clone()));
    }

    #[test]
    fn display_is_js_like() {
        assert_eq!(Value::from(3.0).to_string(), "3");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(Value::from(vec![1, 2]).to_string(), "1,2");
        assert_eq!(Value::Undefined.to_string(), "");
    }

    #[test]
    fn compare_orders_categories() {
        let mut values = vec![Value::Undefined, Value::from("b"), Value::from(2), Value::from("a"), Value::from(1)];
        values.sort_by(Value::compare);
        assert_eq!(values, vec![Value::from(1), Value::from(2), Value::from("a"), Value::from("b"), Value::Undefined]);
    }

    #[test]
    fn object_map_keeps_insertion_order_on_overwrite() {
        let mut map = ObjectMap::new();
        map.insert("b", 1);
        map.insert("a", 2);
        map.insert("b", 3);
        let keys: Vec<_> = map.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(map.get("b"), Some(&Value::from(3)));
    }
}
