//! Membership tables backing `uniq`, `union`, `intersection`, `without` and
//! the first-seen key order of `group_by`/`count_by`/`index_by`.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use crate::value::Value;

/// Hash key for the scalar and text buckets.
///
/// The variant tag keeps the buckets apart: the text `"1"` and the number `1`
/// (or the text `"undefined"` and the absent value) can never collide, and
/// there are no reserved entries a text could shadow.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ScalarKey {
    Undefined,
    Null,
    Bool(bool),
    /// Normalized bits: `-0` folds onto `0`, every NaN folds onto one NaN.
    Number(u64),
    Text(Arc<str>),
}

fn number_bits(n: f64) -> u64 {
    if n == 0.0 {
        0.0f64.to_bits()
    } else if n.is_nan() {
        f64::NAN.to_bits()
    } else {
        n.to_bits()
    }
}

/// Map keyed by values under [`Value::same_value`] equality.
///
/// Scalars and text live in a hash table; composites are tracked by the
/// address of their shared allocation. The composite itself is retained so an
/// address can never be recycled while the map is alive, which keeps the
/// identity comparison free of false positives.
#[derive(Debug)]
pub(crate) struct ValueMap<T> {
    scalars: HashMap<ScalarKey, T>,
    refs: HashMap<usize, (Value, T)>,
}

impl<T> Default for ValueMap<T> {
    fn default() -> Self {
        Self { scalars: HashMap::new(), refs: HashMap::new() }
    }
}

fn scalar_key(value: &Value) -> Option<ScalarKey> {
    match value {
        Value::Undefined => Some(ScalarKey::Undefined),
        Value::Null => Some(ScalarKey::Null),
        Value::Bool(b) => Some(ScalarKey::Bool(*b)),
        Value::Number(n) => Some(ScalarKey::Number(number_bits(*n))),
        Value::Text(s) => Some(ScalarKey::Text(s.clone())),
        Value::Array(_) | Value::Object(_) | Value::Seq(_) => None,
    }
}

fn address(value: &Value) -> usize {
    match value {
        Value::Array(a) => Arc::as_ptr(a).cast::<()>() as usize,
        Value::Object(o) => Arc::as_ptr(o).cast::<()>() as usize,
        Value::Seq(s) => s.address(),
        _ => 0,
    }
}

impl<T> ValueMap<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self { scalars: HashMap::with_capacity(capacity), refs: HashMap::new() }
    }

    pub(crate) fn get(&self, key: &Value) -> Option<&T> {
        match scalar_key(key) {
            Some(k) => self.scalars.get(&k),
            None => self.refs.get(&address(key)).map(|(_, v)| v),
        }
    }

    /// Inserts `value` unless `key` is present; returns `true` when inserted.
    pub(crate) fn insert_new(&mut self, key: &Value, value: T) -> bool {
        match scalar_key(key) {
            Some(k) => match self.scalars.entry(k) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(value);
                    true
                }
            },
            None => match self.refs.entry(address(key)) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert((key.clone(), value));
                    true
                }
            },
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.scalars.len() + self.refs.len()
    }
}

/// Set of values under [`Value::same_value`] equality.
#[derive(Debug, Default)]
pub struct ValueSet {
    inner: ValueMap<()>,
}

impl ValueSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { inner: ValueMap::with_capacity(capacity) }
    }

    /// Adds `value`; returns `true` when it was not present before.
    pub fn insert(&mut self, value: &Value) -> bool {
        self.inner.insert_new(value, ())
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.inner.get(value).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> FromIterator<&'a Value> for ValueSet {
    fn from_iter<I: IntoIterator<Item = &'a Value>>(iter: I) -> Self {
        let mut set = ValueSet::new();
        for v in iter {
            set.insert(v);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjectMap;

    #[test]
    fn discriminates_values_with_identical_spelling() {
        let values = [
            Value::from(1),
            Value::from("1"),
            Value::from(true),
            Value::from("true"),
            Value::Undefined,
            Value::from("undefined"),
        ];
        let mut set = ValueSet::new();
        for v in &values {
            assert!(set.insert(v), "{v:?} reported as already present");
        }
        assert_eq!(set.len(), 6);
        for v in &values {
            assert!(set.contains(v));
        }
    }

    #[test]
    fn reserved_looking_text_is_an_ordinary_member() {
        let mut set = ValueSet::new();
        assert!(set.insert(&Value::from("__proto__")));
        assert!(set.insert(&Value::from("hasOwnProperty")));
        assert!(!set.contains(&Value::from("constructor")));
        assert!(!set.contains(&Value::Null));
    }

    #[test]
    fn composites_are_identity_members() {
        let a = Value::from(vec![1]);
        let b = Value::from(vec![1]);
        let o = Value::from(ObjectMap::new());
        let mut set = ValueSet::new();
        assert!(set.insert(&a));
        assert!(!set.insert(&a.clone()));
        assert!(!set.contains(&b));
        assert!(set.insert(&o));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn numbers_fold_zero_and_nan() {
        let mut set = ValueSet::new();
        assert!(set.insert(&Value::from(0.0)));
        assert!(!set.insert(&Value::from(-0.0)));
        assert!(set.insert(&Value::from(f64::NAN)));
        assert!(!set.insert(&Value::from(-f64::NAN)));
    }
}
