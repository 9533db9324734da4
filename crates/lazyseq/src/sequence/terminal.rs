//! Eager consumers. Each one drives a single traversal and stops it as soon
//! as the answer is known.

use itertools::Itertools;

use super::{Access, Capability, Entry, Flow, Sequence};
use crate::error::{Error, Result};
use crate::value::{Key, ObjectMap, Value};

impl Sequence {
    pub fn to_vec(&self) -> Result<Vec<Value>> {
        let mut out = Vec::with_capacity(self.length().unwrap_or(0));
        self.each(|v, _| {
            out.push(v);
            Ok(Flow::Continue)
        })?;
        Ok(out)
    }

    /// Elements as one `Value::Array`.
    pub fn to_array(&self) -> Result<Value> {
        Ok(Value::array(self.to_vec()?))
    }

    /// Elements together with their delivered keys.
    pub fn entries(&self) -> Result<Vec<Entry>> {
        let mut out = Vec::new();
        self.each(|v, k| {
            out.push((v, k));
            Ok(Flow::Continue)
        })?;
        Ok(out)
    }

    /// Keyed sequences convert entry by entry; any other sequence must
    /// consist of `[key, value]` arrays.
    pub fn to_object(&self) -> Result<ObjectMap> {
        let keyed = self.capability() == Capability::Keyed;
        let mut map = ObjectMap::new();
        self.each(|v, k| {
            if keyed {
                map.insert(k.to_string(), v);
                return Ok(Flow::Continue);
            }
            match v.as_array() {
                Some([key, value, ..]) => {
                    map.insert(key.to_string(), value.clone());
                    Ok(Flow::Continue)
                }
                _ => Err(Error::data(format!("to_object expects [key, value] pairs, got {v:?}"))),
            }
        })?;
        Ok(map)
    }

    /// First element, `Undefined` when empty.
    pub fn first(&self) -> Result<Value> {
        self.get(0)
    }

    pub fn last(&self) -> Result<Value> {
        self.ensure_sync()?;
        match self.access() {
            Access::Bounded(0) => Ok(Value::Undefined),
            Access::Bounded(len) => self.get_at(len - 1),
            Access::Unbounded => Err(Error::data("an unbounded sequence has no last element")),
            Access::Sequential => {
                if self.is_known_unbounded() {
                    return Err(Error::data("an unbounded sequence has no last element"));
                }
                let mut last = Value::Undefined;
                self.each(|v, _| {
                    last = v;
                    Ok(Flow::Continue)
                })?;
                Ok(last)
            }
        }
    }

    /// Element at position `i` in traversal order, `Undefined` past the end.
    /// Random-access sequences answer without traversing.
    pub fn get(&self, i: usize) -> Result<Value> {
        self.ensure_sync()?;
        if self.access().is_random() {
            return self.get_at(i);
        }
        let mut pos = 0usize;
        let mut found = Value::Undefined;
        self.each(|v, _| {
            if pos == i {
                found = v;
                return Ok(Flow::Stop);
            }
            pos += 1;
            Ok(Flow::Continue)
        })?;
        Ok(found)
    }

    /// Number of elements, counted by traversal when not known up front.
    pub fn size(&self) -> Result<usize> {
        self.ensure_sync()?;
        if let Some(len) = self.length() {
            return Ok(len);
        }
        if self.access() == Access::Unbounded || self.is_known_unbounded() {
            return Err(Error::data("an unbounded sequence has no size"));
        }
        let mut n = 0usize;
        self.each(|_, _| {
            n += 1;
            Ok(Flow::Continue)
        })?;
        Ok(n)
    }

    pub fn is_empty(&self) -> Result<bool> {
        if let Some(len) = self.length() {
            self.ensure_sync()?;
            return Ok(len == 0);
        }
        self.each(|_, _| Ok(Flow::Stop))
    }

    pub fn find<F>(&self, p: F) -> Result<Option<Value>>
    where
        F: Fn(&Value) -> bool,
    {
        let mut found = None;
        self.each(|v, _| {
            if p(&v) {
                found = Some(v);
                return Ok(Flow::Stop);
            }
            Ok(Flow::Continue)
        })?;
        Ok(found)
    }

    pub fn contains(&self, needle: &Value) -> Result<bool> {
        Ok(self.index_of(needle)?.is_some())
    }

    /// Traversal position of the first element equal to `needle`.
    pub fn index_of(&self, needle: &Value) -> Result<Option<usize>> {
        let mut pos = 0usize;
        let mut found = None;
        self.each(|v, _| {
            if v.same_value(needle) {
                found = Some(pos);
                return Ok(Flow::Stop);
            }
            pos += 1;
            Ok(Flow::Continue)
        })?;
        Ok(found)
    }

    pub fn every<F>(&self, p: F) -> Result<bool>
    where
        F: Fn(&Value) -> bool,
    {
        self.each(|v, _| Ok(Flow::from(p(&v))))
    }

    pub fn some<F>(&self, p: F) -> Result<bool>
    where
        F: Fn(&Value) -> bool,
    {
        Ok(!self.each(|v, _| Ok(Flow::from(!p(&v))))?)
    }

    pub fn reduce<F, V>(&self, init: impl Into<Value>, mut f: F) -> Result<Value>
    where
        F: FnMut(Value, &Value, &Key) -> V,
        V: Into<Value>,
    {
        let mut acc = init.into();
        self.each(|v, k| {
            acc = f(std::mem::take(&mut acc), &v, &k).into();
            Ok(Flow::Continue)
        })?;
        Ok(acc)
    }

    /// Sum of numeric elements; anything else is a data error.
    pub fn sum(&self) -> Result<f64> {
        let mut total = 0.0;
        self.each(|v, _| match v.as_number() {
            Some(n) => {
                total += n;
                Ok(Flow::Continue)
            }
            None => Err(Error::data(format!("sum expects numbers, got {v:?}"))),
        })?;
        Ok(total)
    }

    pub fn min(&self) -> Result<Option<Value>> {
        Ok(self.to_vec()?.into_iter().min_by(Value::compare))
    }

    pub fn max(&self) -> Result<Option<Value>> {
        Ok(self.to_vec()?.into_iter().max_by(Value::compare))
    }

    /// Display forms of the elements joined by `delimiter`.
    pub fn join(&self, delimiter: &str) -> Result<String> {
        Ok(self.to_vec()?.iter().join(delimiter))
    }

    /// Display forms concatenated; the inverse of wrapping a text.
    pub fn to_text(&self) -> Result<String> {
        self.join("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::{generate, wrap};

    #[test]
    fn positional_terminals() {
        let seq = wrap(vec![10, 20, 30]);
        assert_eq!(seq.first().unwrap(), Value::from(10));
        assert_eq!(seq.last().unwrap(), Value::from(30));
        assert_eq!(seq.get(5).unwrap(), Value::Undefined);
        let filtered = seq.filter(|v| v.as_number().is_some_and(|n| n > 10.0));
        assert_eq!(filtered.get(1).unwrap(), Value::from(30));
        assert_eq!(filtered.size().unwrap(), 2);
        assert_eq!(generate(|i| i * i, None).get(12).unwrap(), Value::from(144));
    }

    #[test]
    fn predicates_short_circuit() {
        let seq = generate(|i| i, None);
        assert!(seq.some(|v| v == &Value::from(5)).unwrap());
        assert!(!seq.every(|v| v.as_number().is_some_and(|n| n < 3.0)).unwrap());
        assert_eq!(seq.index_of(&Value::from(7)).unwrap(), Some(7));
        assert!(seq.size().unwrap_err().is_data());
    }

    #[test]
    fn folds() {
        let seq = wrap(vec![3, 1, 2]);
        assert_eq!(seq.sum().unwrap(), 6.0);
        assert_eq!(seq.min().unwrap(), Some(Value::from(1)));
        assert_eq!(seq.max().unwrap(), Some(Value::from(3)));
        assert_eq!(seq.join("-").unwrap(), "3-1-2");
        let total = seq.reduce(0, |acc, v, _| acc.as_number().unwrap_or(0.0) + v.as_number().unwrap_or(0.0)).unwrap();
        assert_eq!(total, Value::from(6));
        assert!(wrap(vec![Value::from("x")]).sum().unwrap_err().is_data());
    }

    #[test]
    fn to_object_from_pairs_and_keyed() {
        let pairs = wrap(vec![Value::array([Value::from("a"), Value::from(1)])]);
        assert_eq!(pairs.to_object().unwrap().get("a"), Some(&Value::from(1)));
        let err = wrap(vec![1]).to_object().unwrap_err();
        assert!(err.is_data());
        let keyed = wrap(vec![Value::from("x")]).map(|v| v.clone()).group_by(Value::clone);
        assert!(keyed.to_object().unwrap().contains_key("x"));
    }

    #[test]
    fn empty_checks() {
        assert!(wrap(Vec::<Value>::new()).is_empty().unwrap());
        assert!(!wrap(vec![1]).filter(|_| true).is_empty().unwrap());
        assert_eq!(wrap(Value::Null).first().unwrap(), Value::Undefined);
    }
}
