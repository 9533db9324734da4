use std::collections::HashSet;
use std::sync::Arc;

use super::{Flow, Node, Sequence};
use crate::error::Result;
use crate::value::{Key, Value};

fn field_name(key: &Key) -> Option<&str> {
    match key {
        Key::Field(Value::Text(name)) => Some(name),
        _ => None,
    }
}

fn name_set<I, S>(names: I) -> HashSet<Arc<str>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names.into_iter().map(|n| Arc::from(n.as_ref())).collect()
}

impl Sequence {
    /// Keys (or indices) of the elements, renumbered.
    #[must_use]
    pub fn keys(&self) -> Sequence {
        self.try_map(|_, k| Ok(k.to_value()))
    }

    #[must_use]
    pub fn values(&self) -> Sequence {
        self.try_map(|v, _| Ok(v.clone()))
    }

    /// `[key, value]` arrays.
    #[must_use]
    pub fn pairs(&self) -> Sequence {
        self.try_map(|v, k| Ok(Value::array([k.to_value(), v.clone()])))
    }

    /// Only the entries whose key is one of `names`.
    #[must_use]
    pub fn pick<I, S>(&self, names: I) -> Sequence
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = name_set(names);
        self.try_filter(move |_, k| Ok(field_name(k).is_some_and(|n| names.contains(n))))
    }

    /// Every entry except those whose key is one of `names`.
    #[must_use]
    pub fn omit<I, S>(&self, names: I) -> Sequence
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = name_set(names);
        self.try_filter(move |_, k| Ok(!field_name(k).is_some_and(|n| names.contains(n))))
    }

    /// Value stored under `name`, `Undefined` when absent.
    ///
    /// Objects answer directly; any other sequence is traversed until an
    /// entry with that key shows up.
    pub fn get_key(&self, name: &str) -> Result<Value> {
        if let Node::Object(map) = self.node() {
            return Ok(map.get(name).cloned().unwrap_or_default());
        }
        let mut found = Value::Undefined;
        self.each(|v, k| {
            if field_name(&k) == Some(name) {
                found = v;
                return Ok(Flow::Stop);
            }
            Ok(Flow::Continue)
        })?;
        Ok(found)
    }
}
