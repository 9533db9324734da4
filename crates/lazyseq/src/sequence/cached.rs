//! Operators that cannot stream: the parent is realized once, the result is
//! stored on the node and every later traversal replays it.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Access, Entry, Flow, Node, Selector, Sequence};
use crate::error::{Error, Result};
use crate::memo::MemoCell;
use crate::value::{Key, ObjectMap, Value};
use crate::value_set::ValueMap;

pub(crate) enum Plan {
    Reverse,
    Sort { key: Option<Selector>, descending: bool },
    Group(Selector),
    Count(Selector),
    Index(Selector),
    Shuffle(Option<u64>),
    Memoize,
    Invert,
}

impl Plan {
    pub(super) fn name(&self) -> &'static str {
        match self {
            Plan::Reverse => "reverse",
            Plan::Sort { .. } => "sort",
            Plan::Group(_) => "group_by",
            Plan::Count(_) => "count_by",
            Plan::Index(_) => "index_by",
            Plan::Shuffle(_) => "shuffle",
            Plan::Memoize => "memoize",
            Plan::Invert => "invert",
        }
    }

    pub(super) fn is_keyed(&self) -> bool {
        matches!(self, Plan::Group(_) | Plan::Count(_) | Plan::Index(_) | Plan::Invert)
    }

    fn run(&self, parent: &Sequence) -> Result<Vec<Entry>> {
        let entries = collect(parent)?;
        Ok(match self {
            Plan::Memoize => entries,
            Plan::Reverse => renumber(entries.into_iter().rev().map(|(v, _)| v)),
            Plan::Sort { key, descending } => renumber(sort(entries, key.as_ref(), *descending)?),
            Plan::Group(key) => group(entries, key, |slot: &mut Option<Vec<Value>>, v| {
                slot.get_or_insert_with(Vec::new).push(v);
            })?
            .into_iter()
            .map(|(k, items)| (Value::array(items.unwrap_or_default()), Key::Field(k)))
            .collect(),
            Plan::Count(key) => group(entries, key, |slot: &mut Option<usize>, _| {
                *slot.get_or_insert(0) += 1;
            })?
            .into_iter()
            .map(|(k, n)| (Value::from(n.unwrap_or_default()), Key::Field(k)))
            .collect(),
            Plan::Index(key) => group(entries, key, |slot: &mut Option<Value>, v| *slot = Some(v))?
                .into_iter()
                .map(|(k, v)| (v.unwrap_or_default(), Key::Field(k)))
                .collect(),
            Plan::Shuffle(seed) => {
                let mut values: Vec<Value> = entries.into_iter().map(|(v, _)| v).collect();
                match seed {
                    Some(seed) => fisher_yates(&mut values, &mut StdRng::seed_from_u64(*seed)),
                    None => fisher_yates(&mut values, &mut rand::rng()),
                }
                renumber(values)
            }
            Plan::Invert => {
                let mut inverted = ObjectMap::new();
                for (v, k) in entries {
                    inverted.insert(v.to_string(), k.to_value());
                }
                inverted.iter().map(|(k, v)| (v.clone(), Key::Field(Value::Text(k.clone())))).collect()
            }
        })
    }
}

fn renumber(values: impl IntoIterator<Item = Value>) -> Vec<Entry> {
    values.into_iter().enumerate().map(|(i, v)| (v, Key::Index(i))).collect()
}

fn collect(parent: &Sequence) -> Result<Vec<Entry>> {
    if parent.is_known_unbounded() {
        return Err(Error::data(format!("cannot materialize unbounded sequence {parent:?}")));
    }
    let mut entries = Vec::with_capacity(parent.length().unwrap_or(0));
    parent.each_dyn(&mut |v, k| {
        entries.push((v, k));
        Ok(Flow::Continue)
    })?;
    Ok(entries)
}

/// Stable sort on keys computed once per element.
fn sort(entries: Vec<Entry>, key: Option<&Selector>, descending: bool) -> Result<Vec<Value>> {
    let mut decorated = entries
        .into_iter()
        .map(|(v, k)| {
            let sort_key = match key {
                Some(f) => f(&v, &k)?,
                None => v.clone(),
            };
            Ok((sort_key, v))
        })
        .collect::<Result<Vec<_>>>()?;
    decorated.sort_by(|(a, _), (b, _)| {
        let ord = a.compare(b);
        if descending { ord.reverse() } else { ord }
    });
    Ok(decorated.into_iter().map(|(_, v)| v).collect())
}

/// Folds elements into per-key slots, keeping keys in first-seen order.
fn group<T>(
    entries: Vec<Entry>,
    key: &Selector,
    mut fold: impl FnMut(&mut Option<T>, Value),
) -> Result<Vec<(Value, Option<T>)>> {
    let mut slots: Vec<(Value, Option<T>)> = Vec::new();
    let mut positions: ValueMap<usize> = ValueMap::default();
    for (v, k) in entries {
        let group_key = key(&v, &k)?;
        let pos = match positions.get(&group_key) {
            Some(&pos) => pos,
            None => {
                positions.insert_new(&group_key, slots.len());
                slots.push((group_key, None));
                slots.len() - 1
            }
        };
        fold(&mut slots[pos].1, v);
    }
    Ok(slots)
}

fn fisher_yates<R: Rng + ?Sized>(items: &mut [Value], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.random_range(0..=i);
        items.swap(i, j);
    }
}

fn selector<F, K>(f: F) -> Selector
where
    F: Fn(&Value) -> K + Send + Sync + 'static,
    K: Into<Value>,
{
    Arc::new(move |v, _| Ok(f(v).into()))
}

impl Sequence {
    pub(crate) fn cached(&self, plan: Plan) -> Sequence {
        self.derive(Node::Cached { parent: self.clone(), plan, cache: MemoCell::new() })
    }

    /// `true` when traversal could only end by a consumer's stop.
    pub(crate) fn is_known_unbounded(&self) -> bool {
        if self.access() == Access::Unbounded {
            return true;
        }
        match self.node() {
            Node::Map { parent, .. }
            | Node::Filter { parent, .. }
            | Node::Drop { parent, .. }
            | Node::Flatten { parent }
            | Node::Chunk { parent, .. }
            | Node::Consecutive { parent, .. }
            | Node::Tap { parent, .. }
            | Node::Lines { parent }
            | Node::Uniq { parent, .. }
            | Node::Without { parent, .. }
            | Node::Intersection { parent, .. }
            | Node::Async { parent, .. } => parent.is_known_unbounded(),
            Node::Concat { parent, others } => {
                parent.is_known_unbounded() || others.iter().any(Sequence::is_known_unbounded)
            }
            Node::Zip { parent, others, .. } => {
                parent.is_known_unbounded() && others.iter().all(Sequence::is_known_unbounded)
            }
            _ => false,
        }
    }

    /// Realized entries of a cached node. A failed realization leaves the
    /// cache empty, so the next traversal tries again.
    pub(super) fn materialized(&self) -> Result<Arc<Vec<Entry>>> {
        let Node::Cached { parent, plan, cache } = self.node() else {
            return Err(Error::data(format!("`{}` is not a cached operator", self.operator_name())));
        };
        cache.get_or_try_init(|| {
            let entries = plan.run(parent)?;
            tracing::trace!(op = plan.name(), len = entries.len(), "materialized");
            Ok(Arc::new(entries))
        })
    }

    /// Ascending by [`Value::compare`].
    #[must_use]
    pub fn sort(&self) -> Sequence {
        self.cached(Plan::Sort { key: None, descending: false })
    }

    /// Stable ascending sort on `f(element)`.
    #[must_use]
    pub fn sort_by<F, K>(&self, f: F) -> Sequence
    where
        F: Fn(&Value) -> K + Send + Sync + 'static,
        K: Into<Value>,
    {
        self.cached(Plan::Sort { key: Some(selector(f)), descending: false })
    }

    #[must_use]
    pub fn sort_by_desc<F, K>(&self, f: F) -> Sequence
    where
        F: Fn(&Value) -> K + Send + Sync + 'static,
        K: Into<Value>,
    {
        self.cached(Plan::Sort { key: Some(selector(f)), descending: true })
    }

    #[must_use]
    pub fn try_sort_by<F>(&self, f: F) -> Sequence
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.cached(Plan::Sort { key: Some(Arc::new(move |v, _| f(v))), descending: false })
    }

    /// Keyed by `f(element)` in first-seen order; each value is the array of
    /// elements sharing that key.
    #[must_use]
    pub fn group_by<F, K>(&self, f: F) -> Sequence
    where
        F: Fn(&Value) -> K + Send + Sync + 'static,
        K: Into<Value>,
    {
        self.cached(Plan::Group(selector(f)))
    }

    /// Keyed by `f(element)` in first-seen order; each value is a count.
    #[must_use]
    pub fn count_by<F, K>(&self, f: F) -> Sequence
    where
        F: Fn(&Value) -> K + Send + Sync + 'static,
        K: Into<Value>,
    {
        self.cached(Plan::Count(selector(f)))
    }

    /// Keyed by `f(element)`; the last element with a key wins, keys stay in
    /// first-seen order.
    #[must_use]
    pub fn index_by<F, K>(&self, f: F) -> Sequence
    where
        F: Fn(&Value) -> K + Send + Sync + 'static,
        K: Into<Value>,
    {
        self.cached(Plan::Index(selector(f)))
    }

    /// Random permutation, fixed once the node has been traversed.
    #[must_use]
    pub fn shuffle(&self) -> Sequence {
        self.cached(Plan::Shuffle(None))
    }

    #[must_use]
    pub fn shuffle_seeded(&self, seed: u64) -> Sequence {
        self.cached(Plan::Shuffle(Some(seed)))
    }

    /// Realizes the parent's entries on first traversal and replays them.
    #[must_use]
    pub fn memoize(&self) -> Sequence {
        self.cached(Plan::Memoize)
    }

    /// Keyed sequence mapping each element's text form to its key.
    #[must_use]
    pub fn invert(&self) -> Sequence {
        self.cached(Plan::Invert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::{Capability, generate, wrap};

    fn values(seq: &Sequence) -> Vec<Value> {
        seq.iter().unwrap().collect::<Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn sort_is_stable() {
        let seq = wrap(vec!["bb", "a", "cc", "d"]).sort_by(|v| v.as_text().map_or(0, str::len));
        assert_eq!(values(&seq), vec![Value::from("a"), Value::from("d"), Value::from("bb"), Value::from("cc")]);
    }

    #[test]
    fn group_by_keeps_first_seen_key_order() {
        let seq = wrap(vec![3, 1, 4, 1, 5, 9, 2, 6]).group_by(|v| v.as_number().is_some_and(|n| n % 2.0 == 0.0));
        assert_eq!(seq.capability(), Capability::Keyed);
        let mut keys = Vec::new();
        seq.each(|_, k| {
            keys.push(k);
            Ok(Flow::Continue)
        })
        .unwrap();
        assert_eq!(keys, vec![Key::Field(Value::from(false)), Key::Field(Value::from(true))]);
    }

    #[test]
    fn count_by_keeps_text_and_number_keys_apart() {
        let seq = wrap(vec![Value::from(1), Value::from("1"), Value::from(1)]).count_by(Value::clone);
        assert_eq!(values(&seq), vec![Value::from(2), Value::from(1)]);
    }

    #[test]
    fn seeded_shuffle_is_a_permutation() {
        let seq = wrap(vec![1, 2, 3, 4, 5, 6]).shuffle_seeded(7);
        let mut got = values(&seq);
        assert_eq!(got, values(&seq));
        got.sort_by(Value::compare);
        assert_eq!(got, values(&wrap(vec![1, 2, 3, 4, 5, 6])));
    }

    #[test]
    fn unbounded_materialization_is_a_data_error() {
        let err = generate(|i| i, None).filter(|_| true).sort().each(|_, _| Ok(Flow::Continue)).unwrap_err();
        assert!(err.is_data());
        assert!(generate(|i| i, None).take(3).sort().each(|_, _| Ok(Flow::Continue)).is_ok());
    }

    #[test]
    fn invert_maps_values_to_keys() {
        let seq = wrap(vec!["a", "b"]).invert();
        let mut pairs = Vec::new();
        seq.each(|v, k| {
            pairs.push((v, k));
            Ok(Flow::Continue)
        })
        .unwrap();
        assert_eq!(
            pairs,
            vec![(Value::from(0), Key::Field(Value::from("a"))), (Value::from(1), Key::Field(Value::from("b")))]
        );
    }
}
