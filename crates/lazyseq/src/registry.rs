//! Named operator table.
//!
//! A [`Registry`] maps operator names to either a native builder (the
//! catalog operators, registered by [`Registry::with_builtins`]) or a
//! user-supplied [`Behavior`]. Names are resolved when the chain is built:
//! an unknown name or an argument list the operator rejects fails right
//! there, never during traversal.

use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::sequence::{Node, Sequence, SequenceCursor, Upstream, VecCursor, Visit, traverse_cursor};
use crate::value::Value;

pub type EachImpl = Arc<dyn Fn(&Upstream<'_>, &[Value], &mut Visit<'_>) -> Result<bool> + Send + Sync>;
pub type CursorImpl = Arc<dyn Fn(&Upstream<'_>, &[Value]) -> Result<Box<dyn SequenceCursor>> + Send + Sync>;
type BuildImpl = Arc<dyn Fn(&Sequence, &[Value]) -> Result<Sequence> + Send + Sync>;

/// Traversal definitions of a custom operator.
///
/// At least one of the push (`with_each`) and pull (`with_cursor`)
/// definitions is required. With only a push definition, pull traversal
/// buffers one full push traversal; with only a pull definition, push
/// traversal loops over the cursor.
#[derive(Clone, Default)]
pub struct Behavior {
    each: Option<EachImpl>,
    cursor: Option<CursorImpl>,
    min_args: usize,
    max_args: Option<usize>,
}

impl Behavior {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_each<F>(mut self, f: F) -> Self
    where
        F: Fn(&Upstream<'_>, &[Value], &mut Visit<'_>) -> Result<bool> + Send + Sync + 'static,
    {
        self.each = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn with_cursor<F>(mut self, f: F) -> Self
    where
        F: Fn(&Upstream<'_>, &[Value]) -> Result<Box<dyn SequenceCursor>> + Send + Sync + 'static,
    {
        self.cursor = Some(Arc::new(f));
        self
    }

    /// Accepted argument count; `max` of `None` means variadic.
    #[must_use]
    pub fn with_arity(mut self, min: usize, max: Option<usize>) -> Self {
        self.min_args = min;
        self.max_args = max;
        self
    }

    pub fn has_traversal(&self) -> bool {
        self.each.is_some() || self.cursor.is_some()
    }

    fn check_arity(&self, name: &str, argc: usize) -> Result<()> {
        let within = argc >= self.min_args && self.max_args.is_none_or(|max| argc <= max);
        if within {
            return Ok(());
        }
        let expected = match self.max_args {
            Some(max) if max == self.min_args => format!("{max}"),
            Some(max) => format!("{}..={max}", self.min_args),
            None => format!("at least {}", self.min_args),
        };
        Err(Error::configuration(format!("`{name}` expects {expected} argument(s), got {argc}")))
    }

    pub(crate) fn run_each(&self, parent: &Sequence, args: &[Value], visit: &mut Visit<'_>) -> Result<bool> {
        let upstream = Upstream::new(parent);
        match (&self.each, &self.cursor) {
            (Some(each), _) => each(&upstream, args, visit),
            (None, Some(cursor)) => {
                let mut cursor = cursor(&upstream, args)?;
                traverse_cursor(cursor.as_mut(), visit)
            }
            (None, None) => Err(Error::configuration("operator has no traversal definition")),
        }
    }

    pub(crate) fn open_cursor(&self, parent: &Sequence, args: &[Value]) -> Result<Box<dyn SequenceCursor>> {
        let upstream = Upstream::new(parent);
        if let Some(cursor) = &self.cursor {
            return cursor(&upstream, args);
        }
        let mut entries = Vec::new();
        self.run_each(parent, args, &mut |v, k| {
            entries.push((v, k));
            Ok(crate::sequence::Flow::Continue)
        })?;
        Ok(Box::new(VecCursor::new(Arc::new(entries))))
    }
}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Behavior")
            .field("each", &self.each.is_some())
            .field("cursor", &self.cursor.is_some())
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish()
    }
}

#[derive(Clone)]
enum Operator {
    Builtin(BuildImpl),
    Custom(Arc<Behavior>),
}

#[derive(Clone, Default)]
pub struct Registry {
    ops: HashMap<Arc<str>, Operator>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("Registry").field("ops", &names).finish()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn count_arg(name: &str, args: &[Value], i: usize) -> Result<usize> {
    match args.get(i) {
        Some(Value::Number(n)) if n.is_finite() && *n >= 0.0 && n.fract() == 0.0 => Ok(*n as usize),
        Some(other) => Err(Error::configuration(format!("`{name}` expects a non-negative integer, got {other:?}"))),
        None => Err(Error::configuration(format!("`{name}` is missing argument {}", i + 1))),
    }
}

fn expect_args(name: &str, args: &[Value], min: usize, max: Option<usize>) -> Result<()> {
    Behavior::new().with_arity(min, max).check_arity(name, args.len())
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the catalog operators that take plain
    /// value arguments.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.builtin("take", |s, a| {
            expect_args("take", a, 1, Some(1))?;
            Ok(s.take(count_arg("take", a, 0)?))
        });
        reg.builtin("drop", |s, a| {
            expect_args("drop", a, 0, Some(1))?;
            let n = if a.is_empty() { 1 } else { count_arg("drop", a, 0)? };
            Ok(s.drop(n))
        });
        reg.nullary("rest", Sequence::rest);
        reg.nullary("reverse", Sequence::reverse);
        reg.nullary("flatten", Sequence::flatten);
        reg.nullary("uniq", Sequence::uniq);
        reg.nullary("compact", Sequence::compact);
        reg.nullary("shuffle", Sequence::shuffle);
        reg.nullary("memoize", Sequence::memoize);
        reg.nullary("lines", Sequence::lines);
        reg.nullary("keys", Sequence::keys);
        reg.nullary("values", Sequence::values);
        reg.nullary("pairs", Sequence::pairs);
        reg.nullary("invert", Sequence::invert);
        reg.nullary("sort", Sequence::sort);
        reg.builtin("concat", |s, a| Ok(s.concat(a.iter().cloned())));
        reg.builtin("zip", |s, a| Ok(s.zip(a.iter().cloned())));
        reg.builtin("union", |s, a| Ok(s.union(a.iter().cloned())));
        reg.builtin("intersection", |s, a| Ok(s.intersection(a.iter().cloned())));
        reg.builtin("without", |s, a| Ok(s.without(a.iter().cloned())));
        reg.builtin("difference", |s, a| {
            expect_args("difference", a, 1, Some(1))?;
            Ok(s.difference(a[0].clone()))
        });
        reg.builtin("chunk", |s, a| {
            expect_args("chunk", a, 1, Some(1))?;
            s.chunk(count_arg("chunk", a, 0)?)
        });
        reg.builtin("consecutive", |s, a| {
            expect_args("consecutive", a, 1, Some(1))?;
            s.consecutive(count_arg("consecutive", a, 0)?)
        });
        reg
    }

    fn builtin<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&Sequence, &[Value]) -> Result<Sequence> + Send + Sync + 'static,
    {
        self.ops.insert(Arc::from(name), Operator::Builtin(Arc::new(f)));
    }

    fn nullary(&mut self, name: &'static str, f: fn(&Sequence) -> Sequence) {
        self.builtin(name, move |s, a| {
            expect_args(name, a, 0, Some(0))?;
            Ok(f(s))
        });
    }

    /// Registers `behavior` under `name`, replacing any previous operator
    /// of that name.
    pub fn define(&mut self, name: &str, behavior: Behavior) -> Result<()> {
        if name.is_empty() {
            return Err(Error::configuration("operator name must not be empty"));
        }
        if !behavior.has_traversal() {
            return Err(Error::configuration(format!(
                "operator `{name}` needs a push (with_each) or pull (with_cursor) definition"
            )));
        }
        let replaced = self.ops.insert(Arc::from(name), Operator::Custom(Arc::new(behavior))).is_some();
        tracing::debug!(name, replaced, "operator defined");
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ops.keys().map(|k| &**k)
    }

    /// Builds `name(args)` on top of `seq`.
    pub fn apply(&self, seq: &Sequence, name: &str, args: &[Value]) -> Result<Sequence> {
        let Some(op) = self.ops.get(name) else {
            return Err(Error::configuration(format!("unknown operator `{name}`")));
        };
        match op {
            Operator::Builtin(build) => build(seq, args),
            Operator::Custom(behavior) => {
                behavior.check_arity(name, args.len())?;
                Ok(seq.derive(Node::Custom {
                    parent: seq.clone(),
                    name: Arc::from(name),
                    behavior: behavior.clone(),
                    args: Arc::from(args),
                }))
            }
        }
    }
}

impl Sequence {
    /// Chains the registered operator `name`; see [`Registry::apply`].
    pub fn apply(&self, registry: &Registry, name: &str, args: &[Value]) -> Result<Sequence> {
        registry.apply(self, name, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::{Capability, Flow, wrap};
    use crate::value::Key;

    #[test]
    fn builtins_keep_native_capability() {
        let reg = Registry::with_builtins();
        let seq = reg.apply(&wrap(vec![1, 2, 3]), "take", &[Value::from(2)]).unwrap();
        assert_eq!(seq.capability(), Capability::Indexed);
        assert_eq!(seq.to_vec().unwrap(), vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn bad_arguments_fail_at_build_time() {
        let reg = Registry::with_builtins();
        let base = wrap(vec![1]);
        assert!(reg.apply(&base, "take", &[]).unwrap_err().is_configuration());
        assert!(reg.apply(&base, "take", &[Value::from(-1)]).unwrap_err().is_configuration());
        assert!(reg.apply(&base, "chunk", &[Value::from(0)]).unwrap_err().is_configuration());
        assert!(reg.apply(&base, "nope", &[]).unwrap_err().is_configuration());
    }

    #[test]
    fn define_requires_a_traversal() {
        let mut reg = Registry::new();
        assert!(reg.define("empty", Behavior::new()).unwrap_err().is_configuration());
        assert!(reg.define("", Behavior::new().with_each(|_, _, _| Ok(true))).is_err());
        assert!(!reg.contains("empty"));
    }

    #[test]
    fn push_only_operator_gets_a_cursor() {
        let mut reg = Registry::new();
        reg.define(
            "every_other",
            Behavior::new().with_each(|up, _, visit| {
                let mut i = 0usize;
                up.each(|v, k| {
                    i += 1;
                    if i % 2 == 1 { visit(v, k) } else { Ok(Flow::Continue) }
                })
            }),
        )
        .unwrap();
        let seq = wrap(vec![1, 2, 3, 4, 5]).apply(&reg, "every_other", &[]).unwrap();
        let mut cursor = seq.cursor().unwrap();
        let mut got = Vec::new();
        while cursor.advance().unwrap() {
            got.push((cursor.current().cloned().unwrap(), cursor.key().cloned().unwrap()));
        }
        assert_eq!(
            got,
            vec![
                (Value::from(1), Key::Index(0)),
                (Value::from(3), Key::Index(2)),
                (Value::from(5), Key::Index(4)),
            ]
        );
    }
}
