use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use lazyseq::{Behavior, Capability, Error, Flow, Key, Registry, SequenceCursor, Value, wrap};
use rstest::rstest;

fn odd_positions() -> Behavior {
    Behavior::new().with_cursor(|up, _| {
        let mut inner = up.cursor()?;
        let mut pos = 0usize;
        let mut out = 0usize;
        let cursor = move || -> lazyseq::Result<Option<lazyseq::Entry>> {
            while let Some((v, _)) = inner.next_entry()? {
                pos += 1;
                if pos % 2 == 1 {
                    out += 1;
                    return Ok(Some((v, Key::Index(out - 1))));
                }
            }
            Ok(None)
        };
        Ok(Box::new(cursor) as Box<dyn SequenceCursor>)
    })
}

fn scaled() -> Behavior {
    Behavior::new().with_arity(1, Some(1)).with_each(|up, args, visit| {
        let factor = args[0].as_number().unwrap_or(1.0);
        up.each(|v, k| visit(Value::from(v.as_number().unwrap_or(0.0) * factor), k))
    })
}

#[test]
fn pull_only_operator_supports_push() {
    let mut reg = Registry::new();
    reg.define("odd_positions", odd_positions()).unwrap();
    let seq = wrap(vec![1, 2, 3, 4, 5]).apply(&reg, "odd_positions", &[]).unwrap();
    assert_eq!(seq.operator_name(), "odd_positions");
    assert_eq!(seq.capability(), Capability::Generic);
    assert_eq!(seq.to_vec().unwrap(), vec![Value::from(1), Value::from(3), Value::from(5)]);
    assert_eq!(seq.take(2).to_vec().unwrap(), vec![Value::from(1), Value::from(3)]);
}

#[test]
fn custom_operators_chain_with_builtins() {
    let mut reg = Registry::with_builtins();
    reg.define("scaled", scaled()).unwrap();
    let seq = wrap(vec![3, 1, 2, 3])
        .apply(&reg, "uniq", &[])
        .and_then(|s| s.apply(&reg, "scaled", &[Value::from(10)]))
        .and_then(|s| s.apply(&reg, "take", &[Value::from(2)]))
        .unwrap();
    assert_eq!(seq.to_vec().unwrap(), vec![Value::from(30), Value::from(10)]);
}

#[rstest]
#[case("scaled", 0)]
#[case("scaled", 2)]
#[case("missing", 0)]
fn misuse_is_reported_when_the_chain_is_built(#[case] name: &str, #[case] argc: usize) {
    let mut reg = Registry::new();
    reg.define("scaled", scaled()).unwrap();
    let args = vec![Value::from(1); argc];
    let err = wrap(vec![1]).apply(&reg, name, &args).unwrap_err();
    assert!(err.is_configuration(), "{err}");
}

#[test]
fn redefining_replaces_the_operator() {
    let mut reg = Registry::new();
    reg.define("op", scaled()).unwrap();
    reg.define("op", odd_positions()).unwrap();
    let out = wrap(vec![1, 2, 3]).apply(&reg, "op", &[]).unwrap().to_vec().unwrap();
    assert_eq!(out, vec![Value::from(1), Value::from(3)]);
    assert_eq!(reg.names().filter(|n| *n == "op").count(), 1);
}

#[test]
fn cached_operator_retries_after_a_failure() {
    let fail = Arc::new(AtomicBool::new(true));
    let switch = fail.clone();
    let sorted = wrap(vec![3, 1, 2])
        .try_map(move |v, _| {
            if switch.load(Ordering::SeqCst) {
                return Err(Error::traversal("not yet"));
            }
            Ok(v.clone())
        })
        .sort();
    assert!(sorted.to_vec().unwrap_err().is_traversal());
    fail.store(false, Ordering::SeqCst);
    assert_eq!(sorted.to_vec().unwrap(), vec![Value::from(1), Value::from(2), Value::from(3)]);
}

#[test]
fn foreign_selector_errors_keep_their_source() {
    let sorted = wrap(vec!["3", "x", "1"]).try_sort_by(|v| {
        let text = v.as_text().unwrap_or_default();
        text.parse::<i64>().map(Value::from).map_err(Error::from_callback)
    });
    let err = sorted.to_vec().unwrap_err();
    assert!(err.is_traversal());
    assert_eq!(err.message, "invalid digit found in string");
    let source = std::error::Error::source(&err).expect("source is kept");
    assert!(source.downcast_ref::<std::num::ParseIntError>().is_some());
}

#[test]
fn cached_operator_realizes_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let memo = wrap(vec![1, 2, 3])
        .map(move |v| {
            seen.fetch_add(1, Ordering::SeqCst);
            v.clone()
        })
        .memoize();
    assert_eq!(memo.size().unwrap(), 3);
    assert_eq!(memo.last().unwrap(), Value::from(3));
    assert_eq!(memo.reverse().first().unwrap(), Value::from(3));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn grouping_operators_are_keyed_in_first_seen_order() {
    let words = wrap(vec!["one", "two", "three", "four", "five"]);
    let by_len = words.count_by(|v| v.as_text().map_or(0, str::len));
    assert_eq!(by_len.capability(), Capability::Keyed);
    assert_eq!(
        by_len.entries().unwrap(),
        vec![
            (Value::from(2), Key::Field(Value::from(3))),
            (Value::from(1), Key::Field(Value::from(5))),
            (Value::from(2), Key::Field(Value::from(4))),
        ]
    );
    let object = words.group_by(|v| v.as_text().map_or(0, str::len)).to_object().unwrap();
    assert_eq!(object.get("3"), Some(&Value::array([Value::from("one"), Value::from("two")])));
}

#[test]
fn object_round_trip_through_pairs() {
    let source: lazyseq::ObjectMap = [("a", 1), ("b", 2)].into_iter().collect();
    let back = wrap(source).pairs().to_object().unwrap();
    assert_eq!(back.get("b"), Some(&Value::from(2)));
    assert_eq!(back.len(), 2);
}

#[test]
fn text_split_and_lines() {
    let csv = wrap("a,b,,c");
    assert_eq!(csv.split(",").unwrap().size().unwrap(), 4);
    let chunks = wrap(vec!["first li", "ne\nsecond\r\nthi", "rd"]);
    let mut lines = Vec::new();
    chunks
        .lines()
        .each(|v, _| {
            lines.push(v.to_string());
            Ok(Flow::Continue)
        })
        .unwrap();
    assert_eq!(lines, vec!["first line", "second", "third"]);
    assert_eq!(wrap("abc").to_text().unwrap(), "abc");
}
