use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use lazyseq::{Flow, Key, Value, generate, wrap};

fn is_even(v: &Value) -> bool {
    v.as_number().is_some_and(|n| n % 2.0 == 0.0)
}

fn counting_source(calls: &Arc<AtomicUsize>, len: Option<usize>) -> lazyseq::Sequence {
    let calls = calls.clone();
    generate(
        move |i| {
            calls.fetch_add(1, Ordering::SeqCst);
            i
        },
        len,
    )
}

#[test]
fn visitor_error_aborts_traversal() {
    let calls = Arc::new(AtomicUsize::new(0));
    let chain = counting_source(&calls, None).filter(is_even);
    let mut delivered = 0;
    let err = chain
        .each(|_, _| {
            delivered += 1;
            if delivered == 2 {
                return Err(lazyseq::Error::traversal("visitor failed"));
            }
            Ok(Flow::Continue)
        })
        .unwrap_err();
    assert!(err.is_traversal());
    assert_eq!(err.message, "visitor failed");
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    calls.store(0, Ordering::SeqCst);
    assert!(!chain.each(|_, _| Ok(Flow::Stop)).unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn zip_over_a_stream_pulls_one_element_past_a_shorter_input() {
    let calls = Arc::new(AtomicUsize::new(0));
    let rows = counting_source(&calls, None).filter(|_| true).zip([vec![10]]).to_vec().unwrap();
    assert_eq!(rows, vec![Value::array([Value::from(0), Value::from(10)])]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn building_a_chain_reads_nothing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let chain = counting_source(&calls, None).map(|v| v.clone()).filter(is_even).take(3).uniq().reverse();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let _ = chain.sort().concat([Value::from(vec![1])]).flatten();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn take_after_filter_stops_the_source() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let out = wrap(vec![1, 2, 3, 4, 5])
        .map(move |v| {
            seen.fetch_add(1, Ordering::SeqCst);
            v.clone()
        })
        .filter(is_even)
        .take(1)
        .to_vec()
        .unwrap();
    assert_eq!(out, vec![Value::from(2)]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn unbounded_generator_is_fine_when_limited() {
    let calls = Arc::new(AtomicUsize::new(0));
    let out = counting_source(&calls, None).filter(is_even).take(3).to_vec().unwrap();
    assert_eq!(out, vec![Value::from(0), Value::from(2), Value::from(4)]);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[test]
fn flatten_stops_inside_nested_sequences() {
    let calls = Arc::new(AtomicUsize::new(0));
    let nested = wrap(vec![Value::from(1), Value::from(counting_source(&calls, Some(5))), Value::from(99)]);
    let out = nested.flatten().take(3).to_vec().unwrap();
    assert_eq!(out, vec![Value::from(1), Value::from(0), Value::from(1)]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn each_reports_whether_it_ran_to_completion() {
    let seq = wrap(vec![1, 2, 3]);
    assert!(seq.each(|_, _| Ok(Flow::Continue)).unwrap());
    let mut seen = 0;
    let completed = seq
        .each(|_, _| {
            seen += 1;
            Ok(Flow::from(seen < 2))
        })
        .unwrap();
    assert!(!completed);
    assert_eq!(seen, 2);
}

#[test]
fn filter_keeps_source_indices_and_map_renumbers() {
    let filtered = wrap(vec![10, 20, 30]).filter(|v| v.as_number().is_some_and(|n| n > 10.0));
    assert_eq!(
        filtered.entries().unwrap(),
        vec![(Value::from(20), Key::Index(1)), (Value::from(30), Key::Index(2))]
    );
    assert_eq!(
        filtered.map(|v| v.clone()).entries().unwrap(),
        vec![(Value::from(20), Key::Index(0)), (Value::from(30), Key::Index(1))]
    );
}

#[test]
fn random_access_chains_answer_get_without_walking() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seq = counting_source(&calls, Some(1000)).map(|v| v.as_number().unwrap_or(0.0) * 2.0).drop(10).reverse();
    assert_eq!(seq.length(), Some(990));
    assert_eq!(seq.get(0).unwrap(), Value::from(1998));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn zip_ends_with_the_shortest_input() {
    let out = wrap(vec![1, 2, 3]).zip([Value::from(vec!["a", "b"])]).to_vec().unwrap();
    assert_eq!(
        out,
        vec![
            Value::array([Value::from(1), Value::from("a")]),
            Value::array([Value::from(2), Value::from("b")]),
        ]
    );
    let sums = wrap(vec![1, 2]).zip_with([Value::from(vec![10, 20, 30])], |row| {
        row.iter().filter_map(Value::as_number).sum::<f64>()
    });
    assert_eq!(sums.to_vec().unwrap(), vec![Value::from(11), Value::from(22)]);
}

#[test]
fn materializing_an_unbounded_chain_is_a_data_error() {
    let err = generate(|i| i, None).filter(is_even).sort().to_vec().unwrap_err();
    assert!(err.is_data());
    assert!(generate(|i| i, None).last().unwrap_err().is_data());
}

#[test]
fn iterator_and_cursor_are_independent_traversals() {
    let seq = wrap(vec![1, 2, 3]).filter(|_| true);
    let collected: Vec<Value> = seq.iter().unwrap().collect::<lazyseq::Result<_>>().unwrap();
    assert_eq!(collected.len(), 3);
    let mut a = seq.cursor().unwrap();
    let mut b = seq.cursor().unwrap();
    assert!(a.advance().unwrap());
    assert!(a.advance().unwrap());
    assert!(b.advance().unwrap());
    assert_eq!(a.current(), Some(&Value::from(2)));
    assert_eq!(b.current(), Some(&Value::from(1)));
}
