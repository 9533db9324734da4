use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use lazyseq::{Tuning, Value, generate, wrap};

fn repeating(len: usize) -> lazyseq::Sequence {
    let items: Vec<Value> = (0..len).map(|i| Value::from(i % 17)).collect();
    wrap(items)
}

fn benchmark_uniq_tiers(c: &mut Criterion) {
    let mut group = c.benchmark_group("uniq");
    for len in [20usize, 150, 2000] {
        let seq = repeating(len);
        group.bench_with_input(BenchmarkId::new("tiered", len), &seq, |b, seq| {
            b.iter(|| black_box(seq.uniq().to_vec().expect("uniq failed")))
        });
        let hashed = seq.with_tuning(Tuning::builder().always_hash().build());
        group.bench_with_input(BenchmarkId::new("hashed", len), &hashed, |b, seq| {
            b.iter(|| black_box(seq.uniq().to_vec().expect("uniq failed")))
        });
    }
    group.finish();
}

fn benchmark_fused_chain(c: &mut Criterion) {
    let seq = generate(|i| i, Some(10_000))
        .map(|v| v.as_number().unwrap_or(0.0) * 3.0)
        .drop(100)
        .reverse()
        .take(5_000);
    c.bench_function("chain/indexed_map_drop_reverse_take", |b| {
        b.iter(|| black_box(seq.to_vec().expect("chain failed")))
    });
    c.bench_function("chain/indexed_get", |b| b.iter(|| black_box(seq.get(black_box(4_321)).expect("get failed"))));

    let streaming = generate(|i| i, None).filter(|v| v.as_number().is_some_and(|n| n % 3.0 == 0.0)).take(5_000);
    c.bench_function("chain/streaming_filter_take", |b| {
        b.iter(|| black_box(streaming.to_vec().expect("chain failed")))
    });
}

fn benchmark_membership(c: &mut Criterion) {
    let base = repeating(1_000);
    let small: Vec<Value> = (0..10).map(Value::from).collect();
    let large: Vec<Value> = (0..500).map(Value::from).collect();
    c.bench_function("without/linear", |b| {
        b.iter(|| black_box(base.difference(small.clone()).size().expect("without failed")))
    });
    c.bench_function("without/hashed", |b| {
        b.iter(|| black_box(base.difference(large.clone()).size().expect("without failed")))
    });
}

criterion_group!(benches, benchmark_uniq_tiers, benchmark_fused_chain, benchmark_membership);
criterion_main!(benches);
