use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use keyed_bloom::*;

fn populated(n: u64) -> Filter {
    let filter = Filter::with_keys(95_851, &[1, 2, 3, 4, 5, 6, 7]).unwrap();
    for i in 0..n {
        filter.add(&i);
    }
    filter
}

pub fn basic_bench(c: &mut Criterion) {
    let filter = populated(1_000);

    c.bench_function("filter_add", |b| b.iter(|| filter.add(&42_u64)));
    c.bench_function("filter_add_hash", |b| {
        b.iter(|| filter.add_hash(black_box(42)))
    });

    c.bench_function("filter_contains_hit", |b| {
        b.iter(|| black_box(filter.contains(&42_u64)))
    });
    c.bench_function("filter_contains_miss", |b| {
        b.iter(|| black_box(filter.contains(&u64::MAX)))
    });
}

pub fn union_bench(c: &mut Criterion) {
    let a = populated(5_000);
    let b = populated(10_000);

    c.bench_function("filter_union", |bench| {
        bench.iter(|| black_box(a.union(&b).unwrap()))
    });

    c.bench_function("filter_union_in_place", |bench| {
        bench.iter_batched(
            || a.clone(),
            |dst| {
                dst.union_in_place(&b).unwrap();
                dst
            },
            BatchSize::SmallInput,
        )
    });
}

pub fn codec_bench(c: &mut Criterion) {
    let filter = populated(10_000);
    let bytes = filter.serialize();

    c.bench_function("filter_serialize", |b| {
        b.iter(|| black_box(filter.serialize()))
    });
    c.bench_function("filter_deserialize", |b| {
        b.iter(|| black_box(Filter::deserialize(&bytes).unwrap()))
    });
    c.bench_function("filter_write_gzip", |b| {
        b.iter(|| {
            let mut buf = Vec::with_capacity(bytes.len());
            filter.write_to(&mut buf).unwrap();
            black_box(buf)
        })
    });
}

criterion_group!(benches, basic_bench, union_bench, codec_bench);
criterion_main!(benches);
