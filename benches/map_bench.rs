use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rc_runtime::Map;
use std::time::Duration;

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

fn key(n: u64) -> String {
    format!("k{:016x}", n)
}

fn bench_put_random(c: &mut Criterion) {
    c.bench_function("map_put_random_10k", |b| {
        let keys: Vec<String> = lcg(1).take(10_000).map(key).collect();
        b.iter_batched(
            || keys.clone(),
            |keys| {
                let mut m: Map<String, u64> = Map::new();
                for (i, k) in keys.into_iter().enumerate() {
                    m.put(k, i as u64);
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
}

// Increasing keys build a chain, so every put walks the whole tree.
fn bench_put_sorted(c: &mut Criterion) {
    c.bench_function("map_put_sorted_1k", |b| {
        b.iter(|| {
            let mut m: Map<u64, u64> = Map::new();
            for k in 0..1_000u64 {
                m.put(k, k);
            }
            black_box(m.height())
        })
    });
}

fn bench_get_hit(c: &mut Criterion) {
    c.bench_function("map_get_hit", |b| {
        let mut m: Map<String, u64> = Map::new();
        let keys: Vec<_> = lcg(7).take(20_000).map(key).collect();
        for (i, k) in keys.iter().cloned().enumerate() {
            m.put(k, i as u64);
        }
        let mut it = keys.iter().cycle();
        b.iter(|| {
            let k = it.next().unwrap();
            black_box(m.get(k));
        })
    });
}

fn bench_get_miss(c: &mut Criterion) {
    c.bench_function("map_get_miss", |b| {
        let mut m: Map<String, u64> = Map::new();
        for (i, x) in lcg(11).take(10_000).enumerate() {
            m.put(key(x), i as u64);
        }
        let mut miss = lcg(0xdead_beef);
        b.iter(|| {
            let k = key(miss.next().unwrap());
            black_box(m.get(&k));
        })
    });
}

fn bench_in_order(c: &mut Criterion) {
    c.bench_function("map_in_order_10k", |b| {
        let mut m: Map<u64, u64> = Map::new();
        for (i, x) in lcg(3).take(10_000).enumerate() {
            m.put(x, i as u64);
        }
        b.iter(|| black_box(m.values().fold(0u64, |acc, v| acc.wrapping_add(*v))))
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(50)
        .measurement_time(Duration::from_secs(8))
        .warm_up_time(Duration::from_secs(2))
}

criterion_group! {
    name = benches;
    config = bench_config();
    targets = bench_put_random, bench_put_sorted, bench_get_hit, bench_get_miss, bench_in_order
}
criterion_main!(benches);
