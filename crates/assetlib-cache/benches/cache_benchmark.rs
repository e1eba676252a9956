use assetlib_cache::{CacheConfig, ExpiringCache};
use assetlib_core::EvictionPolicy;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

fn generate_cache_key(index: usize) -> String {
    format!("asset:test_key_{}", index)
}

fn generate_payload(len: usize) -> String {
    (0..len).map(|_| fastrand::alphanumeric()).collect()
}

/// Inserts into a cache that is already at budget, so every set evicts.
fn bench_insert_under_pressure(c: &mut Criterion) {
    let mut group = c.benchmark_group("expiring_cache_insert");
    group.measurement_time(Duration::from_secs(5));

    for entries in [100usize, 1_000, 5_000].iter() {
        group.bench_with_input(BenchmarkId::new("evicting", entries), entries, |b, &n| {
            let payload = generate_payload(64);
            let cache = ExpiringCache::new(CacheConfig {
                max_size: n * (payload.len() + 2),
                default_ttl: None,
                policy: EvictionPolicy::Lru,
            });
            for i in 0..n {
                cache.insert(&generate_cache_key(i), payload.clone(), None, Vec::new());
            }
            let mut next = n;
            b.iter(|| {
                next += 1;
                black_box(cache.insert(&generate_cache_key(next), payload.clone(), None, Vec::new()));
            });
        });
    }

    group.finish();
}

fn bench_get_hits(c: &mut Criterion) {
    let cache = ExpiringCache::new(CacheConfig::default());
    for i in 0..1_000 {
        cache.insert(&generate_cache_key(i), generate_payload(128), None, Vec::new());
    }

    c.bench_function("expiring_cache_get_hit", |b| {
        b.iter(|| {
            let key = generate_cache_key(fastrand::usize(..1_000));
            black_box(cache.get_entry(&key));
        });
    });
}

criterion_group!(benches, bench_insert_under_pressure, bench_get_hits);
criterion_main!(benches);
