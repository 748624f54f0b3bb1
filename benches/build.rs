use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use perfhash::{Algorithm, BuildConfig, Builder, HashFunction};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

const SIZES: [u32; 3] = [10_000, 100_000, 1_000_000];

fn keys(n: u32) -> Vec<u32> {
    // odd multiplier: a bijection on u32, so keys are distinct
    (0..n).map(|i| i.wrapping_mul(0x9E37_79B9) ^ 0x5bd1_e995).collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.sample_size(10);
    for n in SIZES {
        let keys = keys(n);
        for algorithm in [Algorithm::Chm, Algorithm::Chm3, Algorithm::Bdz] {
            group.bench_with_input(BenchmarkId::new(format!("{algorithm:?}"), n), &keys, |b, keys| {
                b.iter(|| {
                    Builder::new()
                        .with_config(BuildConfig {
                            algorithm,
                            ..Default::default()
                        })
                        .build_u32(keys.iter().copied())
                        .unwrap()
                })
            });
        }
    }
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");
    let keys = keys(1_000_000);
    for hasher in [HashFunction::Wyhash, HashFunction::Xxh3] {
        for algorithm in [Algorithm::Chm3, Algorithm::Bdz] {
            let f = Builder::new()
                .with_config(BuildConfig {
                    algorithm,
                    ..Default::default()
                })
                .with_hasher(hasher)
                .build_u32(keys.iter().copied())
                .unwrap();
            let mut rng = StdRng::seed_from_u64(0);
            group.bench_function(format!("{algorithm:?}/{hasher:?}"), |b| {
                b.iter(|| {
                    let k = keys[(rng.next_u64() % keys.len() as u64) as usize];
                    black_box(f.index_u32(k))
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_build, bench_lookup);
criterion_main!(benches);
