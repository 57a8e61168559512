use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ewah_bitmap::{BitCounter, Ewah64};
use rand::Rng;

// returns k runs of (num_zeros, num_ones) that sum to n bits
fn build_runs(k: usize, n: usize) -> Vec<(usize, usize)> {
    assert!(k % 2 == 0);
    let mut rng = rand::thread_rng();

    let mut samples = rand::seq::index::sample(&mut rng, n - 1, k - 1).into_vec();
    for sample in samples.iter_mut() {
        *sample += 1;
    }
    samples.sort();
    samples.insert(0, 0);
    samples.push(n);

    let mut deltas = vec![];
    for (&prev, &cur) in samples.iter().zip(samples.iter().skip(1)) {
        deltas.push(cur - prev);
    }
    assert!(deltas.len() % 2 == 0);

    let mut v = vec![];
    for runs in deltas.chunks(2) {
        v.push((runs[0], runs[1]));
    }
    assert!(deltas.iter().sum::<usize>() == n);
    v
}

fn build_bitmap(runs: &[(usize, usize)]) -> Ewah64 {
    let mut bm = Ewah64::new();
    let mut index = 0;
    for (num_zeros, num_ones) in runs.iter().copied() {
        index += num_zeros;
        bm.set_size_in_bits(index, false).unwrap();
        index += num_ones;
        bm.set_size_in_bits(index, true).unwrap();
    }
    bm
}

fn bench_ops(c: &mut Criterion) {
    let num_runs = vec![
        100,     //
        10_000,  //
        100_000, //
    ]; // k
    let bitmap_length = 10_000_000usize; // n

    let bitmaps: Vec<(Ewah64, Ewah64)> = num_runs
        .iter()
        .map(|&k| (build_bitmap(&build_runs(k, bitmap_length)), build_bitmap(&build_runs(k, bitmap_length))))
        .collect();

    let mut group = c.benchmark_group("Merge");
    for (k, (a, b)) in num_runs.iter().copied().zip(bitmaps.iter()) {
        group.bench_function(BenchmarkId::new("And", k), |bench| {
            bench.iter(|| a.and(b).size_in_words())
        });
        group.bench_function(BenchmarkId::new("Or", k), |bench| {
            bench.iter(|| a.or(b).size_in_words())
        });
        group.bench_function(BenchmarkId::new("Xor", k), |bench| {
            bench.iter(|| a.xor(b).size_in_words())
        });
        group.bench_function(BenchmarkId::new("AndCardinality", k), |bench| {
            bench.iter(|| a.and_cardinality(b))
        });
        group.bench_function(BenchmarkId::new("Intersects", k), |bench| {
            bench.iter(|| a.intersects(b))
        });
    }
    group.finish();

    let mut group = c.benchmark_group("Scan");
    for (k, (a, _)) in num_runs.iter().copied().zip(bitmaps.iter()) {
        group.bench_function(BenchmarkId::new("Cardinality", k), |bench| {
            bench.iter(|| a.cardinality())
        });
        group.bench_function(BenchmarkId::new("Discharge", k), |bench| {
            bench.iter(|| {
                let mut counter = BitCounter::new();
                let mut cursor = ewah_bitmap::BufferedCursor::new(a.as_words());
                let _ = cursor.discharge_all(&mut counter);
                counter.count()
            })
        });
    }
    group.finish();

    let mut group = c.benchmark_group("Mutate");
    let mut rng = rand::thread_rng();
    for (k, (a, _)) in num_runs.iter().copied().zip(bitmaps.iter()) {
        group.bench_function(BenchmarkId::new("SetRandom", k), |bench| {
            let mut bm = a.clone();
            bench.iter(|| bm.set(rng.gen_range(0..bitmap_length)))
        });
        group.bench_function(BenchmarkId::new("Get", k), |bench| {
            bench.iter(|| a.get(rng.gen_range(0..bitmap_length)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_ops);
criterion_main!(benches);
