use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trikiosk::ranking::{rank, ClassPrediction};

const CLASS_COUNTS: [usize; 3] = [3, 64, 1_024];

fn predictions(count: usize) -> Vec<ClassPrediction> {
    (0..count)
        .map(|i| {
            // Deterministic, unsorted probabilities.
            let p = ((i * 37 + 11) % 100) as f32 / 100.0;
            ClassPrediction::new(format!("class {}", i + 1), p)
        })
        .collect()
}

fn bench_rank(c: &mut Criterion) {
    for count in CLASS_COUNTS {
        let input = predictions(count);
        c.bench_with_input(BenchmarkId::new("rank", count), &input, |b, input| {
            b.iter(|| rank(black_box(input.clone())));
        });
    }
}

criterion_group!(benches, bench_rank);
criterion_main!(benches);
