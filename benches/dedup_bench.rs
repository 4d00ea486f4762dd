use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use research_harvest::{dedupe, Paper, SourceId};

/// Papers where roughly every third title repeats an earlier one in another case
fn papers(count: usize) -> Vec<Paper> {
    (0..count)
        .map(|i| {
            let title = if i % 3 == 2 {
                format!("  GRAPH NEURAL NETWORKS PART {} ", i - 1)
            } else {
                format!("Graph Neural Networks part {i}")
            };
            Paper::new(title, SourceId::PRIORITY[i % 4])
        })
        .collect()
}

fn benchmark_dedupe(c: &mut Criterion) {
    let mut group = c.benchmark_group("dedupe");
    for count in [100, 1_000, 10_000] {
        let input = papers(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
            b.iter(|| dedupe(black_box(input.clone())));
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_dedupe);
criterion_main!(benches);
