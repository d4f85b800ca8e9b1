use bulker::{Accumulator, AccumulatorOptions, BatchHandler, Outputs};
use core::{convert::Infallible, hint::black_box, time::Duration};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use futures::future::join_all;
use tokio::runtime::Builder;

// Number of submissions per benchmark iteration.
const TOTAL_ITEMS: u64 = 4096;

struct Double;

impl BatchHandler for Double {
    type Input = u64;
    type Output = u64;
    type Error = Infallible;

    async fn handle(&self, items: &[u64]) -> Result<Outputs<u64, u64>, Infallible> {
        Ok(items.iter().map(|&x| (x, x * 2)).collect())
    }
}

/// Measures end-to-end submit-to-result throughput for a range of batch
/// sizes. All items are submitted at once, so every batch but the last closes
/// on size.
fn bench_submit(c: &mut Criterion) {
    let rt = Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_time()
        .build()
        .expect("failed to build runtime");

    let mut group = c.benchmark_group("accumulator/submit");
    group.throughput(Throughput::Elements(TOTAL_ITEMS));

    for max_batch_size in [1_usize, 16, 128, 1024] {
        group.bench_with_input(
            BenchmarkId::from_parameter(max_batch_size),
            &max_batch_size,
            |b, &max_batch_size| {
                let options = AccumulatorOptions::new()
                    .with_max_batch_size(max_batch_size)
                    .with_window(Duration::from_millis(1));
                let accumulator = rt.block_on(async {
                    Accumulator::new(Double, options).expect("valid options")
                });

                b.to_async(&rt).iter(|| {
                    let accumulator = accumulator.clone();
                    async move {
                        let submissions = (0..TOTAL_ITEMS).map(|x| accumulator.submit(x));
                        for res in join_all(submissions).await {
                            black_box(res.expect("double never fails"));
                        }
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_submit);
criterion_main!(benches);
