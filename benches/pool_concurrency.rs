use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use criterion::*;
use wallet_census::{
    count_wallets,
    source::{FetchError, Source},
    types::{Batch, TransactionRecord, WorkRange, WorkUnit},
};

/// Source answering every unit after a fixed delay, with a handful of overlapping addresses
struct LatencySource {
    units: u64,
    concurrency: usize,
    latency: Duration,
}

#[async_trait]
impl Source for LatencySource {
    fn range(&self) -> WorkRange {
        WorkRange::new(self.units, 1)
    }

    fn concurrency(&self) -> usize {
        self.concurrency
    }

    async fn fetch(&self, unit: WorkUnit) -> Result<Batch, FetchError> {
        tokio::time::sleep(self.latency).await;

        Ok((0..20)
            .map(|i| TransactionRecord {
                sender: format!("0x{:040x}", unit * 7 + i),
                recipient: format!("0x{:040x}", i),
                timestamp: unit * 1000,
                block_number: unit as i64,
                success: true,
            })
            .collect())
    }
}

/// Walks 200 units at 2ms each, under different concurrency caps
fn pool_concurrency(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("fetch_pool");
    group.sample_size(10);
    let units = 200;
    group.throughput(Throughput::Elements(units));

    for concurrency in [1usize, 5, 50, 200].into_iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(concurrency),
            &concurrency,
            |b, concurrency| {
                b.to_async(&rt).iter(|| async move {
                    let source = LatencySource {
                        units,
                        concurrency: *concurrency,
                        latency: Duration::from_millis(2),
                    };
                    count_wallets(Arc::new(source)).await.unwrap()
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, pool_concurrency);
criterion_main!(benches);
