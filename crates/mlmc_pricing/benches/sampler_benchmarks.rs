//! Criterion benchmarks for coupled loss sampling.
//!
//! Benchmarks cover:
//! - Single coupled samples across levels (GBM path model)
//! - Parallel batch sampling throughput for different chunk sizes
//! - Nested inner-Monte-Carlo repricing per resolution

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mlmc_core::math::correlation::CorrelationMatrix;
use mlmc_pricing::models::{
    EuropeanOption, GbmAsset, GbmFactorGenerator, Instrument, LinearPortfolioLoss,
    NestedOptionGenerator, NestedOptionLoss, OptionType,
};
use mlmc_pricing::sampler::{LossSampler, ResolutionSchedule, RetryPolicy};

fn three_asset_sampler() -> LossSampler<GbmFactorGenerator, LinearPortfolioLoss> {
    let corr = CorrelationMatrix::new(&[1.0, 0.5, 0.3, 0.5, 1.0, 0.4, 0.3, 0.4, 1.0], 3).unwrap();
    let assets = vec![
        GbmAsset::new(100.0, 0.05, 0.2).unwrap(),
        GbmAsset::new(50.0, 0.03, 0.25).unwrap(),
        GbmAsset::new(80.0, 0.04, 0.3).unwrap(),
    ];
    let instruments = (0..3)
        .map(|factor| Instrument::Position {
            factor,
            quantity: 10.0,
        })
        .collect();
    let loss = LinearPortfolioLoss::new(assets, instruments, 10.0 / 252.0).unwrap();

    LossSampler::new(
        GbmFactorGenerator::correlated(&corr).unwrap(),
        loss,
        ResolutionSchedule::new(1, 2).unwrap(),
        RetryPolicy::default(),
        42,
    )
}

/// Benchmark one coupled sample per level.
fn bench_single_sample(c: &mut Criterion) {
    let sampler = three_asset_sampler();
    let mut group = c.benchmark_group("single_sample");

    for level in [0usize, 2, 4, 6] {
        group.bench_with_input(BenchmarkId::new("gbm", level), &level, |b, &level| {
            let mut seed = 0u64;
            b.iter(|| {
                seed += 1;
                black_box(sampler.sample(level, seed))
            });
        });
    }

    group.finish();
}

/// Benchmark parallel batch throughput.
fn bench_batch(c: &mut Criterion) {
    let sampler = three_asset_sampler();
    let mut group = c.benchmark_group("sample_batch");
    let count = 10_000u64;
    group.throughput(Throughput::Elements(count));

    for chunk in [64usize, 1024, 4096] {
        group.bench_with_input(BenchmarkId::new("level3", chunk), &chunk, |b, &chunk| {
            b.iter(|| black_box(sampler.sample_batch(3, 0, count, chunk)));
        });
    }

    group.finish();
}

/// Benchmark nested repricing as the inner path count doubles.
fn bench_nested(c: &mut Criterion) {
    let option = EuropeanOption {
        option_type: OptionType::Put,
        strike: 95.0,
        maturity: 0.5,
        quantity: 100.0,
    };
    let model = NestedOptionLoss::new(GbmAsset::new(100.0, 0.06, 0.25).unwrap(), 0.03, option, 1.0 / 52.0).unwrap();
    let sampler = LossSampler::new(
        NestedOptionGenerator,
        model,
        ResolutionSchedule::new(16, 2).unwrap(),
        RetryPolicy::default(),
        7,
    );
    let mut group = c.benchmark_group("nested_sample");

    for level in [0usize, 3, 6] {
        group.bench_with_input(BenchmarkId::new("put", level), &level, |b, &level| {
            let mut seed = 0u64;
            b.iter(|| {
                seed += 1;
                black_box(sampler.sample(level, seed))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_single_sample, bench_batch, bench_nested);
criterion_main!(benches);
