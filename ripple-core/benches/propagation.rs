//! Propagation benchmarks: fan-out, deep chains and batched writes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use ripple_core::{Computed, Disposer, Runtime};

fn fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    for width in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            let rt = Runtime::new();
            let source = rt.signal(0u64);
            let disposers: Vec<Disposer> = (0..width)
                .map(|_| {
                    let source = source.clone();
                    rt.reaction(move || Ok(source.get())).start()
                })
                .collect();

            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                source.set(black_box(next)).unwrap();
            });

            for disposer in disposers {
                disposer.dispose();
            }
        });
    }
    group.finish();
}

fn deep_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("deep_chain");
    for depth in [10usize, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let rt = Runtime::new();
            let source = rt.signal(0u64);

            let first = {
                let source = source.clone();
                rt.computed(move || source.get() + 1)
            };
            let mut chain: Vec<Computed<u64>> = vec![first];
            for _ in 1..depth {
                let Some(previous) = chain.last().cloned() else {
                    break;
                };
                chain.push(rt.try_computed(move |_| Ok(previous.get()? + 1)));
            }

            let Some(tail) = chain.last().cloned() else {
                return;
            };
            let disposer = rt.reaction(move || Ok(tail.get()?)).start();

            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                source.set(black_box(next)).unwrap();
            });

            disposer.dispose();
        });
    }
    group.finish();
}

fn batched_writes(c: &mut Criterion) {
    c.bench_function("batched_writes", |b| {
        let rt = Runtime::new();
        let signals: Vec<_> = (0..100).map(|_| rt.signal(0u64)).collect();
        let disposer = {
            let signals = signals.clone();
            rt.reaction(move || Ok(signals.iter().map(|s| s.get()).sum::<u64>()))
                .start()
        };

        let mut next = 0u64;
        b.iter(|| {
            next += 1;
            rt.action(|| {
                for signal in &signals {
                    signal.set(next)?;
                }
                Ok(())
            })
            .unwrap();
        });

        disposer.dispose();
    });
}

criterion_group!(benches, fan_out, deep_chain, batched_writes);
criterion_main!(benches);
