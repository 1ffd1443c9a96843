use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use enact::{compute, use_value, Channel, Component, Runtime, Value};

fn value_read_benchmark(c: &mut Criterion) {
    let value: Value<i32> = use_value(42);

    c.bench_function("value_read", |b| {
        b.iter(|| {
            black_box(value.current());
        });
    });
}

fn value_write_benchmark(c: &mut Criterion) {
    let value: Value<u64> = use_value(0);

    c.bench_function("value_write", |b| {
        let mut i = 0;
        b.iter(|| {
            value.set(black_box(i));
            i += 1;
        });
    });
}

fn channel_fanout_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_fanout");

    for subscriber_count in [1, 10, 100].iter() {
        let channel = Channel::new();
        let mut cursors: Vec<_> = (0..*subscriber_count).map(|_| channel.subscribe()).collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(subscriber_count),
            subscriber_count,
            |b, _| {
                let mut i = 0u64;
                b.iter(|| {
                    channel.send(black_box(i));
                    for cursor in &mut cursors {
                        cursor.advance();
                    }
                    i += 1;
                });
            },
        );
    }
    group.finish();
}

fn spawn_join_benchmark(c: &mut Criterion) {
    let runtime = Runtime::new();

    c.bench_function("spawn_join", |b| {
        b.iter(|| {
            let result = runtime.block_on(|cx| async move {
                let child = cx.spawn(|_| async { Ok(black_box(1)) });
                child.await
            });
            black_box(result)
        });
    });
}

fn computed_stream_benchmark(c: &mut Criterion) {
    let runtime = Runtime::new();
    let numbers = compute(|_, emit| async move {
        for n in 0..100u32 {
            emit.emit(n);
        }
        Ok(())
    });

    c.bench_function("computed_stream_100", |b| {
        b.iter(|| {
            let numbers = numbers.clone();
            runtime.block_on(move |cx| async move {
                let mut cursor = numbers.subscribe(&cx).await?;
                let mut total = 0;
                while let Some(n) = cursor.next().await? {
                    total += n;
                }
                Ok(black_box(total))
            })
        });
    });
}

fn render_update_benchmark(c: &mut Criterion) {
    let runtime = Runtime::new();
    let value = use_value(0u64);
    let view: Component<(), String> = value.component();
    let mount = view.mount(&runtime, ());
    runtime.run_until_stalled();

    c.bench_function("render_update", |b| {
        let mut i = 1;
        b.iter(|| {
            value.set(black_box(i));
            runtime.run_until_stalled();
            i += 1;
        });
    });
    drop(mount);
}

criterion_group!(
    benches,
    value_read_benchmark,
    value_write_benchmark,
    channel_fanout_benchmark,
    spawn_join_benchmark,
    computed_stream_benchmark,
    render_update_benchmark,
);
criterion_main!(benches);
