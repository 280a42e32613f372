use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use ringbuf::traits::Consumer;
use stepgrid::sequencer::lookahead::LookaheadScheduler;
use stepgrid::sequencer::pattern::{Channel, MAX_CHANNELS, Pattern, SampleRef};
use stepgrid::sequencer::resolver::{TriggerSet, collect_triggers};
use stepgrid::sequencer::timeline::{ConfigUpdate, SchedulerConfig};
use stepgrid::{WorkletScheduler, create_control_channel, create_event_channel};

const SAMPLE_RATE: f64 = 48000.0;

fn dense_pattern(channels: usize) -> Pattern {
    let mut pattern = Pattern::new(16).unwrap();
    for i in 0..channels {
        let steps: Vec<usize> = (0..16).filter(|s| (s + i) % 2 == 0).collect();
        let mut channel = Channel::sampler(16, SampleRef::default()).with_steps(&steps);
        channel.muted = i % 7 == 3;
        pattern.add_channel(channel).unwrap();
    }
    pattern
}

/// Trigger collection for one step (runs on the audio thread)
fn bench_collect_triggers(c: &mut Criterion) {
    let mut group = c.benchmark_group("collect_triggers");

    for channels in [1, 16, MAX_CHANNELS] {
        let pattern = dense_pattern(channels);
        let mut set = TriggerSet::new();
        group.bench_with_input(
            BenchmarkId::from_parameter(channels),
            &channels,
            |b, _| {
                b.iter(|| {
                    for step in 0..16 {
                        collect_triggers(black_box(&pattern), step, &mut set);
                    }
                    black_box(set.len())
                });
            },
        );
    }
    group.finish();
}

/// Worklet block processing, including ring buffer traffic
fn bench_worklet_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("worklet_block");

    for block_size in [64usize, 128, 512] {
        let (_control_tx, control_rx) = create_control_channel(16);
        let (event_tx, mut event_rx) = create_event_channel(1024);
        let mut worklet = WorkletScheduler::new(SAMPLE_RATE, control_rx, event_tx);

        // Fast tempo so most blocks emit at least one step
        worklet.configure(&ConfigUpdate {
            bpm: Some(240.0),
            subdivision: Some(16),
            ..ConfigUpdate::default()
        });
        worklet.set_sequence(Box::new(dense_pattern(MAX_CHANNELS)), None);
        worklet.start(None, 0);

        group.bench_with_input(
            BenchmarkId::from_parameter(block_size),
            &block_size,
            |b, &frames| {
                b.iter(|| {
                    worklet.process_block(frames);
                    while let Some(event) = event_rx.try_pop() {
                        black_box(event);
                    }
                });
            },
        );
    }
    group.finish();
}

/// Lookahead tick covering one second of steps
fn bench_lookahead_tick(c: &mut Criterion) {
    c.bench_function("lookahead_tick_1s", |b| {
        let mut scheduler = LookaheadScheduler::new(SchedulerConfig::default(), 0.025);
        scheduler.set_pattern(dense_pattern(16));
        let mut now = 0.0;
        scheduler.start(now, 0);

        b.iter(|| {
            now += 1.0;
            let emitted = scheduler.tick(now, |event| {
                black_box(event);
            });
            black_box(emitted)
        });
    });
}

criterion_group!(
    benches,
    bench_collect_triggers,
    bench_worklet_block,
    bench_lookahead_tick
);
criterion_main!(benches);
