use ringbuf::traits::Consumer;
use stepgrid::audio::timing::{Clock, SystemClock, TransportClock};
use stepgrid::sequencer::dispatcher::{
    BufferStore, MemoryTrimStore, PlaybackRequest, SamplerOutput, TriggerDispatcher,
};
use stepgrid::sequencer::pattern::{ChannelType, PatternPayload};
use stepgrid::sequencer::rack::Instrument;
use stepgrid::{
    AudioOutput, EngineConfig, LookaheadDriver, LookaheadScheduler, SchedulerHost,
    SchedulerResult, WorkletScheduler, create_control_channel, create_event_channel,
    create_step_channel, load_config,
};
use std::env;
use std::fs;
use std::thread;
use std::time::{Duration, Instant};

const DEMO_PATTERN: &str = include_str!("../doc/examples/demo_pattern.json");

/// How long the demo plays before stopping
const PLAY_DURATION: Duration = Duration::from_secs(8);
/// Host polling period in worklet mode
const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Every sample pretends to be this long (buffers are not loaded here)
const DEMO_BUFFER_SECONDS: f64 = 0.5;

/// Environment variable holding the log filter (`debug`, `stepgrid=trace`, ...)
const LOG_ENV: &str = "STEPGRID_LOG";

fn log_builder(var: &str) -> env_logger::Builder {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::new().filter_or(var, "info"));
    builder.format_timestamp_millis();
    builder
}

fn init_logging() {
    log_builder(LOG_ENV).init();
}

/// Every (channel, sample) has a buffer of the same length
struct DemoBuffers;

impl BufferStore for DemoBuffers {
    fn buffer_duration(&self, _channel_index: usize, _sample_index: u32) -> Option<f64> {
        Some(DEMO_BUFFER_SECONDS)
    }
}

/// Prints sampler hits instead of mixing them
struct LoggingOutput;

impl SamplerOutput for LoggingOutput {
    fn play(&mut self, request: PlaybackRequest) {
        log::info!(
            "sampler ch{} sample {} @ {:.3}s (offset {:.3}s, {:.3}s at x{:.2}, vol {:.2})",
            request.channel_index,
            request.sample_index,
            request.start_time,
            request.offset,
            request.audible_duration,
            request.playback_rate,
            request.volume
        );
    }
}

/// Nested instrument that only reports what it is told
struct LoggingInstrument {
    name: String,
}

impl Instrument for LoggingInstrument {
    fn play(&mut self, transport_time: f64) {
        log::info!("instrument '{}' play @ {:.3}s", self.name, transport_time);
    }

    fn stop(&mut self) {
        log::info!("instrument '{}' stop", self.name);
    }
}

fn build_dispatcher(payload: &PatternPayload) -> TriggerDispatcher {
    let mut dispatcher = TriggerDispatcher::new(
        Box::new(DemoBuffers),
        Box::new(MemoryTrimStore::full_range()),
        Box::new(LoggingOutput),
    );

    let names = payload
        .channels
        .iter()
        .filter(|c| c.channel_type == ChannelType::Instrument)
        .filter_map(|c| c.instrument_id.as_deref());
    for name in names {
        let instrument = LoggingInstrument {
            name: name.to_string(),
        };
        dispatcher.rack_mut().register(name, Box::new(instrument));
    }
    dispatcher
}

fn run_worklet(config: &EngineConfig, payload: PatternPayload) -> SchedulerResult<()> {
    let output = AudioOutput::open()?;
    let clock = TransportClock::new(output.sample_rate());

    let (control_tx, control_rx) = create_control_channel(config.control_capacity);
    let (event_tx, event_rx) = create_event_channel(config.event_capacity);
    let (step_tx, mut step_rx) = create_step_channel(config.step_capacity);

    let worklet = WorkletScheduler::new(output.sample_rate(), control_rx, event_tx);
    let _stream = output.run_worklet(worklet, clock.clone())?;

    let dispatcher = build_dispatcher(&payload).with_step_notifications(step_tx);
    let mut host = SchedulerHost::new(
        control_tx,
        event_rx,
        dispatcher,
        config.scheduler,
        config.start_delay,
    );
    host.add_sequence(payload)?;
    host.start(clock.now())?;

    let deadline = Instant::now() + PLAY_DURATION;
    while Instant::now() < deadline {
        host.poll();
        while let Some(step) = step_rx.try_pop() {
            log::debug!(
                "step {} (cycle {}) @ {:.3}s",
                step.step_index,
                step.cycle,
                step.scheduled_time
            );
        }
        thread::sleep(POLL_INTERVAL);
    }

    host.stop()?;
    host.poll();
    Ok(())
}

fn run_lookahead<C: Clock>(
    config: &EngineConfig,
    payload: PatternPayload,
    clock: C,
) -> SchedulerResult<()> {
    let mut dispatcher = build_dispatcher(&payload);
    let rack = dispatcher.rack_mut();
    let pattern = payload.into_pattern(|name| rack.instrument_id(name))?;

    let mut scheduler = LookaheadScheduler::new(config.scheduler, config.wake_interval());
    scheduler.set_pattern(pattern);

    let mut driver = LookaheadDriver::new(scheduler, clock, config.start_delay);
    driver.start(&mut dispatcher);
    driver.run_for(PLAY_DURATION, &mut dispatcher);
    driver.stop(&mut dispatcher);
    Ok(())
}

fn run() -> SchedulerResult<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let mode = args.first().map(String::as_str).unwrap_or("worklet");

    let config = match args.get(2) {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };
    let payload = match args.get(1) {
        Some(path) => PatternPayload::from_json(&fs::read_to_string(path)?)?,
        None => PatternPayload::from_json(DEMO_PATTERN)?,
    };

    log::info!("stepgrid ({} mode, {})", mode, config.scheduler);

    match mode {
        "worklet" => run_worklet(&config, payload),
        "lookahead" => match AudioOutput::open() {
            Ok(output) => {
                let clock = TransportClock::new(output.sample_rate());
                let _stream = output.run_clock(clock.clone())?;
                run_lookahead(&config, payload, clock)
            }
            Err(e) => {
                log::warn!("{}; falling back to the system clock", e);
                run_lookahead(&config, payload, SystemClock::new())
            }
        },
        other => {
            log::error!("Unknown mode '{}'", other);
            eprintln!("Usage: stepgrid [worklet|lookahead] [pattern.json] [config.json|config.ron]");
            std::process::exit(2);
        }
    }
}

fn main() {
    init_logging();
    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
