// Trigger Dispatcher - Turns scheduled steps into sampler playback and rack triggers
//
// Runs on the application thread. Buffer storage, trim windows and the actual
// voice/gain mixing live behind the collaborator traits below.

use crate::messaging::channels::StepProducer;
use crate::messaging::event::{DueStepEvent, SchedulerEvent};
use crate::messaging::notification::StepNotification;
use crate::sequencer::pattern::{ChannelKind, Pattern, SampleRef};
use crate::sequencer::rack::RackCoordinator;
use crate::sequencer::resolver::{StepPosition, Trigger, TriggerSet, collect_triggers};
use ringbuf::traits::Producer;
use std::collections::HashMap;

const MAX_REGION_START: f64 = 0.99;
const MIN_REGION_SPAN: f64 = 0.01;
const MIN_PLAYBACK_RATE: f64 = 0.25;
const MAX_PLAYBACK_RATE: f64 = 4.0;

/// Decoded sample durations, keyed by channel and sample index
pub trait BufferStore {
    /// Duration in seconds, `None` if nothing is loaded
    fn buffer_duration(&self, channel_index: usize, sample_index: u32) -> Option<f64>;
}

/// Trim windows (fractions of the buffer), keyed by channel
pub trait TrimStore {
    fn trim(&self, channel_index: usize) -> Option<TrimWindow>;
}

/// Receiver of sampler playback requests (the voice/gain mixer)
pub trait SamplerOutput {
    fn play(&mut self, request: PlaybackRequest);
}

/// Region of a buffer to play, as fractions in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimWindow {
    pub start: f64,
    pub end: f64,
}

impl TrimWindow {
    pub const FULL: TrimWindow = TrimWindow {
        start: 0.0,
        end: 1.0,
    };
}

/// Fully resolved sampler hit, timed to the transport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackRequest {
    pub channel_index: usize,
    pub sample_index: u32,
    /// Exact transport time of the step
    pub start_time: f64,
    /// Offset into the buffer, seconds
    pub offset: f64,
    /// Length of the selected region, seconds of buffer
    pub duration: f64,
    /// Wall-clock length once the playback rate is applied
    pub audible_duration: f64,
    pub playback_rate: f64,
    pub volume: f32,
    pub allow_overlap: bool,
}

/// Offset/length of a trimmed region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackWindow {
    pub offset: f64,
    pub duration: f64,
    pub audible_duration: f64,
    pub playback_rate: f64,
}

/// Resolve a trim window against a buffer length and playback rate
pub fn playback_window(buffer_duration: f64, trim: TrimWindow, playback_rate: f64) -> PlaybackWindow {
    let start = if trim.start.is_finite() {
        trim.start.clamp(0.0, MAX_REGION_START)
    } else {
        0.0
    };
    let end = trim.end.max(start + MIN_REGION_SPAN).min(1.0);
    let rate = if playback_rate.is_finite() {
        playback_rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
    } else {
        1.0
    };

    let duration = (end - start).max(MIN_REGION_SPAN) * buffer_duration;
    PlaybackWindow {
        offset: start * buffer_duration,
        duration,
        audible_duration: duration / rate,
        playback_rate: rate,
    }
}

/// Start time and next step of a finished pattern repetition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceBoundary {
    pub scheduled_time: f64,
    pub next_step: u64,
}

/// What one `dispatch` call did
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DispatchReport {
    pub triggered: usize,
    pub skipped: usize,
    pub sequence_end: Option<SequenceBoundary>,
}

/// Gates nothing itself (the resolver already did) and fans triggers out
pub struct TriggerDispatcher {
    buffers: Box<dyn BufferStore>,
    trims: Box<dyn TrimStore>,
    output: Box<dyn SamplerOutput>,
    rack: RackCoordinator,
    steps: Option<StepProducer>,
    last_step_time: Option<f64>,
    /// Generation of the pattern behind the last dispatched step
    pattern_generation: Option<u64>,
    dropped_notifications: u64,
}

impl TriggerDispatcher {
    pub fn new(
        buffers: Box<dyn BufferStore>,
        trims: Box<dyn TrimStore>,
        output: Box<dyn SamplerOutput>,
    ) -> Self {
        Self {
            buffers,
            trims,
            output,
            rack: RackCoordinator::new(),
            steps: None,
            last_step_time: None,
            pattern_generation: None,
            dropped_notifications: 0,
        }
    }

    /// Attach the UI step-highlight queue
    pub fn with_step_notifications(mut self, steps: StepProducer) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn rack(&self) -> &RackCoordinator {
        &self.rack
    }

    pub fn rack_mut(&mut self) -> &mut RackCoordinator {
        &mut self.rack
    }

    pub fn dropped_notifications(&self) -> u64 {
        self.dropped_notifications
    }

    /// Forget the ordering reference (transport restart)
    pub fn reset(&mut self) {
        self.last_step_time = None;
        self.pattern_generation = None;
    }

    /// Handle one scheduler event
    ///
    /// Retired patterns are dropped here, on the calling thread.
    pub fn dispatch(&mut self, event: SchedulerEvent) -> DispatchReport {
        match event {
            SchedulerEvent::ScheduleStep(step) => self.dispatch_step(&step),
            SchedulerEvent::SequenceEnd {
                scheduled_time,
                next_step,
            } => DispatchReport {
                sequence_end: Some(SequenceBoundary {
                    scheduled_time,
                    next_step,
                }),
                ..DispatchReport::default()
            },
            SchedulerEvent::Retired(pattern) => {
                drop(pattern);
                DispatchReport::default()
            }
        }
    }

    fn dispatch_step(&mut self, step: &DueStepEvent) -> DispatchReport {
        if let Some(previous) = self.last_step_time {
            if step.scheduled_time < previous {
                log::warn!(
                    "Step {} scheduled at {:.4}s precedes previous step at {:.4}s",
                    step.global_step,
                    step.scheduled_time,
                    previous
                );
            }
        }
        self.last_step_time = Some(step.scheduled_time);

        // A swapped-in pattern starts its own repetitions
        if self
            .pattern_generation
            .is_some_and(|generation| generation != step.pattern_generation)
        {
            self.rack.rearm();
        }
        self.pattern_generation = Some(step.pattern_generation);

        let position = StepPosition {
            step_index: step.step_index,
            cycle: step.cycle,
        };
        let mut report = DispatchReport::default();

        for trigger in &step.triggers {
            let fired = match trigger.kind {
                ChannelKind::Sampler { sample } => {
                    self.play_sample(trigger, sample, step.scheduled_time)
                }
                ChannelKind::Instrument { instrument_id } => {
                    self.rack
                        .trigger(instrument_id, position, step.scheduled_time)
                }
            };
            if fired {
                report.triggered += 1;
            } else {
                report.skipped += 1;
            }
        }

        // UI highlight goes last so it never delays audio dispatch
        if let Some(steps) = self.steps.as_mut() {
            let notification = StepNotification {
                step_index: step.step_index,
                cycle: step.cycle,
                global_step: step.global_step,
                scheduled_time: step.scheduled_time,
            };
            if steps.try_push(notification).is_err() {
                self.dropped_notifications += 1;
            }
        }

        report
    }

    fn play_sample(&mut self, trigger: &Trigger, sample: SampleRef, time: f64) -> bool {
        let channel = trigger.channel_index;
        let Some(buffer_duration) = self.buffers.buffer_duration(channel, sample.sample_index)
        else {
            log::warn!(
                "Channel {}: no buffer for sample {}, trigger skipped",
                channel,
                sample.sample_index
            );
            return false;
        };
        let Some(trim) = self.trims.trim(channel) else {
            log::warn!("Channel {}: no trim window, trigger skipped", channel);
            return false;
        };

        let window = playback_window(buffer_duration, trim, sample.playback_rate as f64);
        self.output.play(PlaybackRequest {
            channel_index: channel,
            sample_index: sample.sample_index,
            start_time: time,
            offset: window.offset,
            duration: window.duration,
            audible_duration: window.audible_duration,
            playback_rate: window.playback_rate,
            volume: trigger.volume,
            allow_overlap: trigger.allow_overlap,
        });
        true
    }

    /// Force-trigger the instruments armed on `step_index`
    ///
    /// Used at transport start so children are ready for the first step;
    /// the scheduled trigger for the same repetition then dedupes.
    pub fn prime_instruments(&mut self, pattern: &Pattern, position: StepPosition, time: f64) -> usize {
        let mut triggers = TriggerSet::new();
        collect_triggers(pattern, position.step_index, &mut triggers);

        let mut primed = 0;
        for trigger in &triggers {
            if let Some(id) = trigger.instrument_id() {
                if self.rack.prime(id, position, time) {
                    primed += 1;
                }
            }
        }
        primed
    }
}

/// In-memory buffer durations
#[derive(Debug, Clone, Default)]
pub struct MemoryBufferStore {
    durations: HashMap<(usize, u32), f64>,
}

impl MemoryBufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, channel_index: usize, sample_index: u32, duration: f64) {
        self.durations.insert((channel_index, sample_index), duration);
    }
}

impl BufferStore for MemoryBufferStore {
    fn buffer_duration(&self, channel_index: usize, sample_index: u32) -> Option<f64> {
        self.durations.get(&(channel_index, sample_index)).copied()
    }
}

/// In-memory trim windows with an optional fallback for unset channels
#[derive(Debug, Clone, Default)]
pub struct MemoryTrimStore {
    windows: HashMap<usize, TrimWindow>,
    fallback: Option<TrimWindow>,
}

impl MemoryTrimStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every channel without its own window plays the full buffer
    pub fn full_range() -> Self {
        Self {
            windows: HashMap::new(),
            fallback: Some(TrimWindow::FULL),
        }
    }

    pub fn insert(&mut self, channel_index: usize, window: TrimWindow) {
        self.windows.insert(channel_index, window);
    }
}

impl TrimStore for MemoryTrimStore {
    fn trim(&self, channel_index: usize) -> Option<TrimWindow> {
        self.windows.get(&channel_index).copied().or(self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::channels::create_step_channel;
    use crate::sequencer::pattern::{Channel, InstrumentId};
    use ringbuf::traits::Consumer;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CapturedOutput(Arc<Mutex<Vec<PlaybackRequest>>>);

    impl SamplerOutput for CapturedOutput {
        fn play(&mut self, request: PlaybackRequest) {
            self.0.lock().unwrap().push(request);
        }
    }

    fn dispatcher_with(buffers: MemoryBufferStore) -> (TriggerDispatcher, CapturedOutput) {
        let output = CapturedOutput::default();
        let dispatcher = TriggerDispatcher::new(
            Box::new(buffers),
            Box::new(MemoryTrimStore::full_range()),
            Box::new(output.clone()),
        );
        (dispatcher, output)
    }

    fn step_with(triggers: &[Trigger], time: f64, global_step: u64) -> SchedulerEvent {
        let mut set = TriggerSet::new();
        for trigger in triggers {
            set.push(*trigger);
        }
        SchedulerEvent::ScheduleStep(DueStepEvent {
            scheduled_time: time,
            step_index: (global_step % 4) as usize,
            cycle: global_step / 4,
            global_step,
            triggers: set,
            pattern_generation: 1,
        })
    }

    fn sampler_trigger(channel_index: usize) -> Trigger {
        Trigger {
            channel_index,
            volume: 0.8,
            allow_overlap: false,
            kind: ChannelKind::Sampler {
                sample: SampleRef::new(0, 2.0),
            },
        }
    }

    #[test]
    fn test_playback_window() {
        let window = playback_window(2.0, TrimWindow { start: 0.25, end: 0.75 }, 2.0);
        assert_eq!(window.offset, 0.5);
        assert_eq!(window.duration, 1.0);
        assert_eq!(window.audible_duration, 0.5);
    }

    #[test]
    fn test_playback_window_clamps() {
        let window = playback_window(1.0, TrimWindow { start: 1.5, end: 0.2 }, 10.0);
        assert!((window.offset - 0.99).abs() < 1e-9);
        assert!((window.duration - 0.01).abs() < 1e-9);
        assert_eq!(window.playback_rate, 4.0);

        let window = playback_window(1.0, TrimWindow { start: -1.0, end: f64::NAN }, 0.0);
        assert_eq!(window.offset, 0.0);
        assert_eq!(window.playback_rate, 0.25);
        assert!((window.duration - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_sampler_request_uses_scheduled_time() {
        let mut buffers = MemoryBufferStore::new();
        buffers.insert(0, 0, 1.0);
        buffers.insert(1, 0, 1.0);
        let (mut dispatcher, output) = dispatcher_with(buffers);

        let report = dispatcher.dispatch(step_with(
            &[sampler_trigger(0), sampler_trigger(1)],
            1.375,
            3,
        ));
        assert_eq!(report.triggered, 2);

        let requests = output.0.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.start_time == 1.375));
        assert_eq!(requests[0].playback_rate, 2.0);
        assert_eq!(requests[0].audible_duration, 0.5);
        assert_eq!(requests[1].volume, 0.8);
    }

    #[test]
    fn test_missing_buffer_skips_single_trigger() {
        let mut buffers = MemoryBufferStore::new();
        buffers.insert(1, 0, 1.0);
        let (mut dispatcher, output) = dispatcher_with(buffers);

        let report = dispatcher.dispatch(step_with(
            &[sampler_trigger(0), sampler_trigger(1)],
            0.0,
            0,
        ));
        assert_eq!(report.triggered, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(output.0.lock().unwrap()[0].channel_index, 1);
    }

    #[test]
    fn test_missing_trim_skips_trigger() {
        let mut buffers = MemoryBufferStore::new();
        buffers.insert(0, 0, 1.0);
        let output = CapturedOutput::default();
        let mut dispatcher = TriggerDispatcher::new(
            Box::new(buffers),
            Box::new(MemoryTrimStore::new()),
            Box::new(output.clone()),
        );

        let report = dispatcher.dispatch(step_with(&[sampler_trigger(0)], 0.0, 0));
        assert_eq!(report.skipped, 1);
        assert!(output.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_step_notification_after_dispatch() {
        let (steps_tx, mut steps_rx) = create_step_channel(1);
        let (dispatcher, _) = dispatcher_with(MemoryBufferStore::new());
        let mut dispatcher = dispatcher.with_step_notifications(steps_tx);

        dispatcher.dispatch(step_with(&[], 0.0, 0));
        dispatcher.dispatch(step_with(&[], 0.125, 1));

        let first = steps_rx.try_pop().unwrap();
        assert_eq!(first.global_step, 0);
        assert!(steps_rx.try_pop().is_none());
        // Queue of one: the second notification was dropped, not blocked on
        assert_eq!(dispatcher.dropped_notifications(), 1);
    }

    #[test]
    fn test_sequence_end_reported() {
        let (mut dispatcher, _) = dispatcher_with(MemoryBufferStore::new());
        let report = dispatcher.dispatch(SchedulerEvent::SequenceEnd {
            scheduled_time: 0.5,
            next_step: 4,
        });
        assert_eq!(
            report.sequence_end,
            Some(SequenceBoundary {
                scheduled_time: 0.5,
                next_step: 4
            })
        );
    }

    #[test]
    fn test_prime_instruments_respects_gating() {
        struct Counter(Arc<Mutex<usize>>);
        impl crate::sequencer::rack::Instrument for Counter {
            fn play(&mut self, _transport_time: f64) {
                *self.0.lock().unwrap() += 1;
            }
            fn stop(&mut self) {}
        }

        let (mut dispatcher, _) = dispatcher_with(MemoryBufferStore::new());
        let plays = Arc::new(Mutex::new(0));
        let live = dispatcher
            .rack_mut()
            .register("live", Box::new(Counter(plays.clone())));
        let muted = dispatcher
            .rack_mut()
            .register("muted", Box::new(Counter(plays.clone())));
        dispatcher.rack_mut().start();

        let mut pattern = Pattern::new(4).unwrap();
        pattern
            .add_channel(Channel::instrument(4, live).with_steps(&[0]))
            .unwrap();
        let mut silent = Channel::instrument(4, muted).with_steps(&[0]);
        silent.muted = true;
        pattern.add_channel(silent).unwrap();
        pattern
            .add_channel(Channel::instrument(4, InstrumentId(42)).with_steps(&[0]))
            .unwrap();

        let position = StepPosition {
            step_index: 0,
            cycle: 0,
        };
        assert_eq!(dispatcher.prime_instruments(&pattern, position, 0.1), 1);
        assert_eq!(*plays.lock().unwrap(), 1);
    }
}
