// Worklet Scheduler - Sample-accurate step scheduling inside the audio callback
//
// RT-CRITICAL: everything reachable from `process_block` must stay free of
// allocation, locks, logging and blocking I/O. The only cross-thread traffic is
// popping control messages and pushing events on lock-free ring buffers.

use crate::messaging::channels::{ControlConsumer, EventProducer};
use crate::messaging::command::ControlMessage;
use crate::messaging::event::{DueStepEvent, SchedulerEvent};
use crate::sequencer::pattern::Pattern;
use crate::sequencer::resolver::{PatternSlot, TriggerSet, collect_triggers, resolve_step};
use crate::sequencer::timeline::{ConfigUpdate, SchedulerConfig};
use ringbuf::traits::{Consumer, Observer, Producer};

/// Upper bound on steps scheduled by a single block
///
/// Anything past it stays due and goes out on the following blocks.
pub const MAX_STEPS_PER_BLOCK: usize = 64;

/// Queue slots one step may need: retired pattern, the step, sequence-end
const EVENTS_PER_STEP: usize = 3;

/// Scheduler that runs once per audio block
pub struct WorkletScheduler {
    sample_rate: f64,
    config: SchedulerConfig,
    /// Frames processed so far: this is the transport clock in this model
    elapsed_samples: u64,
    global_step: u64,
    /// time(g) = anchor_time + (g - anchor_step) * step_duration
    anchor_time: f64,
    anchor_step: u64,
    running: bool,
    slot: PatternSlot,
    controls: ControlConsumer,
    events: EventProducer,
    dropped_events: u64,
}

impl WorkletScheduler {
    pub fn new(sample_rate: f64, controls: ControlConsumer, events: EventProducer) -> Self {
        Self {
            sample_rate,
            config: SchedulerConfig::default(),
            elapsed_samples: 0,
            global_step: 0,
            anchor_time: 0.0,
            anchor_step: 0,
            running: false,
            slot: PatternSlot::new(),
            controls,
            events,
            dropped_events: 0,
        }
    }

    /// Transport time at the start of the next block
    #[inline]
    pub fn current_time(&self) -> f64 {
        self.elapsed_samples as f64 / self.sample_rate
    }

    #[inline]
    fn step_time(&self, global_step: u64) -> f64 {
        let offset = global_step as f64 - self.anchor_step as f64;
        self.anchor_time + offset * self.config.step_duration()
    }

    /// Run one render quantum of `frames` samples
    pub fn process_block(&mut self, frames: usize) {
        self.drain_controls();

        let block_end = (self.elapsed_samples + frames as u64) as f64 / self.sample_rate;
        let mut triggers = TriggerSet::new();
        let mut scheduled = 0;

        while self.running && self.step_time(self.global_step) - block_end <= self.config.lookahead
        {
            if scheduled == MAX_STEPS_PER_BLOCK || self.events.vacant_len() < EVENTS_PER_STEP {
                break;
            }
            let global = self.global_step;
            let events = &mut self.events;
            let dropped = &mut self.dropped_events;
            self.slot.apply_due(global, |old| {
                push_event(events, dropped, SchedulerEvent::Retired(old))
            });

            let Some(pattern) = self.slot.active() else {
                break;
            };
            let step_count = pattern.step_count();
            let position = resolve_step(global, step_count);
            collect_triggers(pattern, position.step_index, &mut triggers);

            let scheduled_time = self.step_time(global);
            push_event(
                &mut self.events,
                &mut self.dropped_events,
                SchedulerEvent::ScheduleStep(DueStepEvent {
                    scheduled_time,
                    step_index: position.step_index,
                    cycle: position.cycle,
                    global_step: global,
                    triggers,
                    pattern_generation: self.slot.generation(),
                }),
            );

            if position.step_index + 1 == step_count {
                let end = SchedulerEvent::SequenceEnd {
                    scheduled_time: self.step_time(global + 1),
                    next_step: global + 1,
                };
                push_event(&mut self.events, &mut self.dropped_events, end);
            }

            self.global_step += 1;
            scheduled += 1;
        }

        self.elapsed_samples += frames as u64;
    }

    fn drain_controls(&mut self) {
        while let Some(message) = self.controls.try_pop() {
            self.handle_control(message);
        }
    }

    /// Apply one control message (also reachable directly for offline use)
    pub fn handle_control(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Configure(update) => self.configure(&update),
            ControlMessage::SetSequence {
                pattern,
                apply_at_step,
            } => self.set_sequence(pattern, apply_at_step),
            ControlMessage::Start {
                start_time,
                start_step,
            } => self.start(start_time, start_step),
            ControlMessage::Stop => self.stop(),
        }
    }

    /// Merge a partial config; invalid fields are ignored
    ///
    /// When the step duration changes mid-run, the anchor moves to the next
    /// unscheduled step so already emitted times stay valid.
    pub fn configure(&mut self, update: &ConfigUpdate) {
        let next_time = self.step_time(self.global_step);
        let old_duration = self.config.step_duration();

        if !self.config.apply(update) {
            return;
        }

        if self.running && self.config.step_duration() != old_duration {
            self.anchor_time = next_time;
            self.anchor_step = self.global_step;
        }
    }

    /// Replace the pattern now (`None` or a past step) or at a future step
    pub fn set_sequence(&mut self, pattern: Box<Pattern>, apply_at_step: Option<u64>) {
        let events = &mut self.events;
        let dropped = &mut self.dropped_events;
        let retire = |old| push_event(events, dropped, SchedulerEvent::Retired(old));
        match apply_at_step {
            Some(step) => self.slot.schedule(pattern, step, self.global_step, retire),
            None => self.slot.set_immediate(pattern, retire),
        }
    }

    /// Start emitting at `start_step`, first step at `start_time`
    pub fn start(&mut self, start_time: Option<f64>, start_step: u64) {
        let now = self.current_time();
        self.anchor_time = start_time.filter(|t| t.is_finite()).unwrap_or(now);
        self.anchor_step = start_step;
        self.global_step = start_step;
        self.running = true;
    }

    /// Stop emitting; no further events until the next start
    pub fn stop(&mut self) {
        let events = &mut self.events;
        let dropped = &mut self.dropped_events;
        self.slot
            .clear_pending(|old| push_event(events, dropped, SchedulerEvent::Retired(old)));
        self.running = false;
        self.global_step = 0;
        self.anchor_step = 0;
        self.anchor_time = 0.0;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Next global step to be scheduled
    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    pub fn elapsed_samples(&self) -> u64 {
        self.elapsed_samples
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn pending_swap_step(&self) -> Option<u64> {
        self.slot.pending_step()
    }

    /// Events lost because the event queue was full
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events
    }
}

#[inline]
fn push_event(events: &mut EventProducer, dropped: &mut u64, event: SchedulerEvent) {
    if events.try_push(event).is_err() {
        // The rejected event is dropped here; a retired pattern would free on
        // this thread, which only happens when the host stops draining.
        *dropped += 1;
    }
}
