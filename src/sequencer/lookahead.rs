// Lookahead Scheduler - Timer-driven scheduling on the application thread
//
// The timer only decides *when to compute*. Every event carries the clock time
// at which it must sound, so a late or jittery wake never shifts a step.

use crate::audio::timing::Clock;
use crate::messaging::event::{DueStepEvent, SchedulerEvent};
use crate::sequencer::chain::{PlayMode, SequenceList};
use crate::sequencer::dispatcher::TriggerDispatcher;
use crate::sequencer::pattern::Pattern;
use crate::sequencer::resolver::{
    PatternSlot, StepPosition, TriggerSet, collect_triggers, resolve_step,
};
use crate::sequencer::timeline::{ConfigUpdate, SchedulerConfig};
use std::thread;
use std::time::{Duration, Instant};

/// Default timer period, well below the default lookahead
pub const DEFAULT_WAKE_INTERVAL: f64 = 0.025;

pub struct LookaheadScheduler {
    config: SchedulerConfig,
    /// Seconds between timer wakes
    wake_interval: f64,
    slot: PatternSlot,
    /// Sequence list used for play-all chaining
    chain: Option<SequenceList>,
    next_scheduled_time: f64,
    global_step: u64,
    running: bool,
    next_wake: Option<f64>,
}

impl LookaheadScheduler {
    pub fn new(config: SchedulerConfig, wake_interval: f64) -> Self {
        let scheduler = Self {
            config,
            wake_interval,
            slot: PatternSlot::new(),
            chain: None,
            next_scheduled_time: 0.0,
            global_step: 0,
            running: false,
            next_wake: None,
        };
        scheduler.check_wake_interval();
        scheduler
    }

    fn check_wake_interval(&self) {
        if self.wake_interval >= self.config.lookahead {
            log::warn!(
                "Wake interval {:.0} ms >= lookahead {:.0} ms, steps may be missed",
                self.wake_interval * 1000.0,
                self.config.lookahead * 1000.0
            );
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn wake_interval(&self) -> f64 {
        self.wake_interval
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    pub fn next_scheduled_time(&self) -> f64 {
        self.next_scheduled_time
    }

    /// Clock time of the next timer wake, `None` when stopped
    pub fn next_wake(&self) -> Option<f64> {
        self.next_wake
    }

    pub fn pattern(&self) -> Option<&Pattern> {
        self.slot.active()
    }

    /// In-place edits (mute, solo, step toggles) are picked up on the next tick
    pub fn pattern_mut(&mut self) -> Option<&mut Pattern> {
        self.slot.active_mut()
    }

    /// Replace the pattern right away
    pub fn set_pattern(&mut self, pattern: Pattern) {
        self.slot.set_immediate(Box::new(pattern), drop);
    }

    /// Replace the pattern once `global_step` reaches `activate_at_step`
    pub fn queue_pattern(&mut self, pattern: Pattern, activate_at_step: u64) {
        self.slot
            .schedule(Box::new(pattern), activate_at_step, self.global_step, drop);
    }

    /// Use a sequence list; its active sequence becomes the pattern
    pub fn set_chain(&mut self, chain: SequenceList) {
        if let Some(active) = chain.active() {
            self.set_pattern(active.clone());
        }
        self.chain = Some(chain);
    }

    /// Merge a partial config; only future steps see a new tempo
    pub fn configure(&mut self, update: &ConfigUpdate) -> bool {
        let changed = self.config.apply(update);
        if changed {
            log::debug!("Lookahead scheduler reconfigured: {}", self.config);
            self.check_wake_interval();
        }
        changed
    }

    pub fn set_bpm(&mut self, bpm: f64) -> bool {
        self.configure(&ConfigUpdate::bpm(bpm))
    }

    /// Begin scheduling with the first step at `start_time`
    pub fn start(&mut self, start_time: f64, start_step: u64) {
        if let Some(chain) = self.chain.as_mut() {
            chain.reset_playback();
            if let Some(active) = chain.active() {
                self.slot.set_immediate(Box::new(active.clone()), drop);
            }
        }
        self.next_scheduled_time = start_time;
        self.global_step = start_step;
        self.running = true;
        self.next_wake = Some(start_time);
    }

    /// Cancel the pending wake and reset the step counter
    pub fn stop(&mut self) {
        self.running = false;
        self.next_wake = None;
        self.next_scheduled_time = 0.0;
        self.global_step = 0;
        self.slot.clear_pending(drop);
    }

    /// Schedule every step that falls inside `now + lookahead`
    ///
    /// Returns the number of steps emitted.
    pub fn tick<F>(&mut self, now: f64, mut emit: F) -> usize
    where
        F: FnMut(SchedulerEvent),
    {
        if !self.running {
            return 0;
        }

        let mut emitted = 0;
        let mut triggers = TriggerSet::new();

        while self.next_scheduled_time < now + self.config.lookahead {
            let global = self.global_step;
            self.slot
                .apply_due(global, |old| emit(SchedulerEvent::Retired(old)));

            let Some(pattern) = self.slot.active() else {
                break;
            };
            let step_count = pattern.step_count();
            let position = resolve_step(global, step_count);
            collect_triggers(pattern, position.step_index, &mut triggers);

            let step_duration = self.config.step_duration();
            emit(SchedulerEvent::ScheduleStep(DueStepEvent {
                scheduled_time: self.next_scheduled_time,
                step_index: position.step_index,
                cycle: position.cycle,
                global_step: global,
                triggers,
                pattern_generation: self.slot.generation(),
            }));
            emitted += 1;

            if position.step_index + 1 == step_count {
                self.end_of_sequence(position, global + 1, step_duration, &mut emit);
            }

            self.global_step += 1;
            self.next_scheduled_time += step_duration;
        }

        self.next_wake = Some(now + self.wake_interval);
        emitted
    }

    fn end_of_sequence<F>(
        &mut self,
        position: StepPosition,
        next_step: u64,
        step_duration: f64,
        emit: &mut F,
    ) where
        F: FnMut(SchedulerEvent),
    {
        emit(SchedulerEvent::SequenceEnd {
            scheduled_time: self.next_scheduled_time + step_duration,
            next_step,
        });

        let Some(chain) = self.chain.as_mut() else {
            return;
        };
        if chain.mode() != PlayMode::All {
            return;
        }
        if let Some(next) = chain.advance().cloned() {
            log::debug!(
                "Cycle {} finished, chaining sequence {} at step {}",
                position.cycle,
                chain.playback_index(),
                next_step
            );
            let next = Box::new(next);
            self.slot
                .schedule(next, next_step, self.global_step, |old| {
                    emit(SchedulerEvent::Retired(old))
                });
        }
    }
}

/// Binds a `LookaheadScheduler` to a clock and a dispatcher
pub struct LookaheadDriver<C: Clock> {
    scheduler: LookaheadScheduler,
    clock: C,
    /// Seconds between `start()` and the first step
    start_delay: f64,
}

impl<C: Clock> LookaheadDriver<C> {
    pub fn new(scheduler: LookaheadScheduler, clock: C, start_delay: f64) -> Self {
        Self {
            scheduler,
            clock,
            start_delay: start_delay.max(0.0),
        }
    }

    pub fn scheduler(&self) -> &LookaheadScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut LookaheadScheduler {
        &mut self.scheduler
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Start the transport; returns the time of the first step
    pub fn start(&mut self, dispatcher: &mut TriggerDispatcher) -> f64 {
        let start_time = self.clock.now() + self.start_delay;
        dispatcher.reset();
        dispatcher.rack_mut().start();
        self.scheduler.start(start_time, 0);

        if let Some(pattern) = self.scheduler.pattern() {
            let first = resolve_step(0, pattern.step_count());
            dispatcher.prime_instruments(pattern, first, start_time);
        }
        log::info!(
            "Lookahead transport started at {:.3}s ({})",
            start_time,
            self.scheduler.config()
        );
        start_time
    }

    /// One timer wake: schedule and dispatch everything due
    pub fn wake(&mut self, dispatcher: &mut TriggerDispatcher) -> usize {
        let now = self.clock.now();
        self.scheduler.tick(now, |event| {
            dispatcher.dispatch(event);
        })
    }

    /// Keep waking every `wake_interval` for `duration` of wall time
    pub fn run_for(&mut self, duration: Duration, dispatcher: &mut TriggerDispatcher) {
        let deadline = Instant::now() + duration;
        let interval = Duration::from_secs_f64(self.scheduler.wake_interval().max(0.001));
        while self.scheduler.is_running() && Instant::now() < deadline {
            self.wake(dispatcher);
            thread::sleep(interval);
        }
    }

    /// Stop scheduling and cascade stop to the instrument rack
    pub fn stop(&mut self, dispatcher: &mut TriggerDispatcher) {
        self.scheduler.stop();
        dispatcher.rack_mut().stop();
        log::info!("Lookahead transport stopped");
    }
}
