// Scheduler Host - Application side of the worklet model
//
// Owns the sequences, talks to the `WorkletScheduler` only through the
// control/event ring buffers, and feeds returned events to the dispatcher.

use crate::error::{SchedulerError, SchedulerResult};
use crate::messaging::channels::{ControlProducer, EventConsumer};
use crate::messaging::command::{ControlMessage, ControlPayload};
use crate::messaging::event::SchedulerEvent;
use crate::sequencer::chain::{PlayMode, SequenceList};
use crate::sequencer::dispatcher::{SequenceBoundary, TriggerDispatcher};
use crate::sequencer::pattern::{Pattern, PatternPayload};
use crate::sequencer::resolver::resolve_step;
use crate::sequencer::timeline::{ConfigUpdate, SchedulerConfig};
use ringbuf::traits::{Consumer, Producer};

pub struct SchedulerHost {
    controls: ControlProducer,
    events: EventConsumer,
    dispatcher: TriggerDispatcher,
    /// Mirror of the config last sent to the worklet
    config: SchedulerConfig,
    sequences: SequenceList,
    /// Seconds between `start()` and the first step
    start_delay: f64,
    running: bool,
    last_global_step: u64,
}

impl SchedulerHost {
    pub fn new(
        controls: ControlProducer,
        events: EventConsumer,
        dispatcher: TriggerDispatcher,
        config: SchedulerConfig,
        start_delay: f64,
    ) -> Self {
        Self {
            controls,
            events,
            dispatcher,
            config,
            sequences: SequenceList::new(),
            start_delay: start_delay.max(0.0),
            running: false,
            last_global_step: 0,
        }
    }

    fn send(&mut self, message: ControlMessage) -> SchedulerResult<()> {
        self.controls
            .try_push(message)
            .map_err(|_| SchedulerError::ControlQueueFull)
    }

    pub fn dispatcher(&self) -> &TriggerDispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut TriggerDispatcher {
        &mut self.dispatcher
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn sequences(&self) -> &SequenceList {
        &self.sequences
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Global step of the last dispatched schedule-step
    pub fn last_global_step(&self) -> u64 {
        self.last_global_step
    }

    /// Add a sequence from its payload; instrument names are interned in the rack
    pub fn add_sequence(&mut self, payload: PatternPayload) -> SchedulerResult<usize> {
        let rack = self.dispatcher.rack_mut();
        let pattern = payload.into_pattern(|name| rack.instrument_id(name))?;
        Ok(self.sequences.push(pattern))
    }

    pub fn load_sequence_json(&mut self, json: &str) -> SchedulerResult<usize> {
        let payload = PatternPayload::from_json(json)?;
        self.add_sequence(payload)
    }

    pub fn add_pattern(&mut self, pattern: Pattern) -> usize {
        self.sequences.push(pattern)
    }

    /// Edit a stored sequence; call `request_resync` to push the edit
    pub fn sequence_mut(&mut self, index: usize) -> SchedulerResult<&mut Pattern> {
        self.sequences.pattern_mut(index)
    }

    pub fn select_sequence(&mut self, index: usize) -> SchedulerResult<()> {
        self.sequences.select(index)
    }

    pub fn set_play_mode(&mut self, mode: PlayMode) {
        self.sequences.set_mode(mode);
    }

    /// Send a partial config; rejected fields are logged and ignored
    pub fn configure(&mut self, update: ConfigUpdate) -> SchedulerResult<bool> {
        for field in update.rejected_fields() {
            log::warn!("Ignoring invalid {} in configure message", field);
        }
        if !self.config.apply(&update) {
            return Ok(false);
        }
        log::debug!("Scheduler reconfigured: {}", self.config);
        self.send(ControlMessage::Configure(update))?;
        Ok(true)
    }

    pub fn set_bpm(&mut self, bpm: f64) -> SchedulerResult<bool> {
        self.configure(ConfigUpdate::bpm(bpm))
    }

    /// Start the transport at `now + start_delay`; returns the first step time
    ///
    /// A running transport is stopped first, so the step counter only goes
    /// back to zero through a full stop.
    pub fn start(&mut self, now: f64) -> SchedulerResult<f64> {
        if self.sequences.is_empty() {
            return Err(SchedulerError::NoSequence);
        }
        if self.running {
            self.stop()?;
        }
        self.sequences.reset_playback();
        let pattern = self
            .sequences
            .active()
            .cloned()
            .ok_or(SchedulerError::NoSequence)?;
        let start_time = now + self.start_delay;

        self.send(ControlMessage::Configure(self.config.into()))?;

        self.dispatcher.reset();
        self.dispatcher.rack_mut().start();
        let first = resolve_step(0, pattern.step_count());
        self.dispatcher
            .prime_instruments(&pattern, first, start_time);

        self.send(ControlMessage::SetSequence {
            pattern: Box::new(pattern),
            apply_at_step: Some(0),
        })?;
        self.send(ControlMessage::Start {
            start_time: Some(start_time),
            start_step: 0,
        })?;

        self.running = true;
        self.last_global_step = 0;
        log::info!("Transport started at {:.3}s ({})", start_time, self.config);
        Ok(start_time)
    }

    /// Stop the worklet and cascade stop to every rack instrument
    ///
    /// Events still queued from the stopped run are discarded.
    pub fn stop(&mut self) -> SchedulerResult<()> {
        self.dispatcher.rack_mut().stop();
        self.running = false;
        self.last_global_step = 0;
        self.send(ControlMessage::Stop)?;
        let stale = self.events.clear();
        if stale > 0 {
            log::debug!("Discarded {} queued events on stop", stale);
        }
        log::info!("Transport stopped");
        Ok(())
    }

    /// Re-post the active sequence so pending edits reach the worklet
    ///
    /// While running the swap lands on the step after the last dispatched one.
    pub fn request_resync(&mut self) -> SchedulerResult<()> {
        let Some(pattern) = self.sequences.active().cloned() else {
            return Ok(());
        };
        let at = if self.running {
            self.last_global_step + 1
        } else {
            0
        };
        self.send(ControlMessage::SetSequence {
            pattern: Box::new(pattern),
            apply_at_step: Some(at),
        })
    }

    /// Forward a JSON control message
    ///
    /// Unknown message types are ignored.
    pub fn post_json(&mut self, json: &str) -> SchedulerResult<()> {
        let payload = ControlPayload::from_json(json)?;
        if let ControlPayload::Configure(update) = payload {
            self.configure(update)?;
            return Ok(());
        }

        let rack = self.dispatcher.rack_mut();
        let Some(message) = payload.into_message(|name| rack.instrument_id(name))? else {
            log::debug!("Ignoring unknown control message: {}", json);
            return Ok(());
        };
        match &message {
            ControlMessage::Start { start_step, .. } => {
                if self.running {
                    self.stop()?;
                }
                self.dispatcher.reset();
                self.dispatcher.rack_mut().start();
                self.running = true;
                self.last_global_step = *start_step;
            }
            ControlMessage::Stop => return self.stop(),
            _ => {}
        }
        self.send(message)
    }

    /// Drain worklet events and dispatch them; returns how many were handled
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.events.try_pop() {
            if let SchedulerEvent::ScheduleStep(step) = &event {
                self.last_global_step = step.global_step;
            }
            let report = self.dispatcher.dispatch(event);
            if let Some(boundary) = report.sequence_end {
                self.handle_sequence_end(boundary);
            }
            handled += 1;
        }
        handled
    }

    fn handle_sequence_end(&mut self, boundary: SequenceBoundary) {
        if !self.running || self.sequences.mode() != PlayMode::All {
            return;
        }
        let Some(next) = self.sequences.advance().cloned() else {
            return;
        };
        log::debug!(
            "Chaining sequence {} at step {} ({:.3}s)",
            self.sequences.playback_index(),
            boundary.next_step,
            boundary.scheduled_time
        );
        let message = ControlMessage::SetSequence {
            pattern: Box::new(next),
            apply_at_step: Some(boundary.next_step),
        };
        if let Err(e) = self.send(message) {
            log::error!("Failed to chain next sequence: {}", e);
        }
    }
}
