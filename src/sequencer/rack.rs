// Instrument Rack Coordinator - Nested sub-sequencers driven by the parent transport
//
// Each instrument channel points at a child instrument (usually another
// sequencer). The parent hands down its transport time, makes sure a child
// fires once per pattern repetition, and cascades stop.

use crate::sequencer::pattern::InstrumentId;
use crate::sequencer::resolver::StepPosition;
use std::collections::HashMap;

/// A child instrument driven by the rack
pub trait Instrument: Send {
    /// Start playback at the given parent transport time
    fn play(&mut self, transport_time: f64);

    /// Silence and rewind
    fn stop(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RackState {
    Idle,
    Playing,
}

struct RackEntry {
    name: String,
    instrument: Option<Box<dyn Instrument>>,
    state: RackState,
    last_trigger: Option<StepPosition>,
}

/// Registry of child instruments keyed by interned `InstrumentId`
#[derive(Default)]
pub struct RackCoordinator {
    entries: Vec<RackEntry>,
    by_name: HashMap<String, InstrumentId>,
    running: bool,
}

impl RackCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern an instrument name
    ///
    /// Unknown names get a fresh id with no instrument attached, so patterns
    /// can reference instruments that are registered later.
    pub fn instrument_id(&mut self, name: &str) -> InstrumentId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = InstrumentId(self.entries.len() as u32);
        self.entries.push(RackEntry {
            name: name.to_string(),
            instrument: None,
            state: RackState::Idle,
            last_trigger: None,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Attach an instrument under `name`, replacing any previous one
    pub fn register(&mut self, name: &str, instrument: Box<dyn Instrument>) -> InstrumentId {
        let id = self.instrument_id(name);
        let running = self.running;
        if let Some(entry) = self.entry_mut(id) {
            if let Some(mut previous) = entry.instrument.replace(instrument) {
                previous.stop();
            }
            entry.state = if running {
                RackState::Playing
            } else {
                RackState::Idle
            };
            entry.last_trigger = None;
        }
        log::debug!("Registered instrument '{}' as {:?}", name, id);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<InstrumentId> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: InstrumentId) -> Option<&str> {
        self.entries.get(id.0 as usize).map(|e| e.name.as_str())
    }

    pub fn state(&self, id: InstrumentId) -> Option<RackState> {
        self.entries.get(id.0 as usize).map(|e| e.state)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn entry_mut(&mut self, id: InstrumentId) -> Option<&mut RackEntry> {
        self.entries.get_mut(id.0 as usize)
    }

    /// Transport start: every registered instrument becomes Playing
    pub fn start(&mut self) {
        self.running = true;
        for entry in &mut self.entries {
            entry.last_trigger = None;
            if entry.instrument.is_some() {
                entry.state = RackState::Playing;
            }
        }
    }

    /// Fire `id` for a scheduled step
    ///
    /// Fires at most once per pattern repetition: a step in the same cycle
    /// as the last trigger is ignored. Returns true if the child was played.
    pub fn trigger(&mut self, id: InstrumentId, position: StepPosition, time: f64) -> bool {
        self.fire(id, position, time, false)
    }

    /// Forced trigger used at transport start
    ///
    /// Records the position so the matching scheduled step dedupes.
    pub fn prime(&mut self, id: InstrumentId, position: StepPosition, time: f64) -> bool {
        self.fire(id, position, time, true)
    }

    fn fire(&mut self, id: InstrumentId, position: StepPosition, time: f64, force: bool) -> bool {
        let Some(entry) = self.entries.get_mut(id.0 as usize) else {
            log::warn!("Unknown instrument {:?}, trigger skipped", id);
            return false;
        };
        let Some(instrument) = entry.instrument.as_mut() else {
            log::warn!(
                "Instrument '{}' is not registered, trigger skipped",
                entry.name
            );
            return false;
        };
        if entry.state != RackState::Playing {
            return false;
        }

        let retrigger = force
            || entry
                .last_trigger
                .is_none_or(|last| last.cycle != position.cycle);
        if !retrigger {
            return false;
        }

        instrument.play(time);
        entry.last_trigger = Some(position);
        true
    }

    /// Forget every last trigger so the next armed step fires
    ///
    /// Called when a different pattern takes over: its repetitions do not
    /// line up with the cycle numbers of the one it replaced.
    pub fn rearm(&mut self) {
        for entry in &mut self.entries {
            entry.last_trigger = None;
        }
    }

    /// Stop one child and mark it Idle
    pub fn deactivate(&mut self, id: InstrumentId) {
        if let Some(entry) = self.entry_mut(id) {
            if let Some(instrument) = entry.instrument.as_mut() {
                instrument.stop();
            }
            entry.state = RackState::Idle;
            entry.last_trigger = None;
        }
    }

    /// Transport stop: cascade to every child
    pub fn stop(&mut self) {
        self.running = false;
        for entry in &mut self.entries {
            if let Some(instrument) = entry.instrument.as_mut() {
                instrument.stop();
            }
            entry.state = RackState::Idle;
            entry.last_trigger = None;
        }
    }
}
