// Sequencer module - Step patterns, scheduling (lookahead and worklet) and dispatch

pub mod chain;
pub mod dispatcher;
pub mod host;
pub mod lookahead;
pub mod pattern;
pub mod rack;
pub mod resolver;
pub mod timeline;
pub mod worklet;

pub use chain::{PlayMode, SequenceList};
pub use dispatcher::{
    BufferStore, DispatchReport, MemoryBufferStore, MemoryTrimStore, PlaybackRequest,
    SamplerOutput, TrimStore, TrimWindow, TriggerDispatcher,
};
pub use host::SchedulerHost;
pub use lookahead::{LookaheadDriver, LookaheadScheduler};
pub use pattern::{Channel, ChannelKind, InstrumentId, Pattern, PatternPayload, SampleRef};
pub use rack::{Instrument, RackCoordinator, RackState};
pub use resolver::{PatternSlot, StepPosition, Trigger, TriggerSet, collect_triggers, resolve_step};
pub use timeline::{ConfigUpdate, SchedulerConfig};
pub use worklet::WorkletScheduler;
