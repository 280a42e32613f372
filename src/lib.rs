// stepgrid - Library exports for the binary, tests and benchmarks

pub mod audio;
pub mod config;
pub mod error;
pub mod messaging;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use audio::stream::AudioOutput;
pub use audio::timing::{Clock, SystemClock, TransportClock};
pub use config::{EngineConfig, load_config};
pub use error::{ConfigError, PatternError, SchedulerError, SchedulerResult};
pub use messaging::channels::{create_control_channel, create_event_channel, create_step_channel};
pub use sequencer::{
    Channel, ChannelKind, ConfigUpdate, InstrumentId, LookaheadDriver, LookaheadScheduler,
    Pattern, PatternPayload, PlayMode, SampleRef, SchedulerConfig, SchedulerHost,
    TriggerDispatcher, WorkletScheduler,
};
