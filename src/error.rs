// Error types for the scheduler core
//
// Nothing in here is ever raised on the audio thread: the worklet path ignores
// bad input instead of failing. These errors surface on the application side
// (payload decoding, config loading, queue back-pressure).

use crate::sequencer::pattern::MAX_CHANNELS;

/// Errors raised while building a pattern from a payload
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("Pattern step count must be greater than zero")]
    EmptyPattern,

    #[error("Pattern has {0} channels, at most {max} are supported", max = MAX_CHANNELS)]
    TooManyChannels(usize),

    #[error("Channel {channel}: volume must be finite and >= 0 (got {volume})")]
    InvalidVolume { channel: usize, volume: f32 },

    #[error("Channel {0}: instrument channel has no instrumentId")]
    MissingInstrumentId(usize),

    #[error("Channel index {0} out of range")]
    ChannelOutOfRange(usize),

    #[error("Invalid pattern payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while validating or loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("BPM must be a finite value > 0 (got {0})")]
    InvalidBpm(f64),

    #[error("Lookahead must be a finite value >= 0 seconds (got {0})")]
    InvalidLookahead(f64),

    #[error("Subdivision must be > 0")]
    InvalidSubdivision,

    #[error("Start delay must be a finite value >= 0 seconds (got {0})")]
    InvalidStartDelay(f64),

    #[error("Wake interval must be a finite value > 0 ms (got {0})")]
    InvalidWakeInterval(f64),

    #[error("Queue capacity must be > 0")]
    InvalidQueueCapacity,

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Top-level error for application-side scheduler operations
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Pattern error: {0}")]
    Pattern(#[from] PatternError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid control message: {0}")]
    InvalidMessage(serde_json::Error),

    #[error("Control queue is full, message dropped")]
    ControlQueueFull,

    #[error("No sequence loaded")]
    NoSequence,

    #[error("Sequence index {0} out of range")]
    SequenceOutOfRange(usize),

    #[error("Audio device error: {0}")]
    Audio(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
