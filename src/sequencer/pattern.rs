// Pattern - Step grid (channels x steps) for one sequence
//
// A pattern is built on the application thread, either directly or from the
// JSON payload, and handed to a scheduler as a whole. Schedulers never see a
// half-edited pattern: full replacement goes through `PatternSlot`.

use crate::error::PatternError;
use serde::{Deserialize, Serialize};

/// Hard cap on channels per pattern, so trigger sets fit in a fixed array
pub const MAX_CHANNELS: usize = 64;

const MIN_PLAYBACK_RATE: f32 = 0.25;
const MAX_PLAYBACK_RATE: f32 = 4.0;

/// Interned handle for a nested instrument (see `RackCoordinator::instrument_id`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstrumentId(pub u32);

/// Sampler settings captured with the pattern
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleRef {
    /// Which sample of the channel's bank to play
    pub sample_index: u32,
    /// Playback speed multiplier, clamped to [0.25, 4.0]
    pub playback_rate: f32,
}

impl SampleRef {
    pub fn new(sample_index: u32, playback_rate: f32) -> Self {
        Self {
            sample_index,
            playback_rate: clamp_playback_rate(playback_rate),
        }
    }
}

impl Default for SampleRef {
    fn default() -> Self {
        Self::new(0, 1.0)
    }
}

fn clamp_playback_rate(rate: f32) -> f32 {
    if !rate.is_finite() {
        return 1.0;
    }
    rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
}

/// What a channel drives when its step fires
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelKind {
    Sampler {
        sample: SampleRef,
    },
    Instrument {
        #[serde(rename = "instrumentId")]
        instrument_id: InstrumentId,
    },
}

/// One row of the step grid
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    steps: Vec<bool>,
    pub muted: bool,
    pub solo: bool,
    pub volume: f32,
    /// Let a new hit overlap the previous one instead of cutting it
    pub allow_overlap: bool,
    pub kind: ChannelKind,
}

impl Channel {
    /// Create a sampler channel with all steps off
    pub fn sampler(step_count: usize, sample: SampleRef) -> Self {
        Self::with_kind(step_count, ChannelKind::Sampler { sample })
    }

    /// Create an instrument channel with all steps off
    pub fn instrument(step_count: usize, instrument_id: InstrumentId) -> Self {
        Self::with_kind(step_count, ChannelKind::Instrument { instrument_id })
    }

    fn with_kind(step_count: usize, kind: ChannelKind) -> Self {
        Self {
            steps: vec![false; step_count],
            muted: false,
            solo: false,
            volume: 1.0,
            allow_overlap: false,
            kind,
        }
    }

    /// Builder-style step setter, ignores out-of-range indices
    pub fn with_steps(mut self, active: &[usize]) -> Self {
        for &step in active {
            self.set_step(step, true);
        }
        self
    }

    pub fn steps(&self) -> &[bool] {
        &self.steps
    }

    /// Is the gate for this step on?
    #[inline]
    pub fn is_active(&self, step_index: usize) -> bool {
        self.steps.get(step_index).copied().unwrap_or(false)
    }

    pub fn set_step(&mut self, step_index: usize, active: bool) {
        if let Some(step) = self.steps.get_mut(step_index) {
            *step = active;
        }
    }

    pub fn toggle_step(&mut self, step_index: usize) {
        if let Some(step) = self.steps.get_mut(step_index) {
            *step = !*step;
        }
    }

    /// Pad with `false` or truncate so the row matches the pattern length
    fn fit_to(&mut self, step_count: usize) {
        self.steps.resize(step_count, false);
    }
}

/// A pattern of `step_count` steps over a set of channels
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    step_count: usize,
    channels: Vec<Channel>,
}

impl Pattern {
    /// Create an empty pattern
    pub fn new(step_count: usize) -> Result<Self, PatternError> {
        if step_count == 0 {
            return Err(PatternError::EmptyPattern);
        }
        Ok(Self {
            step_count,
            channels: Vec::new(),
        })
    }

    /// Add a channel, returning its index
    ///
    /// The channel's step row is resized to the pattern length.
    pub fn add_channel(&mut self, mut channel: Channel) -> Result<usize, PatternError> {
        if self.channels.len() >= MAX_CHANNELS {
            return Err(PatternError::TooManyChannels(self.channels.len() + 1));
        }
        if !channel.volume.is_finite() || channel.volume < 0.0 {
            return Err(PatternError::InvalidVolume {
                channel: self.channels.len(),
                volume: channel.volume,
            });
        }
        channel.fit_to(self.step_count);
        self.channels.push(channel);
        Ok(self.channels.len() - 1)
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    /// In-place edit access (application thread only)
    pub fn channel_mut(&mut self, index: usize) -> Result<&mut Channel, PatternError> {
        self.channels
            .get_mut(index)
            .ok_or(PatternError::ChannelOutOfRange(index))
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// True if any channel is soloed
    pub fn solo_active(&self) -> bool {
        self.channels.iter().any(|c| c.solo)
    }
}

//
// Payload (JSON) representation
//

/// Serialized channel type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Sampler,
    Instrument,
}

/// Sampler snapshot as sent by the application
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplePayload {
    #[serde(default)]
    pub sample_index: u32,
    #[serde(default = "default_rate")]
    pub playback_rate: f32,
}

fn default_rate() -> f32 {
    1.0
}

fn default_volume() -> f32 {
    1.0
}

/// One channel of the pattern payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPayload {
    #[serde(default)]
    pub steps: Vec<bool>,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub allow_overlap: bool,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    #[serde(default, alias = "sampler", skip_serializing_if = "Option::is_none")]
    pub sample: Option<SamplePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_id: Option<String>,
}

/// Pattern payload: `{ stepCount, channels: [...] }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternPayload {
    pub step_count: usize,
    #[serde(default)]
    pub channels: Vec<ChannelPayload>,
}

impl PatternPayload {
    /// Parse a payload from JSON text
    pub fn from_json(json: &str) -> Result<Self, PatternError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validate and convert into a `Pattern`
    ///
    /// `resolve_instrument` maps an `instrumentId` string to its interned handle.
    pub fn into_pattern<F>(self, mut resolve_instrument: F) -> Result<Pattern, PatternError>
    where
        F: FnMut(&str) -> InstrumentId,
    {
        let mut pattern = Pattern::new(self.step_count)?;
        if self.channels.len() > MAX_CHANNELS {
            return Err(PatternError::TooManyChannels(self.channels.len()));
        }

        for (index, payload) in self.channels.into_iter().enumerate() {
            let kind = match payload.channel_type {
                ChannelType::Sampler => {
                    let sample = payload
                        .sample
                        .map(|s| SampleRef::new(s.sample_index, s.playback_rate))
                        .unwrap_or_default();
                    ChannelKind::Sampler { sample }
                }
                ChannelType::Instrument => {
                    let name = payload
                        .instrument_id
                        .as_deref()
                        .filter(|name| !name.is_empty())
                        .ok_or(PatternError::MissingInstrumentId(index))?;
                    ChannelKind::Instrument {
                        instrument_id: resolve_instrument(name),
                    }
                }
            };

            pattern.add_channel(Channel {
                steps: payload.steps,
                muted: payload.muted,
                solo: payload.solo,
                volume: payload.volume,
                allow_overlap: payload.allow_overlap,
                kind,
            })?;
        }

        Ok(pattern)
    }
}
