// Sequence chaining - Loop one sequence or play the whole list in order

use crate::error::{SchedulerError, SchedulerResult};
use crate::sequencer::pattern::Pattern;
use serde::{Deserialize, Serialize};

/// What happens when a pattern repetition ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayMode {
    /// Loop the selected sequence
    #[default]
    Sequence,
    /// Advance through every sequence, wrapping at the end
    All,
}

/// Ordered list of sequences with a selection and a playback cursor
#[derive(Debug, Clone, Default)]
pub struct SequenceList {
    patterns: Vec<Pattern>,
    /// Sequence selected for editing / single-sequence playback
    selected: usize,
    /// Sequence currently playing in `PlayMode::All`
    playback: usize,
    mode: PlayMode,
}

impl SequenceList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sequence, returning its index
    pub fn push(&mut self, pattern: Pattern) -> usize {
        self.patterns.push(pattern);
        self.patterns.len() - 1
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn select(&mut self, index: usize) -> SchedulerResult<()> {
        if index >= self.patterns.len() {
            return Err(SchedulerError::SequenceOutOfRange(index));
        }
        self.selected = index;
        Ok(())
    }

    pub fn playback_index(&self) -> usize {
        self.playback
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: PlayMode) {
        self.mode = mode;
    }

    /// The sequence that should be sounding right now
    pub fn active(&self) -> Option<&Pattern> {
        match self.mode {
            PlayMode::Sequence => self.patterns.get(self.selected),
            PlayMode::All => self.patterns.get(self.playback),
        }
    }

    pub fn pattern_mut(&mut self, index: usize) -> SchedulerResult<&mut Pattern> {
        self.patterns
            .get_mut(index)
            .ok_or(SchedulerError::SequenceOutOfRange(index))
    }

    /// Move the playback cursor to the next sequence
    ///
    /// Only advances in `PlayMode::All`; returns the new active sequence.
    pub fn advance(&mut self) -> Option<&Pattern> {
        if self.mode != PlayMode::All || self.patterns.is_empty() {
            return None;
        }
        self.playback = (self.playback + 1) % self.patterns.len();
        self.patterns.get(self.playback)
    }

    /// Rewind playback to the selected sequence (transport start)
    pub fn reset_playback(&mut self) {
        self.playback = self.selected;
    }
}
