// Step Resolver - Global step -> pattern position, gating, and the swap point
//
// Shared by both scheduler models. Nothing here allocates once a pattern has
// been built, so it is safe to call from the audio callback.

use crate::sequencer::pattern::{ChannelKind, InstrumentId, MAX_CHANNELS, Pattern, SampleRef};
use serde::{Serialize, Serializer};

/// Position of a global step inside a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPosition {
    /// global mod step_count
    pub step_index: usize,
    /// global / step_count (repetition number)
    pub cycle: u64,
}

/// Resolve a global step counter against a pattern length
#[inline]
pub fn resolve_step(global_step: u64, step_count: usize) -> StepPosition {
    if step_count == 0 {
        return StepPosition {
            step_index: 0,
            cycle: global_step,
        };
    }
    let len = step_count as u64;
    StepPosition {
        step_index: (global_step % len) as usize,
        cycle: global_step / len,
    }
}

/// One channel firing on a step
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub channel_index: usize,
    pub volume: f32,
    pub allow_overlap: bool,
    #[serde(flatten)]
    pub kind: ChannelKind,
}

impl Trigger {
    const EMPTY: Trigger = Trigger {
        channel_index: 0,
        volume: 0.0,
        allow_overlap: false,
        kind: ChannelKind::Sampler {
            sample: SampleRef {
                sample_index: 0,
                playback_rate: 1.0,
            },
        },
    };

    pub fn instrument_id(&self) -> Option<InstrumentId> {
        match self.kind {
            ChannelKind::Instrument { instrument_id } => Some(instrument_id),
            ChannelKind::Sampler { .. } => None,
        }
    }
}

/// Fixed-capacity trigger list, stored inline so events never allocate
#[derive(Clone, Copy)]
pub struct TriggerSet {
    triggers: [Trigger; MAX_CHANNELS],
    len: usize,
}

impl TriggerSet {
    pub const fn new() -> Self {
        Self {
            triggers: [Trigger::EMPTY; MAX_CHANNELS],
            len: 0,
        }
    }

    /// Append a trigger; returns false when full
    #[inline]
    pub fn push(&mut self, trigger: Trigger) -> bool {
        if self.len >= MAX_CHANNELS {
            return false;
        }
        self.triggers[self.len] = trigger;
        self.len += 1;
        true
    }

    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn as_slice(&self) -> &[Trigger] {
        &self.triggers[..self.len]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Trigger> {
        self.as_slice().iter()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for TriggerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for TriggerSet {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl std::fmt::Debug for TriggerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl Serialize for TriggerSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'a> IntoIterator for &'a TriggerSet {
    type Item = &'a Trigger;
    type IntoIter = std::slice::Iter<'a, Trigger>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Collect the channels that fire on `step_index`
///
/// Muted channels never fire. If any channel is soloed, only soloed
/// (and unmuted) channels fire. Channel order is preserved.
pub fn collect_triggers(pattern: &Pattern, step_index: usize, out: &mut TriggerSet) {
    out.clear();
    let solo_active = pattern.solo_active();

    for (channel_index, channel) in pattern.channels().iter().enumerate() {
        if !channel.is_active(step_index) || channel.muted {
            continue;
        }
        if solo_active && !channel.solo {
            continue;
        }
        out.push(Trigger {
            channel_index,
            volume: channel.volume,
            allow_overlap: channel.allow_overlap,
            kind: channel.kind,
        });
    }
}

/// A full pattern replacement waiting for its step
#[derive(Debug)]
pub struct PendingSwap {
    pub pattern: Box<Pattern>,
    pub activate_at_step: u64,
}

/// Holder of the active pattern and at most one pending swap
///
/// This is the only place a scheduler's pattern gets replaced. Every pattern
/// that leaves the slot is handed to `retire` so the caller decides where it
/// gets dropped (the worklet ships it back to the application thread).
#[derive(Debug, Default)]
pub struct PatternSlot {
    active: Option<Box<Pattern>>,
    pending: Option<PendingSwap>,
    /// Bumped every time a pattern becomes active
    generation: u64,
}

impl PatternSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&Pattern> {
        self.active.as_deref()
    }

    pub fn active_mut(&mut self) -> Option<&mut Pattern> {
        self.active.as_deref_mut()
    }

    /// Changes whenever the active pattern is replaced
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Step at which the pending swap activates, if any
    pub fn pending_step(&self) -> Option<u64> {
        self.pending.as_ref().map(|p| p.activate_at_step)
    }

    /// Replace the active pattern now, dropping any pending swap
    pub fn set_immediate<F>(&mut self, pattern: Box<Pattern>, mut retire: F)
    where
        F: FnMut(Box<Pattern>),
    {
        if let Some(pending) = self.pending.take() {
            retire(pending.pattern);
        }
        self.generation += 1;
        if let Some(old) = self.active.replace(pattern) {
            retire(old);
        }
    }

    /// Schedule a replacement for `activate_at_step`
    ///
    /// A step that is already current or past applies immediately.
    /// A newer schedule replaces an older pending one.
    pub fn schedule<F>(
        &mut self,
        pattern: Box<Pattern>,
        activate_at_step: u64,
        current_step: u64,
        mut retire: F,
    ) where
        F: FnMut(Box<Pattern>),
    {
        if activate_at_step <= current_step || self.active.is_none() {
            self.set_immediate(pattern, retire);
            return;
        }
        let previous = self.pending.replace(PendingSwap {
            pattern,
            activate_at_step,
        });
        if let Some(previous) = previous {
            retire(previous.pattern);
        }
    }

    /// Apply the pending swap if `global_step >= activate_at_step`
    ///
    /// Returns true when a swap happened.
    #[inline]
    pub fn apply_due<F>(&mut self, global_step: u64, mut retire: F) -> bool
    where
        F: FnMut(Box<Pattern>),
    {
        let due = self
            .pending
            .as_ref()
            .is_some_and(|p| global_step >= p.activate_at_step);
        if !due {
            return false;
        }
        if let Some(swap) = self.pending.take() {
            self.generation += 1;
            if let Some(old) = self.active.replace(swap.pattern) {
                retire(old);
            }
        }
        true
    }

    pub fn clear_pending<F>(&mut self, mut retire: F)
    where
        F: FnMut(Box<Pattern>),
    {
        if let Some(pending) = self.pending.take() {
            retire(pending.pattern);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::pattern::Channel;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn sampler(steps: &[usize]) -> Channel {
        Channel::sampler(4, SampleRef::default()).with_steps(steps)
    }

    fn pattern_with(channels: Vec<Channel>) -> Pattern {
        let mut pattern = Pattern::new(4).unwrap();
        for channel in channels {
            pattern.add_channel(channel).unwrap();
        }
        pattern
    }

    fn channel_indices(set: &TriggerSet) -> Vec<usize> {
        set.iter().map(|t| t.channel_index).collect()
    }

    #[test]
    fn test_resolve_step() {
        assert_eq!(
            resolve_step(0, 4),
            StepPosition {
                step_index: 0,
                cycle: 0
            }
        );
        assert_eq!(
            resolve_step(7, 4),
            StepPosition {
                step_index: 3,
                cycle: 1
            }
        );
        assert_eq!(
            resolve_step(16, 16),
            StepPosition {
                step_index: 0,
                cycle: 1
            }
        );
    }

    #[test]
    fn test_muted_channel_excluded() {
        let mut muted = sampler(&[0]);
        muted.muted = true;
        let pattern = pattern_with(vec![sampler(&[0]), muted, sampler(&[1])]);

        let mut set = TriggerSet::new();
        collect_triggers(&pattern, 0, &mut set);
        assert_eq!(channel_indices(&set), vec![0]);
    }

    #[test]
    fn test_solo_gating() {
        let mut a = sampler(&[0]);
        a.solo = true;
        let pattern = pattern_with(vec![a, sampler(&[0])]);

        let mut set = TriggerSet::new();
        collect_triggers(&pattern, 0, &mut set);
        assert_eq!(channel_indices(&set), vec![0]);
    }

    #[test]
    fn test_muted_solo_channel_silent() {
        let mut a = sampler(&[0]);
        a.solo = true;
        a.muted = true;
        let pattern = pattern_with(vec![a, sampler(&[0])]);

        let mut set = TriggerSet::new();
        collect_triggers(&pattern, 0, &mut set);
        // Solo is still active, so the non-solo channel stays gated
        assert!(set.is_empty());
    }

    #[test]
    fn test_gating_rule_random_patterns() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut set = TriggerSet::new();

        for _ in 0..200 {
            let step_count = rng.gen_range(1..=16);
            let channel_count = rng.gen_range(0..=8);
            let mut pattern = Pattern::new(step_count).unwrap();
            for _ in 0..channel_count {
                let mut channel = Channel::sampler(step_count, SampleRef::default());
                for step in 0..step_count {
                    channel.set_step(step, rng.gen_bool(0.5));
                }
                channel.muted = rng.gen_bool(0.2);
                channel.solo = rng.gen_bool(0.15);
                pattern.add_channel(channel).unwrap();
            }

            let step = rng.gen_range(0..step_count);
            collect_triggers(&pattern, step, &mut set);

            let solo = pattern.channels().iter().any(|c| c.solo);
            let expected: Vec<usize> = pattern
                .channels()
                .iter()
                .enumerate()
                .filter(|(_, c)| c.is_active(step) && !c.muted && (!solo || c.solo))
                .map(|(i, _)| i)
                .collect();
            assert_eq!(channel_indices(&set), expected);
        }
    }

    #[test]
    fn test_trigger_set_capacity() {
        let mut set = TriggerSet::new();
        for i in 0..MAX_CHANNELS {
            assert!(set.push(Trigger {
                channel_index: i,
                ..Trigger::EMPTY
            }));
        }
        assert!(!set.push(Trigger::EMPTY));
        assert_eq!(set.len(), MAX_CHANNELS);
    }

    #[test]
    fn test_trigger_json() {
        let trigger = Trigger {
            channel_index: 2,
            volume: 0.5,
            allow_overlap: true,
            kind: ChannelKind::Instrument {
                instrument_id: InstrumentId(3),
            },
        };
        let value = serde_json::to_value(trigger).unwrap();
        assert_eq!(value["channelIndex"], 2);
        assert_eq!(value["allowOverlap"], true);
        assert_eq!(value["type"], "instrument");
        assert_eq!(value["instrumentId"], 3);
    }

    #[test]
    fn test_swap_boundary() {
        let mut slot = PatternSlot::new();
        let mut retired = Vec::new();
        slot.set_immediate(Box::new(pattern_with(vec![])), |p| retired.push(p));
        assert!(retired.is_empty());
        assert_eq!(slot.generation(), 1);

        let next = pattern_with(vec![sampler(&[0])]);
        slot.schedule(Box::new(next), 8, 3, |p| retired.push(p));
        assert_eq!(slot.pending_step(), Some(8));

        assert!(!slot.apply_due(7, |p| retired.push(p)));
        assert_eq!(slot.active().unwrap().channel_count(), 0);
        assert_eq!(slot.generation(), 1);

        assert!(slot.apply_due(8, |p| retired.push(p)));
        assert_eq!(slot.active().unwrap().channel_count(), 1);
        assert_eq!(slot.generation(), 2);
        assert_eq!(retired.len(), 1);
        assert_eq!(slot.pending_step(), None);
    }

    #[test]
    fn test_swap_in_past_applies_immediately() {
        let mut slot = PatternSlot::new();
        let mut retired = Vec::new();
        slot.set_immediate(Box::new(pattern_with(vec![])), |p| retired.push(p));

        slot.schedule(Box::new(pattern_with(vec![sampler(&[])])), 2, 10, |p| {
            retired.push(p)
        });
        assert_eq!(slot.active().unwrap().channel_count(), 1);
        assert_eq!(slot.pending_step(), None);
        assert_eq!(retired.len(), 1);
    }

    #[test]
    fn test_newer_pending_replaces_older() {
        let mut slot = PatternSlot::new();
        let mut retired = Vec::new();
        slot.set_immediate(Box::new(pattern_with(vec![])), |p| retired.push(p));

        slot.schedule(Box::new(pattern_with(vec![])), 16, 0, |p| retired.push(p));
        slot.schedule(Box::new(pattern_with(vec![])), 32, 0, |p| retired.push(p));
        assert_eq!(slot.pending_step(), Some(32));
        assert_eq!(retired.len(), 1);

        slot.clear_pending(|p| retired.push(p));
        assert_eq!(slot.pending_step(), None);
        assert_eq!(retired.len(), 2);
    }
}
