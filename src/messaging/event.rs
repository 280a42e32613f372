// Scheduler events - Worklet/lookahead -> dispatcher

use crate::sequencer::pattern::Pattern;
use crate::sequencer::resolver::TriggerSet;
use serde::Serialize;

/// One step that must sound at `scheduled_time`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueStepEvent {
    pub scheduled_time: f64,
    pub step_index: usize,
    pub cycle: u64,
    pub global_step: u64,
    pub triggers: TriggerSet,
    /// Identifies the pattern that produced this step; changes on every swap
    #[serde(skip)]
    pub pattern_generation: u64,
}

#[derive(Debug)]
pub enum SchedulerEvent {
    ScheduleStep(DueStepEvent),
    /// Emitted after the last step of a pattern repetition
    SequenceEnd { scheduled_time: f64, next_step: u64 },
    /// A pattern that left the swap slot, to be dropped off the audio thread
    Retired(Box<Pattern>),
}

/// Wire shape of the outbound events
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum EventPayload<'a> {
    ScheduleStep(&'a DueStepEvent),
    SequenceEnd {
        #[serde(rename = "scheduledTime")]
        scheduled_time: f64,
        #[serde(rename = "nextStep")]
        next_step: u64,
    },
}

impl SchedulerEvent {
    /// Serialize to the JSON event format
    ///
    /// `Retired` is internal and has no wire form.
    pub fn to_json(&self) -> Result<Option<String>, serde_json::Error> {
        let payload = match self {
            SchedulerEvent::ScheduleStep(event) => EventPayload::ScheduleStep(event),
            SchedulerEvent::SequenceEnd {
                scheduled_time,
                next_step,
            } => EventPayload::SequenceEnd {
                scheduled_time: *scheduled_time,
                next_step: *next_step,
            },
            SchedulerEvent::Retired(_) => return Ok(None),
        };
        serde_json::to_string(&payload).map(Some)
    }

    pub fn scheduled_time(&self) -> Option<f64> {
        match self {
            SchedulerEvent::ScheduleStep(event) => Some(event.scheduled_time),
            SchedulerEvent::SequenceEnd { scheduled_time, .. } => Some(*scheduled_time),
            SchedulerEvent::Retired(_) => None,
        }
    }
}
