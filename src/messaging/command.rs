// Control messages - Host -> worklet
//
// `ControlMessage` is what travels through the ring buffer: patterns are
// already validated and boxed, so the audio thread only moves pointers.
// `ControlPayload` is the JSON shape accepted from outside.

use crate::error::{PatternError, SchedulerError};
use crate::sequencer::pattern::{InstrumentId, Pattern, PatternPayload};
use crate::sequencer::timeline::ConfigUpdate;
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum ControlMessage {
    /// Partial tempo/lookahead/subdivision update
    Configure(ConfigUpdate),
    /// Replace the pattern, now or at `apply_at_step`
    SetSequence {
        pattern: Box<Pattern>,
        apply_at_step: Option<u64>,
    },
    /// Start emitting; `start_time` defaults to the current block time
    Start {
        start_time: Option<f64>,
        start_step: u64,
    },
    Stop,
}

/// JSON control message, tagged by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlPayload {
    Configure(ConfigUpdate),
    SetSequence {
        sequence: PatternPayload,
        #[serde(
            default,
            rename = "applyAtStep",
            skip_serializing_if = "Option::is_none"
        )]
        apply_at_step: Option<u64>,
    },
    Start {
        #[serde(default, rename = "startTime", skip_serializing_if = "Option::is_none")]
        start_time: Option<f64>,
        #[serde(default, rename = "startStep")]
        start_step: u64,
    },
    Stop,
    /// Any other `type`; ignored by the receiver
    #[serde(other)]
    Unknown,
}

impl ControlPayload {
    pub fn from_json(json: &str) -> Result<Self, SchedulerError> {
        serde_json::from_str(json).map_err(SchedulerError::InvalidMessage)
    }

    /// Convert into a ring-buffer message
    ///
    /// Returns `Ok(None)` for unknown message types.
    pub fn into_message<F>(self, resolve_instrument: F) -> Result<Option<ControlMessage>, PatternError>
    where
        F: FnMut(&str) -> InstrumentId,
    {
        let message = match self {
            ControlPayload::Configure(update) => ControlMessage::Configure(update),
            ControlPayload::SetSequence {
                sequence,
                apply_at_step,
            } => ControlMessage::SetSequence {
                pattern: Box::new(sequence.into_pattern(resolve_instrument)?),
                apply_at_step,
            },
            ControlPayload::Start {
                start_time,
                start_step,
            } => ControlMessage::Start {
                start_time,
                start_step,
            },
            ControlPayload::Stop => ControlMessage::Stop,
            ControlPayload::Unknown => return Ok(None),
        };
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_instruments(_: &str) -> InstrumentId {
        InstrumentId(0)
    }

    #[test]
    fn test_parse_configure() {
        let payload =
            ControlPayload::from_json(r#"{"type":"configure","bpm":100,"lookAhead":0.1}"#)
                .unwrap();
        match payload {
            ControlPayload::Configure(update) => {
                assert_eq!(update.bpm, Some(100.0));
                assert_eq!(update.lookahead, Some(0.1));
                assert_eq!(update.subdivision, None);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_parse_set_sequence() {
        let json = r#"{"type":"set-sequence","applyAtStep":16,
            "sequence":{"stepCount":4,"channels":[{"type":"sampler","steps":[true]}]}}"#;
        let message = ControlPayload::from_json(json)
            .unwrap()
            .into_message(no_instruments)
            .unwrap();
        match message {
            Some(ControlMessage::SetSequence {
                pattern,
                apply_at_step,
            }) => {
                assert_eq!(apply_at_step, Some(16));
                assert_eq!(pattern.step_count(), 4);
                assert_eq!(pattern.channel_count(), 1);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_parse_start_defaults() {
        let message = ControlPayload::from_json(r#"{"type":"start"}"#)
            .unwrap()
            .into_message(no_instruments)
            .unwrap();
        assert!(matches!(
            message,
            Some(ControlMessage::Start {
                start_time: None,
                start_step: 0
            })
        ));
    }

    #[test]
    fn test_unknown_type_ignored() {
        let payload = ControlPayload::from_json(r#"{"type":"shuffle","amount":3}"#).unwrap();
        assert!(matches!(payload, ControlPayload::Unknown));
        assert!(payload.into_message(no_instruments).unwrap().is_none());
    }

    #[test]
    fn test_malformed_json_rejected() {
        let result = ControlPayload::from_json("{not json");
        assert!(matches!(result, Err(SchedulerError::InvalidMessage(_))));
    }
}
