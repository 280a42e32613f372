// Step notifications for UI highlighting
//
// Fire-and-forget: the dispatcher pushes one per scheduled step after audio
// dispatch, and a full queue just drops it.

/// The step that is about to sound
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepNotification {
    pub step_index: usize,
    pub cycle: u64,
    pub global_step: u64,
    /// Transport time at which the step plays, so the UI can delay the highlight
    pub scheduled_time: f64,
}
