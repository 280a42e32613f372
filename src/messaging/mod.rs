// Messaging module - Communication between the application and audio threads

pub mod channels;
pub mod command;
pub mod event;
pub mod notification;

pub use channels::{
    ControlConsumer, ControlProducer, EventConsumer, EventProducer, StepConsumer, StepProducer,
    create_control_channel, create_event_channel, create_step_channel,
};
pub use command::{ControlMessage, ControlPayload};
pub use event::{DueStepEvent, SchedulerEvent};
pub use notification::StepNotification;
