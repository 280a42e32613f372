// Lock-free SPSC channels between the application and audio threads

use crate::messaging::command::ControlMessage;
use crate::messaging::event::SchedulerEvent;
use crate::messaging::notification::StepNotification;
use ringbuf::{HeapRb, traits::Split};

/// Host -> worklet
pub type ControlProducer = ringbuf::HeapProd<ControlMessage>;
pub type ControlConsumer = ringbuf::HeapCons<ControlMessage>;

pub fn create_control_channel(capacity: usize) -> (ControlProducer, ControlConsumer) {
    let rb = HeapRb::<ControlMessage>::new(capacity);
    rb.split()
}

/// Worklet -> host
pub type EventProducer = ringbuf::HeapProd<SchedulerEvent>;
pub type EventConsumer = ringbuf::HeapCons<SchedulerEvent>;

pub fn create_event_channel(capacity: usize) -> (EventProducer, EventConsumer) {
    let rb = HeapRb::<SchedulerEvent>::new(capacity);
    rb.split()
}

/// Dispatcher -> UI step highlighting
pub type StepProducer = ringbuf::HeapProd<StepNotification>;
pub type StepConsumer = ringbuf::HeapCons<StepNotification>;

pub fn create_step_channel(capacity: usize) -> (StepProducer, StepConsumer) {
    let rb = HeapRb::<StepNotification>::new(capacity);
    rb.split()
}
