// Lock-free channels from the engine to the UI

use crate::messaging::notification::Notification;
use crate::sequencer::metronome::{Tick, TickSink};
use ringbuf::{HeapRb, traits::Producer, traits::Split};

pub type TickProducer = ringbuf::HeapProd<Tick>;
pub type TickConsumer = ringbuf::HeapCons<Tick>;

pub fn create_tick_channel(capacity: usize) -> (TickProducer, TickConsumer) {
    let rb = HeapRb::<Tick>::new(capacity);
    rb.split()
}

pub type NotificationProducer = ringbuf::HeapProd<Notification>;
pub type NotificationConsumer = ringbuf::HeapCons<Notification>;

pub fn create_notification_channel(
    capacity: usize,
) -> (NotificationProducer, NotificationConsumer) {
    let rb = HeapRb::<Notification>::new(capacity);
    rb.split()
}

/// Tick sink pushing into a tick channel
///
/// Never blocks the timer thread: ticks are dropped when the consumer falls
/// behind.
pub struct ChannelTickSink {
    producer: TickProducer,
    dropped: u64,
}

impl ChannelTickSink {
    pub fn new(producer: TickProducer) -> Self {
        Self {
            producer,
            dropped: 0,
        }
    }

    /// Ticks lost to a full channel
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl TickSink for ChannelTickSink {
    fn on_tick(&mut self, tick: &Tick) {
        if self.producer.try_push(*tick).is_err() {
            self.dropped += 1;
            if self.dropped == 1 || self.dropped % 100 == 0 {
                log::warn!("Tick channel full, {} ticks dropped", self.dropped);
            }
        }
    }
}
