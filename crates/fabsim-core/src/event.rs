//! Simulation events.

use std::cmp::Ordering;

use downcast_rs::{impl_downcast, Downcast};
use serde::ser::Serialize;

use crate::component::Id;

/// Event identifier, unique within a simulation.
pub type EventId = u64;

/// Trait for event payloads.
///
/// Any serializable type is accepted; payloads are downcast back to concrete
/// types by consumers via the [`cast!`](crate::cast!) macro.
pub trait EventData: Downcast + erased_serde::Serialize {}

impl_downcast!(EventData);

erased_serde::serialize_trait_object!(EventData);

impl<T: Serialize + 'static> EventData for T {}

/// An event scheduled for delivery at a fixed virtual time.
pub struct Event {
    /// Identifier, doubles as the scheduling sequence number.
    pub id: EventId,
    /// Delivery time.
    pub time: f64,
    /// Identifier of the component that produced the event.
    pub src: Id,
    /// Identifier of the component the event is delivered to.
    pub dst: Id,
    /// Payload.
    pub data: Box<dyn EventData>,
}

impl Eq for Event {}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Ord for Event {
    // Inverted ordering for use with BinaryHeap: earliest time first,
    // then lowest sequence number (FIFO for ties).
    fn cmp(&self, other: &Self) -> Ordering {
        other.time.total_cmp(&self.time).then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
