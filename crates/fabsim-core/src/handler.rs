//! Event handling.

use crate::event::Event;

/// Trait for consuming events in simulation components.
pub trait EventHandler {
    /// Processes the event.
    fn on(&mut self, event: Event);
}

/// Enables pattern-matching syntax for processing different types of events by
/// downcasting the payload from [`EventData`](crate::event::EventData) to user types.
///
/// Match arms need not be exhaustive: an event that matches no arm is logged as
/// unhandled under the `ERROR` level.
#[macro_export]
macro_rules! cast {
    ( match $event:ident.data { $( $type:ident { $($tt:tt)* } => { $($expr:tt)* } )+ } ) => {
        $(
            if $event.data.is::<$type>() {
                if let Ok(__value) = $event.data.downcast::<$type>() {
                    let $type { $($tt)* } = *__value;
                    $($expr)*
                }
            } else
        )*
        {
            $crate::log::log_unhandled_event($event);
        }
    }
}
