//! Asynchronous waiting for timers.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Timer identifier, drawn from the same sequence as event identifiers
/// so that timers and events due at the same time preserve scheduling order.
pub(crate) type TimerId = u64;

/// Future returned by [`SimulationContext::sleep`](crate::SimulationContext::sleep),
/// completes when the simulation clock reaches the timer's fire time.
pub struct TimerFuture {
    state: Rc<RefCell<TimerAwaitState>>,
}

impl Future for TimerFuture {
    type Output = ();
    fn poll(self: Pin<&mut Self>, async_ctx: &mut Context) -> Poll<Self::Output> {
        let mut state = self.state.borrow_mut();
        if state.completed {
            Poll::Ready(())
        } else {
            state.waker = Some(async_ctx.waker().clone());
            Poll::Pending
        }
    }
}

// The scheduler-side end of a timer, stored in the timer heap.
#[derive(Clone)]
pub(crate) struct TimerPromise {
    pub id: TimerId,
    pub time: f64,
    state: Rc<RefCell<TimerAwaitState>>,
}

impl TimerPromise {
    pub fn new(id: TimerId, time: f64) -> Self {
        Self {
            id,
            time,
            state: Rc::new(RefCell::new(TimerAwaitState {
                completed: false,
                waker: None,
            })),
        }
    }

    pub fn future(&self) -> TimerFuture {
        TimerFuture {
            state: self.state.clone(),
        }
    }

    pub fn complete(&self) {
        let mut state = self.state.borrow_mut();
        state.completed = true;
        if let Some(waker) = state.waker.take() {
            waker.wake();
        }
    }
}

impl Eq for TimerPromise {}

impl PartialEq for TimerPromise {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Ord for TimerPromise {
    // Inverted ordering for use with BinaryHeap, same scheme as Event.
    fn cmp(&self, other: &Self) -> Ordering {
        other.time.total_cmp(&self.time).then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for TimerPromise {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct TimerAwaitState {
    completed: bool,
    waker: Option<Waker>,
}
