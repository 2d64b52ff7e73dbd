//! Handles for spawned processes and waiting for their completion.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Handle to a process spawned via [`Simulation::spawn`](crate::Simulation::spawn)
/// or [`SimulationContext::spawn`](crate::SimulationContext::spawn).
///
/// The handle can be queried for completion and awaited via [`ProcessHandle::join`]
/// or [`wait_all`]. Cloning the handle is cheap and all clones observe the same process.
#[derive(Clone)]
pub struct ProcessHandle {
    state: Rc<RefCell<ProcessState>>,
}

impl ProcessHandle {
    pub(crate) fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(ProcessState {
                finished: false,
                wakers: Vec::new(),
            })),
        }
    }

    /// Returns whether the process has run to completion.
    pub fn is_finished(&self) -> bool {
        self.state.borrow().finished
    }

    /// Returns a future that completes when the process terminates.
    pub fn join(&self) -> JoinFuture {
        JoinFuture {
            state: self.state.clone(),
        }
    }

    pub(crate) fn complete(&self) {
        let mut state = self.state.borrow_mut();
        state.finished = true;
        for waker in state.wakers.drain(..) {
            waker.wake();
        }
    }
}

/// Future returned by [`ProcessHandle::join`].
pub struct JoinFuture {
    state: Rc<RefCell<ProcessState>>,
}

impl Future for JoinFuture {
    type Output = ();
    fn poll(self: Pin<&mut Self>, async_ctx: &mut Context) -> Poll<Self::Output> {
        let mut state = self.state.borrow_mut();
        if state.finished {
            Poll::Ready(())
        } else {
            state.wakers.push(async_ctx.waker().clone());
            Poll::Pending
        }
    }
}

struct ProcessState {
    finished: bool,
    wakers: Vec<Waker>,
}

/// Suspends the calling process until every named process has terminated.
///
/// Panics on an empty handle set: awaiting nothing is a caller bug and must
/// fail loudly rather than silently resolve.
pub async fn wait_all(handles: &[ProcessHandle]) {
    assert!(!handles.is_empty(), "wait_all() requires at least one process handle");
    for handle in handles {
        handle.join().await;
    }
}
