use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::Context;

use crate::channel::Sender;
use crate::waker::{waker_ref, RcWake};

type BoxedFuture = Pin<Box<dyn Future<Output = ()>>>;

// A process spawned via Simulation::spawn or SimulationContext::spawn.
// Holds the corresponding future and schedules itself for polling by the executor
// on wake-up notifications.
pub(crate) struct Task {
    future: RefCell<Option<BoxedFuture>>,
    executor: Sender<Rc<Task>>,
}

impl Task {
    fn new(future: impl Future<Output = ()> + 'static, executor: Sender<Rc<Task>>) -> Self {
        Self {
            future: RefCell::new(Some(Box::pin(future))),
            executor,
        }
    }

    // Converts a future into a task and sends it to the executor.
    pub fn spawn(future: impl Future<Output = ()> + 'static, executor: Sender<Rc<Task>>) {
        let task = Rc::new(Task::new(future, executor));
        task.schedule();
    }

    // Polls the internal future with a waker made from the task itself.
    // Polling a completed task is a bug.
    pub fn poll(self: Rc<Self>) {
        let mut future_slot = self.future.borrow_mut();
        if let Some(mut future) = future_slot.take() {
            let waker = waker_ref(&self);
            let async_ctx = &mut Context::from_waker(&waker);
            if future.as_mut().poll(async_ctx).is_pending() {
                *future_slot = Some(future);
            }
        } else {
            panic!("Task is polled after completion")
        }
    }

    fn schedule(self: &Rc<Self>) {
        self.executor.send(self.clone());
    }
}

impl RcWake for Task {
    fn wake_by_ref(rc_self: &Rc<Self>) {
        rc_self.schedule();
    }
}
