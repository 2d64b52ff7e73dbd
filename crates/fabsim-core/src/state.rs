use std::collections::{BinaryHeap, HashSet};
use std::future::Future;
use std::rc::Rc;

use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::distributions::{Alphanumeric, DistString};
use rand::prelude::*;
use rand_pcg::Pcg64;

use crate::channel::Sender;
use crate::component::Id;
use crate::event::{Event, EventData, EventId};
use crate::log::log_incorrect_event;
use crate::process::ProcessHandle;
use crate::task::Task;
use crate::timer::{TimerFuture, TimerPromise};

/// Epsilon to compare floating point values for equality.
pub const EPSILON: f64 = 1e-12;

pub(crate) struct SimulationState {
    clock: f64,
    rand: Pcg64,
    events: BinaryHeap<Event>,
    canceled_events: HashSet<EventId>,
    timers: BinaryHeap<TimerPromise>,
    // Shared by events and timers: anything due at an equal time fires in
    // the order it was scheduled, regardless of which heap it sits in.
    sequence: u64,
    event_count: u64,
    task_sender: Sender<Rc<Task>>,
}

impl SimulationState {
    pub fn new(seed: u64, task_sender: Sender<Rc<Task>>) -> Self {
        Self {
            clock: 0.0,
            rand: Pcg64::seed_from_u64(seed),
            events: BinaryHeap::new(),
            canceled_events: HashSet::new(),
            timers: BinaryHeap::new(),
            sequence: 0,
            event_count: 0,
            task_sender,
        }
    }

    pub fn time(&self) -> f64 {
        self.clock
    }

    pub fn set_time(&mut self, time: f64) {
        self.clock = time;
    }

    pub fn rand(&mut self) -> f64 {
        self.rand.gen_range(0.0..1.0)
    }

    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.rand.gen_range(range)
    }

    pub fn sample_from_distribution<T, Dist: Distribution<T>>(&mut self, dist: &Dist) -> T {
        dist.sample(&mut self.rand)
    }

    pub fn random_string(&mut self, len: usize) -> String {
        Alphanumeric.sample_string(&mut self.rand, len)
    }

    pub fn add_event<T>(&mut self, data: T, src: Id, dst: Id, delay: f64) -> EventId
    where
        T: EventData,
    {
        let event_id = self.sequence;
        let event = Event {
            id: event_id,
            time: self.clock + delay.max(0.),
            src,
            dst,
            data: Box::new(data),
        };
        if delay >= -EPSILON {
            self.events.push(event);
            self.sequence += 1;
            self.event_count += 1;
            event_id
        } else {
            log_incorrect_event(event, &format!("negative delay {}", delay));
            panic!("Event delay is negative! It is not allowed to add events from the past.");
        }
    }

    pub fn peek_event(&mut self) -> Option<&Event> {
        loop {
            let maybe_event_id = self.events.peek().map(|e| e.id);
            match maybe_event_id {
                Some(id) if self.canceled_events.remove(&id) => {
                    self.events.pop();
                }
                Some(_) => return self.events.peek(),
                None => return None,
            }
        }
    }

    pub fn next_event(&mut self) -> Option<Event> {
        while let Some(event) = self.events.pop() {
            if !self.canceled_events.remove(&event.id) {
                self.clock = event.time;
                return Some(event);
            }
        }
        None
    }

    pub fn peek_timer(&self) -> Option<&TimerPromise> {
        self.timers.peek()
    }

    pub fn next_timer(&mut self) -> Option<TimerPromise> {
        if let Some(timer) = self.timers.pop() {
            self.clock = timer.time;
            return Some(timer);
        }
        None
    }

    pub fn cancel_event(&mut self, id: EventId) {
        self.canceled_events.insert(id);
    }

    pub fn cancel_events<F>(&mut self, pred: F)
    where
        F: Fn(&Event) -> bool,
    {
        for event in self.events.iter() {
            if pred(event) {
                self.canceled_events.insert(event.id);
            }
        }
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    // Suspension for a fixed duration. A non-positive duration is a
    // programming error and aborts the run.
    pub fn create_timer(&mut self, duration: f64) -> TimerFuture {
        assert!(
            duration > 0.,
            "Timer duration must be positive, got {} at time {}",
            duration,
            self.clock
        );
        let promise = TimerPromise::new(self.sequence, self.clock + duration);
        self.sequence += 1;
        let future = promise.future();
        self.timers.push(promise);
        future
    }

    pub fn spawn(&mut self, future: impl Future<Output = ()> + 'static) -> ProcessHandle {
        let handle = ProcessHandle::new();
        let completion = handle.clone();
        Task::spawn(
            async move {
                future.await;
                completion.complete();
            },
            self.task_sender.clone(),
        );
        handle
    }
}
