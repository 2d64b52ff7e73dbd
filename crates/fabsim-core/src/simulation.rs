//! Simulation configuration and execution.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;

use log::Level::Trace;
use log::{debug, log_enabled, trace};
use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::prelude::Distribution;
use serde_json::json;
use serde_type_name::type_name;

use crate::channel::channel;
use crate::component::Id;
use crate::context::SimulationContext;
use crate::event::Event;
use crate::executor::Executor;
use crate::handler::EventHandler;
use crate::log::log_undelivered_event;
use crate::process::ProcessHandle;
use crate::state::SimulationState;

// What the scheduler fires next: the earliest of the event and timer heaps,
// ties resolved by the shared sequence counter (FIFO).
enum NextItem {
    Event,
    Timer,
}

/// Represents a simulation, provides methods for its configuration and execution.
pub struct Simulation {
    sim_state: Rc<RefCell<SimulationState>>,
    name_to_id: HashMap<String, Id>,
    names: Rc<RefCell<Vec<String>>>,
    handlers: Vec<Option<Rc<RefCell<dyn EventHandler>>>>,
    executor: Executor,
}

impl Simulation {
    /// Creates a new simulation with the specified random seed.
    pub fn new(seed: u64) -> Self {
        let (task_sender, ready_tasks) = channel();
        Self {
            sim_state: Rc::new(RefCell::new(SimulationState::new(seed, task_sender))),
            name_to_id: HashMap::new(),
            names: Rc::new(RefCell::new(Vec::new())),
            handlers: Vec::new(),
            executor: Executor::new(ready_tasks),
        }
    }

    fn register(&mut self, name: &str) -> Id {
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = self.name_to_id.len() as Id;
        self.name_to_id.insert(name.to_owned(), id);
        self.names.borrow_mut().push(name.to_owned());
        self.handlers.push(None);
        id
    }

    /// Returns the identifier of component by its name.
    ///
    /// Panics if component with such name does not exist.
    pub fn lookup_id(&self, name: &str) -> Id {
        *self.name_to_id.get(name).unwrap()
    }

    /// Returns the name of component by its identifier.
    ///
    /// Panics if component with such id does not exist.
    pub fn lookup_name(&self, id: Id) -> String {
        self.names.borrow()[id as usize].clone()
    }

    /// Creates a new simulation context with the specified name.
    pub fn create_context<S>(&mut self, name: S) -> SimulationContext
    where
        S: AsRef<str>,
    {
        let ctx = SimulationContext::new(
            self.register(name.as_ref()),
            name.as_ref(),
            self.sim_state.clone(),
            self.names.clone(),
        );
        debug!(
            target: "simulation",
            "[{:.3} {} simulation] Created context: {}",
            self.time(),
            crate::log::get_colored("DEBUG", colored::Color::Blue),
            json!({"name": ctx.name(), "id": ctx.id()})
        );
        ctx
    }

    /// Registers the event handler implementation for component with the specified name,
    /// returns the component id.
    pub fn add_handler<S>(&mut self, name: S, handler: Rc<RefCell<dyn EventHandler>>) -> Id
    where
        S: AsRef<str>,
    {
        let id = self.register(name.as_ref());
        self.handlers[id as usize] = Some(handler);
        debug!(
            target: "simulation",
            "[{:.3} {} simulation] Added handler: {}",
            self.time(),
            crate::log::get_colored("DEBUG", colored::Color::Blue),
            json!({"name": name.as_ref(), "id": id})
        );
        id
    }

    /// Removes the event handler for component with the specified name.
    ///
    /// All subsequent events destined for this component will not be delivered
    /// until the handler is added again.
    pub fn remove_handler<S>(&mut self, name: S)
    where
        S: AsRef<str>,
    {
        let id = self.lookup_id(name.as_ref());
        self.handlers[id as usize] = None;
    }

    /// Registers a new concurrently running process and returns its handle.
    ///
    /// The process starts executing on the next simulation step.
    pub fn spawn(&mut self, future: impl Future<Output = ()> + 'static) -> ProcessHandle {
        self.sim_state.borrow_mut().spawn(future)
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.sim_state.borrow().time()
    }

    /// Performs a single step through the simulation.
    ///
    /// Polls all ready processes, then fires the earliest pending activity:
    /// either delivers the next event to its handler or completes the next timer,
    /// advancing the clock to its time. Returns `true` if some activity was fired
    /// and `false` otherwise (no progress can be made).
    pub fn step(&mut self) -> bool {
        self.process_tasks();
        let next = self.peek_next_item();
        match next {
            None => false,
            Some(NextItem::Timer) => {
                let timer = self.sim_state.borrow_mut().next_timer().unwrap();
                timer.complete();
                self.process_tasks();
                true
            }
            Some(NextItem::Event) => {
                let event = self.sim_state.borrow_mut().next_event().unwrap();
                self.deliver(event);
                self.process_tasks();
                true
            }
        }
    }

    fn peek_next_item(&mut self) -> Option<NextItem> {
        let mut state = self.sim_state.borrow_mut();
        let next_event = state.peek_event().map(|e| (e.time, e.id));
        let next_timer = state.peek_timer().map(|t| (t.time, t.id));
        match (next_event, next_timer) {
            (None, None) => None,
            (Some(_), None) => Some(NextItem::Event),
            (None, Some(_)) => Some(NextItem::Timer),
            (Some((e_time, e_id)), Some((t_time, t_id))) => {
                if t_time < e_time || (t_time == e_time && t_id < e_id) {
                    Some(NextItem::Timer)
                } else {
                    Some(NextItem::Event)
                }
            }
        }
    }

    fn deliver(&mut self, event: Event) {
        if let Some(handler_opt) = self.handlers.get(event.dst as usize) {
            if log_enabled!(Trace) {
                let src_name = self.lookup_name(event.src);
                let dst_name = self.lookup_name(event.dst);
                trace!(
                    target: &dst_name,
                    "[{:.3} {} {}] {}",
                    event.time,
                    crate::log::get_colored("EVENT", colored::Color::BrightBlack),
                    dst_name,
                    json!({"type": type_name(&event.data).unwrap(), "data": event.data, "src": src_name})
                );
            }
            if let Some(handler) = handler_opt.clone() {
                handler.borrow_mut().on(event);
            } else {
                log_undelivered_event(event);
            }
        } else {
            log_undelivered_event(event);
        }
    }

    fn process_tasks(&mut self) {
        while self.executor.process_task() {}
    }

    /// Performs the specified number of steps through the simulation.
    ///
    /// Returns `true` if there could be more pending activities and `false` otherwise.
    pub fn steps(&mut self, step_count: u64) -> bool {
        for _ in 0..step_count {
            if !self.step() {
                return false;
            }
        }
        true
    }

    /// Steps through the simulation until there are no pending activities left.
    ///
    /// Note that a simulation with an infinitely looping process never runs dry;
    /// bound such runs with [`step_until_time`](Self::step_until_time) instead.
    pub fn step_until_no_events(&mut self) {
        while self.step() {}
    }

    /// Steps through the simulation until the specified time is reached,
    /// then sets the clock to exactly this time.
    ///
    /// Returns `true` if there could be more pending activities and `false` otherwise.
    pub fn step_until_time(&mut self, time: f64) -> bool {
        loop {
            // Freshly spawned processes must run before the queues are
            // inspected, they may schedule the very first activities.
            self.process_tasks();
            let next_time = {
                let mut state = self.sim_state.borrow_mut();
                let next_event = state.peek_event().map(|e| e.time);
                let next_timer = state.peek_timer().map(|t| t.time);
                match (next_event, next_timer) {
                    (None, None) => None,
                    (e, t) => Some(e.unwrap_or(f64::INFINITY).min(t.unwrap_or(f64::INFINITY))),
                }
            };
            match next_time {
                None => {
                    self.sim_state.borrow_mut().set_time(time);
                    return false;
                }
                Some(t) if t > time => {
                    self.sim_state.borrow_mut().set_time(time);
                    return true;
                }
                Some(_) => {
                    self.step();
                }
            }
        }
    }

    /// Steps through the simulation with the specified duration limit,
    /// see [`step_until_time`](Self::step_until_time).
    pub fn step_for_duration(&mut self, duration: f64) -> bool {
        let end_time = self.sim_state.borrow().time() + duration;
        self.step_until_time(end_time)
    }

    /// Returns a random float in the range _[0, 1)_
    /// using the simulation-wide random number generator.
    pub fn rand(&mut self) -> f64 {
        self.sim_state.borrow_mut().rand()
    }

    /// Returns a random number in the specified range
    /// using the simulation-wide random number generator.
    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.sim_state.borrow_mut().gen_range(range)
    }

    /// Returns a random value from the specified distribution
    /// using the simulation-wide random number generator.
    pub fn sample_from_distribution<T, Dist: Distribution<T>>(&mut self, dist: &Dist) -> T {
        self.sim_state.borrow_mut().sample_from_distribution(dist)
    }

    /// Returns a random alphanumeric string of specified length
    /// using the simulation-wide random number generator.
    pub fn random_string(&mut self, len: usize) -> String {
        self.sim_state.borrow_mut().random_string(len)
    }

    /// Returns the total number of created events.
    ///
    /// Note that cancelled events are also counted here.
    pub fn event_count(&self) -> u64 {
        self.sim_state.borrow().event_count()
    }

    /// Cancels pending events that satisfy the given predicate function.
    pub fn cancel_events<F>(&mut self, pred: F)
    where
        F: Fn(&Event) -> bool,
    {
        self.sim_state.borrow_mut().cancel_events(pred);
    }
}
