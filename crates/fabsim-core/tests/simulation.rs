use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use fabsim_core::{cast, Event, EventHandler, Simulation};

#[derive(Clone, Serialize)]
struct Probe {
    value: u32,
}

struct Collector {
    observed: Vec<u32>,
}

impl EventHandler for Collector {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            Probe { value } => {
                self.observed.push(value);
            }
        })
    }
}

#[test]
fn event_delivery() {
    let mut sim = Simulation::new(123);
    let collector = Rc::new(RefCell::new(Collector { observed: Vec::new() }));
    let dst = sim.add_handler("collector", collector.clone());
    let mut ctx = sim.create_context("source");

    ctx.emit(Probe { value: 1 }, dst, 1.0);
    ctx.emit(Probe { value: 2 }, dst, 2.5);
    assert_eq!(sim.event_count(), 2);

    assert!(sim.step());
    assert_eq!(sim.time(), 1.0);
    assert!(sim.step());
    assert_eq!(sim.time(), 2.5);
    assert!(!sim.step());

    assert_eq!(collector.borrow().observed, vec![1, 2]);
}

#[test]
fn fifo_order_at_equal_time() {
    let mut sim = Simulation::new(123);
    let collector = Rc::new(RefCell::new(Collector { observed: Vec::new() }));
    let dst = sim.add_handler("collector", collector.clone());
    let mut ctx = sim.create_context("source");

    // All due at time 5: delivery must follow scheduling order.
    for value in 0..10 {
        ctx.emit(Probe { value }, dst, 5.0);
    }
    sim.step_until_no_events();

    assert_eq!(collector.borrow().observed, (0..10).collect::<Vec<_>>());
}

#[test]
fn event_cancellation() {
    let mut sim = Simulation::new(123);
    let collector = Rc::new(RefCell::new(Collector { observed: Vec::new() }));
    let dst = sim.add_handler("collector", collector.clone());
    let mut ctx = sim.create_context("source");

    let to_cancel = ctx.emit(Probe { value: 1 }, dst, 1.0);
    ctx.emit(Probe { value: 2 }, dst, 2.0);
    ctx.cancel_event(to_cancel);
    sim.step_until_no_events();

    assert_eq!(sim.time(), 2.0);
    assert_eq!(collector.borrow().observed, vec![2]);
}

#[test]
fn step_until_time_bounds_the_clock() {
    let mut sim = Simulation::new(123);
    let collector = Rc::new(RefCell::new(Collector { observed: Vec::new() }));
    let dst = sim.add_handler("collector", collector.clone());
    let mut ctx = sim.create_context("source");

    ctx.emit(Probe { value: 1 }, dst, 1.0);
    ctx.emit(Probe { value: 2 }, dst, 10.0);

    let more = sim.step_until_time(5.0);
    assert!(more);
    assert_eq!(sim.time(), 5.0);
    assert_eq!(collector.borrow().observed, vec![1]);

    assert!(!sim.step_until_time(20.0));
    assert_eq!(sim.time(), 20.0);
    assert_eq!(collector.borrow().observed, vec![1, 2]);
}

#[test]
#[should_panic]
fn negative_delay_is_rejected() {
    let mut sim = Simulation::new(123);
    let collector = Rc::new(RefCell::new(Collector { observed: Vec::new() }));
    let dst = sim.add_handler("collector", collector.clone());
    let mut ctx = sim.create_context("source");
    ctx.emit(Probe { value: 1 }, dst, -1.0);
}

#[derive(Clone, Serialize)]
struct Tick {}

struct SelfTicker {
    ctx: fabsim_core::SimulationContext,
    remaining: u32,
    fired: u32,
}

impl SelfTicker {
    fn start(&mut self) {
        self.ctx.emit_self(Tick {}, 5.0);
    }
}

impl EventHandler for SelfTicker {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            Tick {} => {
                self.fired += 1;
                if self.remaining > 0 {
                    self.remaining -= 1;
                    self.ctx.emit_self(Tick {}, 5.0);
                }
            }
        })
    }
}

#[test]
fn self_scheduling_component() {
    let mut sim = Simulation::new(123);
    let ticker = Rc::new(RefCell::new(SelfTicker {
        ctx: sim.create_context("ticker"),
        remaining: 3,
        fired: 0,
    }));
    sim.add_handler("ticker", ticker.clone());
    ticker.borrow_mut().start();

    assert!(sim.steps(2));
    assert_eq!(sim.time(), 10.0);
    sim.step_until_no_events();
    assert_eq!(sim.time(), 20.0);
    assert_eq!(ticker.borrow().fired, 4);
}

#[test]
fn seeded_runs_are_reproducible() {
    let draws = |seed| {
        let mut sim = Simulation::new(seed);
        (0..32).map(|_| sim.gen_range(0..1_000_000u64)).collect::<Vec<u64>>()
    };
    assert_eq!(draws(16), draws(16));
    assert_ne!(draws(16), draws(17));
}
