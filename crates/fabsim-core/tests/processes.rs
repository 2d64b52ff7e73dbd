use std::cell::RefCell;
use std::rc::Rc;

use fabsim_core::{wait_all, Simulation};

#[test]
fn sleep_advances_virtual_time() {
    let mut sim = Simulation::new(123);
    let ctx = sim.create_context("proc");
    let finished = Rc::new(RefCell::new(Vec::new()));

    let log = finished.clone();
    sim.spawn(async move {
        ctx.sleep(10.0).await;
        log.borrow_mut().push(ctx.time());
        ctx.sleep(2.5).await;
        log.borrow_mut().push(ctx.time());
    });

    sim.step_until_no_events();
    assert_eq!(sim.time(), 12.5);
    assert_eq!(*finished.borrow(), vec![10.0, 12.5]);
}

#[test]
fn tied_timers_fire_in_spawn_order() {
    let mut sim = Simulation::new(123);
    let order = Rc::new(RefCell::new(Vec::new()));

    // Both processes wake at time 5; the first-scheduled timer must win.
    for name in ["first", "second", "third"] {
        let ctx = sim.create_context(name);
        let order = order.clone();
        sim.spawn(async move {
            ctx.sleep(5.0).await;
            order.borrow_mut().push(ctx.name().to_owned());
        });
    }

    sim.step_until_no_events();
    assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
}

#[test]
fn wait_all_joins_sibling_processes() {
    let mut sim = Simulation::new(123);
    let mut handles = Vec::new();
    for (name, delay) in [("worker-1", 10.0), ("worker-2", 25.0), ("worker-3", 5.0)] {
        let ctx = sim.create_context(name);
        handles.push(sim.spawn(async move {
            ctx.sleep(delay).await;
        }));
    }

    let ctx = sim.create_context("parent");
    let joined_at = Rc::new(RefCell::new(0.0));
    let result = joined_at.clone();
    sim.spawn(async move {
        wait_all(&handles).await;
        *result.borrow_mut() = ctx.time();
    });

    sim.step_until_no_events();
    assert_eq!(*joined_at.borrow(), 25.0);
}

#[test]
fn handle_reports_completion() {
    let mut sim = Simulation::new(123);
    let ctx = sim.create_context("proc");
    let handle = sim.spawn(async move {
        ctx.sleep(1.0).await;
    });
    assert!(!handle.is_finished());
    sim.step_until_no_events();
    assert!(handle.is_finished());
}

#[test]
#[should_panic(expected = "Timer duration must be positive")]
fn zero_sleep_is_rejected() {
    let mut sim = Simulation::new(123);
    let ctx = sim.create_context("proc");
    sim.spawn(async move {
        ctx.sleep(0.0).await;
    });
    sim.step_until_no_events();
}

#[test]
#[should_panic(expected = "Timer duration must be positive")]
fn negative_sleep_is_rejected() {
    let mut sim = Simulation::new(123);
    let ctx = sim.create_context("proc");
    sim.spawn(async move {
        ctx.sleep(-3.0).await;
    });
    sim.step_until_no_events();
}

#[test]
#[should_panic(expected = "at least one process handle")]
fn waiting_for_nothing_is_rejected() {
    let mut sim = Simulation::new(123);
    sim.spawn(async move {
        wait_all(&[]).await;
    });
    sim.step_until_no_events();
}

#[test]
fn processes_and_events_share_the_clock() {
    let mut sim = Simulation::new(123);
    let ctx = sim.create_context("ticker");
    let ticks = Rc::new(RefCell::new(0));
    let counter = ticks.clone();
    sim.spawn(async move {
        loop {
            ctx.sleep(10.0).await;
            *counter.borrow_mut() += 1;
        }
    });

    sim.step_until_time(95.0);
    assert_eq!(*ticks.borrow(), 9);
    assert_eq!(sim.time(), 95.0);
}
