//! Periodic processes multiplexed onto the simulation clock.
//!
//! All of them are spawned by the simulation driver; their relative progress
//! at tied timestamps is fully determined by spawn/schedule order.

use std::cell::RefCell;
use std::rc::Rc;

use fabsim_core::{log_debug, log_info, Id, SimulationContext};

use crate::catalog::Catalog;
use crate::events::{ActiveTransfersSample, BillingCompleted, TransferFinished, TransferStarted};
use crate::topology::Topology;
use crate::transfer::{TransferRef, TransferState};

/// Drives one transfer (or download) to a terminal state: begin, then a
/// sleep/update loop, then end. The state is re-checked after every
/// suspension so that an external cancellation (file expiry) is observed
/// cooperatively.
pub async fn transfer_process(
    transfer: TransferRef,
    interval: f64,
    mut ctx: SimulationContext,
    monitoring: Option<Id>,
) {
    // The file may expire between transfer creation and the first poll of
    // this process; in that case skip straight to the wind-down.
    if transfer.borrow().state() == TransferState::Init {
        transfer.borrow_mut().begin(ctx.time());
        let (id, file_name, src_site, dst_site) = {
            let t = transfer.borrow();
            let selector = t.selector();
            let selector = selector.borrow();
            (
                t.id(),
                t.file().borrow().name().to_owned(),
                selector.src_site().borrow().name().to_owned(),
                selector.dst_site().borrow().name().to_owned(),
            )
        };
        log_debug!(ctx, "transfer {}: {} from {} to {}", id, file_name, src_site, dst_site);
        if let Some(dst) = monitoring {
            ctx.emit_now(
                TransferStarted {
                    transfer_id: id,
                    file_name,
                    src_site,
                    dst_site,
                },
                dst,
            );
        }
        loop {
            ctx.sleep(interval).await;
            if transfer.borrow().state() != TransferState::Transferring {
                break;
            }
            transfer.borrow_mut().update(ctx.time());
            if transfer.borrow().state() != TransferState::Transferring {
                break;
            }
        }
    }
    transfer.borrow_mut().end(ctx.time());

    let finished = {
        let t = transfer.borrow();
        log_debug!(ctx, "transfer {} finished in state {:?}", t.id(), t.state());
        TransferFinished {
            transfer_id: t.id(),
            file_name: t.file().borrow().name().to_owned(),
            state: t.state(),
            transferred: t.transferred(),
            duration: t.end_time() - t.start_time(),
        }
    };
    if let Some(dst) = monitoring {
        ctx.emit_now(finished, dst);
    }
}

/// Periodically removes the files whose lifetime has elapsed.
pub async fn reaper_process(catalog: Rc<RefCell<Catalog>>, interval: f64, ctx: SimulationContext) {
    log_info!(ctx, "reaper started");
    loop {
        let removed = catalog.borrow_mut().run_reaper(ctx.time());
        if removed > 0 {
            log_debug!(ctx, "expired {} files", removed);
        }
        ctx.sleep(interval).await;
    }
}

/// Runs the billing pass once per period and reports the totals.
pub async fn billing_process(
    topology: Rc<RefCell<Topology>>,
    period: f64,
    mut ctx: SimulationContext,
    monitoring: Option<Id>,
) {
    log_info!(ctx, "billing started");
    loop {
        ctx.sleep(period).await;
        let bill = topology.borrow_mut().process_billing(ctx.time());
        log_info!(
            ctx,
            "billing pass: CHF {:.2} storage, CHF {:.2} network",
            bill.storage_total,
            bill.network_total
        );
        if let Some(dst) = monitoring {
            ctx.emit_now(
                BillingCompleted {
                    storage_total: bill.storage_total,
                    network_total: bill.network_total,
                },
                dst,
            );
        }
    }
}

/// Periodically samples the activity gauges for external monitoring.
pub async fn monitoring_process(
    catalog: Rc<RefCell<Catalog>>,
    interval: f64,
    mut ctx: SimulationContext,
    monitoring: Id,
) {
    loop {
        ctx.sleep(interval).await;
        let (active_transfers, files) = {
            let catalog = catalog.borrow();
            (catalog.active_transfers(), catalog.file_count())
        };
        ctx.emit_now(
            ActiveTransfersSample {
                active_transfers,
                files,
            },
            monitoring,
        );
    }
}
