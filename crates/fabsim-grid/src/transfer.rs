//! Transfer and download state machines.
//!
//! Bandwidth is not solved as one global max-min-fair allocation: each
//! transfer re-selects the best-looking link on every update tick and the
//! tick's throughput is the equal division of that link's bandwidth among
//! the transfers currently bound to it. This converges toward fairness under
//! frequent re-evaluation rather than being exact per tick.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::Serialize;

use crate::catalog::{FileRef, ReplicaRef, ReplicaState};
use crate::network::{LinkRef, LinkSelector, SelectorRef};

/// Lifecycle of a transfer.
///
/// `SourceLost` and `Failed` are terminal for the driving process but not
/// fatal to the simulation; whether to retry from `SourceLost` with a new
/// source is workload-level policy, not engine behavior. `Cancelled` is set
/// externally when the file expires mid-flight and is observed cooperatively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TransferState {
    Init,
    Transferring,
    Completed,
    SourceLost,
    Failed,
    Cancelled,
}

pub type TransferRef = Rc<RefCell<Transfer>>;

/// Moves one file towards a destination replica over a link selector.
///
/// A download is the same machine without a tracked source replica
/// (`src_replica == None`): single-sided, nothing to lose mid-flight.
pub struct Transfer {
    id: u64,
    file: FileRef,
    selector: SelectorRef,
    src_replica: Option<ReplicaRef>,
    dst_replica: ReplicaRef,
    link: Option<LinkRef>,
    state: TransferState,
    start_time: f64,
    end_time: f64,
    last_update: f64,
    transferred: f64,
    active_gauge: Rc<Cell<usize>>,
}

impl Transfer {
    pub(crate) fn new(
        id: u64,
        file: FileRef,
        selector: SelectorRef,
        src_replica: Option<ReplicaRef>,
        dst_replica: ReplicaRef,
        active_gauge: Rc<Cell<usize>>,
    ) -> Self {
        Self {
            id,
            file,
            selector,
            src_replica,
            dst_replica,
            link: None,
            state: TransferState::Init,
            start_time: 0.,
            end_time: 0.,
            last_update: 0.,
            transferred: 0.,
            active_gauge,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn file(&self) -> FileRef {
        self.file.clone()
    }

    pub fn selector(&self) -> SelectorRef {
        self.selector.clone()
    }

    pub fn src_replica(&self) -> Option<ReplicaRef> {
        self.src_replica.clone()
    }

    pub fn dst_replica(&self) -> ReplicaRef {
        self.dst_replica.clone()
    }

    /// Bytes moved so far.
    pub fn transferred(&self) -> f64 {
        self.transferred
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    /// Binds the best-looking link, marks the destination replica as being
    /// transferred to and starts the clock. Requires state `Init`.
    pub fn begin(&mut self, now: f64) {
        assert_eq!(
            self.state,
            TransferState::Init,
            "transfer {} must be started from Init",
            self.id
        );
        assert_eq!(
            self.dst_replica.borrow().state(),
            ReplicaState::Empty,
            "transfer {} needs an empty destination replica to drive",
            self.id
        );
        self.start_time = now;
        self.last_update = now;
        self.link = Some(self.selector.borrow().bind_link());
        self.dst_replica.borrow_mut().set_state(ReplicaState::Transferring);
        self.state = TransferState::Transferring;
        self.active_gauge.set(self.active_gauge.get() + 1);
    }

    /// Advances the transfer by the elapsed wall of virtual time.
    ///
    /// Requires state `Transferring` and `now` strictly greater than the
    /// last update time; a zero-length tick is a caller bug. Re-selects the
    /// link, applies the equal-division throughput clamped to the remaining
    /// bytes, and flips to a terminal state when the source vanished, the
    /// destination was deleted, or the file is fully materialized.
    pub fn update(&mut self, now: f64) {
        assert_eq!(
            self.state,
            TransferState::Transferring,
            "transfer {} must be updated in Transferring state",
            self.id
        );
        let elapsed = now - self.last_update;
        assert!(
            elapsed > 0.,
            "zero-length transfer tick: now={}, last update={}",
            now,
            self.last_update
        );
        self.last_update = now;

        if let Some(src) = &self.src_replica {
            if src.borrow().state() != ReplicaState::Available {
                self.state = TransferState::SourceLost;
                return;
            }
        }
        if self.dst_replica.borrow().state() == ReplicaState::Deleted {
            self.state = TransferState::Failed;
            return;
        }

        // Re-evaluate the link choice, then divide the chosen link's
        // bandwidth equally among everything bound to it right now.
        let previous = self.link.take().expect("transferring transfer must hold a link");
        LinkSelector::release_link(&previous);
        let link = self.selector.borrow().bind_link();
        let throughput = {
            let link = link.borrow();
            link.bandwidth() / link.bound_transfers() as f64
        };
        self.link = Some(link.clone());

        let full_size = self.file.borrow().size();
        let remaining = full_size - self.dst_replica.borrow().size();
        let amount = (throughput * elapsed).min(remaining);
        if amount > 0. {
            let element = self.dst_replica.borrow().element();
            let applied = element.borrow_mut().increase_replica(&self.file, now, amount);
            link.borrow_mut().add_traffic(applied);
            self.transferred += applied;
        }
        if self.dst_replica.borrow().state() == ReplicaState::Available {
            self.state = TransferState::Completed;
        }
    }

    /// Releases the bound link and settles the destination replica according
    /// to the terminal state: `Completed` keeps it `Available`, `Failed` and
    /// `Cancelled` discard the partial bytes, `SourceLost` reverts it to
    /// `Empty` keeping the partial bytes for a workload-level retry.
    pub fn end(&mut self, now: f64) {
        self.end_time = now;
        if let Some(link) = self.link.take() {
            LinkSelector::release_link(&link);
            let active = self.active_gauge.get();
            assert!(active > 0, "active transfer gauge underflow");
            self.active_gauge.set(active - 1);
        }
        match self.state {
            TransferState::Completed => {
                debug_assert_eq!(self.dst_replica.borrow().state(), ReplicaState::Available);
            }
            TransferState::SourceLost => {
                let mut dst = self.dst_replica.borrow_mut();
                if dst.state() == ReplicaState::Transferring {
                    dst.set_state(ReplicaState::Empty);
                }
            }
            TransferState::Failed | TransferState::Cancelled => {
                let dst_state = self.dst_replica.borrow().state();
                if dst_state != ReplicaState::Deleted {
                    let element = self.dst_replica.borrow().element();
                    let file_name = self.file.borrow().name().to_owned();
                    element.borrow_mut().remove_replica(&file_name, now);
                    let dst = &self.dst_replica;
                    self.file.borrow_mut().replicas.retain(|r| !Rc::ptr_eq(r, dst));
                }
            }
            TransferState::Init | TransferState::Transferring => {
                panic!("transfer {} ended in non-terminal state {:?}", self.id, self.state);
            }
        }
        // Deregister from the file's in-flight list without touching the
        // already mutably borrowed self through its own Rc.
        let me = self as *const Transfer;
        self.file
            .borrow_mut()
            .transfers
            .retain(|t| t.as_ptr() as *const Transfer != me);
    }

    /// External cancellation on file expiry; the driving process observes
    /// the state after its next suspension and winds down.
    pub(crate) fn cancel(&mut self) {
        if matches!(self.state, TransferState::Init | TransferState::Transferring) {
            self.state = TransferState::Cancelled;
        }
    }
}
