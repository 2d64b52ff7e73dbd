//! File catalog: files, replicas and the expiration reaper.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::rc::{Rc, Weak};

use fabsim_core::{Id, SimulationContext};

use crate::error::GridError;
use crate::events::FileDeleted;
use crate::network::SelectorRef;
use crate::topology::{ElementRef, StorageElement};
use crate::transfer::{Transfer, TransferRef};

pub type FileRef = Rc<RefCell<File>>;
pub type ReplicaRef = Rc<RefCell<Replica>>;

/// A logical file tracked by the catalog.
///
/// The name, byte size and expiry time are fixed at creation. The bytes are
/// materialized by replicas; in-flight transfers targeting the file are
/// registered here so that an expiry cascade can cancel them.
pub struct File {
    name: String,
    size: f64,
    die_time: f64,
    pub(crate) index: usize,
    pub(crate) replicas: Vec<ReplicaRef>,
    pub(crate) transfers: Vec<TransferRef>,
}

impl File {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn die_time(&self) -> f64 {
        self.die_time
    }

    pub fn replicas(&self) -> &[ReplicaRef] {
        &self.replicas
    }

    pub fn transfers(&self) -> &[TransferRef] {
        &self.transfers
    }

    /// Returns the replicas that hold the full file content,
    /// i.e. the valid transfer sources.
    pub fn complete_replicas(&self) -> Vec<ReplicaRef> {
        self.replicas
            .iter()
            .filter(|r| r.borrow().state() == ReplicaState::Available)
            .cloned()
            .collect()
    }
}

/// Lifecycle of a replica.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplicaState {
    Empty,
    Transferring,
    Available,
    Deleted,
}

/// Materialization of a file's bytes at one storage element.
///
/// Invariant: `size == file.size` if and only if the state is `Available`.
/// Size grows monotonically and clamps to the file size; the only decrease
/// is the full reset to zero on deletion.
pub struct Replica {
    id: u64,
    file: Weak<RefCell<File>>,
    element: Weak<RefCell<StorageElement>>,
    size: f64,
    state: ReplicaState,
    pub(crate) element_index: usize,
}

impl Replica {
    fn new(id: u64, file: Weak<RefCell<File>>, element: Weak<RefCell<StorageElement>>) -> Self {
        Self {
            id,
            file,
            element,
            size: 0.,
            state: ReplicaState::Empty,
            element_index: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn state(&self) -> ReplicaState {
        self.state
    }

    pub fn file(&self) -> FileRef {
        self.file.upgrade().expect("file outlives its replicas")
    }

    pub fn element(&self) -> ElementRef {
        self.element.upgrade().expect("storage element outlives its replicas")
    }

    pub(crate) fn set_state(&mut self, state: ReplicaState) {
        self.state = state;
    }

    // Applies a monotonic increase clamped to the remaining need and returns
    // the applied amount. The clamped path assigns the full size exactly so
    // the `Available <=> full` invariant never drifts on float rounding.
    pub(crate) fn increase(&mut self, amount: f64, full_size: f64) -> f64 {
        assert!(amount > 0., "replica increase must be positive, got {}", amount);
        assert!(self.state != ReplicaState::Deleted, "increasing a deleted replica");
        let remaining = full_size - self.size;
        let applied = if amount >= remaining {
            self.size = full_size;
            remaining
        } else {
            self.size += amount;
            amount
        };
        if self.size == full_size {
            self.state = ReplicaState::Available;
        }
        applied
    }

    pub(crate) fn reset_deleted(&mut self) {
        self.size = 0.;
        self.state = ReplicaState::Deleted;
    }
}

// Min-entry of the expiry index: earliest die-time first, insertion order
// as the tie-break for determinism.
struct ExpiryEntry {
    die_time: f64,
    sequence: u64,
    file: Weak<RefCell<File>>,
}

impl Eq for ExpiryEntry {}

impl PartialEq for ExpiryEntry {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Ord for ExpiryEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .die_time
            .total_cmp(&self.die_time)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for ExpiryEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Registry of files and the operations that keep the replica bookkeeping
/// consistent: creation, growth, removal, transfer setup and the expiration
/// reaper. Owned by the simulation driver and passed by reference; there are
/// no process-wide singletons.
pub struct Catalog {
    ctx: SimulationContext,
    monitoring: Option<Id>,
    files: Vec<FileRef>,
    file_by_name: HashMap<String, FileRef>,
    expiry_queue: BinaryHeap<ExpiryEntry>,
    expiry_sequence: u64,
    next_replica_id: u64,
    next_transfer_id: u64,
    active_transfers: Rc<Cell<usize>>,
}

impl Catalog {
    pub fn new(ctx: SimulationContext) -> Self {
        Self {
            ctx,
            monitoring: None,
            files: Vec::new(),
            file_by_name: HashMap::new(),
            expiry_queue: BinaryHeap::new(),
            expiry_sequence: 0,
            next_replica_id: 0,
            next_transfer_id: 0,
            active_transfers: Rc::new(Cell::new(0)),
        }
    }

    /// Directs accounting events (file deletions) to the specified component.
    pub fn set_monitoring(&mut self, id: Id) {
        self.monitoring = Some(id);
    }

    pub fn get_file(&self, name: &str) -> Result<FileRef, GridError> {
        self.file_by_name
            .get(name)
            .cloned()
            .ok_or_else(|| GridError::FileNotFound(name.to_owned()))
    }

    pub fn files(&self) -> &[FileRef] {
        &self.files
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Number of transfers currently between `begin` and `end`.
    pub fn active_transfers(&self) -> usize {
        self.active_transfers.get()
    }

    /// Registers a new file.
    ///
    /// Panics on a duplicate name or a non-finite expiry time, both of which
    /// indicate a caller bug.
    pub fn create_file(&mut self, name: &str, size: f64, die_time: f64) -> FileRef {
        assert!(size > 0., "file `{}` must have a positive size", name);
        assert!(die_time.is_finite(), "file `{}` must have a finite expiry time", name);
        assert!(
            !self.file_by_name.contains_key(name),
            "file `{}` is already registered",
            name
        );
        let file = Rc::new(RefCell::new(File {
            name: name.to_owned(),
            size,
            die_time,
            index: self.files.len(),
            replicas: Vec::new(),
            transfers: Vec::new(),
        }));
        self.files.push(file.clone());
        self.file_by_name.insert(name.to_owned(), file.clone());
        self.expiry_queue.push(ExpiryEntry {
            die_time,
            sequence: self.expiry_sequence,
            file: Rc::downgrade(&file),
        });
        self.expiry_sequence += 1;
        file
    }

    /// Registers a new empty replica of the file on the storage element.
    ///
    /// Panics if the element already holds a replica of this file.
    pub fn create_replica(&mut self, file: &FileRef, element: &ElementRef) -> ReplicaRef {
        let file_name = file.borrow().name().to_owned();
        assert!(
            element.borrow().replica_of(&file_name).is_none(),
            "element `{}` already holds a replica of `{}`",
            element.borrow().name(),
            file_name
        );
        let replica = Rc::new(RefCell::new(Replica::new(
            self.next_replica_id,
            Rc::downgrade(file),
            Rc::downgrade(element),
        )));
        self.next_replica_id += 1;
        element.borrow_mut().attach_replica(replica.clone(), file_name);
        file.borrow_mut().replicas.push(replica.clone());
        replica
    }

    /// Grows the replica of `file` held by `element`, clamping to the
    /// remaining need, and returns the applied amount.
    pub fn increase_replica(&mut self, element: &ElementRef, file: &FileRef, amount: f64, now: f64) -> f64 {
        element.borrow_mut().increase_replica(file, now, amount)
    }

    /// Removes the replica of `file` from `element` on both sides.
    ///
    /// Panics if the element holds no such replica (caller bug).
    pub fn remove_replica(&mut self, element: &ElementRef, file: &FileRef, now: f64) {
        let file_name = file.borrow().name().to_owned();
        let replica = element.borrow().replica_of(&file_name).unwrap_or_else(|| {
            panic!(
                "element `{}` holds no replica of `{}`",
                element.borrow().name(),
                file_name
            )
        });
        element.borrow_mut().remove_replica(&file_name, now);
        file.borrow_mut().replicas.retain(|r| !Rc::ptr_eq(r, &replica));
    }

    /// Destroys the file: cancels all in-flight transfers referencing it,
    /// removes every replica from its element and deregisters the file.
    ///
    /// Safe to call twice for the same file: deleting an unregistered file
    /// is a no-op.
    pub fn delete_file(&mut self, file: &FileRef, now: f64) {
        let name = file.borrow().name().to_owned();
        match self.file_by_name.get(&name) {
            Some(registered) if Rc::ptr_eq(registered, file) => {}
            _ => return,
        }
        let transfers = std::mem::take(&mut file.borrow_mut().transfers);
        for transfer in &transfers {
            transfer.borrow_mut().cancel();
        }
        let replicas = std::mem::take(&mut file.borrow_mut().replicas);
        for replica in &replicas {
            let element = replica.borrow().element();
            element.borrow_mut().remove_replica(&name, now);
        }
        self.file_by_name.remove(&name);
        let index = file.borrow().index;
        let last = self.files.pop().expect("file list cannot be empty here");
        if !Rc::ptr_eq(&last, file) {
            last.borrow_mut().index = index;
            self.files[index] = last;
        }
        if let Some(dst) = self.monitoring {
            self.ctx.emit_now(FileDeleted { file_name: name }, dst);
        }
    }

    /// Removes every file whose die-time has elapsed, with all cascading
    /// effects, and returns the number of removed files.
    ///
    /// Cost is proportional to the number of expired files. Calling it again
    /// without advancing the clock removes nothing.
    pub fn run_reaper(&mut self, now: f64) -> usize {
        let mut removed = 0;
        while let Some(entry) = self.expiry_queue.peek() {
            if entry.die_time > now {
                break;
            }
            let entry = self.expiry_queue.pop().unwrap();
            if let Some(file) = entry.file.upgrade() {
                // Skip stale entries of files already deleted by hand.
                let name = file.borrow().name().to_owned();
                let registered = self.file_by_name.get(&name).map_or(false, |f| Rc::ptr_eq(f, &file));
                if registered {
                    self.delete_file(&file, now);
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Creates a transfer of `file` from a replica on `src_element` to a new
    /// replica on `dst_element`, bound to the link selector between the two
    /// owning sites.
    pub fn create_transfer(
        &mut self,
        file: &FileRef,
        src_element: &ElementRef,
        dst_element: &ElementRef,
    ) -> Result<TransferRef, GridError> {
        let file_name = file.borrow().name().to_owned();
        let src_replica =
            src_element
                .borrow()
                .replica_of(&file_name)
                .ok_or_else(|| GridError::SourceReplicaMissing {
                    element: src_element.borrow().name().to_owned(),
                    file: file_name.clone(),
                })?;
        let selector = self.resolve_selector(src_element, dst_element)?;
        let dst_replica = self.create_replica(file, dst_element);
        Ok(self.register_transfer(file, selector, Some(src_replica), dst_replica))
    }

    /// Creates a one-sided download of `file` from `src_element` to a new
    /// replica on `dst_element`: the same machine as a transfer, but without
    /// source-side tracking and contention.
    pub fn create_download(
        &mut self,
        file: &FileRef,
        src_element: &ElementRef,
        dst_element: &ElementRef,
    ) -> Result<TransferRef, GridError> {
        let file_name = file.borrow().name().to_owned();
        if src_element.borrow().replica_of(&file_name).is_none() {
            return Err(GridError::SourceReplicaMissing {
                element: src_element.borrow().name().to_owned(),
                file: file_name,
            });
        }
        let selector = self.resolve_selector(src_element, dst_element)?;
        let dst_replica = self.create_replica(file, dst_element);
        Ok(self.register_transfer(file, selector, None, dst_replica))
    }

    fn resolve_selector(&self, src_element: &ElementRef, dst_element: &ElementRef) -> Result<SelectorRef, GridError> {
        let src_site = src_element.borrow().site();
        let dst_site_name = dst_element.borrow().site().borrow().name().to_owned();
        let selector = src_site.borrow().selector_to(&dst_site_name);
        selector.ok_or_else(|| GridError::SelectorNotFound {
            src: src_site.borrow().name().to_owned(),
            dst: dst_site_name,
        })
    }

    fn register_transfer(
        &mut self,
        file: &FileRef,
        selector: SelectorRef,
        src_replica: Option<ReplicaRef>,
        dst_replica: ReplicaRef,
    ) -> TransferRef {
        let transfer = Rc::new(RefCell::new(Transfer::new(
            self.next_transfer_id,
            file.clone(),
            selector,
            src_replica,
            dst_replica,
            self.active_transfers.clone(),
        )));
        self.next_transfer_id += 1;
        file.borrow_mut().transfers.push(transfer.clone());
        transfer
    }
}
