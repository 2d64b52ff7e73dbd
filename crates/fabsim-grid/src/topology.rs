//! Sites, storage elements and the topology aggregate.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};

use crate::billing::{GIB, MONTH_SECONDS};
use crate::catalog::{FileRef, ReplicaRef};
use crate::error::GridError;
use crate::network::{LinkSelector, SelectorRef};

pub type SiteRef = Rc<RefCell<Site>>;
pub type ElementRef = Rc<RefCell<StorageElement>>;

/// A network location owning storage elements and outbound link selectors.
///
/// Grid sites and cloud regions are the same thing here; cloud regions
/// additionally carry the names of the regions sharing their multi-location
/// (used by topology builders to pick price schedules).
pub struct Site {
    name: String,
    location: String,
    multi_locations: Vec<String>,
    storage_price: f64,
    elements: Vec<ElementRef>,
    selectors: BTreeMap<String, SelectorRef>,
}

impl Site {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn multi_locations(&self) -> &[String] {
        &self.multi_locations
    }

    /// Storage price in CHF per GB-month, applied to all elements of the site.
    pub fn storage_price(&self) -> f64 {
        self.storage_price
    }

    pub fn elements(&self) -> &[ElementRef] {
        &self.elements
    }

    /// Returns the outbound link selector towards the named site, if any.
    pub fn selector_to(&self, dst_site: &str) -> Option<SelectorRef> {
        self.selectors.get(dst_site).cloned()
    }

    /// Outbound link selectors in destination-name order.
    pub fn selectors(&self) -> impl Iterator<Item = &SelectorRef> {
        self.selectors.values()
    }

    pub fn is_same_location(&self, other: &Site) -> bool {
        self.name == other.name
    }

    pub fn is_same_multi_location(&self, other: &Site) -> bool {
        other.multi_locations.iter().any(|name| *name == self.name) && !self.is_same_location(other)
    }
}

/// A storage endpoint (grid RSE or cloud bucket) holding replicas.
///
/// `used_storage` is maintained incrementally on every replica mutation and
/// never recomputed from scratch; the usage log keeps the `(time, delta)`
/// history consumed by storage billing.
pub struct StorageElement {
    name: String,
    site: Weak<RefCell<Site>>,
    replicas: Vec<ReplicaRef>,
    replica_by_name: HashMap<String, ReplicaRef>,
    used_storage: f64,
    usage_log: Vec<(f64, f64)>,
    usage_at_reset: f64,
    time_of_reset: f64,
}

impl StorageElement {
    fn new(name: &str, site: Weak<RefCell<Site>>) -> Self {
        Self {
            name: name.to_owned(),
            site,
            replicas: Vec::new(),
            replica_by_name: HashMap::new(),
            used_storage: 0.,
            usage_log: Vec::new(),
            usage_at_reset: 0.,
            time_of_reset: 0.,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn site(&self) -> SiteRef {
        self.site.upgrade().expect("site outlives its storage elements")
    }

    pub fn used_storage(&self) -> f64 {
        self.used_storage
    }

    pub fn replicas(&self) -> &[ReplicaRef] {
        &self.replicas
    }

    pub fn replica_of(&self, file_name: &str) -> Option<ReplicaRef> {
        self.replica_by_name.get(file_name).cloned()
    }

    pub(crate) fn attach_replica(&mut self, replica: ReplicaRef, file_name: String) {
        replica.borrow_mut().element_index = self.replicas.len();
        self.replicas.push(replica.clone());
        self.replica_by_name.insert(file_name, replica);
    }

    pub(crate) fn increase_replica(&mut self, file: &FileRef, now: f64, amount: f64) -> f64 {
        assert!(amount > 0., "replica increase must be positive, got {}", amount);
        let (file_name, full_size) = {
            let f = file.borrow();
            (f.name().to_owned(), f.size())
        };
        let replica = self
            .replica_by_name
            .get(&file_name)
            .unwrap_or_else(|| panic!("element `{}` holds no replica of `{}`", self.name, file_name))
            .clone();
        let applied = replica.borrow_mut().increase(amount, full_size);
        if applied > 0. {
            self.used_storage += applied;
            self.usage_log.push((now, applied));
        }
        applied
    }

    pub(crate) fn remove_replica(&mut self, file_name: &str, now: f64) {
        let replica = self
            .replica_by_name
            .remove(file_name)
            .unwrap_or_else(|| panic!("element `{}` holds no replica of `{}`", self.name, file_name));
        // O(1) compaction: swap the last replica into the vacated slot.
        // This path runs on every expiration, so no linear scans here.
        let index = replica.borrow().element_index;
        let last = self.replicas.pop().expect("replica list cannot be empty here");
        if !Rc::ptr_eq(&last, &replica) {
            last.borrow_mut().element_index = index;
            self.replicas[index] = last;
        }
        let size = replica.borrow().size();
        if size > 0. {
            self.usage_log.push((now, -size));
        }
        self.used_storage -= size;
        replica.borrow_mut().reset_deleted();
    }

    // Replays the usage log, accruing volume * elapsed * price per interval,
    // then clears the log and rolls the carried volume/time forward to `now`.
    // The replayed end volume must reproduce the live counter.
    pub(crate) fn process_storage_billing(&mut self, now: f64, price_per_gb_month: f64) -> f64 {
        let mut costs = 0.;
        let mut time_offset = self.time_of_reset;
        let mut volume = self.usage_at_reset;
        for &(time, delta) in &self.usage_log {
            let elapsed = time - time_offset;
            assert!(elapsed >= 0., "storage usage log must be chronological");
            if elapsed > 0. {
                costs += (volume / GIB) * (elapsed / MONTH_SECONDS) * price_per_gb_month;
                time_offset = time;
            }
            volume += delta;
        }
        assert!(
            (volume - self.used_storage).abs() < 1e-6,
            "usage log replay diverged from the live counter: {} vs {}",
            volume,
            self.used_storage
        );
        if time_offset < now {
            costs += (volume / GIB) * ((now - time_offset) / MONTH_SECONDS) * price_per_gb_month;
        }
        self.usage_log.clear();
        self.usage_at_reset = self.used_storage;
        self.time_of_reset = now;
        costs
    }
}

/// Registry of sites, storage elements and the links between them.
#[derive(Default)]
pub struct Topology {
    sites: Vec<SiteRef>,
    site_by_name: HashMap<String, SiteRef>,
    elements: Vec<ElementRef>,
    element_by_name: HashMap<String, ElementRef>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new site. `multi_locations` is empty for grid sites.
    ///
    /// Panics on a duplicate name.
    pub fn create_site(
        &mut self,
        name: &str,
        location: &str,
        multi_locations: Vec<String>,
        storage_price: f64,
    ) -> SiteRef {
        assert!(
            !self.site_by_name.contains_key(name),
            "site `{}` is already registered",
            name
        );
        let site = Rc::new(RefCell::new(Site {
            name: name.to_owned(),
            location: location.to_owned(),
            multi_locations,
            storage_price,
            elements: Vec::new(),
            selectors: BTreeMap::new(),
        }));
        self.sites.push(site.clone());
        self.site_by_name.insert(name.to_owned(), site.clone());
        site
    }

    /// Registers a new storage element on the site.
    ///
    /// Element names are unique across the whole topology; panics otherwise.
    pub fn create_element(&mut self, site: &SiteRef, name: &str) -> ElementRef {
        assert!(
            !self.element_by_name.contains_key(name),
            "storage element `{}` is already registered",
            name
        );
        let element = Rc::new(RefCell::new(StorageElement::new(name, Rc::downgrade(site))));
        site.borrow_mut().elements.push(element.clone());
        self.elements.push(element.clone());
        self.element_by_name.insert(name.to_owned(), element.clone());
        element
    }

    /// Registers the directed link selector between two sites.
    ///
    /// At most one selector may exist per ordered site pair; panics otherwise.
    pub fn create_link_selector(&mut self, src: &SiteRef, dst: &SiteRef) -> SelectorRef {
        let dst_name = dst.borrow().name().to_owned();
        assert!(
            src.borrow().selectors.get(&dst_name).is_none(),
            "link selector from `{}` to `{}` already exists",
            src.borrow().name(),
            dst_name
        );
        let selector = Rc::new(RefCell::new(LinkSelector::new(
            Rc::downgrade(src),
            Rc::downgrade(dst),
        )));
        src.borrow_mut().selectors.insert(dst_name, selector.clone());
        selector
    }

    pub fn get_site(&self, name: &str) -> Result<SiteRef, GridError> {
        self.site_by_name
            .get(name)
            .cloned()
            .ok_or_else(|| GridError::SiteNotFound(name.to_owned()))
    }

    pub fn get_element(&self, name: &str) -> Result<ElementRef, GridError> {
        self.element_by_name
            .get(name)
            .cloned()
            .ok_or_else(|| GridError::ElementNotFound(name.to_owned()))
    }

    pub fn sites(&self) -> &[SiteRef] {
        &self.sites
    }

    pub fn elements(&self) -> &[ElementRef] {
        &self.elements
    }
}
