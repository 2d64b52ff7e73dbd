//! Storage links and the selectors that pool them.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::topology::{Site, SiteRef};

pub type LinkRef = Rc<RefCell<StorageLink>>;
pub type SelectorRef = Rc<RefCell<LinkSelector>>;

/// A physical link with fixed bandwidth capacity.
///
/// Tracks the number of transfers currently bound to it and the traffic
/// accumulated since the last billing pass.
pub struct StorageLink {
    bandwidth: f64,
    bound_transfers: u32,
    used_traffic: f64,
}

impl StorageLink {
    /// Bandwidth capacity in bytes per second.
    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn bound_transfers(&self) -> u32 {
        self.bound_transfers
    }

    /// Traffic in bytes accumulated since the last billing reset.
    pub fn used_traffic(&self) -> f64 {
        self.used_traffic
    }

    /// Optimistic estimate of what a newly-joining transfer would receive.
    pub fn headroom(&self) -> f64 {
        self.bandwidth / (self.bound_transfers + 1) as f64
    }

    pub(crate) fn add_traffic(&mut self, bytes: f64) {
        self.used_traffic += bytes;
    }

    pub(crate) fn take_traffic(&mut self) -> f64 {
        let traffic = self.used_traffic;
        self.used_traffic = 0.;
        traffic
    }
}

/// The directed network path abstraction between two sites, pooling one or
/// more storage links and carrying the tiered network price schedule.
pub struct LinkSelector {
    src: Weak<RefCell<Site>>,
    dst: Weak<RefCell<Site>>,
    links: Vec<LinkRef>,
    network_prices: Vec<(f64, f64)>,
}

impl LinkSelector {
    pub(crate) fn new(src: Weak<RefCell<Site>>, dst: Weak<RefCell<Site>>) -> Self {
        Self {
            src,
            dst,
            links: Vec::new(),
            network_prices: Vec::new(),
        }
    }

    pub fn src_site(&self) -> SiteRef {
        self.src.upgrade().expect("site outlives its link selectors")
    }

    pub fn dst_site(&self) -> SiteRef {
        self.dst.upgrade().expect("site outlives its link selectors")
    }

    pub fn links(&self) -> &[LinkRef] {
        &self.links
    }

    /// Price schedule: `(cumulative volume threshold in GiB, unit price)`
    /// tiers, increasing by threshold.
    pub fn network_prices(&self) -> &[(f64, f64)] {
        &self.network_prices
    }

    pub fn create_link(&mut self, bandwidth: f64) -> LinkRef {
        assert!(bandwidth > 0., "link bandwidth must be positive, got {}", bandwidth);
        let link = Rc::new(RefCell::new(StorageLink {
            bandwidth,
            bound_transfers: 0,
            used_traffic: 0.,
        }));
        self.links.push(link.clone());
        link
    }

    /// Installs the tiered price schedule.
    ///
    /// Panics on an empty schedule or non-increasing thresholds.
    pub fn set_network_prices(&mut self, tiers: Vec<(f64, f64)>) {
        assert!(!tiers.is_empty(), "network price schedule cannot be empty");
        for pair in tiers.windows(2) {
            assert!(
                pair[0].0 < pair[1].0,
                "network price thresholds must be strictly increasing"
            );
        }
        self.network_prices = tiers;
    }

    /// Picks the link maximizing the headroom estimate `bandwidth / (bound + 1)`.
    /// Ties keep the first-seen link. A selector with zero links is a
    /// configuration error.
    pub fn select_link(&self) -> LinkRef {
        assert!(!self.links.is_empty(), "link selector has no links configured");
        let mut best = self.links[0].clone();
        let mut best_headroom = best.borrow().headroom();
        for link in &self.links[1..] {
            let headroom = link.borrow().headroom();
            if headroom > best_headroom {
                best = link.clone();
                best_headroom = headroom;
            }
        }
        best
    }

    /// Selects a link and binds one more transfer to it.
    pub fn bind_link(&self) -> LinkRef {
        let link = self.select_link();
        link.borrow_mut().bound_transfers += 1;
        link
    }

    /// Unbinds one transfer from the link. Releasing an unbound link is a
    /// bug signal and aborts the run.
    pub fn release_link(link: &LinkRef) {
        let mut link = link.borrow_mut();
        assert!(link.bound_transfers > 0, "releasing an unbound storage link");
        link.bound_transfers -= 1;
    }
}
