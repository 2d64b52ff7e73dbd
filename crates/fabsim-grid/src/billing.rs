//! Tiered network pricing and the periodic billing pass.

use std::collections::BTreeMap;

use crate::topology::Topology;

pub(crate) const GIB: f64 = 1024. * 1024. * 1024.;
pub(crate) const MONTH_SECONDS: f64 = 30. * 24. * 3600.;

/// Cost of moving `volume` GiB under a tiered price schedule.
///
/// The schedule is a list of `(cumulative volume threshold, unit price)`
/// tiers, increasing by threshold. The volume is consumed tier by tier,
/// charging `min(remaining, tier_width) * unit_price` per tier; volume in
/// excess of the last threshold is charged at the last tier's price. The
/// resulting cost is non-decreasing and piecewise-linear in the volume.
///
/// Panics on an empty schedule: a selector without prices is a
/// configuration error.
pub fn network_cost(tiers: &[(f64, f64)], volume: f64) -> f64 {
    assert!(!tiers.is_empty(), "network price schedule is missing");
    assert!(volume >= 0., "traffic volume cannot be negative, got {}", volume);
    let mut remaining = volume;
    let mut costs = 0.;
    let mut prev_threshold = 0.;
    let mut last_price = 0.;
    for &(threshold, price) in tiers {
        let width = threshold - prev_threshold;
        let charged = remaining.min(width);
        costs += charged * price;
        remaining -= charged;
        prev_threshold = threshold;
        last_price = price;
        if remaining <= 0. {
            return costs;
        }
    }
    costs + remaining * last_price
}

/// Result of one billing pass.
pub struct Bill {
    pub storage_total: f64,
    pub network_total: f64,
    pub storage_by_element: BTreeMap<String, f64>,
}

impl Topology {
    /// Computes storage and network costs accrued since the previous billing
    /// pass and resets the per-cycle accumulators: every element's usage log
    /// is replayed and cleared, every link's traffic counter is drained.
    pub fn process_billing(&mut self, now: f64) -> Bill {
        let mut storage_by_element = BTreeMap::new();
        let mut storage_total = 0.;
        for site in self.sites() {
            let site = site.borrow();
            for element in site.elements() {
                let costs = element.borrow_mut().process_storage_billing(now, site.storage_price());
                storage_total += costs;
                storage_by_element.insert(element.borrow().name().to_owned(), costs);
            }
        }

        let mut network_total = 0.;
        for site in self.sites() {
            for selector in site.borrow().selectors() {
                let selector = selector.borrow();
                let mut traffic = 0.;
                for link in selector.links() {
                    traffic += link.borrow_mut().take_traffic();
                }
                network_total += network_cost(selector.network_prices(), traffic / GIB);
            }
        }

        Bill {
            storage_total,
            network_total,
            storage_by_element,
        }
    }
}
