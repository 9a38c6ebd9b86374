//! Invariant registration and evaluation.
//!
//! An invariant is a pure check over application state identified by
//! `module/route`. It reports a message and whether the invariant is broken;
//! it never mutates state.

use std::time::{Duration, Instant};

use tracing::debug;

/// Outcome of evaluating a single invariant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvariantReport {
    pub message: String,
    pub broken: bool,
}

impl InvariantReport {
    pub fn holds(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            broken: false,
        }
    }

    pub fn broken(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            broken: true,
        }
    }

    /// Broken when `broken` is true, with the same message either way.
    pub fn check(broken: bool, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            broken,
        }
    }
}

/// A broken invariant, identified by module and route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenInvariant {
    pub module: String,
    pub route: String,
    pub message: String,
}

/// A named invariant over application state `A`.
pub struct Invariant<A> {
    module: String,
    route: String,
    check: Box<dyn Fn(&A) -> InvariantReport>,
}

impl<A> Invariant<A> {
    pub fn new(
        module: impl Into<String>,
        route: impl Into<String>,
        check: impl Fn(&A) -> InvariantReport + 'static,
    ) -> Self {
        Self {
            module: module.into(),
            route: route.into(),
            check: Box::new(check),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    /// `module/route`
    pub fn full_route(&self) -> String {
        format!("{}/{}", self.module, self.route)
    }

    pub fn evaluate(&self, app: &A) -> InvariantReport {
        (self.check)(app)
    }
}

/// Timing for one invariant evaluated in isolation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantTiming {
    pub route: String,
    pub elapsed: Duration,
    pub broken: bool,
    pub message: String,
}

/// Anything the driver can ask "is every invariant still holding?".
///
/// Takes `&mut self` so wrappers can keep evaluation counters.
pub trait InvariantSet<A> {
    /// Evaluates the set; returns the first broken invariant, if any.
    fn check(&mut self, app: &A) -> Option<BrokenInvariant>;

    /// Number of invariants in the set.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered collection of invariants contributed by application modules.
pub struct InvariantRegistry<A> {
    invariants: Vec<Invariant<A>>,
}

impl<A> InvariantRegistry<A> {
    pub fn new() -> Self {
        Self {
            invariants: Vec::new(),
        }
    }

    pub fn register(
        &mut self,
        module: impl Into<String>,
        route: impl Into<String>,
        check: impl Fn(&A) -> InvariantReport + 'static,
    ) -> &mut Self {
        self.invariants.push(Invariant::new(module, route, check));
        self
    }

    pub fn with(
        mut self,
        module: impl Into<String>,
        route: impl Into<String>,
        check: impl Fn(&A) -> InvariantReport + 'static,
    ) -> Self {
        self.register(module, route, check);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Invariant<A>> {
        self.invariants.iter()
    }

    /// Evaluates every invariant in registration order and returns the
    /// first broken one.
    pub fn assert_all(&self, app: &A) -> Option<BrokenInvariant> {
        for invariant in &self.invariants {
            let report = invariant.evaluate(app);
            debug!(route = %invariant.full_route(), broken = report.broken, "invariant evaluated");
            if report.broken {
                return Some(BrokenInvariant {
                    module: invariant.module.clone(),
                    route: invariant.route.clone(),
                    message: report.message,
                });
            }
        }
        None
    }

    /// Keeps only the invariant registered as `module/route`.
    pub fn only(self, full_route: &str) -> Self {
        Self {
            invariants: self
                .invariants
                .into_iter()
                .filter(|inv| inv.full_route() == full_route)
                .collect(),
        }
    }

    /// Evaluates each invariant separately and times it.
    pub fn benchmark(&self, app: &A) -> Vec<InvariantTiming> {
        self.invariants
            .iter()
            .map(|inv| {
                let start = Instant::now();
                let report = inv.evaluate(app);
                InvariantTiming {
                    route: inv.full_route(),
                    elapsed: start.elapsed(),
                    broken: report.broken,
                    message: report.message,
                }
            })
            .collect()
    }
}

impl<A> Default for InvariantRegistry<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> InvariantSet<A> for InvariantRegistry<A> {
    fn check(&mut self, app: &A) -> Option<BrokenInvariant> {
        self.assert_all(app)
    }

    fn len(&self) -> usize {
        self.invariants.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ledger {
        supply: u64,
        balances: Vec<u64>,
    }

    fn supply_invariant() -> InvariantRegistry<Ledger> {
        InvariantRegistry::new()
            .with("bank", "nonnegative", |_| InvariantReport::holds("ok"))
            .with("bank", "total-supply", |l: &Ledger| {
                let sum: u64 = l.balances.iter().sum();
                InvariantReport::check(
                    sum != l.supply,
                    format!("sum of balances {sum}, supply {}", l.supply),
                )
            })
    }

    #[test]
    fn holding_invariants_report_nothing() {
        let ledger = Ledger {
            supply: 10,
            balances: vec![4, 6],
        };
        assert_eq!(supply_invariant().assert_all(&ledger), None);
    }

    #[test]
    fn first_broken_invariant_is_identified() {
        let ledger = Ledger {
            supply: 11,
            balances: vec![4, 6],
        };
        let broken = supply_invariant().assert_all(&ledger).unwrap();
        assert_eq!(broken.module, "bank");
        assert_eq!(broken.route, "total-supply");
        assert!(broken.message.contains("supply 11"));
    }

    #[test]
    fn benchmark_reports_each_invariant() {
        let ledger = Ledger {
            supply: 11,
            balances: vec![4, 6],
        };
        let timings = supply_invariant().benchmark(&ledger);
        assert_eq!(timings.len(), 2);
        assert!(!timings[0].broken);
        assert!(timings[1].broken);
        assert_eq!(timings[1].route, "bank/total-supply");
    }

    #[test]
    fn only_filters_by_full_route() {
        let reg = supply_invariant().only("bank/total-supply");
        assert_eq!(InvariantSet::len(&reg), 1);
    }
}
