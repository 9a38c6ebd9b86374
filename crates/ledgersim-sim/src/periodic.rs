//! Periodic invariant scheduling.
//!
//! Evaluating every invariant at every check point is expensive for long
//! runs. [`PeriodicInvariants`] wraps an [`InvariantRegistry`] and only
//! evaluates it on every `period`-th call, counted from `offset`.

use crate::{BrokenInvariant, InvariantRegistry, InvariantSet, SimConfig};

/// An invariant set evaluated only when `(calls - offset) mod period == 0`.
///
/// The call counter is incremented on every [`InvariantSet::check`] before
/// the schedule is consulted, so with `period = 5, offset = 0` the set runs
/// on the 5th, 10th, 15th, ... call. A period of 0 or 1 evaluates on every
/// call.
pub struct PeriodicInvariants<A> {
    inner: InvariantRegistry<A>,
    period: u64,
    offset: u64,
    calls: u64,
    evaluations: u64,
}

impl<A> PeriodicInvariants<A> {
    pub fn new(inner: InvariantRegistry<A>, period: u64, offset: u64) -> Self {
        Self {
            inner,
            period,
            offset,
            calls: 0,
            evaluations: 0,
        }
    }

    /// Number of times `check` has been called.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Number of calls that actually evaluated the invariants.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    fn due(&self) -> bool {
        if self.period <= 1 {
            return true;
        }
        let distance = i128::from(self.calls) - i128::from(self.offset);
        distance.rem_euclid(i128::from(self.period)) == 0
    }
}

impl<A> InvariantSet<A> for PeriodicInvariants<A> {
    fn check(&mut self, app: &A) -> Option<BrokenInvariant> {
        self.calls += 1;
        if !self.due() {
            return None;
        }
        self.evaluations += 1;
        self.inner.assert_all(app)
    }

    fn len(&self) -> usize {
        InvariantSet::len(&self.inner)
    }
}

/// Applies the run configuration's invariant schedule to a registry.
///
/// `all_invariants` or a period of at most 1 returns the registry itself;
/// otherwise it is wrapped in [`PeriodicInvariants`].
pub fn schedule_invariants<A: 'static>(
    registry: InvariantRegistry<A>,
    config: &SimConfig,
) -> Box<dyn InvariantSet<A>> {
    if config.all_invariants || config.invariant_period <= 1 {
        Box::new(registry)
    } else {
        Box::new(PeriodicInvariants::new(
            registry,
            config.invariant_period,
            0,
        ))
    }
}
