//! Randomized operations and weighted selection.
//!
//! An [`Operation`] draws its arguments from the run's [`SimRng`], applies
//! one action to the application, and may schedule follow-up operations for
//! later blocks. Operations are registered in an [`OperationSet`] with a
//! parameter name and default weight; at the start of a run the weights are
//! resolved once (overrides first) into an [`OperationRegistry`].

use ledgersim_types::{BlockHeader, Height};
use thiserror::Error;

use crate::{ParamResolver, SimAccount, SimError, SimRng};

// ============================================================================
// Operations
// ============================================================================

/// Block context handed to every operation.
#[derive(Debug, Clone, Copy)]
pub struct OperationContext<'a> {
    pub header: BlockHeader,
    /// Actor accounts (module accounts excluded).
    pub accounts: &'a [SimAccount],
}

/// Why an operation attempt did not apply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// The attempt was rejected by a business rule or had no viable
    /// arguments. Counted as a skip; the run continues.
    #[error("skipped: {0}")]
    Skip(String),

    /// The operation hit a state that indicates a bug in the application or
    /// in the operation itself. Stops the run.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl OperationError {
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip(reason.into())
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal(reason.into())
    }
}

/// A successfully applied operation.
pub struct OperationOutcome<A> {
    /// Human-readable description, logged when the run is verbose.
    pub comment: String,
    pub future_operations: Vec<FutureOperation<A>>,
}

impl<A> OperationOutcome<A> {
    pub fn new(comment: impl Into<String>) -> Self {
        Self {
            comment: comment.into(),
            future_operations: Vec::new(),
        }
    }

    pub fn with_future(mut self, future: FutureOperation<A>) -> Self {
        self.future_operations.push(future);
        self
    }
}

impl<A> std::fmt::Debug for OperationOutcome<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationOutcome")
            .field("comment", &self.comment)
            .field("future_operations", &self.future_operations.len())
            .finish()
    }
}

/// Result of executing an operation.
pub type OperationResult<A> = Result<OperationOutcome<A>, OperationError>;

/// A randomized action against an application of type `A`.
pub trait Operation<A> {
    /// `module/action`, used for statistics and logs.
    fn route(&self) -> &str;

    fn execute(&self, rng: &mut SimRng, app: &mut A, ctx: &OperationContext<'_>)
    -> OperationResult<A>;
}

/// Adapts a closure into an [`Operation`].
pub struct FnOperation<F> {
    route: String,
    run: F,
}

impl<A, F> Operation<A> for FnOperation<F>
where
    F: Fn(&mut SimRng, &mut A, &OperationContext<'_>) -> OperationResult<A>,
{
    fn route(&self) -> &str {
        &self.route
    }

    fn execute(
        &self,
        rng: &mut SimRng,
        app: &mut A,
        ctx: &OperationContext<'_>,
    ) -> OperationResult<A> {
        (self.run)(rng, app, ctx)
    }
}

/// Boxes a closure as an operation with the given route.
pub fn operation<A, F>(route: impl Into<String>, run: F) -> Box<dyn Operation<A>>
where
    A: 'static,
    F: Fn(&mut SimRng, &mut A, &OperationContext<'_>) -> OperationResult<A> + 'static,
{
    Box::new(FnOperation {
        route: route.into(),
        run,
    })
}

/// An operation scheduled to run at the start of a later block.
pub struct FutureOperation<A> {
    pub block_height: Height,
    pub operation: Box<dyn Operation<A>>,
}

impl<A> FutureOperation<A> {
    pub fn at(block_height: Height, operation: Box<dyn Operation<A>>) -> Self {
        Self {
            block_height,
            operation,
        }
    }
}

// ============================================================================
// Registration and selection
// ============================================================================

/// An operation with an unresolved weight.
pub struct WeightedOperation<A> {
    param_name: String,
    default_weight: u64,
    operation: Box<dyn Operation<A>>,
}

impl<A> WeightedOperation<A> {
    pub fn param_name(&self) -> &str {
        &self.param_name
    }

    pub fn default_weight(&self) -> u64 {
        self.default_weight
    }

    pub fn route(&self) -> &str {
        self.operation.route()
    }
}

/// The operations an application contributes to a run, before weights are
/// resolved.
pub struct OperationSet<A> {
    entries: Vec<WeightedOperation<A>>,
}

impl<A> OperationSet<A> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers `operation`; its weight is resolved from `param_name`,
    /// falling back to `default_weight`.
    pub fn add(
        &mut self,
        param_name: impl Into<String>,
        default_weight: u64,
        operation: Box<dyn Operation<A>>,
    ) -> &mut Self {
        self.entries.push(WeightedOperation {
            param_name: param_name.into(),
            default_weight,
            operation,
        });
        self
    }

    pub fn with(
        mut self,
        param_name: impl Into<String>,
        default_weight: u64,
        operation: Box<dyn Operation<A>>,
    ) -> Self {
        self.add(param_name, default_weight, operation);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WeightedOperation<A>> {
        self.entries.iter()
    }

    /// Resolves every weight once and builds the selection table.
    pub fn resolve(
        self,
        resolver: &mut ParamResolver<'_>,
        rng: &mut SimRng,
    ) -> Result<OperationRegistry<A>, SimError> {
        let mut weights = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let default = entry.default_weight;
            let weight: u64 = resolver.resolve(&entry.param_name, rng, |_| default)?;
            weights.push(weight);
        }
        let operations = self.entries.into_iter().map(|e| e.operation).collect();
        OperationRegistry::from_weights(operations, weights)
    }
}

impl<A> Default for OperationSet<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Operations with resolved weights.
///
/// Selection draws `r` uniformly from `[0, total_weight)` and picks the
/// first entry whose cumulative weight exceeds `r`, so each entry is chosen
/// with probability `weight / total_weight`. Zero-weight entries are never
/// chosen.
pub struct OperationRegistry<A> {
    operations: Vec<Box<dyn Operation<A>>>,
    weights: Vec<u64>,
    cumulative: Vec<u64>,
    total_weight: u64,
}

impl<A> OperationRegistry<A> {
    pub fn from_weights(
        operations: Vec<Box<dyn Operation<A>>>,
        weights: Vec<u64>,
    ) -> Result<Self, SimError> {
        debug_assert_eq!(operations.len(), weights.len());

        let mut cumulative = Vec::with_capacity(weights.len());
        let mut total: u64 = 0;
        for &w in &weights {
            total = total.checked_add(w).ok_or(SimError::WeightOverflow)?;
            cumulative.push(total);
        }
        if total == 0 {
            return Err(SimError::ZeroTotalWeight);
        }

        Ok(Self {
            operations,
            weights,
            cumulative,
            total_weight: total,
        })
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// `(route, weight)` in registration order.
    pub fn weights(&self) -> impl Iterator<Item = (&str, u64)> {
        self.operations
            .iter()
            .zip(&self.weights)
            .map(|(op, &w)| (op.route(), w))
    }

    /// Draws one operation, weighted.
    pub fn select(&self, rng: &mut SimRng) -> &dyn Operation<A> {
        let r = rng.next_u64_range(0, self.total_weight);
        let idx = self.cumulative.partition_point(|&c| c <= r);
        // total_weight > 0 guarantees r < last cumulative weight
        debug_assert!(idx < self.operations.len());
        self.operations[idx].as_ref()
    }
}
