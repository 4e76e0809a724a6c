//! Precondition registry.
//!
//! Keeps the ordered list of "given" steps of one test, rejects a second
//! precondition of the same kind and primes each one at the moment the
//! [`PrimingPolicy`] dictates.

use crate::precondition::{Precondition, PreconditionKind};
use crate::recording::WriteOnlyTestItems;
use crate::result::{GwtError, GwtResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// When a registered precondition is primed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimingPolicy {
    /// Prime during registration
    #[default]
    Immediate,
    /// Prime the previous entry when the next precondition or the
    /// invocation is registered; the last one is flushed just before the
    /// invocation runs
    Deferred,
}

/// How repeated precondition kinds are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// A second precondition of the same kind fails the test
    #[default]
    RejectSameKind,
    /// Every registered value counts as its own instance
    AllowSameKind,
}

/// Priming state of a registered precondition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimingState {
    /// Registered, waiting to be primed
    Pending,
    /// Primed successfully
    Primed,
    /// Priming returned an error
    Failed,
}

struct Entry<I: 'static> {
    precondition: Box<dyn Precondition<I>>,
    kind: PreconditionKind,
    state: PrimingState,
}

/// Ordered, deduplicated set of the preconditions of one test.
pub struct PreconditionRegistry<I: 'static> {
    entries: Vec<Entry<I>>,
    kinds: HashSet<PreconditionKind>,
    pending: Option<usize>,
    priming: PrimingPolicy,
    duplicates: DuplicatePolicy,
}

impl<I: 'static> fmt::Debug for PreconditionRegistry<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreconditionRegistry")
            .field("preconditions", &self.names())
            .field("pending", &self.pending)
            .field("priming", &self.priming)
            .field("duplicates", &self.duplicates)
            .finish()
    }
}

impl<I: 'static> Default for PreconditionRegistry<I> {
    fn default() -> Self {
        Self::new(PrimingPolicy::default(), DuplicatePolicy::default())
    }
}

impl<I: 'static> PreconditionRegistry<I> {
    /// Create an empty registry
    #[must_use]
    pub fn new(priming: PrimingPolicy, duplicates: DuplicatePolicy) -> Self {
        Self {
            entries: Vec::new(),
            kinds: HashSet::new(),
            pending: None,
            priming,
            duplicates,
        }
    }

    /// Active priming policy
    #[must_use]
    pub const fn priming(&self) -> PrimingPolicy {
        self.priming
    }

    /// Active duplicate policy
    #[must_use]
    pub const fn duplicates(&self) -> DuplicatePolicy {
        self.duplicates
    }

    /// Register a precondition and return its index.
    ///
    /// Under [`PrimingPolicy::Immediate`] the precondition is primed before
    /// returning. Under [`PrimingPolicy::Deferred`] the previously
    /// registered precondition is primed instead and this one waits for the
    /// next registration or [`flush`](Self::flush).
    ///
    /// # Errors
    ///
    /// [`GwtError::DuplicatePrecondition`] if the kind was already
    /// registered, or the priming failure of whichever precondition was
    /// primed.
    pub fn register<P>(
        &mut self,
        precondition: P,
        items: &mut dyn WriteOnlyTestItems,
        infrastructure: &mut I,
    ) -> GwtResult<usize>
    where
        P: Precondition<I>,
    {
        let kind = precondition.kind();
        if self.duplicates == DuplicatePolicy::RejectSameKind && self.kinds.contains(&kind) {
            return Err(GwtError::DuplicatePrecondition {
                name: precondition.name(),
            });
        }

        if self.priming == PrimingPolicy::Deferred {
            self.flush(items, infrastructure)?;
        }

        tracing::debug!(
            precondition = %precondition.name(),
            priming = ?self.priming,
            "registering precondition"
        );

        let index = self.entries.len();
        let _ = self.kinds.insert(kind.clone());
        self.entries.push(Entry {
            precondition: Box::new(precondition),
            kind,
            state: PrimingState::Pending,
        });

        match self.priming {
            PrimingPolicy::Immediate => self.prime_entry(index, items, infrastructure)?,
            PrimingPolicy::Deferred => self.pending = Some(index),
        }

        Ok(index)
    }

    /// Prime the precondition still waiting under deferred priming.
    ///
    /// No-op when nothing is pending.
    ///
    /// # Errors
    ///
    /// The priming failure of the pending precondition.
    pub fn flush(
        &mut self,
        items: &mut dyn WriteOnlyTestItems,
        infrastructure: &mut I,
    ) -> GwtResult<()> {
        match self.pending.take() {
            Some(index) => self.prime_entry(index, items, infrastructure),
            None => Ok(()),
        }
    }

    fn prime_entry(
        &mut self,
        index: usize,
        items: &mut dyn WriteOnlyTestItems,
        infrastructure: &mut I,
    ) -> GwtResult<()> {
        let entry = self
            .entries
            .get_mut(index)
            .ok_or_else(|| GwtError::InvalidState {
                message: format!("no precondition registered at index {index}"),
            })?;

        if entry.state != PrimingState::Pending {
            return Ok(());
        }

        let name = entry.precondition.name();
        match entry.precondition.prime(items, infrastructure) {
            Ok(()) => {
                entry.state = PrimingState::Primed;
                tracing::debug!(precondition = %name, "primed precondition");
                Ok(())
            }
            Err(source) => {
                entry.state = PrimingState::Failed;
                // Invocations registered as givens already fail with a named error
                Err(match source.downcast::<GwtError>() {
                    Ok(err) => *err,
                    Err(source) => GwtError::PrimingFailed {
                        precondition: name,
                        source,
                    },
                })
            }
        }
    }

    /// Concrete precondition at `index`, if it is a `P`
    pub fn get_mut<P>(&mut self, index: usize) -> Option<&mut P>
    where
        P: Precondition<I>,
    {
        self.entries
            .get_mut(index)
            .and_then(|entry| entry.precondition.as_mut().as_any_mut().downcast_mut::<P>())
    }

    /// Number of registered preconditions
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a precondition of this kind is registered
    #[must_use]
    pub fn contains_kind(&self, kind: &PreconditionKind) -> bool {
        self.kinds.contains(kind)
    }

    /// Names in registration order
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.precondition.name()).collect()
    }

    /// Kinds in registration order
    #[must_use]
    pub fn kinds(&self) -> Vec<&PreconditionKind> {
        self.entries.iter().map(|e| &e.kind).collect()
    }

    /// Priming state of the precondition at `index`
    #[must_use]
    pub fn state(&self, index: usize) -> Option<PrimingState> {
        self.entries.get(index).map(|e| e.state)
    }

    /// Number of successfully primed preconditions
    #[must_use]
    pub fn primed_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.state == PrimingState::Primed)
            .count()
    }

    /// Index of the precondition waiting to be primed, if any
    #[must_use]
    pub const fn pending(&self) -> Option<usize> {
        self.pending
    }
}
