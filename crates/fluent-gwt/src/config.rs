//! Orchestrator configuration.
//!
//! Selects the policies the [`FluentTest`](crate::FluentTest) state machine
//! runs with. Configuration is programmatic; nothing is read from files or
//! the environment.

use crate::registry::{DuplicatePolicy, PrimingPolicy};
use serde::{Deserialize, Serialize};

/// What a second `then` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThenPolicy {
    /// After the first `then`, only `and` is accepted
    #[default]
    Strict,
    /// Repeated `then` calls stay in the THEN stage
    Sticky,
}

/// Policies for one [`FluentTest`](crate::FluentTest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FluentConfig {
    /// When preconditions are primed
    pub priming: PrimingPolicy,
    /// Whether a precondition kind may be given twice
    pub duplicates: DuplicatePolicy,
    /// Whether `then` may be repeated
    pub then_policy: ThenPolicy,
}

impl FluentConfig {
    /// Immediate priming, same-kind rejection, strict `then`
    #[must_use]
    pub const fn new() -> Self {
        Self {
            priming: PrimingPolicy::Immediate,
            duplicates: DuplicatePolicy::RejectSameKind,
            then_policy: ThenPolicy::Strict,
        }
    }

    /// Deferred priming, for preconditions configured after `given` returns
    #[must_use]
    pub const fn deferred() -> Self {
        Self::new().with_priming(PrimingPolicy::Deferred)
    }

    /// Set the priming policy
    #[must_use]
    pub const fn with_priming(mut self, priming: PrimingPolicy) -> Self {
        self.priming = priming;
        self
    }

    /// Set the duplicate policy
    #[must_use]
    pub const fn with_duplicates(mut self, duplicates: DuplicatePolicy) -> Self {
        self.duplicates = duplicates;
        self
    }

    /// Set the `then` policy
    #[must_use]
    pub const fn with_then_policy(mut self, then_policy: ThenPolicy) -> Self {
        self.then_policy = then_policy;
        self
    }
}
