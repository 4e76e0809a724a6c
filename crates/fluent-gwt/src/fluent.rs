//! The Given/When/Then orchestrator.
//!
//! [`FluentTest`] is the only type test authors drive directly. It tracks the
//! current [`Stage`], owns the precondition registry, the invocation and its
//! result, and rejects every call made out of order.
//!
//! ```text
//!   given / and ──► when ──► then ──► and_then ...
//!   (GIVEN)         (WHEN)   (THEN)   (THEN)
//! ```
//!
//! One instance serves exactly one test execution. Construct a fresh one per
//! test; nothing is shared between instances.

use crate::config::{FluentConfig, ThenPolicy};
use crate::invocation::{call_system, invoke_when, SystemUnderTest, When};
use crate::precondition::{short_type_name, InvocationPrecondition, Precondition};
use crate::recording::{CapturedInputsRecorder, InterestingGivensRecorder, TestState, WriteOnlyTestItems};
use crate::registry::PreconditionRegistry;
use crate::result::{GwtError, GwtResult, ProtocolViolation};
use crate::stage::Stage;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::ops::{Deref, DerefMut};

enum Invocation<I: 'static, R: 'static> {
    NotInvoked,
    /// The `when` passed its guard; a failure leaves it here
    Attempted,
    Deferred(Box<dyn SystemUnderTest<I, Output = R>>),
    Completed(R),
    /// The staged call failed; later `then` calls report the same failure
    Failed(GwtError),
}

type CallHook<R> = Box<dyn FnMut(&R, &mut dyn WriteOnlyTestItems)>;

/// Stage-tracking state machine for one acceptance test.
///
/// `I` is the test infrastructure handed to preconditions and invocations
/// (`()` when there is none); `R` is the result the invocation produces and
/// the assertions are built from.
///
/// # Example
///
/// ```
/// use fluent_gwt::{BoxError, FluentTest, GwtResult, SimplePrecondition, When, WriteOnlyTestItems};
///
/// struct Double(u32);
///
/// impl When<Vec<u32>> for Double {
///     type Request = u32;
///     type Response = u32;
///
///     fn request(&mut self, _: &mut dyn WriteOnlyTestItems, _: &mut Vec<u32>) -> Result<Option<u32>, BoxError> {
///         Ok(Some(self.0))
///     }
///
///     fn response(&mut self, n: u32, _: &mut dyn WriteOnlyTestItems, seen: &mut Vec<u32>) -> Result<Option<u32>, BoxError> {
///         seen.push(n);
///         Ok(Some(n * 2))
///     }
/// }
///
/// fn main() -> GwtResult<()> {
///     let mut test = FluentTest::new(Vec::new());
///     test.given(SimplePrecondition::new("empty history"))?;
///     test.when(Double(21))?;
///     assert_eq!(test.then(|doubled| *doubled)?, 42);
///     test.verify()
/// }
/// ```
pub struct FluentTest<I: 'static, R: 'static> {
    config: FluentConfig,
    stage: Stage,
    registry: PreconditionRegistry<I>,
    invocation: Invocation<I, R>,
    retained: Option<Box<dyn Any>>,
    on_call_result: Option<CallHook<R>>,
    infrastructure: I,
    state: TestState,
    failed: bool,
}

impl<I: 'static, R: 'static> fmt::Debug for FluentTest<I, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let invocation = match self.invocation {
            Invocation::NotInvoked => "not invoked",
            Invocation::Attempted => "attempted",
            Invocation::Deferred(_) => "deferred",
            Invocation::Completed(_) => "completed",
            Invocation::Failed(_) => "failed",
        };
        f.debug_struct("FluentTest")
            .field("stage", &self.stage)
            .field("config", &self.config)
            .field("preconditions", &self.registry)
            .field("invocation", &invocation)
            .field("failed", &self.failed)
            .finish()
    }
}

impl<R: 'static> Default for FluentTest<(), R> {
    fn default() -> Self {
        Self::new(())
    }
}

impl<I: 'static, R: 'static> FluentTest<I, R> {
    /// Create a test with the default policies
    #[must_use]
    pub fn new(infrastructure: I) -> Self {
        Self::with_config(FluentConfig::default(), infrastructure)
    }

    /// Create a test with explicit policies
    #[must_use]
    pub fn with_config(config: FluentConfig, infrastructure: I) -> Self {
        Self {
            config,
            stage: Stage::Given,
            registry: PreconditionRegistry::new(config.priming, config.duplicates),
            invocation: Invocation::NotInvoked,
            retained: None,
            on_call_result: None,
            infrastructure,
            state: TestState::new(),
            failed: false,
        }
    }

    /// Run `hook` once with the result of an object-style call, right after
    /// the first `then` performs it.
    #[must_use]
    pub fn on_call_result<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&R, &mut dyn WriteOnlyTestItems) + 'static,
    {
        self.on_call_result = Some(Box::new(hook));
        self
    }

    // =========================================================================
    // GIVEN
    // =========================================================================

    /// Register a precondition.
    ///
    /// Returns the registered precondition so it can be configured further.
    /// Under deferred priming that configuration is what gets primed; under
    /// immediate priming it has already been primed.
    ///
    /// # Errors
    ///
    /// - [`ProtocolViolation::GivenAfterWhen`] once the `when` has happened
    /// - [`GwtError::DuplicatePrecondition`] for a second precondition of the same kind
    /// - the priming failure of whichever precondition was primed
    pub fn given<P>(&mut self, precondition: P) -> GwtResult<&mut P>
    where
        P: Precondition<I>,
    {
        let index = self.register_given(precondition)?;
        self.registry
            .get_mut::<P>(index)
            .ok_or_else(|| missing_step::<P>())
    }

    /// Same as [`given`](Self::given), for every given after the first.
    pub fn and<P>(&mut self, precondition: P) -> GwtResult<&mut P>
    where
        P: Precondition<I>,
    {
        self.given(precondition)
    }

    /// Register a side-effecting invocation as a precondition.
    ///
    /// Priming runs its whole request/response cycle and discards the
    /// response.
    pub fn given_invocation<W>(&mut self, when: W) -> GwtResult<&mut W>
    where
        W: When<I> + 'static,
    {
        let index = self.register_given(InvocationPrecondition::new(when))?;
        self.registry
            .get_mut::<InvocationPrecondition<W>>(index)
            .map(InvocationPrecondition::invocation_mut)
            .ok_or_else(|| missing_step::<W>())
    }

    /// Same as [`given_invocation`](Self::given_invocation), after the first given.
    pub fn and_invocation<W>(&mut self, when: W) -> GwtResult<&mut W>
    where
        W: When<I> + 'static,
    {
        self.given_invocation(when)
    }

    fn register_given<P>(&mut self, precondition: P) -> GwtResult<usize>
    where
        P: Precondition<I>,
    {
        if self.invocation_consumed() {
            return Err(self.fail(GwtError::protocol(ProtocolViolation::GivenAfterWhen)));
        }
        let registered =
            self.registry
                .register(precondition, &mut self.state, &mut self.infrastructure);
        self.track(registered)
    }

    // =========================================================================
    // WHEN
    // =========================================================================

    /// Invoke the system under test and store the response for the
    /// assertions.
    ///
    /// Any precondition still waiting under deferred priming is primed
    /// first.
    ///
    /// # Errors
    ///
    /// - [`ProtocolViolation::SecondWhen`] once any `when` has been attempted,
    ///   including one that failed
    /// - [`GwtError::NullRequest`] / [`GwtError::NullResponse`] for absent values
    /// - [`GwtError::SystemUnderTest`] if either step raised
    pub fn when<W>(&mut self, mut when: W) -> GwtResult<()>
    where
        W: When<I, Response = R>,
    {
        self.begin_when()?;
        tracing::debug!(invocation = %when.name(), "invoking system under test");
        let invoked = invoke_when(&mut when, &mut self.state, &mut self.infrastructure);
        let response = self.track(invoked)?;
        self.invocation = Invocation::Completed(response);
        self.advance(Stage::When);
        Ok(())
    }

    /// Stage an object-style system under test.
    ///
    /// The returned system can be configured further; it is called by the
    /// first [`then`](Self::then).
    pub fn when_system<S>(&mut self, system: S) -> GwtResult<&mut S>
    where
        S: SystemUnderTest<I, Output = R>,
    {
        self.begin_when()?;
        self.stage_system(system)
    }

    /// Build an object-style system under test from the infrastructure and
    /// stage it, as [`when_system`](Self::when_system).
    pub fn when_with<S, F>(&mut self, factory: F) -> GwtResult<&mut S>
    where
        S: SystemUnderTest<I, Output = R>,
        F: FnOnce(&mut I) -> S,
    {
        self.begin_when()?;
        let system = factory(&mut self.infrastructure);
        self.stage_system(system)
    }

    fn begin_when(&mut self) -> GwtResult<()> {
        if self.invocation_consumed() {
            return Err(self.fail(GwtError::protocol(ProtocolViolation::SecondWhen)));
        }
        self.invocation = Invocation::Attempted;
        let flushed = self.registry.flush(&mut self.state, &mut self.infrastructure);
        self.track(flushed)
    }

    fn stage_system<S>(&mut self, system: S) -> GwtResult<&mut S>
    where
        S: SystemUnderTest<I, Output = R>,
    {
        tracing::debug!(invocation = %system.name(), "staged system under test");
        self.invocation = Invocation::Deferred(Box::new(system));
        self.advance(Stage::When);
        match &mut self.invocation {
            Invocation::Deferred(staged) => staged.as_mut().as_any_mut().downcast_mut::<S>(),
            _ => None,
        }
        .ok_or_else(|| missing_step::<S>())
    }

    // =========================================================================
    // THEN
    // =========================================================================

    /// Build the first assertions from the stored result.
    ///
    /// Performs a staged object-style call first.
    ///
    /// # Errors
    ///
    /// - [`ProtocolViolation::ThenBeforeWhen`] before the `when`
    /// - [`ProtocolViolation::ThenInsteadOfAnd`] on a repeated `then` under [`ThenPolicy::Strict`]
    /// - [`GwtError::SystemUnderTest`] / [`GwtError::NullResult`] from a staged call
    pub fn then<'a, T, F>(&'a mut self, factory: F) -> GwtResult<T>
    where
        F: FnOnce(&'a R) -> T,
    {
        self.enter_then()?;
        let result = self.stored_result()?;
        Ok(factory(result))
    }

    /// Build further assertions from the stored result.
    ///
    /// # Errors
    ///
    /// [`ProtocolViolation::AndBeforeThen`] unless a `then` came first.
    pub fn and_then<'a, T, F>(&'a mut self, factory: F) -> GwtResult<T>
    where
        F: FnOnce(&'a R) -> T,
    {
        if self.stage != Stage::Then {
            return Err(self.fail(GwtError::protocol(ProtocolViolation::AndBeforeThen)));
        }
        let result = self.stored_result()?;
        Ok(factory(result))
    }

    /// Like [`then`](Self::then), but keeps the assertions so later steps
    /// can fetch them with [`and_retained`](Self::and_retained).
    pub fn then_retained<T, F>(&mut self, factory: F) -> GwtResult<&mut T>
    where
        T: 'static,
        F: FnOnce(&R) -> T,
    {
        self.enter_then()?;
        let assertions = factory(self.stored_result()?);
        self.retained = Some(Box::new(assertions));
        self.retained_mut::<T>()
    }

    /// Fetch the assertions kept by [`then_retained`](Self::then_retained).
    ///
    /// # Errors
    ///
    /// [`ProtocolViolation::AndBeforeThen`] unless a `then` came first.
    pub fn and_retained<T>(&mut self) -> GwtResult<&mut T>
    where
        T: 'static,
    {
        if self.stage != Stage::Then {
            return Err(self.fail(GwtError::protocol(ProtocolViolation::AndBeforeThen)));
        }
        self.retained_mut::<T>()
    }

    fn enter_then(&mut self) -> GwtResult<()> {
        match self.stage {
            Stage::Given => {
                return Err(self.fail(GwtError::protocol(ProtocolViolation::ThenBeforeWhen)));
            }
            Stage::Then if self.config.then_policy == ThenPolicy::Strict => {
                return Err(self.fail(GwtError::protocol(ProtocolViolation::ThenInsteadOfAnd)));
            }
            Stage::When | Stage::Then => {}
        }
        let called = self
            .complete_deferred_call()
            .and_then(|()| self.stored_result().map(|_| ()));
        self.track(called)?;
        self.advance(Stage::Then);
        Ok(())
    }

    fn complete_deferred_call(&mut self) -> GwtResult<()> {
        let mut system = match std::mem::replace(&mut self.invocation, Invocation::Attempted) {
            Invocation::Deferred(system) => system,
            Invocation::Failed(err) => {
                let replayed = err.replay();
                self.invocation = Invocation::Failed(err);
                return Err(replayed);
            }
            other => {
                self.invocation = other;
                return Ok(());
            }
        };

        tracing::debug!(invocation = %system.name(), "calling system under test");
        match call_system(&mut *system, &mut self.state, &mut self.infrastructure) {
            Ok(result) => {
                if let Some(hook) = self.on_call_result.as_mut() {
                    hook(&result, &mut self.state);
                }
                self.invocation = Invocation::Completed(result);
                Ok(())
            }
            Err(err) => {
                self.invocation = Invocation::Failed(err.replay());
                Err(err)
            }
        }
    }

    fn stored_result(&self) -> GwtResult<&R> {
        self.result().ok_or_else(|| GwtError::InvalidState {
            message: "no result stored for the assertions".to_string(),
        })
    }

    fn retained_mut<T: 'static>(&mut self) -> GwtResult<&mut T> {
        self.retained
            .as_mut()
            .and_then(|assertions| assertions.downcast_mut::<T>())
            .ok_or_else(|| GwtError::InvalidState {
                message: format!(
                    "no retained assertions of type '{}'",
                    short_type_name(std::any::type_name::<T>())
                ),
            })
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// End-of-test completeness check.
    ///
    /// The host runner calls this after a test body that succeeded, and
    /// must skip it when the body already failed.
    ///
    /// # Errors
    ///
    /// [`GwtError::IncompleteProtocol`] unless the test reached THEN.
    pub fn verify(&self) -> GwtResult<()> {
        if self.stage.is_terminal() {
            return Ok(());
        }
        tracing::warn!(stage = %self.stage, "test ended before reaching THEN");
        Err(GwtError::IncompleteProtocol { stage: self.stage })
    }

    /// Verify completeness and hand back what was recorded.
    pub fn finish(self) -> GwtResult<TestState> {
        self.verify()?;
        Ok(self.state)
    }

    /// Wrap in a guard that verifies completeness when dropped
    #[must_use]
    pub fn scoped(self) -> FluentScope<I, R> {
        FluentScope { test: self }
    }

    // =========================================================================
    // Recording
    // =========================================================================

    /// Record a named fact about the preconditions.
    pub fn add_to_givens<V: Serialize>(&mut self, key: &str, value: V) -> GwtResult<()> {
        let value = serde_json::to_value(value).map_err(GwtError::from);
        let value = self.track(value)?;
        self.state.add_to_givens(key, value);
        Ok(())
    }

    /// Record a named input or output of the system under test.
    pub fn add_to_captured_inputs_and_outputs<V: Serialize>(
        &mut self,
        key: &str,
        value: V,
    ) -> GwtResult<()> {
        let value = serde_json::to_value(value).map_err(GwtError::from);
        let value = self.track(value)?;
        self.state.add_to_captured_inputs_and_outputs(key, value);
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current stage
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Active policies
    #[must_use]
    pub const fn config(&self) -> &FluentConfig {
        &self.config
    }

    /// Stored result, once the invocation has produced one
    #[must_use]
    pub const fn result(&self) -> Option<&R> {
        match &self.invocation {
            Invocation::Completed(result) => Some(result),
            Invocation::NotInvoked
            | Invocation::Attempted
            | Invocation::Deferred(_)
            | Invocation::Failed(_) => None,
        }
    }

    /// Registered preconditions
    #[must_use]
    pub const fn preconditions(&self) -> &PreconditionRegistry<I> {
        &self.registry
    }

    /// Test infrastructure
    #[must_use]
    pub const fn infrastructure(&self) -> &I {
        &self.infrastructure
    }

    /// Mutable test infrastructure
    pub fn infrastructure_mut(&mut self) -> &mut I {
        &mut self.infrastructure
    }

    /// Recorded givens and captured inputs/outputs
    #[must_use]
    pub const fn test_state(&self) -> &TestState {
        &self.state
    }

    /// Take the recorded state without verifying completeness
    #[must_use]
    pub fn into_test_state(self) -> TestState {
        self.state
    }

    /// Whether any step has returned an error
    #[must_use]
    pub const fn has_failed(&self) -> bool {
        self.failed
    }

    /// Whether a `when` has passed its guard, successfully or not
    const fn invocation_consumed(&self) -> bool {
        !matches!(self.invocation, Invocation::NotInvoked)
    }

    fn advance(&mut self, next: Stage) {
        if self.stage != next {
            tracing::debug!(from = %self.stage, to = %next, "stage transition");
        }
        self.stage = next;
    }

    fn fail(&mut self, err: GwtError) -> GwtError {
        self.failed = true;
        tracing::debug!(stage = %self.stage, error = %err, "step failed");
        err
    }

    fn track<T>(&mut self, result: GwtResult<T>) -> GwtResult<T> {
        result.map_err(|err| self.fail(err))
    }
}

fn missing_step<T: ?Sized>() -> GwtError {
    GwtError::InvalidState {
        message: format!(
            "registered step '{}' could not be retrieved",
            short_type_name(std::any::type_name::<T>())
        ),
    }
}

/// Guard that runs the completeness check when it goes out of scope.
///
/// Dropping panics with [`GwtError::IncompleteProtocol`] if the test never
/// reached THEN, unless a step already returned an error or the thread is
/// already panicking, so the original failure is never masked.
pub struct FluentScope<I: 'static, R: 'static> {
    test: FluentTest<I, R>,
}

impl<I: 'static, R: 'static> fmt::Debug for FluentScope<I, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FluentScope").field("test", &self.test).finish()
    }
}

impl<I: 'static, R: 'static> Deref for FluentScope<I, R> {
    type Target = FluentTest<I, R>;

    fn deref(&self) -> &Self::Target {
        &self.test
    }
}

impl<I: 'static, R: 'static> DerefMut for FluentScope<I, R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.test
    }
}

impl<I: 'static, R: 'static> Drop for FluentScope<I, R> {
    fn drop(&mut self) {
        if std::thread::panicking() || self.test.has_failed() {
            return;
        }
        if let Err(err) = self.test.verify() {
            panic!("{err}");
        }
    }
}
