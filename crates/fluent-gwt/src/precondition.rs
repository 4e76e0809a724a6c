//! Preconditions: the "given" steps of a test.
//!
//! A precondition primes fixtures (stubs, mocks, seeded data) before the
//! system under test is invoked. Each carries a [`PreconditionKind`] so the
//! registry can reject a second precondition of the same kind.

use crate::invocation::{invoke_when, When};
use crate::recording::WriteOnlyTestItems;
use crate::result::BoxError;
use std::any::{Any, TypeId};
use std::fmt;

/// Upcast to [`Any`] so registered steps can be handed back by concrete type.
pub trait AsAny: Any {
    /// Mutable `Any` view of `self`
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Identity used for duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PreconditionKind {
    /// One kind per implementing type
    Type {
        /// Stable identifier of the type
        id: TypeId,
        /// Full type name
        name: &'static str,
    },
    /// Explicit tag
    Named(String),
}

impl PreconditionKind {
    /// Kind derived from a type
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::Type {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Kind from an explicit tag
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Name shown in failures, with module paths stripped
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Type { name, .. } => short_type_name(name),
            Self::Named(name) => name.clone(),
        }
    }
}

impl fmt::Display for PreconditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// Strip module paths from a type name, including inside generic arguments.
///
/// `my_tests::weather::Stub<alloc::string::String>` becomes `Stub<String>`.
#[must_use]
pub fn short_type_name(full: &str) -> String {
    full.split_inclusive(|c: char| {
        matches!(c, '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | '&' | ';')
    })
    .map(|piece| piece.rsplit("::").next().unwrap_or(piece))
    .collect()
}

/// A "given" step.
///
/// `prime` runs once per test, either as soon as the precondition is
/// registered or one step later under
/// [`PrimingPolicy::Deferred`](crate::PrimingPolicy::Deferred).
///
/// # Example
///
/// ```
/// use fluent_gwt::{BoxError, Precondition, WriteOnlyTestItems};
/// use std::collections::HashMap;
///
/// #[derive(Default)]
/// struct StubCity {
///     city: String,
/// }
///
/// impl StubCity {
///     fn named(&mut self, city: &str) -> &mut Self {
///         self.city = city.to_string();
///         self
///     }
/// }
///
/// impl Precondition<HashMap<String, bool>> for StubCity {
///     fn prime(
///         &mut self,
///         items: &mut dyn WriteOnlyTestItems,
///         known: &mut HashMap<String, bool>,
///     ) -> Result<(), BoxError> {
///         items.add_to_givens("City", self.city.clone().into());
///         known.insert(self.city.clone(), true);
///         Ok(())
///     }
/// }
/// ```
pub trait Precondition<I>: AsAny {
    /// Apply this precondition to the test fixtures.
    ///
    /// # Errors
    ///
    /// Any error is reported as a priming failure naming this precondition.
    fn prime(
        &mut self,
        items: &mut dyn WriteOnlyTestItems,
        infrastructure: &mut I,
    ) -> Result<(), BoxError>;

    /// Duplicate-detection identity; one per implementing type by default
    fn kind(&self) -> PreconditionKind {
        PreconditionKind::of::<Self>()
    }

    /// Name shown in failures and logs
    fn name(&self) -> String {
        self.kind().display_name()
    }
}

type PrimeFn<I> = Box<dyn FnMut(&mut dyn WriteOnlyTestItems, &mut I) -> Result<(), BoxError>>;

/// A precondition built from a closure.
///
/// Its kind is its name, so several closures with different names can be
/// registered in the same test.
pub struct SimplePrecondition<I> {
    name: String,
    prime_fn: Option<PrimeFn<I>>,
}

impl<I> fmt::Debug for SimplePrecondition<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimplePrecondition")
            .field("name", &self.name)
            .field("has_prime", &self.prime_fn.is_some())
            .finish()
    }
}

impl<I> SimplePrecondition<I> {
    /// Create a precondition that does nothing when primed
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prime_fn: None,
        }
    }

    /// Set the priming function
    #[must_use]
    pub fn with_prime<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut dyn WriteOnlyTestItems, &mut I) -> Result<(), BoxError> + 'static,
    {
        self.prime_fn = Some(Box::new(f));
        self
    }
}

impl<I: 'static> Precondition<I> for SimplePrecondition<I> {
    fn prime(
        &mut self,
        items: &mut dyn WriteOnlyTestItems,
        infrastructure: &mut I,
    ) -> Result<(), BoxError> {
        match &mut self.prime_fn {
            Some(f) => f(items, infrastructure),
            None => Ok(()),
        }
    }

    fn kind(&self) -> PreconditionKind {
        PreconditionKind::named(self.name.clone())
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Runs a side-effecting invocation as a "given" step.
///
/// Priming performs the full request/response cycle and discards the
/// response, e.g. to create state that the real `when` then reads.
#[derive(Debug)]
pub struct InvocationPrecondition<W> {
    invocation: W,
}

impl<W> InvocationPrecondition<W> {
    /// Wrap an invocation
    #[must_use]
    pub const fn new(invocation: W) -> Self {
        Self { invocation }
    }

    /// The wrapped invocation
    #[must_use]
    pub const fn invocation(&self) -> &W {
        &self.invocation
    }

    /// The wrapped invocation, for further configuration
    pub fn invocation_mut(&mut self) -> &mut W {
        &mut self.invocation
    }
}

impl<I, W> Precondition<I> for InvocationPrecondition<W>
where
    W: When<I> + 'static,
{
    fn prime(
        &mut self,
        items: &mut dyn WriteOnlyTestItems,
        infrastructure: &mut I,
    ) -> Result<(), BoxError> {
        invoke_when(&mut self.invocation, items, infrastructure)?;
        Ok(())
    }

    fn name(&self) -> String {
        self.invocation.name()
    }
}
