//! fluent-gwt: Given/When/Then acceptance tests with a checked call order
//!
//! A test is written as a fluent chain of steps against a [`FluentTest`]:
//! preconditions prime fixtures, one invocation runs the system under
//! test, and assertions are built from its result. The orchestrator
//! tracks the current [`Stage`] and fails any call made out of order.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        FluentTest<I, R>                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  given / and          when                then / and            │
//! │  ┌──────────────┐     ┌──────────────┐    ┌──────────────┐      │
//! │  │ Precondition │────►│ When /       │───►│ assertion    │      │
//! │  │ Registry     │     │ SystemUnder- │    │ factories    │      │
//! │  │ (prime)      │     │ Test (R)     │    │ (&R -> T)    │      │
//! │  └──────────────┘     └──────────────┘    └──────────────┘      │
//! │          │                    │                                  │
//! │          └──────► TestState (givens, captured I/O) ◄─────────── │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use fluent_gwt::prelude::*;
//!
//! struct Greet;
//!
//! impl SystemUnderTest<()> for Greet {
//!     type Output = String;
//!
//!     fn call(&mut self, items: &mut dyn WriteOnlyTestItems, _: &mut ()) -> Result<Option<String>, BoxError> {
//!         items.add_to_captured_inputs_and_outputs("Greeting", "hello".into());
//!         Ok(Some("hello".to_string()))
//!     }
//! }
//!
//! let mut test = FluentTest::new(()).scoped();
//! test.given(SimplePrecondition::new("nobody greeted yet")).unwrap();
//! test.when_system(Greet).unwrap();
//! test.then(|greeting| assert_eq!(greeting, "hello")).unwrap();
//! ```

#![warn(missing_docs)]

mod config;
mod fluent;
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
mod harness;
mod invocation;
#[allow(clippy::missing_errors_doc)]
mod precondition;
mod recording;
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
mod registry;
mod result;
mod stage;

pub use config::{FluentConfig, ThenPolicy};
pub use fluent::{FluentScope, FluentTest};
pub use harness::{run_scenario, ScenarioReport, SuiteReport};
pub use invocation::{SystemUnderTest, When};
pub use precondition::{
    short_type_name, AsAny, InvocationPrecondition, Precondition, PreconditionKind,
    SimplePrecondition,
};
pub use recording::{
    CapturedInputsRecorder, InterestingGivensRecorder, RecordedItem, TestState,
    WriteOnlyTestItems,
};
pub use registry::{DuplicatePolicy, PreconditionRegistry, PrimingPolicy, PrimingState};
pub use result::{BoxError, GwtError, GwtResult, ProtocolViolation};
pub use stage::Stage;

/// Prelude for convenient imports
pub mod prelude {
    pub use super::config::*;
    pub use super::fluent::*;
    pub use super::harness::*;
    pub use super::invocation::*;
    pub use super::precondition::*;
    pub use super::recording::*;
    pub use super::registry::*;
    pub use super::result::*;
    pub use super::stage::*;
}
