//! Recording of interesting givens and captured inputs/outputs.
//!
//! The documentation layer that renders these is external; the orchestrator
//! only forwards named values to it and never inspects them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Records a named fact about the preconditions of a test
pub trait InterestingGivensRecorder {
    /// Add a named given
    fn add_to_givens(&mut self, key: &str, value: Value);
}

/// Records a named input sent to, or output received from, a system
pub trait CapturedInputsRecorder {
    /// Add a named captured input or output
    fn add_to_captured_inputs_and_outputs(&mut self, key: &str, value: Value);
}

/// Write-only view over both recorders, handed to invocations and hooks.
pub trait WriteOnlyTestItems: InterestingGivensRecorder + CapturedInputsRecorder {}

impl<T: InterestingGivensRecorder + CapturedInputsRecorder + ?Sized> WriteOnlyTestItems for T {}

/// One recorded key/value pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedItem {
    /// Name the value was recorded under
    pub key: String,
    /// Recorded value
    pub value: Value,
}

/// In-memory recording state for one test execution.
///
/// Both collections keep insertion order. Keys may repeat; lookups return
/// the first match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestState {
    /// Facts about the preconditions
    pub interesting_givens: Vec<RecordedItem>,
    /// Inputs and outputs captured while the system under test ran
    pub captured_inputs_and_outputs: Vec<RecordedItem>,
}

impl TestState {
    /// Create an empty state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// First given recorded under `key`
    #[must_use]
    pub fn given(&self, key: &str) -> Option<&Value> {
        find(&self.interesting_givens, key)
    }

    /// First captured input/output recorded under `key`
    #[must_use]
    pub fn captured(&self, key: &str) -> Option<&Value> {
        find(&self.captured_inputs_and_outputs, key)
    }

    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interesting_givens.is_empty() && self.captured_inputs_and_outputs.is_empty()
    }

    /// Export as pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn find<'a>(items: &'a [RecordedItem], key: &str) -> Option<&'a Value> {
    items.iter().find(|item| item.key == key).map(|item| &item.value)
}

impl InterestingGivensRecorder for TestState {
    fn add_to_givens(&mut self, key: &str, value: Value) {
        self.interesting_givens.push(RecordedItem {
            key: key.to_string(),
            value,
        });
    }
}

impl CapturedInputsRecorder for TestState {
    fn add_to_captured_inputs_and_outputs(&mut self, key: &str, value: Value) {
        self.captured_inputs_and_outputs.push(RecordedItem {
            key: key.to_string(),
            value,
        });
    }
}
