//! Scenario runner.
//!
//! Plays the part of the host test runner: runs a scenario body against a
//! [`FluentTest`], performs the completeness check only when the body
//! succeeded, and reports the outcome together with everything the test
//! recorded.

use crate::fluent::FluentTest;
use crate::recording::TestState;
use crate::result::{BoxError, GwtResult};
use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// Outcome of one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario name
    pub name: String,
    /// Whether the scenario passed
    pub passed: bool,
    /// Failure message if it did not
    pub error: Option<String>,
    /// Stage the test stopped at
    pub stage: Stage,
    /// Time spent in the body and the completeness check
    pub duration: Duration,
    /// Recorded givens and captured inputs/outputs
    pub test_state: TestState,
}

/// Run one scenario.
///
/// The body may fail by returning an error or by panicking (for example
/// from an `assert!` inside an assertion factory). Either way the
/// completeness check is skipped so it cannot mask the original failure.
/// It is also skipped when a step failed and the body handled the error
/// itself, as [`FluentScope`](crate::FluentScope) does.
pub fn run_scenario<I, R, F>(
    name: impl Into<String>,
    mut test: FluentTest<I, R>,
    body: F,
) -> ScenarioReport
where
    I: 'static,
    R: 'static,
    F: FnOnce(&mut FluentTest<I, R>) -> Result<(), BoxError>,
{
    let name = name.into();
    let start = Instant::now();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&mut test)));
    let error = match outcome {
        Ok(Ok(())) if test.has_failed() => None,
        Ok(Ok(())) => test.verify().err().map(|err| err.to_string()),
        Ok(Err(err)) => Some(err.to_string()),
        Err(payload) => Some(panic_message(payload.as_ref())),
    };

    let duration = start.elapsed();
    let stage = test.stage();
    match &error {
        None => tracing::debug!(scenario = %name, ?duration, "scenario passed"),
        Some(error) => tracing::warn!(scenario = %name, %stage, %error, "scenario failed"),
    }

    ScenarioReport {
        name,
        passed: error.is_none(),
        error,
        stage,
        duration,
        test_state: test.into_test_state(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "scenario panicked".to_string()
    }
}

/// Reports from a group of scenarios
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Suite name
    pub name: String,
    /// Scenario reports in run order
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    /// Create an empty report
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scenarios: Vec::new(),
        }
    }

    /// Run a scenario and keep its report
    pub fn run<I, R, F>(
        &mut self,
        name: impl Into<String>,
        test: FluentTest<I, R>,
        body: F,
    ) -> &ScenarioReport
    where
        I: 'static,
        R: 'static,
        F: FnOnce(&mut FluentTest<I, R>) -> Result<(), BoxError>,
    {
        self.add(run_scenario(name, test, body))
    }

    /// Add a finished report
    pub fn add(&mut self, report: ScenarioReport) -> &ScenarioReport {
        self.scenarios.push(report);
        &self.scenarios[self.scenarios.len() - 1]
    }

    /// Check if all scenarios passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.scenarios.iter().all(|s| s.passed)
    }

    /// Count passed scenarios
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.scenarios.iter().filter(|s| s.passed).count()
    }

    /// Count failed scenarios
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.scenarios.iter().filter(|s| !s.passed).count()
    }

    /// Total scenario count
    #[must_use]
    pub fn total(&self) -> usize {
        self.scenarios.len()
    }

    /// Total time across scenarios
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.scenarios.iter().map(|s| s.duration).sum()
    }

    /// Failed scenarios
    #[must_use]
    pub fn failures(&self) -> Vec<&ScenarioReport> {
        self.scenarios.iter().filter(|s| !s.passed).collect()
    }

    /// One-line summary
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{}: {} passed, {} failed, {} total",
            self.name,
            self.passed_count(),
            self.failed_count(),
            self.total()
        )
    }

    /// Export as pretty JSON
    pub fn to_json(&self) -> GwtResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::invocation::SystemUnderTest;
    use crate::precondition::SimplePrecondition;
    use crate::recording::WriteOnlyTestItems;
    use serde_json::json;

    struct Answer;

    impl SystemUnderTest<()> for Answer {
        type Output = u32;

        fn call(&mut self, items: &mut dyn WriteOnlyTestItems, _: &mut ()) -> Result<Option<u32>, BoxError> {
            items.add_to_captured_inputs_and_outputs("Answer", json!(42));
            Ok(Some(42))
        }
    }

    fn seeded() -> SimplePrecondition<()> {
        SimplePrecondition::new("seeded").with_prime(|items, _| {
            items.add_to_givens("Seed", json!(7));
            Ok(())
        })
    }

    mod run_scenario_tests {
        use super::*;

        #[test]
        fn complete_scenario_passes() {
            let report = run_scenario("answer", FluentTest::new(()), |test| {
                test.given(seeded())?;
                test.when_system(Answer)?;
                test.then(|answer| assert_eq!(*answer, 42))?;
                Ok(())
            });

            assert!(report.passed, "{:?}", report.error);
            assert_eq!(report.stage, Stage::Then);
            assert_eq!(report.test_state.given("Seed"), Some(&json!(7)));
            assert_eq!(report.test_state.captured("Answer"), Some(&json!(42)));
        }

        #[test]
        fn incomplete_scenario_fails_completeness_check() {
            let report = run_scenario("no then", FluentTest::<(), u32>::new(()), |test| {
                test.when_system(Answer)?;
                Ok(())
            });

            assert!(!report.passed);
            assert_eq!(report.stage, Stage::When);
            assert!(report
                .error
                .unwrap()
                .starts_with("Each test needs at least a 'when' and a 'then'"));
        }

        #[test]
        fn body_error_is_reported_instead_of_completeness() {
            let report = run_scenario("early then", FluentTest::<(), u32>::new(()), |test| {
                test.then(|answer| *answer)?;
                Ok(())
            });

            assert_eq!(
                report.error.as_deref(),
                Some("The initial 'then' should be after the 'when'")
            );
        }

        #[test]
        fn handled_step_error_skips_completeness_check() {
            let test = FluentTest::<(), u32>::new(());
            let report = run_scenario("expects early then to fail", test, |test| {
                let err = test.then(|answer| *answer).unwrap_err();
                assert!(err.violation().is_some());
                Ok(())
            });

            assert!(report.passed, "{:?}", report.error);
            assert_eq!(report.stage, Stage::Given);
        }

        #[test]
        fn panicking_assertion_is_reported() {
            let report = run_scenario("wrong answer", FluentTest::new(()), |test| {
                test.when_system(Answer)?;
                test.then(|answer| assert_eq!(*answer, 41, "answer mismatch"))?;
                Ok(())
            });

            assert!(!report.passed);
            assert!(report.error.unwrap().contains("answer mismatch"));
            assert_eq!(report.stage, Stage::Then);
        }
    }

    mod suite_report_tests {
        use super::*;

        fn suite() -> SuiteReport {
            let mut suite = SuiteReport::new("answers");
            suite.run("passes", FluentTest::new(()), |test| {
                test.when_system(Answer)?;
                test.then(|_| ())?;
                Ok(())
            });
            suite.run("fails", FluentTest::<(), u32>::new(()), |_| Ok(()));
            suite
        }

        #[test]
        fn counts_outcomes() {
            let suite = suite();
            assert!(!suite.all_passed());
            assert_eq!(suite.passed_count(), 1);
            assert_eq!(suite.failed_count(), 1);
            assert_eq!(suite.total(), 2);
            assert_eq!(suite.failures()[0].name, "fails");
            assert_eq!(suite.summary(), "answers: 1 passed, 1 failed, 2 total");
        }

        #[test]
        fn empty_suite_passes() {
            let suite = SuiteReport::new("empty");
            assert!(suite.all_passed());
            assert_eq!(suite.total_duration(), Duration::ZERO);
        }

        #[test]
        fn exports_json() {
            let json = suite().to_json().unwrap();
            let back: SuiteReport = serde_json::from_str(&json).unwrap();
            assert_eq!(back.scenarios.len(), 2);
            assert_eq!(back.scenarios[0].stage, Stage::Then);
            assert!(json.contains("\"Answer\""));
        }
    }
}
