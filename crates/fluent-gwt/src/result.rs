//! Result and error types for fluent-gwt.
//!
//! Every variant is a test-authoring defect or a failure raised by the
//! system under test. None of them are recovered internally: they surface
//! to the host runner as test failures.

use crate::stage::Stage;
use std::fmt;
use thiserror::Error;

/// Boxed error returned by user-supplied capabilities (`prime`, `request`,
/// `response`, `call`).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for fluent-gwt operations
pub type GwtResult<T> = Result<T, GwtError>;

/// A fluent call made in the wrong stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolViolation {
    /// `given`/`and` after the `when`
    GivenAfterWhen,
    /// A second `when`, or a `when` after the `then`
    SecondWhen,
    /// `then` before any `when`
    ThenBeforeWhen,
    /// `then` used where `and` was expected
    ThenInsteadOfAnd,
    /// then-phase `and` before the first `then`
    AndBeforeThen,
}

impl ProtocolViolation {
    /// Human readable description naming the offending step
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::GivenAfterWhen => {
                "The 'given' steps must be specified before the 'when' and 'then' steps"
            }
            Self::SecondWhen => {
                "There should only be one 'when', after the 'given' and before the 'then'"
            }
            Self::ThenBeforeWhen => "The initial 'then' should be after the 'when'",
            Self::ThenInsteadOfAnd => "After the first 'then' you should use 'and'",
            Self::AndBeforeThen => {
                "The first 'then' should be a 'then' and after that you should use 'and'"
            }
        }
    }
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Errors that can occur while driving a Given/When/Then test
#[derive(Debug, Error)]
pub enum GwtError {
    /// A fluent call occurred in the wrong stage
    #[error("{violation}")]
    ProtocolOrder {
        /// Which ordering rule was broken
        violation: ProtocolViolation,
    },

    /// The same precondition kind was registered twice in one test
    #[error("The dependency '{name}' has already specified a 'given' step")]
    DuplicatePrecondition {
        /// Display name of the precondition kind
        name: String,
    },

    /// A request/response invocation produced no request
    #[error("'{invocation}' request was absent")]
    NullRequest {
        /// Display name of the invocation
        invocation: String,
    },

    /// A request/response invocation produced no response
    #[error("'{invocation}' response was absent")]
    NullResponse {
        /// Display name of the invocation
        invocation: String,
    },

    /// An object-style system under test produced no result
    #[error("'{invocation}' result was absent")]
    NullResult {
        /// Display name of the system under test
        invocation: String,
    },

    /// The system under test raised while being invoked
    #[error("'{invocation}' failed: {source}")]
    SystemUnderTest {
        /// Display name of the invocation
        invocation: String,
        /// Original failure
        #[source]
        source: BoxError,
    },

    /// A precondition failed to prime its fixtures
    #[error("The dependency '{precondition}' failed to prime: {source}")]
    PrimingFailed {
        /// Display name of the precondition
        precondition: String,
        /// Original failure
        #[source]
        source: BoxError,
    },

    /// The test ended before reaching the terminal stage
    #[error("Each test needs at least a 'when' and a 'then' (stopped at {stage})")]
    IncompleteProtocol {
        /// Stage the test stopped at
        stage: Stage,
    },

    /// Invalid internal state (should not happen)
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Error message
        message: String,
    },

    /// A recorded value could not be serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GwtError {
    pub(crate) const fn protocol(violation: ProtocolViolation) -> Self {
        Self::ProtocolOrder { violation }
    }

    /// Same variant again, with boxed sources reduced to their message.
    pub(crate) fn replay(&self) -> Self {
        match self {
            Self::ProtocolOrder { violation } => Self::protocol(*violation),
            Self::DuplicatePrecondition { name } => Self::DuplicatePrecondition {
                name: name.clone(),
            },
            Self::NullRequest { invocation } => Self::NullRequest {
                invocation: invocation.clone(),
            },
            Self::NullResponse { invocation } => Self::NullResponse {
                invocation: invocation.clone(),
            },
            Self::NullResult { invocation } => Self::NullResult {
                invocation: invocation.clone(),
            },
            Self::SystemUnderTest { invocation, source } => Self::SystemUnderTest {
                invocation: invocation.clone(),
                source: source.to_string().into(),
            },
            Self::PrimingFailed {
                precondition,
                source,
            } => Self::PrimingFailed {
                precondition: precondition.clone(),
                source: source.to_string().into(),
            },
            Self::IncompleteProtocol { stage } => Self::IncompleteProtocol { stage: *stage },
            Self::InvalidState { message } => Self::InvalidState {
                message: message.clone(),
            },
            Self::Json(err) => Self::InvalidState {
                message: err.to_string(),
            },
        }
    }

    /// The broken ordering rule, if this is a protocol-order failure
    #[must_use]
    pub const fn violation(&self) -> Option<ProtocolViolation> {
        match self {
            Self::ProtocolOrder { violation } => Some(*violation),
            _ => None,
        }
    }

    /// Whether the error indicates a defect in the test rather than in the
    /// system under test
    #[must_use]
    pub const fn is_authoring_defect(&self) -> bool {
        !matches!(
            self,
            Self::SystemUnderTest { .. } | Self::PrimingFailed { .. } | Self::Json(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn protocol_order_displays_violation_message() {
        let err = GwtError::protocol(ProtocolViolation::ThenInsteadOfAnd);
        assert_eq!(err.to_string(), "After the first 'then' you should use 'and'");
        assert_eq!(err.violation(), Some(ProtocolViolation::ThenInsteadOfAnd));
    }

    #[test]
    fn duplicate_precondition_names_the_dependency() {
        let err = GwtError::DuplicatePrecondition {
            name: "StubWeatherProvider".to_string(),
        };
        assert!(err.to_string().contains("'StubWeatherProvider'"));
        assert!(err.violation().is_none());
    }

    #[test]
    fn system_under_test_keeps_source() {
        let err = GwtError::SystemUnderTest {
            invocation: "RequestWeather".to_string(),
            source: "connection refused".into(),
        };
        assert_eq!(err.to_string(), "'RequestWeather' failed: connection refused");
        let source = err.source().expect("source is preserved");
        assert_eq!(source.to_string(), "connection refused");
        assert!(!err.is_authoring_defect());
    }

    #[test]
    fn replay_keeps_variant_and_message() {
        let err = GwtError::SystemUnderTest {
            invocation: "RequestWeather".to_string(),
            source: "connection refused".into(),
        };
        let replayed = err.replay();
        assert!(matches!(
            replayed,
            GwtError::SystemUnderTest { ref invocation, .. } if invocation == "RequestWeather"
        ));
        assert_eq!(replayed.to_string(), err.to_string());

        let absent = GwtError::NullResult {
            invocation: "WeatherService".to_string(),
        };
        assert_eq!(absent.replay().to_string(), "'WeatherService' result was absent");
    }

    #[test]
    fn incomplete_protocol_names_stage() {
        let err = GwtError::IncompleteProtocol { stage: Stage::When };
        assert!(err.to_string().contains("stopped at WHEN"));
        assert!(err.is_authoring_defect());
    }

    #[test]
    fn every_violation_has_distinct_message() {
        let all = [
            ProtocolViolation::GivenAfterWhen,
            ProtocolViolation::SecondWhen,
            ProtocolViolation::ThenBeforeWhen,
            ProtocolViolation::ThenInsteadOfAnd,
            ProtocolViolation::AndBeforeThen,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.message(), b.message());
            }
        }
    }
}
