//! Invocations: the "when" step of a test.
//!
//! Two shapes are supported:
//!
//! - [`When`]: build a request, then execute it to get a response. Runs
//!   as soon as it is registered.
//! - [`SystemUnderTest`]: an object constructed at `when`, configured by
//!   the caller, and called lazily by the first `then`.

use crate::precondition::{short_type_name, AsAny};
use crate::recording::WriteOnlyTestItems;
use crate::result::{BoxError, GwtError, GwtResult};

/// Request/response invocation.
///
/// Returning `Ok(None)` from either step is a test defect and fails the
/// `when`. Invocations with nothing to build up front can use
/// `type Request = ()` and return `Ok(Some(()))`.
pub trait When<I> {
    /// Request handed from [`When::request`] to [`When::response`]
    type Request;
    /// Value stored for the assertions
    type Response;

    /// Build the request.
    fn request(
        &mut self,
        items: &mut dyn WriteOnlyTestItems,
        infrastructure: &mut I,
    ) -> Result<Option<Self::Request>, BoxError>;

    /// Execute the request against the system under test.
    fn response(
        &mut self,
        request: Self::Request,
        items: &mut dyn WriteOnlyTestItems,
        infrastructure: &mut I,
    ) -> Result<Option<Self::Response>, BoxError>;

    /// Name shown in failures and logs
    fn name(&self) -> String {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// Object-style system under test, called once by the first `then`.
pub trait SystemUnderTest<I>: AsAny {
    /// Value stored for the assertions
    type Output;

    /// Invoke the system.
    fn call(
        &mut self,
        items: &mut dyn WriteOnlyTestItems,
        infrastructure: &mut I,
    ) -> Result<Option<Self::Output>, BoxError>;

    /// Name shown in failures and logs
    fn name(&self) -> String {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// Run a full request/response cycle.
///
/// The response step is not reached when no request was produced.
pub(crate) fn invoke_when<I, W>(
    when: &mut W,
    items: &mut dyn WriteOnlyTestItems,
    infrastructure: &mut I,
) -> GwtResult<W::Response>
where
    W: When<I> + ?Sized,
{
    let invocation = when.name();
    let request = when
        .request(items, infrastructure)
        .map_err(|source| GwtError::SystemUnderTest {
            invocation: invocation.clone(),
            source,
        })?
        .ok_or_else(|| GwtError::NullRequest {
            invocation: invocation.clone(),
        })?;

    when.response(request, items, infrastructure)
        .map_err(|source| GwtError::SystemUnderTest {
            invocation: invocation.clone(),
            source,
        })?
        .ok_or(GwtError::NullResponse { invocation })
}

/// Call an object-style system under test.
pub(crate) fn call_system<I, S>(
    system: &mut S,
    items: &mut dyn WriteOnlyTestItems,
    infrastructure: &mut I,
) -> GwtResult<S::Output>
where
    S: SystemUnderTest<I> + ?Sized,
{
    let invocation = system.name();
    system
        .call(items, infrastructure)
        .map_err(|source| GwtError::SystemUnderTest {
            invocation: invocation.clone(),
            source,
        })?
        .ok_or(GwtError::NullResult { invocation })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::TestState;
    use serde_json::json;

    /// Scripted invocation; `None` fields produce absent values.
    struct Scripted {
        request: Option<u32>,
        response: Option<u32>,
        fail_response: bool,
        response_calls: usize,
    }

    impl Scripted {
        fn ok() -> Self {
            Self {
                request: Some(2),
                response: Some(4),
                fail_response: false,
                response_calls: 0,
            }
        }
    }

    impl When<()> for Scripted {
        type Request = u32;
        type Response = u32;

        fn request(
            &mut self,
            items: &mut dyn WriteOnlyTestItems,
            _: &mut (),
        ) -> Result<Option<u32>, BoxError> {
            items.add_to_captured_inputs_and_outputs("Request", json!(self.request));
            Ok(self.request)
        }

        fn response(
            &mut self,
            _: u32,
            _: &mut dyn WriteOnlyTestItems,
            _: &mut (),
        ) -> Result<Option<u32>, BoxError> {
            self.response_calls += 1;
            if self.fail_response {
                return Err("backend unavailable".into());
            }
            Ok(self.response)
        }
    }

    struct Echo(Option<&'static str>);

    impl SystemUnderTest<()> for Echo {
        type Output = &'static str;

        fn call(
            &mut self,
            _: &mut dyn WriteOnlyTestItems,
            _: &mut (),
        ) -> Result<Option<&'static str>, BoxError> {
            Ok(self.0)
        }

        fn name(&self) -> String {
            "echo service".to_string()
        }
    }

    #[test]
    fn invoke_returns_response_and_records() {
        let mut state = TestState::new();
        let mut when = Scripted::ok();
        let response = invoke_when(&mut when, &mut state, &mut ()).unwrap();
        assert_eq!(response, 4);
        assert_eq!(state.captured("Request"), Some(&json!(2)));
    }

    #[test]
    fn absent_request_skips_response() {
        let mut when = Scripted {
            request: None,
            ..Scripted::ok()
        };
        let err = invoke_when(&mut when, &mut TestState::new(), &mut ()).unwrap_err();
        assert!(matches!(err, GwtError::NullRequest { ref invocation } if invocation == "Scripted"));
        assert_eq!(when.response_calls, 0);
    }

    #[test]
    fn absent_response_fails() {
        let mut when = Scripted {
            response: None,
            ..Scripted::ok()
        };
        let err = invoke_when(&mut when, &mut TestState::new(), &mut ()).unwrap_err();
        assert!(matches!(err, GwtError::NullResponse { .. }));
    }

    #[test]
    fn response_error_is_wrapped_with_name() {
        let mut when = Scripted {
            fail_response: true,
            ..Scripted::ok()
        };
        let err = invoke_when(&mut when, &mut TestState::new(), &mut ()).unwrap_err();
        assert_eq!(err.to_string(), "'Scripted' failed: backend unavailable");
    }

    #[test]
    fn call_system_uses_custom_name() {
        let mut state = TestState::new();
        assert_eq!(call_system(&mut Echo(Some("hi")), &mut state, &mut ()).unwrap(), "hi");

        let err = call_system(&mut Echo(None), &mut state, &mut ()).unwrap_err();
        assert_eq!(err.to_string(), "'echo service' result was absent");
    }
}
