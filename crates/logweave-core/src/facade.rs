//! Logging facade for application code
//!
//! [`Logger`] is the call surface handlers use to emit exception, custom
//! message and API-call records. Each call takes a [`CallerContext`] naming
//! the emitting component and operation; the [`caller!`] and [`log_error!`]
//! macros fill it in from the call site, including argument names.
//!
//! [`caller!`]: crate::caller
//! [`log_error!`]: crate::log_error

use crate::context::{EnrichmentContext, RequestContext};
use crate::dispatcher::Dispatcher;
use crate::record::{ErrorReport, ExceptionDetails, LogEvent, LogRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::sync::Arc;

/// Who is logging: component, operation, argument names and request
#[derive(Clone, Debug, Default)]
pub struct CallerContext {
    /// Emitting component (module path)
    pub source: String,
    /// Emitting operation
    pub function: String,
    /// Declared parameter names, when known
    pub parameter_names: Option<Vec<String>>,
    /// Request in scope, overriding the logger's own
    pub request: Option<Arc<RequestContext>>,
    /// Route, overriding the request's
    pub route: Option<String>,
}

impl CallerContext {
    /// Caller with a source and function name
    pub fn new(source: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            function: function.into(),
            ..Default::default()
        }
    }

    /// Set the parameter names
    pub fn with_parameter_names(mut self, names: &[&str]) -> Self {
        self.parameter_names = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    /// Set the request
    pub fn with_request(mut self, request: Arc<RequestContext>) -> Self {
        self.request = Some(request);
        self
    }

    /// Set the route
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }
}

/// Caller context for the enclosing function
#[macro_export]
macro_rules! caller {
    () => {
        $crate::facade::CallerContext::new(::std::module_path!(), $crate::__function_name!())
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        let name = name.strip_suffix("::f").unwrap_or(name);
        let name = name.trim_end_matches("::{{closure}}");
        match name.rfind("::") {
            Some(pos) => &name[pos + 2..],
            None => name,
        }
    }};
}

/// Log an error with the enclosing function as caller and the given
/// arguments captured under their expression text
///
/// ```ignore
/// log_error!(logger, err, order_id, payload);
/// ```
#[macro_export]
macro_rules! log_error {
    ($logger:expr, $error:expr $(, $arg:expr)* $(,)?) => {
        $logger.log_error(
            &$error,
            $crate::caller!().with_parameter_names(&[$(::std::stringify!($arg)),*]),
            ::std::vec![$($crate::facade::capture_argument(&$arg)),*],
        )
    };
}

/// Serialize an argument for parameter capture
pub fn capture_argument<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value)
        .unwrap_or_else(|e| Value::String(format!("<unserializable: {}>", e)))
}

/// Structured result returned to remote callers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResponse<T> {
    /// Whether the operation succeeded
    #[serde(default)]
    pub success: bool,
    /// Human-readable outcome
    pub message: Option<String>,
    /// Payload on success
    pub data: Option<T>,
    /// Whether a failure was a system fault rather than a rule rejection
    pub is_system_error: bool,
}

impl<T> ServiceResponse<T> {
    /// Successful response carrying `data`
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            is_system_error: false,
        }
    }

    /// Failed response
    pub fn failure(message: impl Into<String>, is_system_error: bool) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
            is_system_error,
        }
    }
}

/// Error raised by a remote service call; its message is the service's raw
/// response body
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Remote fault from {service}: {message}")]
pub struct RemoteFault {
    /// Remote service name
    pub service: String,
    /// Raw response body
    pub message: String,
}

impl RemoteFault {
    /// Create a remote fault
    pub fn new(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            message: message.into(),
        }
    }
}

/// Whether `error` (or one of its sources) is a [`RemoteFault`] whose body
/// parses as a [`ServiceResponse`] flagged as not a system error.
///
/// Anything else, including unparsable bodies, counts as a system error.
pub fn is_policy_validation(error: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(fault) = err.downcast_ref::<RemoteFault>() {
            return serde_json::from_str::<ServiceResponse<Value>>(&fault.message)
                .map(|response| !response.is_system_error)
                .unwrap_or(false);
        }
        current = err.source();
    }
    false
}

/// Emits records on behalf of application code
#[derive(Clone)]
pub struct Logger {
    dispatcher: Arc<Dispatcher>,
    request: Option<Arc<RequestContext>>,
}

impl Logger {
    /// Logger with no request in scope
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            request: None,
        }
    }

    /// Logger bound to a request
    pub fn for_request(&self, request: Arc<RequestContext>) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            request: Some(request),
        }
    }

    /// Logger bound to the request stored in `extensions`, if any
    pub fn for_extensions(&self, extensions: &http::Extensions) -> Self {
        match RequestContext::from_extensions(extensions) {
            Some(request) => self.for_request(request),
            None => self.clone(),
        }
    }

    /// Underlying dispatcher
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Request this logger is bound to
    pub fn request(&self) -> Option<&Arc<RequestContext>> {
        self.request.as_ref()
    }

    /// Log an exception record
    pub fn log_error(
        &self,
        error: &(dyn StdError + 'static),
        caller: CallerContext,
        arguments: Vec<Value>,
    ) {
        let parameters = self.capture_parameters(caller.parameter_names.as_deref(), arguments);
        let inner = error.source();
        let details = ExceptionDetails {
            message: error.to_string(),
            function_parameters: parameters,
            stack_trace: capture_backtrace(),
            inner_message: inner.map(|e| e.to_string()),
            inner_detail: inner.map(|e| format!("{:?}", e)),
            is_policy_validation: is_policy_validation(error),
        };
        let record = LogRecord::exception(caller.source.clone(), caller.function.clone(), details);
        let event = LogEvent::new(record).with_error(ErrorReport::from_error(error));
        self.emit(event, &caller);
    }

    /// Log an exception record and return `T::default()`
    pub fn log_error_and_return<T: Default>(
        &self,
        error: &(dyn StdError + 'static),
        caller: CallerContext,
        arguments: Vec<Value>,
    ) -> T {
        self.log_error(error, caller, arguments);
        T::default()
    }

    /// Log an exception record and return a failed [`ServiceResponse`].
    ///
    /// In generic error mode the message is the configured fixed text;
    /// otherwise it is the error's own message.
    pub fn log_error_and_return_default_response<T>(
        &self,
        error: &(dyn StdError + 'static),
        caller: CallerContext,
        arguments: Vec<Value>,
    ) -> ServiceResponse<T> {
        let policy = is_policy_validation(error);
        self.log_error(error, caller, arguments);
        let facade = &self.dispatcher.settings().facade;
        let message = if facade.generic_error_mode {
            facade.generic_error_message.clone()
        } else {
            error.to_string()
        };
        ServiceResponse::failure(message, !policy)
    }

    /// Log a custom message record
    pub fn log_custom_message(&self, message: impl Into<String>, caller: CallerContext) {
        let record = LogRecord::custom_message(caller.source.clone(), caller.function.clone(), message);
        self.emit(LogEvent::new(record), &caller);
    }

    /// Log an API call record. Always reports success: logging problems
    /// never fail the business call.
    pub fn log_by_api(
        &self,
        payload: BTreeMap<String, Option<String>>,
        is_exception: bool,
        caller: CallerContext,
    ) -> ServiceResponse<bool> {
        let record = LogRecord::api_call(
            caller.source.clone(),
            caller.function.clone(),
            self.redact_payload(payload),
            is_exception,
        );
        self.emit(LogEvent::new(record), &caller);
        ServiceResponse::ok(true)
    }

    fn emit(&self, mut event: LogEvent, caller: &CallerContext) {
        let request = caller.request.as_ref().or(self.request.as_ref());
        let route = caller
            .route
            .clone()
            .or_else(|| request.map(|r| r.route().to_string()));
        if let Some(route) = route {
            event.record = event.record.with_route(route);
        }
        if let Some(id) = request.and_then(|r| r.correlation_id()) {
            event.record.assign_correlation_id(id);
        }
        let ctx = EnrichmentContext {
            request: request.map(|r| r.as_ref()),
            response: None,
        };
        self.dispatcher.dispatch(event, &ctx);
    }

    /// Pair names with values (arity is the shorter of the two) and redact
    fn capture_parameters(
        &self,
        names: Option<&[String]>,
        arguments: Vec<Value>,
    ) -> Vec<(String, Value)> {
        let redaction = self.dispatcher.redaction();
        let named: Vec<(String, Value)> = match names {
            Some(names) => names.iter().cloned().zip(arguments).collect(),
            None => arguments
                .into_iter()
                .enumerate()
                .map(|(i, value)| (format!("arg{}", i), value))
                .collect(),
        };
        named
            .into_iter()
            .map(|(name, mut value)| {
                if let Value::String(text) = &value {
                    if let Ok(parsed @ (Value::Object(_) | Value::Array(_))) =
                        serde_json::from_str::<Value>(text)
                    {
                        value = parsed;
                    }
                }
                redaction.redact_named_value(&name, &mut value);
                (name, value)
            })
            .collect()
    }

    fn redact_payload(
        &self,
        payload: BTreeMap<String, Option<String>>,
    ) -> BTreeMap<String, Option<String>> {
        let redaction = self.dispatcher.redaction();
        payload
            .into_iter()
            .map(|(key, value)| {
                let value = if redaction.is_sensitive_field(&key) {
                    value.map(|_| redaction.marker().to_string())
                } else {
                    value
                };
                (key, value)
            })
            .collect()
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("request", &self.request.as_ref().map(|r| r.path().to_string()))
            .finish()
    }
}

fn capture_backtrace() -> Option<String> {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => Some(backtrace.to_string()),
        _ => None,
    }
}
