// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::rpc::{Code, Status};
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

type BoxError = Box<dyn StdError + Send + Sync>;
type SharedError = Arc<dyn StdError + Send + Sync>;

/// The error type for every call made through this runtime.
///
/// A single call may fail in the service, in the transport, in the client
/// before the request is sent, or because a deadline or policy ran out. The
/// `is_*()` predicates identify the kind and [code()][Error::code] maps every
/// kind onto a canonical [Code].
///
/// Cloning is cheap. Several waiters on one long-running operation, or a
/// paginator replaying its terminal error, hand out clones of the same value.
///
/// # Example
/// ```
/// use aiplatform_gax::error::Error;
/// use aiplatform_gax::error::rpc::{Code, Status};
/// fn lookup() -> Result<String, Error> {
///     Err(Error::service(Status::default().set_code(Code::NotFound)))
/// }
/// match lookup() {
///     Ok(v) => println!("found {v}"),
///     Err(e) if e.is_timeout() => println!("gave up waiting: {e}"),
///     Err(e) => match e.status() {
///         Some(s) if s.code == Code::NotFound => println!("missing"),
///         _ => println!("failed: {e}"),
///     },
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<SharedError>,
    context: Option<Box<ErrorContext>>,
}

impl Error {
    fn new(kind: ErrorKind, source: Option<SharedError>) -> Self {
        Self {
            kind,
            source,
            context: None,
        }
    }

    /// Wraps a [Status] returned by the service.
    ///
    /// # Example
    /// ```
    /// use aiplatform_gax::error::Error;
    /// use aiplatform_gax::error::rpc::{Code, Status};
    /// let status = Status::default().set_code(Code::NotFound).set_message("NOT FOUND");
    /// let error = Error::service(status.clone());
    /// assert_eq!(error.status(), Some(&status));
    /// ```
    pub fn service(status: Status) -> Self {
        Self::new(ErrorKind::Service(Box::new(status)), None)
    }

    /// A deadline expired, `source` is usually the last attempt's error.
    pub fn timeout<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Timeout, Some(Arc::from(source.into())))
    }

    /// A deadline expired before the call finished.
    ///
    /// Generated in the client. The [source][StdError::source] is the last
    /// attempt's error, if there was one. An operation that timed out while
    /// waiting keeps running in the service and can be resumed by name.
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout)
    }

    /// The caller cancelled the call.
    pub fn cancelled<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Cancelled, Some(Arc::from(source.into())))
    }

    /// True for cancellation requested through the caller's token.
    ///
    /// An operation cancelled in the service is a service error with
    /// [Code::Cancelled] instead. Both report the same [code()][Error::code].
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// A policy stopped the loop, `source` explains which one.
    ///
    /// # Example
    /// ```
    /// use std::error::Error as _;
    /// use aiplatform_gax::error::Error;
    /// let error = Error::exhausted("too many retry attempts");
    /// assert!(error.is_exhausted());
    /// assert!(error.source().is_some());
    /// ```
    pub fn exhausted<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Exhausted, Some(Arc::from(source.into())))
    }

    /// A retry or polling policy gave up.
    ///
    /// Generated in the client, usually after several service errors.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.kind, ErrorKind::Exhausted)
    }

    /// The response payload is malformed.
    pub fn deser<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Deserialization, Some(Arc::from(source.into())))
    }

    /// The response did not decode. The service may have applied the request.
    pub fn is_deserialization(&self) -> bool {
        matches!(self.kind, ErrorKind::Deserialization)
    }

    /// The request payload cannot be encoded.
    pub fn ser<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Serialization, Some(Arc::from(source.into())))
    }

    /// The request did not encode, nothing was sent. Never transient.
    pub fn is_serialization(&self) -> bool {
        matches!(self.kind, ErrorKind::Serialization)
    }

    /// A problem in the transport layer after the request may have been sent.
    ///
    /// Examples include a broken connection after the request is written, or
    /// a response that is truncated.
    pub fn io<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Transport { sent: true }, Some(Arc::from(source.into())))
    }

    /// If true, the transport failed and the request may have reached the
    /// service.
    pub fn is_io(&self) -> bool {
        matches!(self.kind, ErrorKind::Transport { sent: true })
    }

    /// A problem in the transport layer before the request left the client.
    ///
    /// Examples include failing to open a connection, or failing to resolve
    /// the service address. The transport must only use this constructor when
    /// it can guarantee the service never saw the request.
    pub fn connect<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Transport { sent: false }, Some(Arc::from(source.into())))
    }

    /// If true, the transport failed before the request left the client.
    pub fn is_connect(&self) -> bool {
        matches!(self.kind, ErrorKind::Transport { sent: false })
    }

    /// A problem reported by the transport layer, with or without a request
    /// reaching the service.
    pub fn is_transport(&self) -> bool {
        matches!(self.kind, ErrorKind::Transport { .. })
    }

    /// An uncategorized error.
    pub fn other<T: Into<BoxError>>(source: T) -> Self {
        Self::new(ErrorKind::Other, Some(Arc::from(source.into())))
    }

    /// The service [Status], only for errors created by [Error::service].
    pub fn status(&self) -> Option<&Status> {
        match &self.kind {
            ErrorKind::Service(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    /// The canonical code for this error.
    ///
    /// Service errors return their status code. Client-side errors are mapped
    /// onto the closest canonical code.
    ///
    /// # Example
    /// ```
    /// use aiplatform_gax::error::{Error, rpc::Code};
    /// assert_eq!(Error::timeout("too slow").code(), Code::DeadlineExceeded);
    /// assert_eq!(Error::io("broken pipe").code(), Code::Unavailable);
    /// ```
    pub fn code(&self) -> Code {
        match &self.kind {
            ErrorKind::Service(s) => s.code,
            ErrorKind::Timeout => Code::DeadlineExceeded,
            ErrorKind::Cancelled => Code::Cancelled,
            ErrorKind::Transport { .. } => Code::Unavailable,
            ErrorKind::Serialization | ErrorKind::Deserialization => Code::Internal,
            ErrorKind::Exhausted => self
                .source
                .as_ref()
                .and_then(|e| e.downcast_ref::<Error>())
                .map(Error::code)
                .unwrap_or(Code::Unknown),
            ErrorKind::Other => Code::Unknown,
        }
    }

    /// The error was generated before the RPC started and is transient.
    ///
    /// Such errors are safe to retry even for non-idempotent requests.
    pub fn is_transient_and_before_rpc(&self) -> bool {
        self.is_connect()
    }

    /// Annotates the error with the method name, the number of attempts and
    /// the time spent in the call.
    pub fn with_context<M: Into<String>>(
        mut self,
        method: M,
        attempt_count: u32,
        elapsed: Duration,
    ) -> Self {
        let context = self.context.get_or_insert_with(Default::default);
        context.method = Some(method.into());
        context.attempt_count = Some(attempt_count);
        context.elapsed = Some(elapsed);
        self
    }

    /// Attaches the errors observed, and retried past, before this error.
    pub fn with_breadcrumbs(mut self, breadcrumbs: Vec<Breadcrumb>) -> Self {
        if breadcrumbs.is_empty() {
            return self;
        }
        let context = self.context.get_or_insert_with(Default::default);
        context.breadcrumbs = breadcrumbs;
        self
    }

    /// The RPC method that produced this error, if known.
    pub fn method(&self) -> Option<&str> {
        self.context.as_ref().and_then(|c| c.method.as_deref())
    }

    /// The number of attempts made before this error was returned, if known.
    pub fn attempt_count(&self) -> Option<u32> {
        self.context.as_ref().and_then(|c| c.attempt_count)
    }

    /// The time spent in the call before this error was returned, if known.
    pub fn elapsed(&self) -> Option<Duration> {
        self.context.as_ref().and_then(|c| c.elapsed)
    }

    /// Errors retried past before this error, in the order they occurred.
    pub fn breadcrumbs(&self) -> &[Breadcrumb] {
        self.context
            .as_ref()
            .map(|c| c.breadcrumbs.as_slice())
            .unwrap_or_default()
    }

    fn fmt_kind(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.kind, &self.source) {
            (ErrorKind::Service(s), _) => write!(
                f,
                "the service reports an error with code {} described as: {}",
                s.code, s.message
            ),
            (ErrorKind::Timeout, Some(e)) => {
                write!(f, "the request exceeded the request deadline {e}")
            }
            (ErrorKind::Cancelled, Some(e)) => write!(f, "the request was cancelled: {e}"),
            (ErrorKind::Exhausted, Some(e)) => write!(f, "{e}"),
            (ErrorKind::Serialization, Some(e)) => write!(f, "cannot serialize the request {e}"),
            (ErrorKind::Deserialization, Some(e)) => {
                write!(f, "cannot deserialize the response {e}")
            }
            (ErrorKind::Transport { sent: false }, Some(e)) => {
                write!(f, "the transport could not send the request: {e}")
            }
            (ErrorKind::Transport { sent: true }, Some(e)) => {
                write!(f, "the transport reports an error: {e}")
            }
            (ErrorKind::Other, Some(e)) => {
                write!(f, "an unclassified problem making a request: {e}")
            }
            (kind, None) => write!(f, "{kind:?}"),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.fmt_kind(f)?;
        let Some(context) = &self.context else {
            return Ok(());
        };
        if let Some(method) = &context.method {
            write!(f, ", method={method}")?;
        }
        if let Some(count) = context.attempt_count {
            write!(f, ", attempts={count}")?;
        }
        if let Some(elapsed) = context.elapsed {
            write!(f, ", elapsed={elapsed:?}")?;
        }
        for b in &context.breadcrumbs {
            write!(f, ", previous error on attempt {}: {}", b.attempt, b.message)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

/// A summary of an error that was retried past.
///
/// The call runner and the long-running operation pollers keep a list of the
/// errors they recovered from. If the call eventually fails the list is
/// attached to the final error.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct Breadcrumb {
    /// The attempt (or poll) number that failed, starting at 1.
    pub attempt: u32,
    /// The canonical code of the error.
    pub code: Code,
    /// The error message.
    pub message: String,
}

impl Breadcrumb {
    pub fn new(attempt: u32, error: &Error) -> Self {
        Self {
            attempt,
            code: error.code(),
            message: error.to_string(),
        }
    }
}

/// The type of error held by an [Error] instance.
#[derive(Clone, Debug)]
enum ErrorKind {
    Service(Box<Status>),
    Timeout,
    Cancelled,
    Exhausted,
    Transport { sent: bool },
    Serialization,
    Deserialization,
    /// A uncategorized error.
    Other,
}

#[derive(Clone, Debug, Default)]
struct ErrorContext {
    method: Option<String>,
    attempt_count: Option<u32>,
    elapsed: Option<Duration>,
    breadcrumbs: Vec<Breadcrumb>,
}
