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

//! The service error model.
//!
//! Services report failures as a [Status]: a canonical [Code], a message,
//! and a list of structured [StatusDetails]. Completed long-running
//! operations use the same shape for their `error` field.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// An error returned by the service.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct Status {
    pub code: Code,
    /// A developer-facing message, in English.
    pub message: String,
    pub details: Vec<StatusDetails>,
}

impl Status {
    pub fn set_code<T: Into<Code>>(mut self, v: T) -> Self {
        self.code = v.into();
        self
    }

    pub fn set_message<T: Into<String>>(mut self, v: T) -> Self {
        self.message = v.into();
        self
    }

    pub fn set_details<T, I>(mut self, v: T) -> Self
    where
        T: IntoIterator<Item = I>,
        I: Into<StatusDetails>,
    {
        self.details = v.into_iter().map(Into::into).collect();
        self
    }

    /// The retry delay suggested by the service, if any.
    pub fn retry_delay(&self) -> Option<Duration> {
        self.details.iter().find_map(|d| match d {
            StatusDetails::RetryInfo(info) => info.retry_delay(),
            _ => None,
        })
    }

    /// Returns true if the service attached a [RetryInfo].
    ///
    /// Retry policies use this to retry `INTERNAL` and `UNKNOWN` errors the
    /// service marked as retryable.
    pub fn has_retry_info(&self) -> bool {
        self.details
            .iter()
            .any(|d| matches!(d, StatusDetails::RetryInfo(_)))
    }
}

/// The canonical error codes.
///
/// Serialized as the integer value. Out of range integers deserialize as
/// [Code::Unknown].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Code {
    /// Not an error.
    Ok = 0,
    /// Usually cancelled by the caller. Long-running operations finish with
    /// this code after a successful cancel request.
    Cancelled = 1,
    #[default]
    Unknown = 2,
    InvalidArgument = 3,
    /// The deadline expired. The request may still have completed.
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    /// Often a quota, retryable after a delay.
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    /// A concurrency conflict. Retrying only helps if the caller restarts the
    /// whole read-modify-write sequence.
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    /// Usually transient, retryable after a delay.
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

// Indexed by the integer value of each code.
const CODES: [(Code, &str); 17] = [
    (Code::Ok, "OK"),
    (Code::Cancelled, "CANCELLED"),
    (Code::Unknown, "UNKNOWN"),
    (Code::InvalidArgument, "INVALID_ARGUMENT"),
    (Code::DeadlineExceeded, "DEADLINE_EXCEEDED"),
    (Code::NotFound, "NOT_FOUND"),
    (Code::AlreadyExists, "ALREADY_EXISTS"),
    (Code::PermissionDenied, "PERMISSION_DENIED"),
    (Code::ResourceExhausted, "RESOURCE_EXHAUSTED"),
    (Code::FailedPrecondition, "FAILED_PRECONDITION"),
    (Code::Aborted, "ABORTED"),
    (Code::OutOfRange, "OUT_OF_RANGE"),
    (Code::Unimplemented, "UNIMPLEMENTED"),
    (Code::Internal, "INTERNAL"),
    (Code::Unavailable, "UNAVAILABLE"),
    (Code::DataLoss, "DATA_LOSS"),
    (Code::Unauthenticated, "UNAUTHENTICATED"),
];

impl Code {
    /// The name used in logs and JSON payloads, e.g. `NOT_FOUND`.
    pub fn name(&self) -> &'static str {
        CODES[*self as usize].1
    }
}

impl From<i32> for Code {
    fn from(value: i32) -> Self {
        usize::try_from(value)
            .ok()
            .and_then(|i| CODES.get(i))
            .map(|(code, _)| *code)
            .unwrap_or_default()
    }
}

impl From<Code> for String {
    fn from(value: Code) -> String {
        value.name().to_string()
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<&str> for Code {
    type Error = String;
    fn try_from(value: &str) -> std::result::Result<Code, Self::Error> {
        CODES
            .iter()
            .find(|(_, name)| *name == value)
            .map(|(code, _)| *code)
            .ok_or_else(|| format!("unknown status code name {value}"))
    }
}

impl Serialize for Code {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i32(*self as i32)
    }
}

impl<'de> Deserialize<'de> for Code {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        i32::deserialize(deserializer).map(Code::from)
    }
}

/// A structured detail attached to a [Status].
///
/// Tagged by the `@type` field. Detail types this crate does not model are
/// kept as [StatusDetails::Other].
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[non_exhaustive]
#[serde(tag = "@type")]
pub enum StatusDetails {
    #[serde(rename = "type.googleapis.com/google.rpc.DebugInfo")]
    DebugInfo(DebugInfo),
    #[serde(rename = "type.googleapis.com/google.rpc.ErrorInfo")]
    ErrorInfo(ErrorInfo),
    #[serde(rename = "type.googleapis.com/google.rpc.LocalizedMessage")]
    LocalizedMessage(LocalizedMessage),
    #[serde(rename = "type.googleapis.com/google.rpc.RetryInfo")]
    RetryInfo(RetryInfo),
    #[serde(untagged)]
    Other(serde_json::Value),
}

impl From<ErrorInfo> for StatusDetails {
    fn from(value: ErrorInfo) -> Self {
        Self::ErrorInfo(value)
    }
}

impl From<RetryInfo> for StatusDetails {
    fn from(value: RetryInfo) -> Self {
        Self::RetryInfo(value)
    }
}

impl From<DebugInfo> for StatusDetails {
    fn from(value: DebugInfo) -> Self {
        Self::DebugInfo(value)
    }
}

impl From<LocalizedMessage> for StatusDetails {
    fn from(value: LocalizedMessage) -> Self {
        Self::LocalizedMessage(value)
    }
}

/// Describes the cause of the error with structured details.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct ErrorInfo {
    /// The reason of the error, a constant value in `UPPER_SNAKE_CASE`.
    pub reason: String,
    /// The logical grouping to which the `reason` belongs.
    pub domain: String,
    /// Additional structured details about this error.
    pub metadata: HashMap<String, String>,
}

impl ErrorInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reason<T: Into<String>>(mut self, v: T) -> Self {
        self.reason = v.into();
        self
    }

    pub fn set_domain<T: Into<String>>(mut self, v: T) -> Self {
        self.domain = v.into();
        self
    }

    pub fn set_metadata<T, K, V>(mut self, v: T) -> Self
    where
        T: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.metadata = v.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }
}

/// Describes when the clients can retry a failed request.
///
/// The delay uses the JSON encoding of `google.protobuf.Duration`, e.g.
/// `"1.5s"`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct RetryInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<String>,
}

impl RetryInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_retry_delay(mut self, v: Duration) -> Self {
        self.retry_delay = Some(format!("{}s", v.as_secs_f64()));
        self
    }

    /// The parsed delay, `None` if missing or malformed.
    pub fn retry_delay(&self) -> Option<Duration> {
        let value = self.retry_delay.as_deref()?;
        let seconds = value.strip_suffix('s')?.parse::<f64>().ok()?;
        Duration::try_from_secs_f64(seconds).ok()
    }
}

/// Describes additional debugging info.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct DebugInfo {
    pub stack_entries: Vec<String>,
    pub detail: String,
}

impl DebugInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_detail<T: Into<String>>(mut self, v: T) -> Self {
        self.detail = v.into();
        self
    }

    pub fn set_stack_entries<T, V>(mut self, v: T) -> Self
    where
        T: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.stack_entries = v.into_iter().map(|v| v.into()).collect();
        self
    }
}

/// A localized error message that is safe to return to the user.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
#[non_exhaustive]
pub struct LocalizedMessage {
    pub locale: String,
    pub message: String,
}

impl LocalizedMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_locale<T: Into<String>>(mut self, v: T) -> Self {
        self.locale = v.into();
        self
    }

    pub fn set_message<T: Into<String>>(mut self, v: T) -> Self {
        self.message = v.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn status_basic_setters() {
        let got = Status::default()
            .set_code(Code::Unimplemented)
            .set_message("test-message");
        let want = Status {
            code: Code::Unimplemented,
            message: "test-message".into(),
            ..Default::default()
        };
        assert_eq!(got, want);

        let got = Status::default()
            .set_code(Code::Unimplemented as i32)
            .set_message("test-message");
        assert_eq!(got, want);
    }

    #[test]
    fn status_detail_setter() {
        let d0 = StatusDetails::ErrorInfo(ErrorInfo::new().set_reason("test-reason"));
        let d1 = StatusDetails::DebugInfo(DebugInfo::new().set_detail("test-detail"));
        let want = Status {
            details: vec![d0.clone(), d1.clone()],
            ..Default::default()
        };
        let got = Status::default().set_details([d0, d1]);
        assert_eq!(got, want);

        let got = Status::default().set_details([ErrorInfo::new().set_reason("test-reason")]);
        assert_eq!(got.details.len(), 1);
    }

    #[test]
    fn serialization_all_variants() -> Result<()> {
        let status = Status::default()
            .set_code(Code::Unavailable)
            .set_message("try again")
            .set_details([
                StatusDetails::ErrorInfo(
                    ErrorInfo::new()
                        .set_reason("reason")
                        .set_domain("aiplatform.googleapis.com"),
                ),
                StatusDetails::RetryInfo(RetryInfo::new().set_retry_delay(Duration::from_secs(2))),
                StatusDetails::DebugInfo(DebugInfo::new().set_stack_entries(["a", "b"])),
                StatusDetails::LocalizedMessage(
                    LocalizedMessage::new()
                        .set_locale("en-US")
                        .set_message("please retry"),
                ),
            ]);
        let got = serde_json::to_value(&status)?;
        let want = json!({
            "code": 14,
            "message": "try again",
            "details": [
                {"@type": "type.googleapis.com/google.rpc.ErrorInfo", "reason": "reason", "domain": "aiplatform.googleapis.com", "metadata": {}},
                {"@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "2s"},
                {"@type": "type.googleapis.com/google.rpc.DebugInfo", "stackEntries": ["a", "b"], "detail": ""},
                {"@type": "type.googleapis.com/google.rpc.LocalizedMessage", "locale": "en-US", "message": "please retry"},
            ]
        });
        assert_eq!(got, want);
        Ok(())
    }

    #[test]
    fn deserialization_unknown_detail() -> Result<()> {
        let input = json!({
            "code": 5,
            "message": "not here",
            "details": [
                {"@type": "type.googleapis.com/google.rpc.ResourceInfo", "resourceName": "projects/p/locations/l/datasets/d"},
            ]
        });
        let got: Status = serde_json::from_value(input)?;
        assert_eq!(got.code, Code::NotFound);
        assert!(
            matches!(got.details.first(), Some(StatusDetails::Other(_))),
            "{got:?}"
        );
        Ok(())
    }

    #[test]
    fn deserialization_defaults() -> Result<()> {
        let got: Status = serde_json::from_value(json!({}))?;
        assert_eq!(got, Status::default());
        assert_eq!(got.code, Code::Unknown);
        Ok(())
    }

    #[test]
    fn retry_delay() {
        let status = Status::default().set_details([RetryInfo::new().set_retry_delay(
            Duration::from_millis(1500),
        )]);
        assert!(status.has_retry_info());
        assert_eq!(status.retry_delay(), Some(Duration::from_millis(1500)));

        let bad = RetryInfo {
            retry_delay: Some("soon".to_string()),
        };
        assert_eq!(bad.retry_delay(), None);
        assert!(!Status::default().has_retry_info());
    }

    #[test_case(Code::Ok, "OK")]
    #[test_case(Code::Cancelled, "CANCELLED")]
    #[test_case(Code::Unknown, "UNKNOWN")]
    #[test_case(Code::InvalidArgument, "INVALID_ARGUMENT")]
    #[test_case(Code::DeadlineExceeded, "DEADLINE_EXCEEDED")]
    #[test_case(Code::NotFound, "NOT_FOUND")]
    #[test_case(Code::AlreadyExists, "ALREADY_EXISTS")]
    #[test_case(Code::PermissionDenied, "PERMISSION_DENIED")]
    #[test_case(Code::ResourceExhausted, "RESOURCE_EXHAUSTED")]
    #[test_case(Code::FailedPrecondition, "FAILED_PRECONDITION")]
    #[test_case(Code::Aborted, "ABORTED")]
    #[test_case(Code::OutOfRange, "OUT_OF_RANGE")]
    #[test_case(Code::Unimplemented, "UNIMPLEMENTED")]
    #[test_case(Code::Internal, "INTERNAL")]
    #[test_case(Code::Unavailable, "UNAVAILABLE")]
    #[test_case(Code::DataLoss, "DATA_LOSS")]
    #[test_case(Code::Unauthenticated, "UNAUTHENTICATED")]
    fn code_names(code: Code, name: &str) -> Result<()> {
        assert_eq!(code.name(), name);
        assert_eq!(code.to_string(), name);
        assert_eq!(String::from(code), name);
        assert_eq!(Code::try_from(name).map_err(anyhow::Error::msg)?, code);
        assert_eq!(Code::from(code as i32), code);
        Ok(())
    }

    #[test]
    fn code_unknown_values() {
        assert_eq!(Code::from(-1), Code::Unknown);
        assert_eq!(Code::from(17), Code::Unknown);
        assert!(Code::try_from("NOT-A-CODE").is_err());
    }

    #[test]
    fn code_table_order() {
        for (i, (code, _)) in CODES.iter().enumerate() {
            assert_eq!(*code as usize, i, "{code:?}");
        }
    }
}
