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

//! Capture the spans and events emitted by the runtime.
//!
//! Tests in the same binary share a global subscriber. Each test wraps its
//! work in a `test_layer` span with a unique id, and the layer files every
//! span and event under the id of its enclosing `test_layer` span. Tests can
//! then run in parallel without seeing each other's output.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, Once};
use tracing::{Event, Subscriber, field, span};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::{LookupSpan, SpanRef};

const ROOT_SPAN: &str = "test_layer";

/// A span captured by [TestLayer].
#[derive(Clone, Debug)]
pub struct CapturedSpan {
    pub id: span::Id,
    pub name: String,
    /// The span fields, including values recorded after creation.
    pub attributes: HashMap<String, String>,
    pub test_id: Option<String>,
}

/// An event captured by [TestLayer].
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    pub level: tracing::Level,
    /// The event message, empty if the event has none.
    pub message: String,
    pub fields: HashMap<String, String>,
    /// The name of the innermost span enclosing the event.
    pub span: Option<String>,
    pub test_id: Option<String>,
}

struct FieldVisitor<'a>(&'a mut HashMap<String, String>);

impl field::Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &field::Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }

    fn record_i64(&mut self, field: &field::Field, value: i64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_u64(&mut self, field: &field::Field, value: u64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_bool(&mut self, field: &field::Field, value: bool) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
}

struct Log {
    spans: Vec<CapturedSpan>,
    events: Vec<CapturedEvent>,
}

static LOG: Mutex<Log> = Mutex::new(Log {
    spans: Vec::new(),
    events: Vec::new(),
});
static INIT: Once = Once::new();

// A panicking test must not break the other tests in the binary.
fn log() -> MutexGuard<'static, Log> {
    LOG.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Clone, Debug)]
struct TestId(String);

fn find_test_id<S>(span: Option<SpanRef<'_, S>>) -> Option<String>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    span?
        .scope()
        .find(|s| s.name() == ROOT_SPAN)
        .and_then(|s| s.extensions().get::<TestId>().map(|t| t.0.clone()))
}

/// A [Layer] capturing spans and events per test.
///
/// # Example
/// ```
/// use aiplatform_test_utils::test_layer::TestLayer;
/// let _guard = TestLayer::initialize("doc_example");
/// tracing::info_span!("client_request", rpc.method = "/test.Service/Get").in_scope(|| {
///     tracing::info!("done");
/// });
/// let spans = TestLayer::capture("doc_example");
/// assert_eq!(spans.len(), 1);
/// assert_eq!(spans[0].attributes.get("rpc.method").map(String::as_str), Some("/test.Service/Get"));
/// let events = TestLayer::capture_events("doc_example");
/// assert_eq!(events[0].message, "done");
/// ```
#[derive(Clone, Debug, Default)]
pub struct TestLayer;

impl TestLayer {
    /// Installs the layer (once per process) and starts capturing for `test_id`.
    ///
    /// Capture stops when the returned guard is dropped. Use a distinct id in
    /// each test.
    pub fn initialize(test_id: &'static str) -> tracing::span::EnteredSpan {
        INIT.call_once(|| {
            let subscriber = tracing_subscriber::registry().with(TestLayer);
            // Another subscriber may already be installed, in that case
            // nothing is captured and the assertions in the test fail.
            let _ = tracing::subscriber::set_global_default(subscriber);
        });
        {
            let mut log = log();
            log.spans.retain(|s| s.test_id.as_deref() != Some(test_id));
            log.events.retain(|e| e.test_id.as_deref() != Some(test_id));
        }
        tracing::info_span!(ROOT_SPAN, test_id = test_id).entered()
    }

    /// Removes and returns the spans captured for `test_id`, in creation order.
    pub fn capture(test_id: &str) -> Vec<CapturedSpan> {
        let mut log = log();
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut log.spans)
            .into_iter()
            .partition(|s| s.test_id.as_deref() == Some(test_id) && s.name != ROOT_SPAN);
        log.spans = kept;
        taken
    }

    /// Removes and returns the events captured for `test_id`, in order.
    pub fn capture_events(test_id: &str) -> Vec<CapturedEvent> {
        let mut log = log();
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut log.events)
            .into_iter()
            .partition(|e| e.test_id.as_deref() == Some(test_id));
        log.events = kept;
        taken
    }
}

impl<S> Layer<S> for TestLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut attributes = HashMap::new();
        attrs.record(&mut FieldVisitor(&mut attributes));
        let Some(span) = ctx.span(id) else {
            return;
        };
        let name = span.name().to_string();
        let test_id = if name == ROOT_SPAN {
            let id = attributes.get("test_id").cloned();
            if let Some(id) = &id {
                span.extensions_mut().insert(TestId(id.clone()));
            }
            id
        } else {
            find_test_id(Some(span))
        };
        log().spans.push(CapturedSpan {
            id: id.clone(),
            name,
            attributes,
            test_id,
        });
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, _ctx: Context<'_, S>) {
        let mut log = log();
        if let Some(span) = log.spans.iter_mut().rev().find(|s| s.id == *id) {
            values.record(&mut FieldVisitor(&mut span.attributes));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut fields = HashMap::new();
        event.record(&mut FieldVisitor(&mut fields));
        let message = fields
            .remove("message")
            .map(|m| m.trim_matches('"').to_string())
            .unwrap_or_default();
        let span = ctx.event_span(event);
        let span_name = span.as_ref().map(|s| s.name().to_string());
        let test_id = find_test_id(span);
        log().events.push(CapturedEvent {
            level: *event.metadata().level(),
            message,
            fields,
            span: span_name,
            test_id,
        });
    }
}
