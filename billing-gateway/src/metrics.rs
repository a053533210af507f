//! Per-call performance events.
//!
//! [`MetricsRecorder::wrap`] times a gateway call and, when the caller supplied
//! a [`MetricsContext`], emits one [`FlowEvent`] to an [`EventSink`]:
//!
//! ```text
//! { ...context, "event": "<prefix>.<operation>", "time": <unix ms>, "flow_time": <elapsed ms> }
//! ```
//!
//! Emission failures are logged and never affect the wrapped call's result.

#[allow(
    redundant_imports,
    reason = "Future needed for RPITIT despite being in Edition 2024 prelude"
)]
use std::future::Future;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

/// Default event name prefix.
pub const DEFAULT_EVENT_PREFIX: &str = "billing.performance";

/// Flow-tracking fields supplied by the caller for one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsContext(Map<String, Value>);

impl MetricsContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Context fields.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for MetricsContext {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// A structured performance event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FlowEvent(Map<String, Value>);

impl FlowEvent {
    fn new(context: &MetricsContext, event: String, time: i64, flow_time: u64) -> Self {
        let mut fields = context.0.clone();
        fields.insert("event".to_owned(), Value::String(event));
        fields.insert("time".to_owned(), Value::from(time));
        fields.insert("flow_time".to_owned(), Value::from(flow_time));
        Self(fields)
    }

    /// Event name, e.g. `billing.performance.listPlans`.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.get("event").and_then(Value::as_str).unwrap_or_default()
    }

    /// Completion time in unix milliseconds.
    #[must_use]
    pub fn time(&self) -> i64 {
        self.0.get("time").and_then(Value::as_i64).unwrap_or_default()
    }

    /// Elapsed milliseconds.
    #[must_use]
    pub fn flow_time(&self) -> u64 {
        self.0.get("flow_time").and_then(Value::as_u64).unwrap_or_default()
    }

    /// All event fields.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Failure to deliver a flow event.
#[derive(Debug, Error)]
#[error("flow event emission failed: {0}")]
pub struct EmitError(pub String);

/// Destination of flow events.
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    ///
    /// # Errors
    ///
    /// Returns error if the event could not be delivered.
    fn emit(&self, event: &FlowEvent) -> Result<(), EmitError>;
}

/// Logs flow events under the `flow_event` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &FlowEvent) -> Result<(), EmitError> {
        let payload = serde_json::to_string(event).map_err(|e| EmitError(e.to_string()))?;
        info!(
            target: "flow_event",
            event = event.name(),
            flow_time = event.flow_time(),
            payload = %payload,
            "flow event"
        );
        Ok(())
    }
}

/// Times calls and emits flow events.
#[derive(Debug, Clone)]
pub struct MetricsRecorder<E> {
    sink: E,
    prefix: String,
}

impl Default for MetricsRecorder<TracingSink> {
    fn default() -> Self {
        Self::new(TracingSink)
    }
}

impl<E: EventSink> MetricsRecorder<E> {
    /// Creates a recorder with the default event prefix.
    #[must_use]
    pub fn new(sink: E) -> Self {
        Self { sink, prefix: DEFAULT_EVENT_PREFIX.to_owned() }
    }

    /// Replaces the event name prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Event sink.
    #[must_use]
    pub fn sink(&self) -> &E {
        &self.sink
    }

    /// Awaits `call`, emitting a flow event when `context` is present.
    ///
    /// The event is emitted whether the call succeeds or fails; the call's
    /// result is returned unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use billing_gateway::metrics::{MetricsContext, MetricsRecorder};
    ///
    /// # async fn example() {
    /// let recorder = MetricsRecorder::default();
    /// let context = MetricsContext::new().with("flow_id", "abc");
    ///
    /// let result: Result<u32, ()> =
    ///     recorder.wrap("listPlans", Some(&context), async { Ok(1) }).await;
    /// assert_eq!(result, Ok(1));
    /// # }
    /// ```
    pub async fn wrap<T, Er, F>(
        &self,
        operation: &str,
        context: Option<&MetricsContext>,
        call: F,
    ) -> Result<T, Er>
    where
        F: Future<Output = Result<T, Er>>,
    {
        let Some(context) = context else {
            return call.await;
        };

        let started = Instant::now();
        let result = call.await;
        let flow_time = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let event = FlowEvent::new(
            context,
            format!("{}.{operation}", self.prefix),
            Utc::now().timestamp_millis(),
            flow_time,
        );
        if let Err(err) = self.sink.emit(&event) {
            warn!(operation, error = %err, "flow event dropped");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    #[derive(Debug, Default)]
    struct CollectingSink {
        events: Mutex<Vec<FlowEvent>>,
    }

    impl EventSink for CollectingSink {
        fn emit(&self, event: &FlowEvent) -> Result<(), EmitError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl EventSink for FailingSink {
        fn emit(&self, _event: &FlowEvent) -> Result<(), EmitError> {
            Err(EmitError("sink offline".to_owned()))
        }
    }

    #[tokio::test]
    async fn test_no_context_emits_nothing() {
        let recorder = MetricsRecorder::new(CollectingSink::default());
        let result: Result<u8, ()> = recorder.wrap("listPlans", None, async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
        assert!(recorder.sink().events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_event_carries_context_and_timing() {
        let recorder = MetricsRecorder::new(CollectingSink::default());
        let context = MetricsContext::new().with("flow_id", "f1").with("device_id", "d1");
        let before = Utc::now().timestamp_millis();

        let result: Result<&str, ()> = recorder
            .wrap("getCustomer", Some(&context), async {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                Ok("done")
            })
            .await;
        assert_eq!(result, Ok("done"));

        let events = recorder.sink().events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.name(), "billing.performance.getCustomer");
        assert_eq!(event.fields()["flow_id"], json!("f1"));
        assert_eq!(event.fields()["device_id"], json!("d1"));
        assert!(event.flow_time() >= 20);
        assert!(event.time() >= before);
    }

    #[tokio::test]
    async fn test_event_emitted_on_failure() {
        let recorder =
            MetricsRecorder::new(CollectingSink::default()).with_prefix("subscriptions.perf");
        let context = MetricsContext::new();

        let result: Result<(), &str> =
            recorder.wrap("cancelSubscription", Some(&context), async { Err("boom") }).await;
        assert_eq!(result, Err("boom"));

        let events = recorder.sink().events.lock().unwrap();
        assert_eq!(events[0].name(), "subscriptions.perf.cancelSubscription");
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_mask_result() {
        let recorder = MetricsRecorder::new(FailingSink);
        let context = MetricsContext::new();
        let result: Result<u8, ()> =
            recorder.wrap("listPlans", Some(&context), async { Ok(1) }).await;
        assert_eq!(result, Ok(1));
    }

    #[test]
    fn test_reserved_fields_override_context() {
        let context = MetricsContext::new().with("event", "spoofed").with("time", 0);
        let event = FlowEvent::new(&context, "billing.performance.listPlans".to_owned(), 42, 3);
        assert_eq!(event.name(), "billing.performance.listPlans");
        assert_eq!(event.time(), 42);
        assert_eq!(event.flow_time(), 3);
    }

    #[test]
    fn test_tracing_sink_emits() {
        let event = FlowEvent::new(&MetricsContext::new(), "e".to_owned(), 1, 2);
        assert!(TracingSink.emit(&event).is_ok());
    }
}
