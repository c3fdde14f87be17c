//! Requests carried through the state transition queue.
//!
//! A [`StateTransitionRequest`] is built on the caller's thread, moved into the
//! queue by value, and consumed on the worker thread. It captures the caller's
//! trace context so the worker's processing span links back to the span that
//! submitted the request.

use crate::domain::{AppCloseReason, ContextHandle, KillParams, LifecycleState, RequestType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Distributed tracing context for cross-thread span propagation.
///
/// Carries the OpenTelemetry trace and span ids of the submitting span as hex
/// strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: String,
    pub parent_span_id: String,
}

impl TraceContext {
    /// Captures the ids of the current span.
    ///
    /// Returns `None` when no valid OpenTelemetry span is active, for example
    /// when tracing was never initialized.
    pub fn from_current() -> Option<Self> {
        use opentelemetry::trace::TraceContextExt;
        use tracing_opentelemetry::OpenTelemetrySpanExt;

        let otel_context = tracing::Span::current().context();
        let span_ref = otel_context.span();
        let span_context = span_ref.span_context();

        if !span_context.is_valid() {
            return None;
        }
        Some(Self {
            trace_id: format!("{:032x}", span_context.trace_id()),
            parent_span_id: format!("{:016x}", span_context.span_id()),
        })
    }

    /// Attaches this context as the remote parent on the current thread.
    ///
    /// The returned guard must be held while the linked work runs.
    pub fn attach(&self) -> Option<opentelemetry::ContextGuard> {
        use opentelemetry::trace::{
            SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
        };

        let trace_id = TraceId::from_hex(&self.trace_id).ok()?;
        let span_id = SpanId::from_hex(&self.parent_span_id).ok()?;
        let span_context = SpanContext::new(
            trace_id,
            span_id,
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        Some(
            opentelemetry::Context::current()
                .with_remote_span_context(span_context)
                .attach(),
        )
    }
}

/// An accepted request to move one context toward a target state.
#[derive(Clone)]
pub struct StateTransitionRequest {
    pub context: ContextHandle,
    pub request_type: RequestType,
    pub target_state: LifecycleState,
    pub close_reason: AppCloseReason,
    /// Fixed at submission; later requests for the same context never change it.
    pub kill_params: KillParams,
    pub intent: Option<String>,
    pub submitted_at: Instant,
    pub trace_context: Option<TraceContext>,
}

impl StateTransitionRequest {
    /// Builds a request stamped with the current time and trace context.
    pub fn new(context: ContextHandle, request_type: RequestType, target_state: LifecycleState) -> Self {
        Self {
            context,
            request_type,
            target_state,
            close_reason: AppCloseReason::default(),
            kill_params: KillParams::default(),
            intent: None,
            submitted_at: Instant::now(),
            trace_context: TraceContext::from_current(),
        }
    }

    #[must_use]
    pub fn with_intent(mut self, intent: Option<String>) -> Self {
        self.intent = intent;
        self
    }

    #[must_use]
    pub const fn with_close_reason(mut self, reason: AppCloseReason) -> Self {
        self.close_reason = reason;
        self
    }

    #[must_use]
    pub const fn with_kill_params(mut self, params: KillParams) -> Self {
        self.kill_params = params;
        self
    }

    pub fn app_id(&self) -> &str {
        self.context.app_id()
    }

    pub fn app_instance_id(&self) -> &str {
        self.context.app_instance_id()
    }
}

impl fmt::Debug for StateTransitionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTransitionRequest")
            .field("app_instance_id", &self.app_instance_id())
            .field("request_type", &self.request_type)
            .field("target_state", &self.target_state)
            .field("close_reason", &self.close_reason)
            .field("kill_params", &self.kill_params)
            .field("intent", &self.intent)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ApplicationContext, LiveContext};

    #[test]
    fn builder_sets_optional_fields() {
        let mut record = ApplicationContext::new("com.test.app");
        record.assign_instance_id("i-1").unwrap();
        let handle = LiveContext::new(record).unwrap();

        let request = StateTransitionRequest::new(handle, RequestType::Terminate, LifecycleState::Terminating)
            .with_close_reason(AppCloseReason::KillAndRun)
            .with_kill_params(KillParams { force: true })
            .with_intent(Some("home".to_string()));

        assert_eq!(request.app_instance_id(), "i-1");
        assert_eq!(request.close_reason, AppCloseReason::KillAndRun);
        assert!(request.kill_params.force);
        assert_eq!(request.intent.as_deref(), Some("home"));
    }

    #[test]
    fn no_trace_context_without_subscriber() {
        assert!(TraceContext::from_current().is_none());
    }

    #[test]
    fn malformed_trace_ids_do_not_attach() {
        let ctx = TraceContext {
            trace_id: "not-hex".to_string(),
            parent_span_id: "0000000000000001".to_string(),
        };
        assert!(ctx.attach().is_none());
    }
}
