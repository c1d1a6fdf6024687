//! Per-event interception state machine.
//!
//! Each upstream `tool_call` event runs through extraction, schema
//! compatibility and the loop guard, then ends in exactly one of:
//! intercepted (handed to the caller), executed (proxy mode), terminated,
//! or no decision (the event goes to the regular converter).

pub mod boundary;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use boundary::{create_boundary, BoundaryMode, LegacyBoundary, ToolCallBoundary, V1Boundary};

use crate::config::RelayConfig;
use crate::error::{BoundaryError, RelayError, Result};
use crate::guard::{LoopGuard, LoopGuardDecision};
use crate::streaming::create_hint_chunk;
use crate::tools::{
    apply_compat, SchemaMap, ToolMapper, ToolRouter, ToolUpdate, TypeError, ValidationResult,
};
use crate::types::{ChatCompletionChunk, OpenAiToolCall, ResponseMeta, ToolCallEvent};

/// Who owns tool execution.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum ToolLoopMode {
    /// Hand repaired calls back to the caller.
    #[default]
    #[serde(alias = "opencode")]
    #[strum(to_string = "intercept", serialize = "opencode")]
    Intercept,
    /// Execute calls through the injected router.
    #[serde(alias = "proxy-exec", alias = "proxy-execute")]
    #[strum(to_string = "proxy_execute", serialize = "proxy-exec", serialize = "proxy-execute")]
    ProxyExecute,
    /// Leave tool calls to the converter.
    #[strum(to_string = "off")]
    Off,
}

/// Policy for calls that fail schema validation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SchemaFailureMode {
    Strict,
    #[default]
    PassThrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TerminationReason {
    SchemaValidation,
    LoopGuard,
}

/// Why and how the current turn must end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Termination {
    pub reason: TerminationReason,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_errors: Vec<TypeError>,
}

/// Outcome for one tool-call event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptionDecision {
    pub intercepted: bool,
    pub skip_converter: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminate: Option<Termination>,
}

impl InterceptionDecision {
    pub fn intercepted() -> Self {
        Self {
            intercepted: true,
            skip_converter: true,
            terminate: None,
        }
    }

    /// Handled here without handing the call to the caller.
    pub fn handled() -> Self {
        Self {
            intercepted: false,
            skip_converter: true,
            terminate: None,
        }
    }

    pub fn terminated(termination: Termination) -> Self {
        Self {
            intercepted: false,
            skip_converter: true,
            terminate: Some(termination),
        }
    }
}

/// Side-effect channel for interception.
///
/// Every method defaults to a no-op so sinks implement only what they use.
#[async_trait]
pub trait InterceptionSink: Send + Sync {
    async fn on_tool_update(&self, _update: ToolUpdate) -> Result<()> {
        Ok(())
    }

    async fn on_tool_result(&self, _chunk: ChatCompletionChunk) -> Result<()> {
        Ok(())
    }

    async fn on_intercepted_tool_call(&self, _call: OpenAiToolCall) -> Result<()> {
        Ok(())
    }
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl InterceptionSink for NoopSink {}

type FallbackCallback = dyn Fn(&BoundaryError) + Send + Sync;

/// Session-scoped interception state for one conversation turn.
pub struct ToolInterceptor {
    mode: ToolLoopMode,
    schema_failure_mode: SchemaFailureMode,
    auto_fallback: bool,
    emit_tool_updates: bool,
    provider_id: String,
    allowed: HashSet<String>,
    schemas: SchemaMap,
    guard: LoopGuard,
    boundary: Arc<dyn ToolCallBoundary>,
    router: Option<ToolRouter>,
    mapper: ToolMapper,
    meta: ResponseMeta,
    session_id: String,
    on_fallback: Option<Arc<FallbackCallback>>,
}

impl ToolInterceptor {
    /// Interceptor with default settings for `allowed` tools.
    pub fn new(allowed: HashSet<String>, schemas: SchemaMap, meta: ResponseMeta) -> Self {
        Self::from_config(&RelayConfig::default(), allowed, schemas, meta)
    }

    pub fn from_config(
        config: &RelayConfig,
        allowed: HashSet<String>,
        schemas: SchemaMap,
        meta: ResponseMeta,
    ) -> Self {
        Self {
            mode: config.tool_loop_mode,
            schema_failure_mode: config.schema_failure_mode,
            auto_fallback: config.auto_fallback_to_legacy,
            emit_tool_updates: config.emit_tool_updates,
            provider_id: config.provider_id.clone(),
            allowed,
            schemas,
            guard: LoopGuard::new(config.max_repeat),
            boundary: create_boundary(config.boundary_mode, &config.provider_id),
            router: None,
            mapper: ToolMapper::new(),
            meta,
            session_id: String::new(),
            on_fallback: None,
        }
    }

    pub fn with_mode(mut self, mode: ToolLoopMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_schema_failure_mode(mut self, mode: SchemaFailureMode) -> Self {
        self.schema_failure_mode = mode;
        self
    }

    pub fn with_auto_fallback(mut self, enabled: bool) -> Self {
        self.auto_fallback = enabled;
        self
    }

    pub fn with_emit_tool_updates(mut self, enabled: bool) -> Self {
        self.emit_tool_updates = enabled;
        self
    }

    pub fn with_guard(mut self, guard: LoopGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_boundary(mut self, boundary: Arc<dyn ToolCallBoundary>) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_router(mut self, router: ToolRouter) -> Self {
        self.router = Some(router);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Called with the boundary error whenever `v1` falls back to `legacy`.
    pub fn with_fallback_callback(
        mut self,
        callback: impl Fn(&BoundaryError) + Send + Sync + 'static,
    ) -> Self {
        self.on_fallback = Some(Arc::new(callback));
        self
    }

    pub fn mode(&self) -> ToolLoopMode {
        self.mode
    }

    pub fn boundary_mode(&self) -> BoundaryMode {
        self.boundary.mode()
    }

    pub fn meta(&self) -> &ResponseMeta {
        &self.meta
    }

    pub fn guard(&self) -> &LoopGuard {
        &self.guard
    }

    pub fn guard_mut(&mut self) -> &mut LoopGuard {
        &mut self.guard
    }

    /// Decide what to do with `event`, falling back to the legacy boundary on
    /// boundary extraction errors when enabled.
    ///
    /// `Ok(None)` means the event is not an interceptable tool call and should
    /// go to the regular converter.
    pub async fn handle_event(
        &mut self,
        event: &ToolCallEvent,
        sink: &dyn InterceptionSink,
    ) -> Result<Option<InterceptionDecision>> {
        if self.mode == ToolLoopMode::Off {
            return Ok(None);
        }

        let boundary = Arc::clone(&self.boundary);
        let outcome = self.handle_event_with(boundary.as_ref(), event, sink).await;
        let primary_mode = boundary.mode();

        match outcome {
            Err(RelayError::Boundary(error))
                if self.auto_fallback && primary_mode != BoundaryMode::Legacy =>
            {
                tracing::warn!(
                    provider = %self.provider_id,
                    error = %error,
                    "boundary extraction failed; retrying with legacy boundary"
                );
                if let Some(callback) = &self.on_fallback {
                    callback(&error);
                }
                let legacy = LegacyBoundary::new(self.provider_id.clone());
                self.handle_event_with(&legacy, event, sink).await
            }
            other => other,
        }
    }

    /// Decide what to do with `event` using `boundary` only.
    pub async fn handle_event_with(
        &mut self,
        boundary: &dyn ToolCallBoundary,
        event: &ToolCallEvent,
        sink: &dyn InterceptionSink,
    ) -> Result<Option<InterceptionDecision>> {
        if self.mode == ToolLoopMode::Off {
            return Ok(None);
        }

        let allowed = self.extraction_allow_set();
        let Some(call) = boundary.maybe_extract_tool_call(event, &allowed)? else {
            return Ok(None);
        };

        let compat = apply_compat(&call, &self.schemas);
        let call = compat.tool_call;
        if !compat.collision_keys.is_empty() {
            tracing::debug!(tool = call.name(), collisions = ?compat.collision_keys, "alias collisions dropped");
        }

        if !compat.validation.ok {
            return self.handle_invalid(&call, &compat.validation, sink).await.map(Some);
        }

        let guard = self.guard.evaluate(&call);
        if guard.triggered {
            return Ok(Some(InterceptionDecision::terminated(loop_guard_termination(
                &guard,
            ))));
        }

        match self.mode {
            ToolLoopMode::Intercept => {
                tracing::debug!(tool = call.name(), call_id = %call.id, "intercepted tool call");
                sink.on_intercepted_tool_call(call).await?;
                Ok(Some(InterceptionDecision::intercepted()))
            }
            ToolLoopMode::ProxyExecute => self.execute(event, call, sink).await,
            ToolLoopMode::Off => Ok(None),
        }
    }

    fn extraction_allow_set(&self) -> HashSet<String> {
        let mut allowed = self.allowed.clone();
        if self.mode == ToolLoopMode::ProxyExecute {
            if let Some(router) = &self.router {
                allowed.extend(router.tool_names());
            }
        }
        allowed
    }

    async fn handle_invalid(
        &mut self,
        call: &OpenAiToolCall,
        validation: &ValidationResult,
        sink: &dyn InterceptionSink,
    ) -> Result<InterceptionDecision> {
        let guard = self.guard.evaluate_validation(call, &validation.signature());
        if guard.triggered {
            return Ok(InterceptionDecision::terminated(loop_guard_termination(&guard)));
        }

        if self.schema_failure_mode == SchemaFailureMode::Strict || validation.has_type_errors() {
            return Ok(InterceptionDecision::terminated(Termination {
                reason: TerminationReason::SchemaValidation,
                message: format!(
                    "Tool call '{}' failed schema validation ({}).",
                    call.name(),
                    validation.describe()
                ),
                error_class: Some(crate::guard::VALIDATION_CLASS.to_string()),
                fingerprint: None,
                missing: validation.missing.clone(),
                type_errors: validation.type_errors.clone(),
            }));
        }

        let hint = format!(
            "Skipped malformed tool call '{}' ({}). Retry with corrected arguments.",
            call.name(),
            validation.describe()
        );
        tracing::debug!(tool = call.name(), call_id = %call.id, "emitting malformed tool call hint");
        sink.on_tool_result(create_hint_chunk(&self.meta, hint)).await?;
        Ok(InterceptionDecision::handled())
    }

    async fn execute(
        &mut self,
        event: &ToolCallEvent,
        call: OpenAiToolCall,
        sink: &dyn InterceptionSink,
    ) -> Result<Option<InterceptionDecision>> {
        let Some(router) = self.router.as_ref().filter(|r| r.can_execute(call.name())) else {
            tracing::debug!(tool = call.name(), "no executor for tool call; passing through");
            return Ok(None);
        };

        if self.emit_tool_updates {
            for update in self.mapper.map_event(event, &self.session_id) {
                sink.on_tool_update(update).await?;
            }
        }

        let chunk = router.handle_tool_call(&call, &self.meta).await;
        sink.on_tool_result(chunk).await?;
        Ok(Some(InterceptionDecision::handled()))
    }
}

fn loop_guard_termination(guard: &LoopGuardDecision) -> Termination {
    Termination {
        reason: TerminationReason::LoopGuard,
        message: format!(
            "Stopped repeated failing calls to '{}' after {} attempts (limit {}). Fix the arguments or try a different approach.",
            guard.tool_name, guard.repeat_count, guard.max_repeat
        ),
        error_class: guard.error_class.clone(),
        fingerprint: Some(guard.fingerprint.clone()),
        missing: Vec::new(),
        type_errors: Vec::new(),
    }
}

impl fmt::Debug for ToolInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolInterceptor")
            .field("mode", &self.mode)
            .field("schema_failure_mode", &self.schema_failure_mode)
            .field("boundary", &self.boundary.mode())
            .field("auto_fallback", &self.auto_fallback)
            .field("allowed", &self.allowed)
            .field("router", &self.router)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tool_loop_mode_parses_aliases() {
        assert_eq!("intercept".parse::<ToolLoopMode>().unwrap(), ToolLoopMode::Intercept);
        assert_eq!("opencode".parse::<ToolLoopMode>().unwrap(), ToolLoopMode::Intercept);
        assert_eq!("proxy-exec".parse::<ToolLoopMode>().unwrap(), ToolLoopMode::ProxyExecute);
        assert_eq!("PROXY_EXECUTE".parse::<ToolLoopMode>().unwrap(), ToolLoopMode::ProxyExecute);
        assert_eq!("off".parse::<ToolLoopMode>().unwrap(), ToolLoopMode::Off);
        assert_eq!(ToolLoopMode::ProxyExecute.to_string(), "proxy_execute");
        assert!("sometimes".parse::<ToolLoopMode>().is_err());
    }

    #[test]
    fn schema_failure_mode_parses() {
        assert_eq!("strict".parse::<SchemaFailureMode>().unwrap(), SchemaFailureMode::Strict);
        assert_eq!(
            "pass_through".parse::<SchemaFailureMode>().unwrap(),
            SchemaFailureMode::PassThrough
        );
    }

    #[test]
    fn decisions_serialize_without_empty_termination() {
        let value = serde_json::to_value(InterceptionDecision::handled()).unwrap();
        assert_eq!(value, serde_json::json!({ "intercepted": false, "skip_converter": true }));
    }
}
