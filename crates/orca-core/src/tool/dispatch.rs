//! Tool dispatcher
//!
//! Resolves model-issued tool calls against a [`ToolRegistry`], runs them,
//! and folds every outcome (missing tool, bad arguments, failure, panic)
//! into an error-flagged result. Nothing here returns `Err` to the caller.

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::join_all;
use tracing::{debug, warn};

use super::context::ToolContext;
use super::metrics::MetricsRegistry;
use super::registry::ToolRegistry;
use crate::Error;
use crate::llm::{ContentBlock, ToolCall};

/// Placeholder used when a tool returns nothing
pub const NO_OUTPUT: &str = "Tool returned no output";

/// How a batch is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// All calls run concurrently; results are reassembled in call order
    #[default]
    Parallel,
    /// Calls run one after another in call order
    Sequential,
}

/// Outcome of one tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocationResult {
    pub tool_use_id: String,
    pub tool_name: String,
    pub content: String,
    pub is_error: bool,
    pub latency: Duration,
}

impl ToolInvocationResult {
    /// Tool result block answering the originating call
    pub fn into_block(self) -> ContentBlock {
        ContentBlock::ToolResult {
            tool_use_id: self.tool_use_id,
            content: self.content,
            is_error: self.is_error,
        }
    }
}

/// Executes batches of tool calls against a registry
pub struct ToolDispatcher<'a> {
    registry: &'a ToolRegistry,
    metrics: Option<&'a MetricsRegistry>,
    mode: ExecutionMode,
}

impl<'a> ToolDispatcher<'a> {
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self {
            registry,
            metrics: None,
            mode: ExecutionMode::default(),
        }
    }

    /// Record `(latency, is_error)` for every invocation
    pub fn with_metrics(mut self, metrics: &'a MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Run a batch; the result has one entry per call, in call order.
    pub async fn dispatch(&self, calls: &[ToolCall], ctx: &ToolContext) -> Vec<ToolInvocationResult> {
        debug!(count = calls.len(), mode = ?self.mode, "Dispatching tool batch");

        match self.mode {
            ExecutionMode::Parallel => join_all(calls.iter().map(|call| self.invoke(call, ctx))).await,
            ExecutionMode::Sequential => {
                let mut results = Vec::with_capacity(calls.len());
                for call in calls {
                    results.push(self.invoke(call, ctx).await);
                }
                results
            }
        }
    }

    async fn invoke(&self, call: &ToolCall, ctx: &ToolContext) -> ToolInvocationResult {
        let Some(tool) = self.registry.get(&call.name) else {
            warn!(tool = %call.name, "Model requested an unknown tool");
            return ToolInvocationResult {
                tool_use_id: call.id.clone(),
                tool_name: call.name.clone(),
                content: Error::ToolNotFound(call.name.clone()).to_string(),
                is_error: true,
                latency: Duration::ZERO,
            };
        };

        let started = Instant::now();
        let outcome = AssertUnwindSafe(tool.execute(call.input.clone(), ctx))
            .catch_unwind()
            .await;
        let latency = started.elapsed();

        let (content, is_error) = match outcome {
            Ok(Ok(result)) if result.output.trim().is_empty() => (NO_OUTPUT.to_string(), result.is_error),
            Ok(Ok(result)) => (result.output, result.is_error),
            Ok(Err(Error::InvalidArguments(detail))) => (
                format!("Tool error in {}: Invalid arguments - {}", call.name, detail),
                true,
            ),
            Ok(Err(Error::ToolExecution(detail))) => {
                (format!("Tool error in {}: {}", call.name, detail), true)
            }
            Ok(Err(e)) => (format!("Tool error in {}: {}", call.name, e), true),
            Err(_) => (format!("Tool error in {}: tool panicked", call.name), true),
        };

        if let Some(metrics) = self.metrics {
            metrics.record(&call.name, latency, is_error);
        }

        debug!(
            tool = %call.name,
            latency_ms = latency.as_millis() as u64,
            is_error,
            "Tool call finished"
        );

        ToolInvocationResult {
            tool_use_id: call.id.clone(),
            tool_name: call.name.clone(),
            content,
            is_error,
            latency,
        }
    }
}
