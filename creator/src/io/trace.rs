//! Span tree recorded alongside a run and written to `trace.json`.
//!
//! Tracing is bookkeeping only: unknown span ids, missing parents and an
//! unwritable trace file produce a warning and are otherwise ignored.

use std::fs;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::exit_code::status_from_reply;
use crate::core::types::{SpanKind, SpanStatus};

/// Handle to a span started on a [`Tracer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanId(usize);

#[derive(Debug, Clone)]
struct SpanRecord {
    name: String,
    kind: SpanKind,
    parent: Option<usize>,
    start_ms: i64,
    end_ms: Option<i64>,
    status: Option<SpanStatus>,
    metadata: Map<String, Value>,
    inputs: Map<String, Value>,
    outputs: Map<String, Value>,
}

/// Serialized span with its children.
#[derive(Debug, Clone, Serialize)]
pub struct Span {
    pub name: String,
    pub kind: SpanKind,
    pub start_time_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SpanStatus>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub inputs: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub outputs: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Span>,
}

#[derive(Debug, Default)]
pub struct Tracer {
    spans: Vec<SpanRecord>,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a span. A parent that does not exist turns the span into a root.
    pub fn start(&mut self, name: impl Into<String>, kind: SpanKind, parent: Option<SpanId>) -> SpanId {
        let name = name.into();
        let parent = match parent {
            Some(SpanId(idx)) if idx < self.spans.len() => Some(idx),
            Some(SpanId(idx)) => {
                warn!(span = %name, parent = idx, "unknown parent span, recording as root");
                None
            }
            None => None,
        };
        self.spans.push(SpanRecord {
            name,
            kind,
            parent,
            start_ms: Utc::now().timestamp_millis(),
            end_ms: None,
            status: None,
            metadata: Map::new(),
            inputs: Map::new(),
            outputs: Map::new(),
        });
        SpanId(self.spans.len() - 1)
    }

    pub fn set_metadata(&mut self, id: SpanId, key: &str, value: impl Into<Value>) {
        match self.spans.get_mut(id.0) {
            Some(span) => {
                span.metadata.insert(key.to_string(), value.into());
            }
            None => warn!(span = id.0, "metadata for unknown span ignored"),
        }
    }

    /// Close a span, attaching inputs/outputs.
    ///
    /// When the output mentions `exitcode: <n>` the span gets a status.
    pub fn finish(&mut self, id: SpanId, inputs: Map<String, Value>, outputs: Map<String, Value>) {
        let Some(span) = self.spans.get_mut(id.0) else {
            warn!(span = id.0, "finish for unknown span ignored");
            return;
        };
        span.status = outputs
            .values()
            .filter_map(Value::as_str)
            .find_map(status_from_reply);
        span.inputs = inputs;
        span.outputs = outputs;
        span.end_ms = Some(Utc::now().timestamp_millis());
    }

    /// Root spans with their nested children, in start order.
    pub fn tree(&self) -> Vec<Span> {
        (0..self.spans.len())
            .filter(|&idx| self.spans[idx].parent.is_none())
            .map(|idx| self.build(idx))
            .collect()
    }

    fn build(&self, idx: usize) -> Span {
        let record = &self.spans[idx];
        let children = (idx + 1..self.spans.len())
            .filter(|&child| self.spans[child].parent == Some(idx))
            .map(|child| self.build(child))
            .collect();
        Span {
            name: record.name.clone(),
            kind: record.kind,
            start_time_ms: record.start_ms,
            end_time_ms: record.end_ms,
            status: record.status,
            metadata: record.metadata.clone(),
            inputs: record.inputs.clone(),
            outputs: record.outputs.clone(),
            children,
        }
    }

    /// Write the span tree as JSON. Failures are logged, not returned.
    pub fn write(&self, path: &Path) {
        let mut buf = match serde_json::to_string_pretty(&self.tree()) {
            Ok(buf) => buf,
            Err(err) => {
                warn!(err = %err, "failed to serialize trace");
                return;
            }
        };
        buf.push('\n');
        match fs::write(path, buf) {
            Ok(()) => debug!(path = %path.display(), spans = self.spans.len(), "trace written"),
            Err(err) => warn!(err = %err, path = %path.display(), "failed to write trace"),
        }
    }
}

/// Build a one-entry JSON map.
pub fn field(key: &str, value: impl Into<Value>) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), value.into());
    map
}
