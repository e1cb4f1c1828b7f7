//! Per-turn stream interpreter.
//!
//! Feeds each chunk through the buffer, scanner and classifier. The first
//! structured result is handed to the sink inside the `push_chunk` call that
//! found it; after that the turn is resolved and further chunks are ignored.

use crate::classifier::{classify, Classification};
use crate::logging::StreamMetric;
use crate::noise::{self, NarrationFilter};
use crate::scanner::{split_segments, StreamBuffer};
use crate::str_utils::preview;
use crate::types::{Disposition, StructuredResult};
use std::sync::Arc;

/// Receives structured results from the interpreter.
pub trait ResultSink {
    fn on_structured_result(&mut self, result: StructuredResult);
}

impl<F> ResultSink for F
where
    F: FnMut(StructuredResult),
{
    fn on_structured_result(&mut self, result: StructuredResult) {
        self(result)
    }
}

/// What the interpreter knows once the stream has ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnSummary {
    pub resolved: Option<Disposition>,
    /// Invoices handed to the sink, zero when unresolved.
    pub delivered: usize,
    pub narration: String,
    pub saw_tool_output: bool,
}

pub struct TurnInterpreter {
    buffer: StreamBuffer,
    filter: Arc<dyn NarrationFilter>,
    narration: Vec<String>,
    saw_tool_output: bool,
    resolved: Option<Disposition>,
    delivered: usize,
    max_buffer_bytes: usize,
    metrics: StreamMetric,
}

impl TurnInterpreter {
    pub fn new(filter: Arc<dyn NarrationFilter>, max_buffer_bytes: usize) -> Self {
        Self {
            buffer: StreamBuffer::new(),
            filter,
            narration: Vec::new(),
            saw_tool_output: false,
            resolved: None,
            delivered: 0,
            max_buffer_bytes,
            metrics: StreamMetric::new(),
        }
    }

    pub fn with_turn_id(mut self, turn_id: impl Into<String>) -> Self {
        self.metrics = StreamMetric::for_turn(turn_id);
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    pub fn push_chunk(&mut self, chunk: &str, sink: &mut dyn ResultSink) -> Disposition {
        if let Some(disposition) = self.resolved {
            tracing::trace!("[INTERPRET] Turn already resolved, ignoring {} bytes", chunk.len());
            return disposition;
        }

        self.metrics.record_chunk(chunk);
        self.buffer.push(chunk);

        loop {
            let outcome = self.buffer.scan();
            let candidate = match outcome.payload {
                Some(candidate) => candidate,
                None => break,
            };
            self.metrics.candidates += 1;

            match classify(&candidate.value) {
                Classification::Result(result) => {
                    let disposition = result.disposition();
                    tracing::info!(
                        "[INTERPRET] {:?} with {} invoice(s) extracted",
                        disposition,
                        result.len()
                    );
                    self.resolved = Some(disposition);
                    self.delivered = result.len();
                    let consumed = self.buffer.consume(candidate.segment.start);
                    self.retain_narration(&consumed);
                    sink.on_structured_result(result);
                    return disposition;
                }
                Classification::Miss { .. } if !candidate.segment.terminated => {
                    // The line may still grow into a different span
                    break;
                }
                Classification::Miss { tool_output } => {
                    tracing::debug!(
                        "[INTERPRET] Payload did not classify (tool_output={}): {}",
                        tool_output,
                        preview(&self.buffer.as_str()[candidate.span.clone()], 120)
                    );
                    self.saw_tool_output |= tool_output;
                    let up_to = outcome.consumed_up_to.unwrap_or(candidate.segment.next);
                    let consumed = self.buffer.consume(up_to);
                    self.retain_narration(&consumed);
                }
            }
        }

        if self.buffer.len() > self.max_buffer_bytes {
            let settled = self.buffer.consume_settled();
            tracing::debug!(
                "[INTERPRET] Buffer over {} bytes, compacted {} settled bytes",
                self.max_buffer_bytes,
                settled.len()
            );
            self.retain_narration(&settled);
        }

        if self.buffer.as_str().contains('{') {
            Disposition::Pending
        } else {
            Disposition::PlainText
        }
    }

    /// Consumes the interpreter at end of stream.
    pub fn finish(mut self) -> TurnSummary {
        if self.resolved.is_none() {
            // End of stream terminates the open line; a payload there was
            // held back on a miss and still counts as tool output.
            if let Some(candidate) = self.buffer.scan().payload {
                if let Classification::Miss { tool_output } = classify(&candidate.value) {
                    self.saw_tool_output |= tool_output;
                }
            }
            let rest = self.buffer.take_all();
            self.retain_narration(&rest);
        }
        self.metrics.log_summary();
        TurnSummary {
            resolved: self.resolved,
            delivered: self.delivered,
            narration: noise::join_narration(&self.narration),
            saw_tool_output: self.saw_tool_output,
        }
    }

    /// Ends a turn that failed mid-stream. Only the metrics are kept.
    pub fn abandon(self) {
        tracing::debug!(
            "[INTERPRET] Abandoning turn with {} unscanned bytes",
            self.buffer.len()
        );
        self.metrics.log_summary();
    }

    fn retain_narration(&mut self, text: &str) {
        let segments = split_segments(text);
        let lines = segments.iter().map(|s| s.text(text));
        let kept = noise::filter(self.filter.as_ref(), lines);
        self.metrics.noise_lines += segments.len().saturating_sub(kept.len());
        self.metrics.narration_lines += kept.len();
        self.narration.extend(kept);
    }
}
