//! Session controller.
//!
//! Owns the transcript and runs one turn at a time: opens the transport,
//! feeds chunks to a fresh `TurnInterpreter`, and settles the turn on exactly
//! one terminal message. `submit` takes `&mut self`, so a second turn cannot
//! start while one is streaming; a reveal still animating from the previous
//! turn is awaited before the next turn appends anything.

use crate::codec::TextChunkCodec;
use crate::config::SessionConfig;
use crate::constants::{
    invoice_not_found_message, result_delivered_message, TOOL_NOT_USED_MESSAGE,
    TOOL_NO_MATCH_MESSAGE, TRANSPORT_ERROR_MESSAGE,
};
use crate::interpreter::{ResultSink, TurnInterpreter, TurnSummary};
use crate::noise::{DefaultNoiseFilter, NarrationFilter};
use crate::transcript::TranscriptHandle;
use crate::transport::ChatTransport;
use crate::typing::{RevealHandle, RevealStatus, TypingRenderer};
use crate::types::{FallbackReason, InterpreterError, ObservedError, Result, Turn, TurnOutcome};
use futures_util::StreamExt;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tracing::Instrument;
use uuid::Uuid;

lazy_static! {
    static ref INVOICE_NUMBER: Regex = Regex::new(
        r"(?i)(?:\binvoice\b\s*(?:#|no\.?|number)?\s*[:#]?\s*|#)([a-z]{0,4}-?\d+)\b"
    )
    .expect("Invalid invoice number regex");
}

/// Pulls an invoice number out of the user's question, if there is one.
pub fn extract_invoice_number(input: &str) -> Option<String> {
    INVOICE_NUMBER
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Picks the terminal message for a stream that ended without a result.
pub fn resolve_unmatched(input: &str, summary: &TurnSummary) -> (TurnOutcome, String) {
    if let Some(number) = extract_invoice_number(input) {
        let message = invoice_not_found_message(&number);
        return (
            TurnOutcome::Fallback(FallbackReason::InvoiceNotFound(number)),
            message,
        );
    }
    if !summary.narration.is_empty() {
        return (TurnOutcome::Narration, summary.narration.clone());
    }
    if summary.saw_tool_output {
        return (
            TurnOutcome::Fallback(FallbackReason::ToolNoMatch),
            TOOL_NO_MATCH_MESSAGE.to_string(),
        );
    }
    (
        TurnOutcome::Fallback(FallbackReason::ToolNotUsed),
        TOOL_NOT_USED_MESSAGE.to_string(),
    )
}

pub struct SessionController {
    transcript: TranscriptHandle,
    transport: Arc<dyn ChatTransport>,
    filter: Arc<dyn NarrationFilter>,
    config: SessionConfig,
    pending_reveal: Option<RevealHandle>,
}

impl SessionController {
    pub fn new(transport: Arc<dyn ChatTransport>, config: SessionConfig) -> Self {
        Self {
            transcript: TranscriptHandle::new(),
            transport,
            filter: Arc::new(DefaultNoiseFilter),
            config,
            pending_reveal: None,
        }
    }

    /// Swaps the line classification rules.
    pub fn with_filter(mut self, filter: Arc<dyn NarrationFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn transcript(&self) -> &TranscriptHandle {
        &self.transcript
    }

    /// Waits for a reveal still animating from the last turn.
    pub async fn settle(&mut self) -> Option<RevealStatus> {
        match self.pending_reveal.take() {
            Some(handle) => Some(handle.finish().await),
            None => None,
        }
    }

    /// Abandons the running reveal, snapping it to its full text.
    pub async fn cancel_reveal(&mut self) -> Option<RevealStatus> {
        match self.pending_reveal.take() {
            Some(handle) => {
                handle.cancel();
                Some(handle.finish().await)
            }
            None => None,
        }
    }

    pub async fn submit(
        &mut self,
        input: &str,
        sink: &mut (dyn ResultSink + Send),
    ) -> Result<TurnOutcome> {
        if input.trim().is_empty() {
            return Err(InterpreterError::EmptyInput.into());
        }

        if let Some(status) = self.settle().await {
            tracing::debug!("[SESSION] Previous reveal settled: {:?}", status);
        }

        self.transcript.append(Turn::user(input))?;

        let turn_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("turn", turn_id = %turn_id);
        let outcome = self.run_turn(input, &turn_id, sink).instrument(span).await;

        self.transcript.scroll_to_latest();
        outcome
    }

    async fn run_turn(
        &mut self,
        input: &str,
        turn_id: &str,
        sink: &mut (dyn ResultSink + Send),
    ) -> Result<TurnOutcome> {
        let history = self.transcript.history();
        let stream = match self.transport.open(&history).await {
            Ok(stream) => stream,
            Err(e) => return self.fail_turn(e),
        };

        let mut chunks = FramedRead::new(StreamReader::new(stream), TextChunkCodec::new());
        let mut interpreter = TurnInterpreter::new(self.filter.clone(), self.config.max_buffer_bytes)
            .with_turn_id(turn_id);

        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(text) => {
                    interpreter.push_chunk(&text, sink);
                    if interpreter.is_resolved() {
                        break;
                    }
                }
                Err(e) => {
                    interpreter.abandon();
                    return self.fail_turn(e.into());
                }
            }
        }

        let summary = interpreter.finish();
        let (outcome, message) = match summary.resolved {
            Some(disposition) => (
                TurnOutcome::StructuredResult {
                    disposition,
                    count: summary.delivered,
                },
                result_delivered_message(summary.delivered),
            ),
            None => resolve_unmatched(input, &summary),
        };

        tracing::info!("[SESSION] Turn resolved: {:?}", outcome);
        self.show(message)?;
        Ok(outcome)
    }

    fn show(&mut self, message: String) -> Result<()> {
        match self.config.typing_interval {
            Some(interval) => {
                let renderer = TypingRenderer::new(interval);
                self.pending_reveal = Some(renderer.reveal(self.transcript.clone(), message)?);
            }
            None => {
                self.transcript.append(Turn::assistant(message))?;
            }
        }
        Ok(())
    }

    /// Transport failures end the turn on a fixed message, appended whole.
    fn fail_turn(&mut self, error: ObservedError) -> Result<TurnOutcome> {
        tracing::error!("[SESSION] Transport failure: {}", error);
        self.transcript
            .append(Turn::assistant(TRANSPORT_ERROR_MESSAGE))?;
        Ok(TurnOutcome::TransportFailure)
    }
}
