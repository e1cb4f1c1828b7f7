//! Transcript state.
//!
//! At most one turn is in progress at a time and it is always the last
//! assistant turn. `update_in_progress` is the only way to touch it.

use crate::constants::TRANSCRIPT_EVENT_CAPACITY;
use crate::types::{InterpreterError, Result, Role, Turn};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TranscriptEvent {
    TurnAppended {
        index: usize,
        turn: Turn,
    },
    TurnUpdated {
        index: usize,
        text: String,
        in_progress: bool,
    },
    ScrollToLatest,
}

#[derive(Debug, Default, Clone)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn in_progress_count(&self) -> usize {
        self.turns.iter().filter(|t| t.in_progress).count()
    }

    fn in_progress_index(&self) -> Option<usize> {
        let last = self.turns.len().checked_sub(1)?;
        let turn = &self.turns[last];
        if turn.role == Role::Assistant && turn.in_progress {
            Some(last)
        } else {
            None
        }
    }

    fn push(&mut self, turn: Turn) -> Result<usize> {
        if turn.in_progress && self.in_progress_count() > 0 {
            return Err(InterpreterError::RevealInFlight.into());
        }
        self.turns.push(turn);
        Ok(self.turns.len() - 1)
    }

    fn update_in_progress(&mut self, text: &str, in_progress: bool) -> Option<usize> {
        let idx = self.in_progress_index()?;
        let turn = &mut self.turns[idx];
        turn.text.clear();
        turn.text.push_str(text);
        turn.in_progress = in_progress;
        Some(idx)
    }
}

/// Shared handle to the session transcript plus its change feed.
#[derive(Debug, Clone)]
pub struct TranscriptHandle {
    inner: Arc<RwLock<Transcript>>,
    tx: broadcast::Sender<TranscriptEvent>,
}

impl Default for TranscriptHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptHandle {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(TRANSCRIPT_EVENT_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(Transcript::new())),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TranscriptEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: TranscriptEvent) {
        // No subscribers is fine; the state itself is the source of truth
        let _ = self.tx.send(event);
    }

    fn write<T>(&self, f: impl FnOnce(&mut Transcript) -> T) -> Result<T> {
        match self.inner.write() {
            Ok(mut guard) => Ok(f(&mut guard)),
            Err(_) => Err(InterpreterError::Internal(
                "transcript lock poisoned".to_string(),
                tracing_error::SpanTrace::capture(),
            )
            .into()),
        }
    }

    pub fn snapshot(&self) -> Transcript {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Finished turns, in order, for sending back to the model.
    pub fn history(&self) -> Vec<Turn> {
        self.snapshot()
            .turns
            .into_iter()
            .filter(|t| !t.in_progress)
            .collect()
    }

    pub fn append(&self, turn: Turn) -> Result<usize> {
        let appended = turn.clone();
        let index = self.write(|t| t.push(turn))??;
        self.publish(TranscriptEvent::TurnAppended {
            index,
            turn: appended,
        });
        Ok(index)
    }

    /// Opens the single in-progress assistant turn.
    pub fn begin_in_progress(&self) -> Result<usize> {
        self.append(Turn {
            role: Role::Assistant,
            text: String::new(),
            in_progress: true,
        })
    }

    /// Replaces the in-progress turn's text. Returns false when no turn is
    /// in progress.
    pub fn update_in_progress(&self, text: &str, in_progress: bool) -> Result<bool> {
        let updated = self.write(|t| t.update_in_progress(text, in_progress))?;
        match updated {
            Some(index) => {
                self.publish(TranscriptEvent::TurnUpdated {
                    index,
                    text: text.to_string(),
                    in_progress,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn scroll_to_latest(&self) {
        self.publish(TranscriptEvent::ScrollToLatest);
    }
}
