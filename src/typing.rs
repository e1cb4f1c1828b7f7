//! Typing renderer.
//!
//! Reveals a finished narration string one character per tick into a single
//! in-progress assistant turn. Runs as its own task so transport reads are
//! never blocked on the animation.

use crate::str_utils::prefix_chars;
use crate::transcript::TranscriptHandle;
use crate::types::Result;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealStatus {
    Completed,
    /// Cancelled mid-way; the turn was snapped to its full text.
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Copy)]
pub struct TypingRenderer {
    interval: Duration,
}

impl TypingRenderer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Opens the in-progress turn, then animates it on a background task.
    pub fn reveal(&self, transcript: TranscriptHandle, text: String) -> Result<RevealHandle> {
        transcript.begin_in_progress()?;

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let interval = self.interval;
        let join = tokio::spawn(async move {
            match animate(&transcript, &text, interval, &task_cancel).await {
                Ok(status) => status,
                Err(e) => {
                    tracing::error!("[TYPING] Reveal aborted: {}", e.inner);
                    RevealStatus::Failed
                }
            }
        });
        Ok(RevealHandle { join, cancel })
    }
}

/// Advances the already opened in-progress turn one char per tick.
async fn animate(
    transcript: &TranscriptHandle,
    text: &str,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<RevealStatus> {
    let total = text.chars().count();
    tracing::debug!("[TYPING] Revealing {} chars", total);

    if total == 0 {
        transcript.update_in_progress("", false)?;
        return Ok(RevealStatus::Completed);
    }

    for shown in 1..=total {
        tokio::select! {
            _ = cancel.cancelled() => {
                transcript.update_in_progress(text, false)?;
                tracing::debug!("[TYPING] Reveal cancelled at {}/{}", shown - 1, total);
                return Ok(RevealStatus::Cancelled);
            }
            _ = tokio::time::sleep(interval) => {}
        }
        transcript.update_in_progress(prefix_chars(text, shown), shown < total)?;
    }

    Ok(RevealStatus::Completed)
}

#[derive(Debug)]
pub struct RevealHandle {
    join: JoinHandle<RevealStatus>,
    cancel: CancellationToken,
}

impl RevealHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the reveal task to end.
    pub async fn finish(self) -> RevealStatus {
        match self.join.await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!("[TYPING] Reveal task failed to join: {}", e);
                RevealStatus::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::TranscriptEvent;
    use crate::types::InterpreterError;

    #[tokio::test]
    async fn test_reveal_passes_through_every_prefix() {
        let transcript = TranscriptHandle::new();
        let mut rx = transcript.subscribe();
        let renderer = TypingRenderer::new(Duration::from_millis(1));

        let handle = match renderer.reveal(transcript.clone(), "hello".to_string()) {
            Ok(h) => h,
            Err(e) => panic!("reveal failed: {}", e),
        };
        assert_eq!(handle.finish().await, RevealStatus::Completed);

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TranscriptEvent::TurnUpdated { text, .. } = event {
                seen.push(text);
            }
        }
        assert_eq!(seen, vec!["h", "he", "hel", "hell", "hello"]);

        let snapshot = transcript.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.turns()[0].text, "hello");
        assert!(!snapshot.turns()[0].in_progress);
    }

    #[tokio::test]
    async fn test_cancel_snaps_to_full_text() {
        let transcript = TranscriptHandle::new();
        let renderer = TypingRenderer::new(Duration::from_secs(60));

        let handle = match renderer.reveal(transcript.clone(), "a long answer".to_string()) {
            Ok(h) => h,
            Err(e) => panic!("reveal failed: {}", e),
        };
        handle.cancel();
        assert_eq!(handle.finish().await, RevealStatus::Cancelled);

        let snapshot = transcript.snapshot();
        assert_eq!(snapshot.turns()[0].text, "a long answer");
        assert_eq!(snapshot.in_progress_count(), 0);
    }

    #[tokio::test]
    async fn test_turn_exists_before_animation_starts() {
        let transcript = TranscriptHandle::new();
        let renderer = TypingRenderer::new(Duration::from_secs(60));

        let handle = match renderer.reveal(transcript.clone(), "later".to_string()) {
            Ok(h) => h,
            Err(e) => panic!("reveal failed: {}", e),
        };
        let snapshot = transcript.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.turns()[0].text, "");
        assert!(snapshot.turns()[0].in_progress);

        handle.cancel();
        assert_eq!(handle.finish().await, RevealStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_second_reveal_is_rejected_while_one_runs() {
        let transcript = TranscriptHandle::new();
        let renderer = TypingRenderer::new(Duration::from_secs(60));

        let first = match renderer.reveal(transcript.clone(), "one".to_string()) {
            Ok(h) => h,
            Err(e) => panic!("reveal failed: {}", e),
        };
        match renderer.reveal(transcript.clone(), "two".to_string()) {
            Err(e) => assert!(matches!(e.inner, InterpreterError::RevealInFlight)),
            Ok(_) => panic!("second reveal must be rejected"),
        }
        first.cancel();
        first.finish().await;
        assert_eq!(transcript.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_text_finishes_immediately() {
        let transcript = TranscriptHandle::new();
        let cancel = CancellationToken::new();
        assert!(transcript.begin_in_progress().is_ok());
        let status = animate(&transcript, "", Duration::from_millis(1), &cancel).await;
        assert!(matches!(status, Ok(RevealStatus::Completed)));
        assert_eq!(transcript.snapshot().in_progress_count(), 0);
    }

    #[tokio::test]
    async fn test_multibyte_text_reveals_whole_chars() {
        let transcript = TranscriptHandle::new();
        let cancel = CancellationToken::new();
        let mut rx = transcript.subscribe();
        assert!(transcript.begin_in_progress().is_ok());
        let status = animate(&transcript, "€é", Duration::from_millis(1), &cancel).await;
        assert!(matches!(status, Ok(RevealStatus::Completed)));

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TranscriptEvent::TurnUpdated { text, .. } = event {
                seen.push(text);
            }
        }
        assert_eq!(seen, vec!["€", "€é"]);
    }
}
