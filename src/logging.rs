use crate::redaction_layer::RedactingWriter;
use std::panic;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;

pub const LOG_FILE_NAME: &str = "invoice-chat.log";
pub const DEFAULT_LOG_FILTER: &str = "invoice_chat=info";

/// Installs the global subscriber: env filter, redacted daily log file, and
/// span trace capture for errors. Keep the guard alive for the whole run.
pub fn init_tracing(log_dir: &str) -> WorkerGuard {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => DEFAULT_LOG_FILTER.into(),
    };

    let _ = std::fs::create_dir_all(log_dir);
    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(move || RedactingWriter::new(non_blocking.clone()))
                .with_ansi(false),
        )
        .with(tracing_error::ErrorLayer::default())
        .init();

    guard
}

/// Sets up a global panic hook that logs panics using tracing.
pub fn setup_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();

        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "Unknown panic payload"
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(
            target: "panic",
            message = %message,
            location = %location,
            backtrace = %backtrace,
            "FATAL: Application panicked"
        );

        original_hook(panic_info);
    }));
}

/// Per-turn stream counters, logged once the turn ends.
#[derive(Debug, Default, Clone)]
pub struct StreamMetric {
    pub turn_id: Option<String>,
    pub chunks: usize,
    pub bytes: usize,
    pub candidates: usize,
    pub noise_lines: usize,
    pub narration_lines: usize,
}

impl StreamMetric {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_turn(turn_id: impl Into<String>) -> Self {
        Self {
            turn_id: Some(turn_id.into()),
            ..Self::default()
        }
    }

    pub fn record_chunk(&mut self, chunk: &str) {
        self.chunks += 1;
        self.bytes += chunk.len();
    }

    pub fn log_summary(&self) {
        let turn_id = self.turn_id.as_deref().unwrap_or("unknown");
        info!(
            target: "flight_recorder",
            "[STREAM END] TurnID: {} | Chunks: {} | Bytes: {} | Candidates: {} | Prose: {} | Noise: {}",
            turn_id, self.chunks, self.bytes, self.candidates, self.narration_lines, self.noise_lines
        );
    }
}
