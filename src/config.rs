use crate::constants::{DEFAULT_ENDPOINT, DEFAULT_MAX_BUFFER_BYTES, DEFAULT_TYPING_INTERVAL_MS};
use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
    #[arg(long, env = "CHAT_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,
    #[arg(long, default_value_t = DEFAULT_TYPING_INTERVAL_MS)]
    pub typing_interval_ms: u64,
    #[arg(long, default_value_t = false)]
    pub no_typing: bool,
    #[arg(long, default_value_t = DEFAULT_MAX_BUFFER_BYTES)]
    pub max_buffer_bytes: usize,
    #[arg(long, default_value_t = 120)]
    pub request_timeout_secs: u64,
    #[arg(long, default_value_t = 10)]
    pub connect_timeout_secs: u64,
    /// Replay a recorded response stream instead of calling the endpoint
    #[arg(long)]
    pub replay: Option<std::path::PathBuf>,
    #[arg(long, default_value_t = 64)]
    pub replay_chunk_size: usize,
    #[arg(long, default_value = "logs")]
    pub log_dir: String,
}

/// Library-side settings for a chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Delay between revealed characters. `None` appends turns whole.
    pub typing_interval: Option<Duration>,
    pub max_buffer_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            typing_interval: Some(Duration::from_millis(DEFAULT_TYPING_INTERVAL_MS)),
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
        }
    }
}

impl SessionConfig {
    pub fn without_typing(mut self) -> Self {
        self.typing_interval = None;
        self
    }

    pub fn with_typing_interval(mut self, interval: Duration) -> Self {
        self.typing_interval = if interval.is_zero() {
            None
        } else {
            Some(interval)
        };
        self
    }
}

impl From<&Args> for SessionConfig {
    fn from(args: &Args) -> Self {
        let config = SessionConfig {
            max_buffer_bytes: args.max_buffer_bytes.max(1),
            ..SessionConfig::default()
        };
        if args.no_typing {
            config.without_typing()
        } else {
            config.with_typing_interval(Duration::from_millis(args.typing_interval_ms))
        }
    }
}
