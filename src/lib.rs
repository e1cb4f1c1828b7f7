pub mod classifier;
pub mod codec;
pub mod config;
pub mod constants;
pub mod interpreter;
pub mod logging;
pub mod noise;
pub mod redaction_layer;
pub mod scanner;
pub mod session;
pub mod str_utils;
pub mod transcript;
pub mod transport;
pub mod typing;
pub mod types;

pub use types::*;

pub use config::{Args, SessionConfig};
pub use interpreter::{ResultSink, TurnInterpreter, TurnSummary};
pub use session::SessionController;
pub use transcript::{TranscriptEvent, TranscriptHandle};
