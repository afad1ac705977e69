//! AI enrichment stage
//!
//! Multi-credential chat-completions client with per-key sliding-window rate
//! limiting and a bounded worker pool. Site pacing elsewhere is best-effort
//! courtesy; the quota here costs real API budget and is strictly enforced.

pub mod key_pool;
pub mod processor;
pub mod prompts;

pub use key_pool::{AiError, KeyPool};
pub use processor::{AiBatchStats, AiProcessor, ProgressCallback};
