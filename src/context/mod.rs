//! Request orchestration ahead of generation.
//!
//! Rewrites the conversation into a search query, runs retrieval and builds
//! the grounded prompt.

pub mod pipeline;
pub mod prompt;
pub mod rewriter;

pub use pipeline::{ChatPipeline, GenerationOptions, PreparedChat};
pub use prompt::PromptBuilder;
pub use rewriter::{latest_user_turn, QueryRewriter};
