//! Chat answer streaming over server-sent events.

pub mod emitter;
pub mod protocol;
pub mod sanitize;

pub use emitter::{EmitterState, StreamEmitter};
pub use protocol::PipelineEvent;
pub use sanitize::{sanitize, sanitize_bundle, SanitizeMode};
