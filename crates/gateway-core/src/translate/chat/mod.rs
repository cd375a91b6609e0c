//! Chat Completions translation core (C8): request translation, response
//! translation, and the streaming chunk state machine, per spec.md §4.4.

pub mod request;
pub mod response;
pub mod streaming;

pub use request::{translate_request, RequestTranslationContext, TranslatedRequest};
pub use response::{assemble_response, attach_audio, build_choice, extract_content, sum_usage, AudioAttachment};
pub use streaming::{translate_stream_event, BlockState, ChunkAccumulator};
