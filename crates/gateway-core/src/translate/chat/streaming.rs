//! Streaming converse events → OpenAI Chat Completions stream chunks
//! (spec.md §4.4 "Streaming" and the per-content-block state machine),
//! grounded in the teacher's `handle_streaming_request` generalized from
//! one event kind to the full converse event set.

use async_openai::types::chat::{
    ChatChoiceStream, ChatCompletionStreamResponseDelta, CreateChatCompletionStreamResponse, FinishReason,
};
use serde_json::Value;

use crate::translate::chat::response::finish_reason_from_stop_reason;
use crate::translate::converse::{ContentBlockDelta, ContentBlockStart, ConverseStreamEvent, ConverseTokenUsage};

/// Per-content-block state, per spec.md §4.4's state diagram:
/// `IDLE → (contentBlockStart) → OPEN → (contentBlockDelta) → OPEN →
/// (contentBlockStop) → DONE`, with `messageStop` moving either OPEN or
/// DONE to `ENDED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Idle,
    Open,
    Done,
    Ended,
}

struct ToolCallAccumulator {
    index: u32,
    id: String,
}

/// Per-choice accumulator driving one fanned-out converse stream; the
/// merge queue (spec.md §4.4 "Concurrency") owns one of these per choice
/// index.
pub struct ChunkAccumulator {
    pub block_state: BlockState,
    tool_calls: Vec<ToolCallAccumulator>,
    active_tool_call: Option<usize>,
    pub finish_reason: Option<FinishReason>,
    pub role_emitted: bool,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self {
            block_state: BlockState::Idle,
            tool_calls: Vec::new(),
            active_tool_call: None,
            finish_reason: None,
            role_emitted: false,
        }
    }

    /// Folds one converse-stream event into zero or more OpenAI delta
    /// fragments (each becomes one emitted chunk).
    pub fn fold_event(&mut self, event: &ConverseStreamEvent, legacy_function_call: bool) -> Vec<Value> {
        match event {
            ConverseStreamEvent::MessageStart { .. } => {
                self.role_emitted = true;
                vec![serde_json::json!({ "role": "assistant" })]
            }
            ConverseStreamEvent::ContentBlockStart { start, .. } => self.fold_content_block_start(start, legacy_function_call),
            ConverseStreamEvent::ContentBlockDelta { delta, .. } => self.fold_content_block_delta(delta, legacy_function_call),
            ConverseStreamEvent::ContentBlockStop { .. } => {
                self.block_state = BlockState::Done;
                self.active_tool_call = None;
                Vec::new()
            }
            ConverseStreamEvent::MessageStop { stop_reason } => {
                self.block_state = BlockState::Ended;
                self.finish_reason = Some(finish_reason_from_stop_reason(stop_reason, legacy_function_call));
                Vec::new()
            }
            ConverseStreamEvent::Metadata { .. } | ConverseStreamEvent::Unknown => Vec::new(),
        }
    }

    fn fold_content_block_start(&mut self, start: &ContentBlockStart, legacy_function_call: bool) -> Vec<Value> {
        self.block_state = BlockState::Open;
        let Some(tool_use) = &start.tool_use else { return Vec::new() };

        let index = self.tool_calls.len() as u32;
        self.tool_calls.push(ToolCallAccumulator { index, id: tool_use.tool_use_id.clone() });
        self.active_tool_call = Some(self.tool_calls.len() - 1);

        let delta = if legacy_function_call {
            serde_json::json!({ "function_call": { "name": tool_use.name } })
        } else {
            serde_json::json!({
                "tool_calls": [{
                    "index": index,
                    "id": tool_use.tool_use_id,
                    "type": "function",
                    "function": { "name": tool_use.name },
                }],
            })
        };
        vec![delta]
    }

    fn fold_content_block_delta(&mut self, delta: &ContentBlockDelta, legacy_function_call: bool) -> Vec<Value> {
        let mut fragments = Vec::new();

        if let Some(text) = &delta.text {
            if !text.is_empty() {
                fragments.push(serde_json::json!({ "content": text }));
            }
        }

        if let Some(reasoning) = &delta.reasoning_content {
            if let Some(text) = &reasoning.text {
                if !text.is_empty() {
                    fragments.push(serde_json::json!({ "reasoning_content": text }));
                }
            }
        }

        if let Some(tool_use) = &delta.tool_use {
            if let Some(input) = &tool_use.input {
                if let Some(idx) = self.active_tool_call {
                    let tool_call = &self.tool_calls[idx];
                    let fragment = if legacy_function_call {
                        serde_json::json!({ "function_call": { "arguments": input } })
                    } else {
                        serde_json::json!({
                            "tool_calls": [{ "index": tool_call.index, "function": { "arguments": input } }],
                        })
                    };
                    fragments.push(fragment);
                }
            }
        }

        fragments
    }
}

impl Default for ChunkAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

fn build_chunk(
    model: &str,
    choice_index: u32,
    delta_fragment: Value,
    finish_reason: Option<FinishReason>,
) -> CreateChatCompletionStreamResponse {
    let delta: ChatCompletionStreamResponseDelta =
        serde_json::from_value(delta_fragment).expect("delta fragment matches OpenAI delta shape");

    let value = serde_json::json!({
        "id": format!("chatcmpl-{}", uuid::Uuid::new_v4()),
        "object": "chat.completion.chunk",
        "created": chrono::Utc::now().timestamp() as u32,
        "model": model,
        "choices": vec![ChatChoiceStream { index: choice_index, delta, finish_reason, logprobs: None }],
        "usage": Value::Null,
    });
    serde_json::from_value(value).expect("constructed stream chunk is valid")
}

/// Translates one converse-stream event into zero or more OpenAI chunks
/// for `choice_index`, emitting a terminal chunk with the mapped finish
/// reason (and usage, if requested) on `messageStop`.
pub fn translate_stream_event(
    event: &ConverseStreamEvent,
    accumulator: &mut ChunkAccumulator,
    model: &str,
    choice_index: u32,
    legacy_function_call: bool,
) -> Vec<CreateChatCompletionStreamResponse> {
    let fragments = accumulator.fold_event(event, legacy_function_call);
    let mut chunks: Vec<CreateChatCompletionStreamResponse> = fragments
        .into_iter()
        .map(|fragment| build_chunk(model, choice_index, fragment, None))
        .collect();

    if matches!(event, ConverseStreamEvent::MessageStop { .. }) {
        chunks.push(build_chunk(model, choice_index, serde_json::json!({}), accumulator.finish_reason));
    }

    chunks
}

/// Attaches usage to a terminal chunk when `stream_options.include_usage`
/// was requested (spec.md §4.4).
pub fn attach_usage_to_chunk(chunk: &mut CreateChatCompletionStreamResponse, usage: &ConverseTokenUsage) {
    chunk.usage = Some(async_openai::types::chat::CompletionUsage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: usage.total_tokens,
        prompt_tokens_details: None,
        completion_tokens_details: None,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::converse::{ToolUseDelta, ToolUseStart};

    #[test]
    fn message_start_emits_role_only_chunk() {
        let mut accumulator = ChunkAccumulator::new();
        let chunks =
            translate_stream_event(&ConverseStreamEvent::MessageStart { role: crate::translate::converse::ConverseRole::Assistant }, &mut accumulator, "m", 0, false);
        assert_eq!(chunks.len(), 1);
        assert!(accumulator.role_emitted);
    }

    #[test]
    fn content_block_start_with_tool_use_emits_tool_call_header() {
        let mut accumulator = ChunkAccumulator::new();
        let event = ConverseStreamEvent::ContentBlockStart {
            content_block_index: 0,
            start: ContentBlockStart { tool_use: Some(ToolUseStart { tool_use_id: "tu_1".to_string(), name: "get_weather".to_string() }) },
        };
        let chunks = translate_stream_event(&event, &mut accumulator, "m", 0, false);
        assert_eq!(chunks.len(), 1);
        assert_eq!(accumulator.block_state, BlockState::Open);
    }

    #[test]
    fn content_block_delta_text_appends_to_content() {
        let mut accumulator = ChunkAccumulator::new();
        let event = ConverseStreamEvent::ContentBlockDelta {
            content_block_index: 0,
            delta: ContentBlockDelta { text: Some("hi".to_string()), reasoning_content: None, tool_use: None },
        };
        let chunks = translate_stream_event(&event, &mut accumulator, "m", 0, false);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn tool_use_input_delta_appends_to_active_tool_call_arguments() {
        let mut accumulator = ChunkAccumulator::new();
        let start_event = ConverseStreamEvent::ContentBlockStart {
            content_block_index: 0,
            start: ContentBlockStart { tool_use: Some(ToolUseStart { tool_use_id: "tu_1".to_string(), name: "f".to_string() }) },
        };
        translate_stream_event(&start_event, &mut accumulator, "m", 0, false);

        let delta_event = ConverseStreamEvent::ContentBlockDelta {
            content_block_index: 0,
            delta: ContentBlockDelta { text: None, reasoning_content: None, tool_use: Some(ToolUseDelta { input: Some("{\"a\":1}".to_string()) }) },
        };
        let chunks = translate_stream_event(&delta_event, &mut accumulator, "m", 0, false);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn message_stop_sets_finish_reason_and_flushes_terminal_chunk() {
        let mut accumulator = ChunkAccumulator::new();
        let event = ConverseStreamEvent::MessageStop { stop_reason: "tool_use".to_string() };
        let chunks = translate_stream_event(&event, &mut accumulator, "m", 0, false);
        assert_eq!(chunks.len(), 1);
        assert_eq!(accumulator.block_state, BlockState::Ended);
        assert!(matches!(accumulator.finish_reason, Some(FinishReason::ToolCalls)));
    }

    #[test]
    fn content_block_stop_marks_done_without_emitting() {
        let mut accumulator = ChunkAccumulator::new();
        let event = ConverseStreamEvent::ContentBlockStop { content_block_index: 0 };
        let chunks = translate_stream_event(&event, &mut accumulator, "m", 0, false);
        assert!(chunks.is_empty());
        assert_eq!(accumulator.block_state, BlockState::Done);
    }
}
