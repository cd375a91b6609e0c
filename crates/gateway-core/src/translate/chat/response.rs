//! converse → OpenAI Chat Completions response translation (spec.md §4.4,
//! "Response translation", non-streaming path), grounded in the teacher's
//! `adapt_genai_to_openai`.

use async_openai::types::chat::{
    ChatChoice, CompletionTokensDetails, CompletionUsage, CreateChatCompletionResponse, FinishReason,
};
use serde_json::Value;

use crate::translate::converse::{ContentBlock, ConverseResponse};

pub fn finish_reason_from_stop_reason(stop_reason: &str, legacy_function_call: bool) -> FinishReason {
    match stop_reason {
        "max_tokens" => FinishReason::Length,
        "content_filtered" | "guardrail_intervened" => FinishReason::ContentFilter,
        "tool_use" if legacy_function_call => FinishReason::FunctionCall,
        "tool_use" => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

/// Text and reasoning text extracted from one converse response message,
/// plus any tool/function calls, kept separate so the caller can decide
/// how to fold them into the OpenAI message shape.
pub struct ExtractedContent {
    pub text: String,
    pub reasoning_text: String,
    pub tool_calls: Vec<ExtractedToolCall>,
}

pub struct ExtractedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

pub fn extract_content(resp: &ConverseResponse) -> ExtractedContent {
    let mut text = String::new();
    let mut reasoning_text = String::new();
    let mut tool_calls = Vec::new();

    for block in &resp.output.message.content {
        match block {
            ContentBlock::Text { text: t } => text.push_str(t),
            ContentBlock::ReasoningContent { reasoning_text: r } => reasoning_text.push_str(&r.text),
            ContentBlock::ToolUse(tool_use) => tool_calls.push(ExtractedToolCall {
                id: tool_use.tool_use_id.clone(),
                name: tool_use.name.clone(),
                arguments: tool_use.input.clone(),
            }),
            _ => {}
        }
    }

    ExtractedContent { text, reasoning_text, tool_calls }
}

/// Builds one OpenAI `ChatChoice` from one converse response, per
/// spec.md §4.4's finish-reason and tool-call mapping table.
pub fn build_choice(index: u32, resp: &ConverseResponse, legacy_function_call: bool) -> ChatChoice {
    let extracted = extract_content(resp);
    let finish_reason = finish_reason_from_stop_reason(&resp.stop_reason, legacy_function_call);

    let tool_calls_value: Vec<Value> = extracted
        .tool_calls
        .iter()
        .map(|call| {
            let arguments = serde_json::to_string(&call.arguments).unwrap_or_else(|_| "{}".to_string());
            if legacy_function_call {
                serde_json::json!({ "name": call.name, "arguments": arguments })
            } else {
                serde_json::json!({
                    "id": call.id,
                    "type": "function",
                    "function": { "name": call.name, "arguments": arguments },
                })
            }
        })
        .collect();

    let message_value = if legacy_function_call {
        serde_json::json!({
            "role": "assistant",
            "content": if extracted.text.is_empty() { Value::Null } else { Value::String(extracted.text) },
            "function_call": tool_calls_value.into_iter().next(),
        })
    } else {
        serde_json::json!({
            "role": "assistant",
            "content": if extracted.text.is_empty() { Value::Null } else { Value::String(extracted.text) },
            "tool_calls": if tool_calls_value.is_empty() { Value::Null } else { Value::Array(tool_calls_value) },
            "reasoning_content": if extracted.reasoning_text.is_empty() { Value::Null } else { Value::String(extracted.reasoning_text) },
        })
    };

    let message = serde_json::from_value(message_value).expect("constructed OpenAI message is valid");

    ChatChoice { index, message, finish_reason: Some(finish_reason), logprobs: None }
}

/// Sums usage across choices and, when reasoning text was produced without
/// a provider-reported reasoning-token count, folds in an estimate under
/// `completion_tokens_details.reasoning_tokens` (spec.md §4.4).
pub fn sum_usage(responses: &[ConverseResponse], reasoning_text_present: bool) -> CompletionUsage {
    let mut prompt_tokens = 0u32;
    let mut completion_tokens = 0u32;

    for resp in responses {
        prompt_tokens += resp.usage.input_tokens;
        completion_tokens += resp.usage.output_tokens;
    }

    let mut total_tokens = prompt_tokens + completion_tokens;
    let mut completion_tokens_details = None;

    if reasoning_text_present {
        let reasoning_estimate: u32 = responses
            .iter()
            .map(|r| {
                extract_content(r)
                    .reasoning_text
                    .split_whitespace()
                    .map(|w| crate::tokenizer::estimate_tokens(w, crate::tokenizer::Encoding::Cl100kBase))
                    .sum::<u32>()
            })
            .sum();
        if reasoning_estimate > 0 {
            completion_tokens += reasoning_estimate;
            total_tokens += reasoning_estimate;
            completion_tokens_details = Some(CompletionTokensDetails {
                reasoning_tokens: Some(reasoning_estimate),
                accepted_prediction_tokens: None,
                rejected_prediction_tokens: None,
                audio_tokens: None,
            });
        }
    }

    CompletionUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens,
        prompt_tokens_details: None,
        completion_tokens_details,
    }
}

pub fn assemble_response(model: String, choices: Vec<ChatChoice>, usage: CompletionUsage) -> CreateChatCompletionResponse {
    let value = serde_json::json!({
        "id": format!("chatcmpl-{}", uuid::Uuid::new_v4()),
        "object": "chat.completion",
        "created": chrono::Utc::now().timestamp() as u32,
        "model": model,
        "choices": choices,
        "usage": usage,
    });
    serde_json::from_value(value).expect("constructed OpenAI response is valid")
}

/// One synthesized `message.audio` attachment. The caller runs the TTS
/// invocation itself (through [`crate::translate::speech`], resolved via
/// the adapter registry) and plugs the result in with [`attach_audio`],
/// per spec.md §4.4.
pub struct AudioAttachment {
    pub id: String,
    pub data_base64: String,
    pub transcript: String,
    pub expires_at: i64,
}

pub fn attach_audio(choice_value: &mut Value, audio: AudioAttachment) {
    if let Some(message) = choice_value.get_mut("message") {
        message["audio"] = serde_json::json!({
            "id": audio.id,
            "data": audio.data_base64,
            "transcript": audio.transcript,
            "expires_at": audio.expires_at,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::converse::{ConverseMessage, ConverseOutput, ConverseRole, ConverseTokenUsage, ToolUseBlock};

    fn sample_response(stop_reason: &str, content: Vec<ContentBlock>) -> ConverseResponse {
        ConverseResponse {
            output: ConverseOutput { message: ConverseMessage { role: ConverseRole::Assistant, content } },
            stop_reason: stop_reason.to_string(),
            usage: ConverseTokenUsage { input_tokens: 10, output_tokens: 5, total_tokens: 15 },
        }
    }

    #[test]
    fn maps_tool_use_stop_reason_to_tool_calls() {
        let reason = finish_reason_from_stop_reason("tool_use", false);
        assert!(matches!(reason, FinishReason::ToolCalls));
    }

    #[test]
    fn maps_tool_use_stop_reason_to_function_call_when_legacy() {
        let reason = finish_reason_from_stop_reason("tool_use", true);
        assert!(matches!(reason, FinishReason::FunctionCall));
    }

    #[test]
    fn maps_guardrail_intervened_to_content_filter() {
        let reason = finish_reason_from_stop_reason("guardrail_intervened", false);
        assert!(matches!(reason, FinishReason::ContentFilter));
    }

    #[test]
    fn build_choice_extracts_text_and_tool_calls() {
        let resp = sample_response(
            "tool_use",
            vec![
                ContentBlock::Text { text: "thinking...".to_string() },
                ContentBlock::ToolUse(ToolUseBlock {
                    tool_use_id: "tu_1".to_string(),
                    name: "get_weather".to_string(),
                    input: serde_json::json!({"city": "nyc"}),
                }),
            ],
        );
        let choice = build_choice(0, &resp, false);
        assert!(matches!(choice.finish_reason, Some(FinishReason::ToolCalls)));
    }

    #[test]
    fn sum_usage_adds_reasoning_token_estimate() {
        let resp = sample_response(
            "end_turn",
            vec![ContentBlock::ReasoningContent {
                reasoning_text: crate::translate::converse::ReasoningTextBlock {
                    text: "one two three four five".to_string(),
                    signature: None,
                },
            }],
        );
        let usage = sum_usage(&[resp], true);
        assert!(usage.completion_tokens_details.is_some());
        assert!(usage.completion_tokens > 5);
    }

    #[test]
    fn sum_usage_without_reasoning_text_has_no_details() {
        let resp = sample_response("end_turn", vec![ContentBlock::Text { text: "hi".to_string() }]);
        let usage = sum_usage(&[resp], false);
        assert!(usage.completion_tokens_details.is_none());
    }
}
