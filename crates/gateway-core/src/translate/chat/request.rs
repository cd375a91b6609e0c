//! OpenAI Chat Completions → converse request translation (spec.md §4.4,
//! "Request translation"), grounded in the teacher's
//! `adapt_openai_to_genai` but targeting the provider's native converse
//! wire shape instead of an intermediate SDK type.

use async_openai::types::chat::{
    ChatCompletionMessageToolCalls, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestDeveloperMessageContent, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestToolMessageContent,
    ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
    ChatCompletionToolChoiceOption, ChatCompletionTools, CreateChatCompletionRequest,
    ToolChoiceOptions,
};
use serde_json::{Map, Value};

use crate::errors::GatewayError;
use crate::translate::converse::{
    ContentBlock, ConverseMessage, ConverseRequest, ConverseRole, GuardrailConfiguration,
    InferenceConfiguration, PerformanceConfig, ReasoningConfig, SystemBlock, ThinkingConfig,
    ToolChoiceSelection, ToolConfiguration, ToolInputSchema, ToolResultBlock, ToolResultContent,
    ToolSpec, ToolSpecInner, ToolUseBlock,
};
use crate::translate::media_blocks::{build_document_block, build_image_block, build_video_block, MediaResolver};

/// Per-request knobs that come from configuration or request headers
/// rather than the OpenAI body itself.
pub struct RequestTranslationContext {
    pub model_requires_reasoning: bool,
    pub model_uses_string_reasoning_config: bool,
    pub default_model_params: Value,
    pub guardrail: Option<GuardrailConfiguration>,
    /// `thinking_budget`, a vendor extension outside the OpenAI schema; the
    /// caller lifts it out of the raw request body before `req` is parsed
    /// into the typed [`CreateChatCompletionRequest`].
    pub thinking_budget: Option<u64>,
    /// `enable_thinking`, the same kind of vendor extension as
    /// `thinking_budget`.
    pub enable_thinking: Option<bool>,
}

/// Reasoning-effort → thinking-budget fraction, per spec.md §4.4.
fn effort_factor(effort: &str) -> Option<f64> {
    match effort {
        "minimal" => Some(0.25),
        "low" => Some(0.5),
        "medium" => Some(0.75),
        "high" => Some(1.0),
        _ => None,
    }
}

pub struct TranslatedRequest {
    pub messages: Vec<ConverseMessage>,
    pub system: Vec<SystemBlock>,
    pub tool_config: Option<ToolConfiguration>,
    pub inference_config: InferenceConfiguration,
    pub additional_model_request_fields: Value,
    pub reasoning_config: Option<ReasoningConfig>,
    pub guardrail_config: Option<GuardrailConfiguration>,
    pub legacy_function_call: bool,
}

impl TranslatedRequest {
    /// Assembles the wire request sent to the provider. `reasoning_config`
    /// has no dedicated slot on [`ConverseRequest`]; the provider expects
    /// it folded into `additionalModelRequestFields`, the same bag
    /// `default_model_params` contributes to. `latency` comes from request
    /// headers or configuration, not from the translated OpenAI body, so
    /// the caller supplies it directly.
    pub fn into_converse_request(self, latency: Option<String>) -> ConverseRequest {
        let mut additional = match self.additional_model_request_fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        if let Some(reasoning) = self.reasoning_config {
            if let Some(thinking) = reasoning.thinking {
                additional.insert("thinking".to_string(), serde_json::to_value(thinking).expect("thinking config serializes"));
            }
            if let Some(reasoning_config) = reasoning.reasoning_config {
                additional.insert("reasoning_config".to_string(), Value::String(reasoning_config));
            }
        }

        ConverseRequest {
            messages: self.messages,
            system: self.system,
            tool_config: self.tool_config,
            inference_config: self.inference_config,
            additional_model_request_fields: Value::Object(additional),
            guardrail_config: self.guardrail_config,
            performance_config: latency.map(|latency| PerformanceConfig { latency }),
        }
    }
}

pub async fn translate_request(
    req: &CreateChatCompletionRequest,
    ctx: &RequestTranslationContext,
    media_resolver: &MediaResolver,
) -> Result<TranslatedRequest, GatewayError> {
    let mut system = Vec::new();
    let mut messages = Vec::new();
    let mut legacy_function_call = false;
    let mut pending_tool_results: Vec<ToolResultBlock> = Vec::new();

    for message in &req.messages {
        match message {
            ChatCompletionRequestMessage::Developer(dev) => {
                system.push(SystemBlock { text: developer_text(&dev.content) });
            }
            ChatCompletionRequestMessage::System(sys) => {
                system.push(SystemBlock { text: system_text(&sys.content) });
            }
            ChatCompletionRequestMessage::User(user) => {
                flush_tool_results(&mut messages, &mut pending_tool_results);
                let content = user_content_blocks(&user.content, media_resolver).await?;
                if !content.is_empty() {
                    messages.push(ConverseMessage { role: ConverseRole::User, content });
                }
            }
            ChatCompletionRequestMessage::Assistant(asst) => {
                flush_tool_results(&mut messages, &mut pending_tool_results);
                let mut content = Vec::new();

                if let Some(text) = &asst.content {
                    let text = assistant_text(text);
                    if !text.trim().is_empty() {
                        content.push(ContentBlock::Text { text });
                    }
                }

                if let Some(tool_calls) = &asst.tool_calls {
                    for call in tool_calls {
                        if let ChatCompletionMessageToolCalls::Function(call) = call {
                            let input: Value = serde_json::from_str(&call.function.arguments)
                                .unwrap_or_else(|_| Value::Object(Map::new()));
                            content.push(ContentBlock::ToolUse(ToolUseBlock {
                                tool_use_id: call.id.clone(),
                                name: call.function.name.clone(),
                                input,
                            }));
                        }
                    }
                }

                if content.is_empty() {
                    continue;
                }
                messages.push(ConverseMessage { role: ConverseRole::Assistant, content });
            }
            ChatCompletionRequestMessage::Tool(tool) => {
                let text = tool_text(&tool.content);
                pending_tool_results.push(ToolResultBlock {
                    tool_use_id: tool.tool_call_id.clone(),
                    content: vec![ToolResultContent::Text { text }],
                    status: None,
                });
            }
            ChatCompletionRequestMessage::Function(func) => {
                legacy_function_call = true;
                let text = func.content.clone().unwrap_or_default();
                pending_tool_results.push(ToolResultBlock {
                    tool_use_id: func.name.clone(),
                    content: vec![ToolResultContent::Text { text }],
                    status: None,
                });
            }
        }
    }
    flush_tool_results(&mut messages, &mut pending_tool_results);

    let tool_config = build_tool_config(req)?;

    let mut inference_config = InferenceConfiguration {
        temperature: req.temperature,
        top_p: req.top_p,
        max_tokens: req.max_completion_tokens.or(req.max_tokens),
        stop_sequences: None,
        ..Default::default()
    };

    inference_config.stop_sequences = stop_sequences_from_request(req);

    let mut additional: Map<String, Value> = Map::new();
    if let Value::Object(defaults) = &ctx.default_model_params {
        for (key, value) in defaults {
            if !value.is_null() {
                additional.insert(key.clone(), value.clone());
            }
        }
    }

    let reasoning_config = build_reasoning_config(req, ctx, inference_config.max_tokens)?;

    Ok(TranslatedRequest {
        messages,
        system,
        tool_config,
        inference_config,
        additional_model_request_fields: Value::Object(additional),
        reasoning_config,
        guardrail_config: ctx.guardrail.clone(),
        legacy_function_call,
    })
}

/// `stop` accepts either a single string or an array in the OpenAI wire
/// shape; converse wants a flat list either way.
fn stop_sequences_from_request(req: &CreateChatCompletionRequest) -> Option<Vec<String>> {
    let value = serde_json::to_value(req.stop.as_ref()?).ok()?;
    match value {
        Value::String(s) => Some(vec![s]),
        Value::Array(items) => Some(items.into_iter().filter_map(|v| v.as_str().map(str::to_string)).collect()),
        _ => None,
    }
}

fn flush_tool_results(messages: &mut Vec<ConverseMessage>, pending: &mut Vec<ToolResultBlock>) {
    if pending.is_empty() {
        return;
    }
    let content = pending.drain(..).map(ContentBlock::ToolResult).collect();
    messages.push(ConverseMessage { role: ConverseRole::User, content });
}

fn build_tool_config(req: &CreateChatCompletionRequest) -> Result<Option<ToolConfiguration>, GatewayError> {
    let mut tools = Vec::new();

    if let Some(openai_tools) = &req.tools {
        for tool in openai_tools {
            match tool {
                ChatCompletionTools::Function(func) => {
                    tools.push(ToolSpec {
                        tool_spec: ToolSpecInner {
                            name: func.function.name.clone(),
                            description: func.function.description.clone(),
                            input_schema: ToolInputSchema {
                                json: func.function.parameters.clone().unwrap_or(Value::Object(Map::new())),
                            },
                        },
                    });
                }
                ChatCompletionTools::Custom(_) => {
                    return Err(GatewayError::UnsupportedParameter { param: "tools[].custom".to_string() });
                }
            }
        }
    }

    if let Some(functions) = &req.functions {
        for function in functions {
            tools.push(ToolSpec {
                tool_spec: ToolSpecInner {
                    name: function.name.clone(),
                    description: function.description.clone(),
                    input_schema: ToolInputSchema {
                        json: match function.parameters.clone() {
                            Value::Null => Value::Object(Map::new()),
                            other => other,
                        },
                    },
                },
            });
        }
    }

    if tools.is_empty() {
        return Ok(None);
    }

    let tool_choice = match &req.tool_choice {
        None => None,
        Some(ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::Auto)) => Some(ToolChoiceSelection::Auto {}),
        Some(ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::Required)) => Some(ToolChoiceSelection::Any {}),
        Some(ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::None)) => {
            return Err(GatewayError::UnsupportedParameter { param: "tool_choice=none".to_string() });
        }
        Some(ChatCompletionToolChoiceOption::Function(named)) => {
            Some(ToolChoiceSelection::Tool { name: named.function.name.clone() })
        }
        _ => None,
    };

    Ok(Some(ToolConfiguration { tools, tool_choice }))
}

fn build_reasoning_config(
    req: &CreateChatCompletionRequest,
    ctx: &RequestTranslationContext,
    max_tokens: Option<u32>,
) -> Result<Option<ReasoningConfig>, GatewayError> {
    let effort = req
        .reasoning_effort
        .as_ref()
        .and_then(|e| serde_json::to_value(e).ok())
        .and_then(|v| v.as_str().map(str::to_string));
    let thinking_budget = ctx.thinking_budget;

    if !ctx.model_requires_reasoning || (effort.is_none() && thinking_budget.is_none()) {
        return Ok(None);
    }

    if effort.is_some() && thinking_budget.is_some() {
        return Err(GatewayError::InvalidRequest(
            "reasoning_effort and thinking_budget are mutually exclusive".to_string(),
        ));
    }

    if thinking_budget.is_some() && ctx.enable_thinking != Some(true) {
        return Err(GatewayError::InvalidRequest(
            "thinking_budget requires enable_thinking to be set to true".to_string(),
        ));
    }

    let budget = if let Some(budget) = thinking_budget {
        budget as u32
    } else {
        let effort = effort.as_deref().unwrap();
        let factor = effort_factor(effort)
            .ok_or_else(|| GatewayError::InvalidRequest(format!("unknown reasoning_effort `{effort}`")))?;
        let max_tokens = max_tokens.unwrap_or(4096) as f64;
        (1024.0_f64).max(((max_tokens - 1.0) * factor).floor()) as u32
    };

    if ctx.model_uses_string_reasoning_config {
        let effort_name = effort.unwrap_or_else(|| "medium".to_string());
        let effort_name = if effort_name == "minimal" { "low".to_string() } else { effort_name };
        Ok(Some(ReasoningConfig { thinking: None, reasoning_config: Some(effort_name) }))
    } else {
        Ok(Some(ReasoningConfig {
            thinking: Some(ThinkingConfig::Enabled { budget_tokens: budget }),
            reasoning_config: None,
        }))
    }
}

fn developer_text(content: &ChatCompletionRequestDeveloperMessageContent) -> String {
    match content {
        ChatCompletionRequestDeveloperMessageContent::Text(t) => t.clone(),
        ChatCompletionRequestDeveloperMessageContent::Array(parts) => parts
            .iter()
            .map(|p| {
                let async_openai::types::chat::ChatCompletionRequestDeveloperMessageContentPart::Text(t) = p;
                t.text.clone()
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}

fn system_text(content: &ChatCompletionRequestSystemMessageContent) -> String {
    match content {
        ChatCompletionRequestSystemMessageContent::Text(t) => t.clone(),
        ChatCompletionRequestSystemMessageContent::Array(parts) => parts
            .iter()
            .map(|p| {
                let async_openai::types::chat::ChatCompletionRequestSystemMessageContentPart::Text(t) = p;
                t.text.clone()
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}

fn assistant_text(content: &ChatCompletionRequestAssistantMessageContent) -> String {
    match content {
        ChatCompletionRequestAssistantMessageContent::Text(t) => t.clone(),
        ChatCompletionRequestAssistantMessageContent::Array(parts) => parts
            .iter()
            .map(|p| match p {
                async_openai::types::chat::ChatCompletionRequestAssistantMessageContentPart::Text(t) => t.text.clone(),
                async_openai::types::chat::ChatCompletionRequestAssistantMessageContentPart::Refusal(r) => {
                    r.refusal.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}

fn tool_text(content: &ChatCompletionRequestToolMessageContent) -> String {
    match content {
        ChatCompletionRequestToolMessageContent::Text(t) => t.clone(),
        ChatCompletionRequestToolMessageContent::Array(parts) => parts
            .iter()
            .map(|p| {
                let async_openai::types::chat::ChatCompletionRequestToolMessageContentPart::Text(t) = p;
                t.text.clone()
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}

async fn user_content_blocks(
    content: &ChatCompletionRequestUserMessageContent,
    media_resolver: &MediaResolver,
) -> Result<Vec<ContentBlock>, GatewayError> {
    match content {
        ChatCompletionRequestUserMessageContent::Text(t) => {
            if t.trim().is_empty() {
                Ok(Vec::new())
            } else {
                Ok(vec![ContentBlock::Text { text: t.clone() }])
            }
        }
        ChatCompletionRequestUserMessageContent::Array(parts) => {
            let mut blocks = Vec::new();
            for part in parts {
                match part {
                    ChatCompletionRequestUserMessageContentPart::Text(t) => {
                        blocks.push(ContentBlock::Text { text: t.text.clone() });
                    }
                    ChatCompletionRequestUserMessageContentPart::ImageUrl(img) => {
                        blocks.push(build_image_block(&img.image_url.url, media_resolver).await?);
                    }
                    ChatCompletionRequestUserMessageContentPart::InputAudio(_) => {
                        return Err(GatewayError::UnsupportedParameter {
                            param: "content[].input_audio".to_string(),
                        });
                    }
                    ChatCompletionRequestUserMessageContentPart::File(file) => {
                        let file_value = serde_json::to_value(&file.file)
                            .map_err(|e| GatewayError::InvalidRequest(format!("file part serialization failed: {e}")))?;
                        let data = file_value
                            .get("file_data")
                            .and_then(Value::as_str)
                            .ok_or_else(|| GatewayError::InvalidRequest("file part missing file_data".to_string()))?;
                        let block = build_document_or_video_block(data)?;
                        blocks.push(block);
                    }
                }
            }
            Ok(blocks)
        }
    }
}

fn build_document_or_video_block(data_url: &str) -> Result<ContentBlock, GatewayError> {
    if let Ok(block) = build_video_block(data_url) {
        return Ok(block);
    }
    build_document_block(data_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> MediaResolver {
        MediaResolver { client: reqwest::Client::new(), block_private_networks: false }
    }

    fn ctx() -> RequestTranslationContext {
        RequestTranslationContext {
            model_requires_reasoning: false,
            model_uses_string_reasoning_config: false,
            default_model_params: Value::Null,
            guardrail: None,
            thinking_budget: None,
            enable_thinking: None,
        }
    }

    fn request_from_json(value: Value) -> CreateChatCompletionRequest {
        serde_json::from_value(value).expect("valid request fixture")
    }

    #[tokio::test]
    async fn system_and_user_text_become_system_block_and_user_message() {
        let req = request_from_json(serde_json::json!({
            "model": "anthropic.claude-3-5-sonnet",
            "messages": [
                {"role": "system", "content": "be terse"},
                {"role": "user", "content": "hello"},
            ],
        }));

        let translated = translate_request(&req, &ctx(), &resolver()).await.unwrap();
        assert_eq!(translated.system.len(), 1);
        assert_eq!(translated.system[0].text, "be terse");
        assert_eq!(translated.messages.len(), 1);
        assert!(matches!(translated.messages[0].role, ConverseRole::User));
    }

    #[tokio::test]
    async fn consecutive_tool_messages_merge_into_one_user_message() {
        let req = request_from_json(serde_json::json!({
            "model": "anthropic.claude-3-5-sonnet",
            "messages": [
                {"role": "user", "content": "what's the weather?"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "call_1", "type": "function", "function": {"name": "get_weather", "arguments": "{}"}},
                ]},
                {"role": "tool", "tool_call_id": "call_1", "content": "sunny"},
                {"role": "tool", "tool_call_id": "call_2", "content": "72F"},
            ],
        }));

        let translated = translate_request(&req, &ctx(), &resolver()).await.unwrap();
        let last = translated.messages.last().unwrap();
        assert!(matches!(last.role, ConverseRole::User));
        assert_eq!(last.content.len(), 2);
    }

    #[tokio::test]
    async fn custom_tool_choice_none_is_rejected() {
        let req = request_from_json(serde_json::json!({
            "model": "anthropic.claude-3-5-sonnet",
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [{"type": "function", "function": {"name": "f", "parameters": {}}}],
            "tool_choice": "none",
        }));

        let result = translate_request(&req, &ctx(), &resolver()).await;
        assert!(matches!(result, Err(GatewayError::UnsupportedParameter { .. })));
    }

    #[tokio::test]
    async fn reasoning_config_skipped_when_model_does_not_require_it() {
        let req = request_from_json(serde_json::json!({
            "model": "amazon.nova-pro",
            "messages": [{"role": "user", "content": "hi"}],
            "reasoning_effort": "high",
        }));

        let translated = translate_request(&req, &ctx(), &resolver()).await.unwrap();
        assert!(translated.reasoning_config.is_none());
    }

    #[tokio::test]
    async fn reasoning_budget_uses_effort_factor_with_floor_of_1024() {
        let req = request_from_json(serde_json::json!({
            "model": "anthropic.claude-3-7-sonnet",
            "messages": [{"role": "user", "content": "hi"}],
            "reasoning_effort": "low",
            "max_completion_tokens": 2000,
        }));
        let mut context = ctx();
        context.model_requires_reasoning = true;

        let translated = translate_request(&req, &context, &resolver()).await.unwrap();
        match translated.reasoning_config.unwrap().thinking.unwrap() {
            ThinkingConfig::Enabled { budget_tokens } => assert_eq!(budget_tokens, 1024),
        }
    }

    #[tokio::test]
    async fn explicit_thinking_budget_is_forwarded_to_provider() {
        let req = request_from_json(serde_json::json!({
            "model": "anthropic.claude-3-7-sonnet",
            "messages": [{"role": "user", "content": "hi"}],
        }));
        let mut context = ctx();
        context.model_requires_reasoning = true;
        context.thinking_budget = Some(2048);
        context.enable_thinking = Some(true);

        let translated = translate_request(&req, &context, &resolver()).await.unwrap();
        match translated.reasoning_config.unwrap().thinking.unwrap() {
            ThinkingConfig::Enabled { budget_tokens } => assert_eq!(budget_tokens, 2048),
        }
    }

    #[tokio::test]
    async fn reasoning_effort_and_explicit_thinking_budget_are_mutually_exclusive() {
        let req = request_from_json(serde_json::json!({
            "model": "anthropic.claude-3-7-sonnet",
            "messages": [{"role": "user", "content": "hi"}],
            "reasoning_effort": "high",
        }));
        let mut context = ctx();
        context.model_requires_reasoning = true;
        context.thinking_budget = Some(2048);

        let result = translate_request(&req, &context, &resolver()).await;
        assert!(matches!(result, Err(GatewayError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn thinking_budget_with_thinking_disabled_is_rejected() {
        let req = request_from_json(serde_json::json!({
            "model": "anthropic.claude-3-7-sonnet",
            "messages": [{"role": "user", "content": "hi"}],
        }));
        let mut context = ctx();
        context.model_requires_reasoning = true;
        context.thinking_budget = Some(2048);
        context.enable_thinking = Some(false);

        let result = translate_request(&req, &context, &resolver()).await;
        assert!(matches!(result, Err(GatewayError::InvalidRequest(_))));
    }

    #[test]
    fn stop_sequences_accepts_single_string_or_array() {
        let req = request_from_json(serde_json::json!({
            "model": "m",
            "messages": [],
            "stop": "STOP",
        }));
        assert_eq!(stop_sequences_from_request(&req), Some(vec!["STOP".to_string()]));

        let req = request_from_json(serde_json::json!({
            "model": "m",
            "messages": [],
            "stop": ["A", "B"],
        }));
        assert_eq!(stop_sequences_from_request(&req), Some(vec!["A".to_string(), "B".to_string()]));
    }

    #[tokio::test]
    async fn into_converse_request_folds_thinking_into_additional_fields() {
        let req = request_from_json(serde_json::json!({
            "model": "anthropic.claude-3-7-sonnet",
            "messages": [{"role": "user", "content": "hi"}],
            "reasoning_effort": "high",
            "max_completion_tokens": 4096,
        }));
        let mut context = ctx();
        context.model_requires_reasoning = true;

        let translated = translate_request(&req, &context, &resolver()).await.unwrap();
        let converse = translated.into_converse_request(Some("optimized".to_string()));

        assert!(converse.additional_model_request_fields["thinking"]["budgetTokens"].is_u64());
        assert_eq!(converse.performance_config.unwrap().latency, "optimized");
    }

    #[tokio::test]
    async fn into_converse_request_without_reasoning_has_empty_additional_fields() {
        let req = request_from_json(serde_json::json!({
            "model": "amazon.nova-pro",
            "messages": [{"role": "user", "content": "hi"}],
        }));

        let translated = translate_request(&req, &ctx(), &resolver()).await.unwrap();
        let converse = translated.into_converse_request(None);

        assert_eq!(converse.additional_model_request_fields, serde_json::json!({}));
        assert!(converse.performance_config.is_none());
    }
}
