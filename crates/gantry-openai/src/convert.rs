//! Mapping between the provider-agnostic conversation model and the
//! chat-completions wire shapes.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use gantry_genai::{
    Candidate, Exchange, FinishReason, FunctionContent, GenMetadata, GenOptions, GenResponse,
    Message, Part, PartData, Role,
};

use crate::wire::{
    ChatChunk, ChatMessage, ChatRequest, ChatResponse, ContentPart, FunctionSpec, ImageUrl,
    MessageContent, ResponseFormat, StreamOptions, ToolCall, Usage,
};

const ROLE_SYSTEM: &str = "system";
const ROLE_USER: &str = "user";
const ROLE_ASSISTANT: &str = "assistant";
const ROLE_TOOL: &str = "tool";

fn role_to_wire(role: Role) -> &'static str {
    match role {
        Role::System => ROLE_SYSTEM,
        Role::User => ROLE_USER,
        Role::Assistant => ROLE_ASSISTANT,
    }
}

fn role_from_wire(role: &str) -> Role {
    match role {
        ROLE_SYSTEM => Role::System,
        ROLE_USER => Role::User,
        ROLE_ASSISTANT => Role::Assistant,
        _ => Role::Assistant,
    }
}

fn is_image(mime: &str) -> bool {
    mime.starts_with("image/")
}

pub(crate) fn chat_request(
    model: &str,
    exchange: &Exchange,
    options: &GenOptions,
    stream: bool,
) -> ChatRequest {
    let mut messages = Vec::new();
    if let Some(system) = &options.system_instruction {
        messages.push(ChatMessage::text(ROLE_SYSTEM, system.clone()));
    }
    for message in &exchange.messages {
        convert_message(message, &mut messages);
    }

    let json_output = options
        .output_mime
        .as_deref()
        .is_some_and(|mime| mime == gantry_codec::MIME_JSON);

    ChatRequest {
        model: model.to_string(),
        messages,
        stream: stream.then_some(true),
        stream_options: (stream && options.stream_usage)
            .then_some(StreamOptions { include_usage: true }),
        temperature: options.temperature,
        top_p: options.top_p,
        n: options.candidate_count,
        stop: (!options.stop_sequences.is_empty()).then(|| options.stop_sequences.clone()),
        max_tokens: options.max_tokens,
        presence_penalty: options.presence_penalty,
        frequency_penalty: options.frequency_penalty,
        seed: options.seed,
        response_format: json_output.then(|| ResponseFormat {
            kind: "json_object".to_string(),
        }),
    }
}

/// One source message becomes one wire message, preceded by a `tool` message
/// per function-response part. Text stays a plain string unless an image
/// part forces the content-part array.
fn convert_message(message: &Message, out: &mut Vec<ChatMessage>) {
    let mut texts: Vec<&str> = Vec::new();
    let mut parts: Vec<ContentPart> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    let mut saw_image = false;

    for part in &message.parts {
        match &part.data {
            PartData::Text(text) => {
                texts.push(text);
                parts.push(ContentPart::Text { text: text.clone() });
            }
            PartData::FileUri(uri) if is_image(&part.mime) => {
                saw_image = true;
                parts.push(ContentPart::ImageUrl {
                    image_url: ImageUrl { url: uri.clone() },
                });
            }
            PartData::Blob(data) if is_image(&part.mime) => {
                saw_image = true;
                parts.push(ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:{};base64,{}", part.mime, BASE64.encode(data)),
                    },
                });
            }
            PartData::FileUri(_) | PartData::Blob(_) => {
                tracing::warn!(part = %part.name, mime = %part.mime, "skipping non-image attachment");
            }
            PartData::FunctionCall { id, name, args } => {
                tool_calls.push(ToolCall {
                    id: id.clone(),
                    kind: "function".to_string(),
                    function: FunctionSpec {
                        name: name.clone(),
                        arguments: serde_json::Value::Object(args.clone()).to_string(),
                    },
                });
            }
            PartData::FunctionResponse(content) => {
                out.push(ChatMessage {
                    role: ROLE_TOOL.to_string(),
                    content: Some(MessageContent::Text(function_content_text(content))),
                    tool_calls: None,
                    tool_call_id: Some(part.name.clone()),
                });
            }
        }
    }

    let content = if saw_image {
        Some(MessageContent::Parts(parts))
    } else if texts.is_empty() {
        None
    } else {
        Some(MessageContent::Text(texts.join("\n")))
    };

    out.push(ChatMessage {
        role: role_to_wire(message.role).to_string(),
        content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
    });
}

fn function_content_text(content: &FunctionContent) -> String {
    match content {
        FunctionContent::Text(text) => text.clone(),
        FunctionContent::Uri(uri) => uri.clone(),
        FunctionContent::Blob(data) => BASE64.encode(data),
    }
}

pub(crate) fn finish_reason(raw: Option<&str>) -> FinishReason {
    match raw {
        None => FinishReason::InProgress,
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("tool_calls") => FinishReason::ToolCall,
        Some("content_filter") => FinishReason::ContentFilter,
        Some(_) => FinishReason::Unknown,
    }
}

fn wire_message_to_message(wire: ChatMessage) -> Message {
    let mut message = Message::new(role_from_wire(&wire.role));
    match wire.content {
        Some(MessageContent::Text(text)) => {
            if !text.is_empty() {
                message.parts.push(Part::text(text));
            }
        }
        Some(MessageContent::Parts(parts)) => {
            for part in parts {
                match part {
                    ContentPart::Text { text } => message.parts.push(Part::text(text)),
                    ContentPart::ImageUrl { image_url } => message
                        .parts
                        .push(Part::file_uri("image", "image/*", image_url.url)),
                }
            }
        }
        None => {}
    }
    if let Some(calls) = wire.tool_calls {
        for call in calls {
            let args = serde_json::from_str(&call.function.arguments).unwrap_or_default();
            message
                .parts
                .push(Part::function_call(call.id, call.function.name, args));
        }
    }
    message
}

fn metadata(usage: Option<Usage>) -> GenMetadata {
    usage
        .map(|usage| GenMetadata {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        })
        .unwrap_or_default()
}

pub(crate) fn to_gen_response(wire: ChatResponse) -> GenResponse {
    let candidates = wire
        .choices
        .into_iter()
        .map(|choice| Candidate {
            index: choice.index,
            finish_reason: finish_reason(choice.finish_reason.as_deref()),
            message: wire_message_to_message(choice.message),
        })
        .collect();
    GenResponse {
        candidates,
        metadata: metadata(wire.usage),
    }
}

/// One streaming chunk becomes one response; each choice's delta becomes a
/// message.
pub(crate) fn chunk_to_response(chunk: ChatChunk) -> GenResponse {
    let candidates = chunk
        .choices
        .into_iter()
        .map(|choice| {
            let role = choice
                .delta
                .role
                .as_deref()
                .map(role_from_wire)
                .unwrap_or(Role::Assistant);
            let mut message = Message::new(role);
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    message.parts.push(Part::text(content));
                }
            }
            Candidate {
                index: choice.index,
                finish_reason: finish_reason(choice.finish_reason.as_deref()),
                message,
            }
        })
        .collect();
    GenResponse {
        candidates,
        metadata: metadata(chunk.usage),
    }
}
