//! Anthropic Messages canonicalization.

use serde_json::Value;
use std::collections::HashMap;

use crate::error::RouteError;
use crate::types::canonical::{
	CanonicalMessage, CanonicalRequest, CanonicalTool, Content, ContentBlock, MessageRole,
	RequestMetadata, RequestParameters, ToolCall, ToolCallFunction,
};

pub fn to_canonical(
	mut body: Value,
	metadata: impl FnOnce(bool) -> RequestMetadata,
) -> Result<CanonicalRequest, RouteError> {
	let obj = body
		.as_object_mut()
		.ok_or_else(|| RouteError::MissingField("request body must be a JSON object".into()))?;

	let model = obj
		.remove("model")
		.and_then(|v| v.as_str().map(str::to_string))
		.ok_or_else(|| RouteError::MissingField("model".into()))?;

	let stream = obj
		.remove("stream")
		.and_then(|v| v.as_bool())
		.unwrap_or(false);

	let mut messages = Vec::new();

	// Lift `system` into a synthetic leading system message.
	if let Some(system) = obj.remove("system") {
		let text = match system {
			Value::String(s) => Some(s),
			Value::Array(blocks) => {
				let joined = blocks
					.iter()
					.filter_map(|b| b.get("text").and_then(Value::as_str))
					.collect::<Vec<_>>()
					.join("\n");
				if joined.is_empty() { None } else { Some(joined) }
			},
			_ => None,
		};
		if let Some(text) = text {
			messages.push(CanonicalMessage {
				role: MessageRole::System,
				content: Some(Content::Text(text)),
				tool_calls: None,
				tool_call_id: None,
				name: None,
			});
		}
	}

	let raw_messages = obj
		.remove("messages")
		.and_then(|v| v.as_array().cloned())
		.ok_or_else(|| RouteError::MissingField("messages".into()))?;

	for m in raw_messages {
		messages.extend(parse_message(m)?);
	}

	let tools = obj
		.remove("tools")
		.and_then(|v| v.as_array().cloned())
		.unwrap_or_default()
		.into_iter()
		.filter_map(parse_tool)
		.collect();

	let parameters = RequestParameters {
		temperature: obj.remove("temperature").and_then(|v| v.as_f64()),
		top_p: obj.remove("top_p").and_then(|v| v.as_f64()),
		max_tokens: obj.remove("max_tokens").and_then(|v| v.as_u64()),
		stop: obj.remove("stop_sequences").and_then(|v| {
			v.as_array().map(|arr| {
				arr.iter()
					.filter_map(|i| i.as_str().map(str::to_string))
					.collect()
			})
		}),
		stream,
	};

	let extra: HashMap<String, Value> = obj.clone().into_iter().collect();

	Ok(CanonicalRequest {
		model,
		messages,
		tools,
		parameters,
		metadata: metadata(stream),
		extra,
	})
}

/// One Anthropic message can expand into several canonical messages: an
/// assistant message with both text and `tool_use` blocks becomes one
/// assistant message (with `tool_calls`), and `tool_result` blocks in a user
/// message become their own `{role: tool}` messages.
fn parse_message(v: Value) -> Result<Vec<CanonicalMessage>, RouteError> {
	let obj = v
		.as_object()
		.ok_or_else(|| RouteError::MissingField("messages[*]".into()))?;
	let role_str = obj
		.get("role")
		.and_then(Value::as_str)
		.ok_or_else(|| RouteError::MissingField("messages[*].role".into()))?;
	let role = if role_str == "assistant" {
		MessageRole::Assistant
	} else {
		MessageRole::User
	};

	let content = obj.get("content").cloned().unwrap_or(Value::Null);
	let blocks = match content {
		Value::String(s) => {
			return Ok(vec![CanonicalMessage {
				role,
				content: Some(Content::Text(s)),
				tool_calls: None,
				tool_call_id: None,
				name: None,
			}]);
		},
		Value::Array(blocks) => blocks,
		_ => vec![],
	};

	let mut text_parts = Vec::new();
	let mut tool_calls = Vec::new();
	let mut tool_result_messages = Vec::new();

	for block in blocks {
		let Some(bobj) = block.as_object() else { continue };
		match bobj.get("type").and_then(Value::as_str) {
			Some("text") => {
				if let Some(t) = bobj.get("text").and_then(Value::as_str) {
					text_parts.push(t.to_string());
				}
			},
			Some("tool_use") => {
				let id = bobj
					.get("id")
					.and_then(Value::as_str)
					.unwrap_or_default()
					.to_string();
				let name = bobj
					.get("name")
					.and_then(Value::as_str)
					.unwrap_or_default()
					.to_string();
				let input = bobj.get("input").cloned().unwrap_or(Value::Object(Default::default()));
				tool_calls.push(ToolCall {
					id,
					kind: "function".to_string(),
					function: ToolCallFunction {
						name,
						arguments: serde_json::to_string(&input).unwrap_or_default(),
					},
				});
			},
			Some("tool_result") => {
				let tool_call_id = bobj
					.get("tool_use_id")
					.and_then(Value::as_str)
					.unwrap_or_default()
					.to_string();
				let text = extract_tool_result_text(bobj.get("content"));
				if text.is_empty() {
					return Err(RouteError::CompatToolTextEmpty);
				}
				tool_result_messages.push(CanonicalMessage {
					role: MessageRole::Tool,
					content: Some(Content::Text(text)),
					tool_calls: None,
					tool_call_id: Some(tool_call_id),
					name: None,
				});
			},
			_ => {},
		}
	}

	let mut out = Vec::new();
	if !text_parts.is_empty() || !tool_calls.is_empty() {
		out.push(CanonicalMessage {
			role,
			content: if text_parts.is_empty() {
				None
			} else {
				Some(Content::Text(text_parts.join("")))
			},
			tool_calls: if tool_calls.is_empty() {
				None
			} else {
				Some(tool_calls)
			},
			tool_call_id: None,
			name: None,
		});
	}
	out.extend(tool_result_messages);
	Ok(out)
}

fn extract_tool_result_text(content: Option<&Value>) -> String {
	match content {
		Some(Value::String(s)) => s.clone(),
		Some(Value::Array(blocks)) => blocks
			.iter()
			.filter_map(|b| b.get("text").and_then(Value::as_str))
			.collect::<Vec<_>>()
			.join(""),
		_ => String::new(),
	}
}

fn parse_tool(v: Value) -> Option<CanonicalTool> {
	let obj = v.as_object()?;
	Some(CanonicalTool {
		name: obj.get("name")?.as_str()?.to_string(),
		description: obj
			.get("description")
			.and_then(Value::as_str)
			.map(str::to_string),
		parameters: obj
			.get("input_schema")
			.cloned()
			.unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
	})
}

/// Render a canonical request into Anthropic Messages wire shape. Used by
/// compatibility when the selected provider family speaks Anthropic natively.
pub fn from_canonical(req: &CanonicalRequest) -> Value {
	let system = req.system_text();
	let messages: Vec<Value> = req
		.non_system_messages()
		.map(|m| {
			let mut blocks: Vec<Value> = Vec::new();
			if let Some(content) = &m.content {
				if !content.is_empty() {
					blocks.push(serde_json::json!({"type": "text", "text": content.as_text()}));
				}
			}
			if let Some(tool_calls) = &m.tool_calls {
				for tc in tool_calls {
					let input: Value =
						serde_json::from_str(&tc.function.arguments).unwrap_or(Value::Object(Default::default()));
					blocks.push(serde_json::json!({
						"type": "tool_use",
						"id": tc.id,
						"name": tc.function.name,
						"input": input,
					}));
				}
			}
			if m.role == MessageRole::Tool {
				return serde_json::json!({
					"role": "user",
					"content": [{
						"type": "tool_result",
						"tool_use_id": m.tool_call_id.clone().unwrap_or_default(),
						"content": m.content.as_ref().map(Content::as_text).unwrap_or_default(),
					}],
				});
			}
			serde_json::json!({
				"role": if m.role == MessageRole::Assistant { "assistant" } else { "user" },
				"content": blocks,
			})
		})
		.collect();

	let mut obj = serde_json::Map::new();
	obj.insert("model".to_string(), Value::String(req.model.clone()));
	obj.insert("messages".to_string(), Value::Array(messages));
	obj.insert(
		"max_tokens".to_string(),
		serde_json::json!(req.parameters.max_tokens.unwrap_or(4096)),
	);
	if let Some(system) = system {
		obj.insert("system".to_string(), Value::String(system));
	}
	if let Some(t) = req.parameters.temperature {
		obj.insert("temperature".to_string(), serde_json::json!(t));
	}
	if let Some(t) = req.parameters.top_p {
		obj.insert("top_p".to_string(), serde_json::json!(t));
	}
	if let Some(stop) = &req.parameters.stop {
		obj.insert("stop_sequences".to_string(), serde_json::json!(stop));
	}
	if !req.tools.is_empty() {
		obj.insert(
			"tools".to_string(),
			Value::Array(
				req
					.tools
					.iter()
					.map(|t| {
						serde_json::json!({
							"name": t.name,
							"description": t.description,
							"input_schema": t.parameters,
						})
					})
					.collect(),
			),
		);
	}
	obj.insert("stream".to_string(), Value::Bool(req.parameters.stream));
	Value::Object(obj)
}

// ContentBlock is re-exported for use by normalizer when rendering responses.
pub type AnthropicContentBlock = ContentBlock;
