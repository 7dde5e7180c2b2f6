//! OpenAI chat-completions canonicalization. This is the pivot shape, so
//! to-canonical is mostly normalization.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::RouteError;
use crate::types::canonical::{
	CanonicalMessage, CanonicalRequest, CanonicalTool, Content, MessageRole, RequestMetadata,
	RequestParameters, ToolCall, ToolCallFunction,
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

	let raw_messages = obj
		.remove("messages")
		.and_then(|v| v.as_array().cloned())
		.ok_or_else(|| RouteError::MissingField("messages".into()))?;

	let messages = raw_messages
		.into_iter()
		.map(parse_message)
		.collect::<Result<Vec<_>, _>>()?;

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
		max_tokens: obj
			.remove("max_tokens")
			.or_else(|| obj.remove("max_completion_tokens"))
			.and_then(|v| v.as_u64()),
		stop: parse_stop(obj.remove("stop")),
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

fn parse_stop(v: Option<Value>) -> Option<Vec<String>> {
	match v? {
		Value::String(s) => Some(vec![s]),
		Value::Array(items) => Some(
			items
				.into_iter()
				.filter_map(|i| i.as_str().map(str::to_string))
				.collect(),
		),
		_ => None,
	}
}

fn parse_message(v: Value) -> Result<CanonicalMessage, RouteError> {
	let obj = v
		.as_object()
		.ok_or_else(|| RouteError::MissingField("messages[*]".into()))?;
	let role_str = obj
		.get("role")
		.and_then(Value::as_str)
		.ok_or_else(|| RouteError::MissingField("messages[*].role".into()))?;
	let role = match role_str {
		"system" | "developer" => MessageRole::System,
		"assistant" => MessageRole::Assistant,
		"tool" => MessageRole::Tool,
		_ => MessageRole::User,
	};

	let content = obj.get("content").cloned().and_then(|c| {
		if c.is_null() {
			None
		} else {
			serde_json::from_value::<Content>(c).ok()
		}
	});

	let tool_calls = obj
		.get("tool_calls")
		.and_then(Value::as_array)
		.map(|arr| {
			arr.iter()
				.filter_map(|tc| parse_tool_call(tc.clone()))
				.collect::<Vec<_>>()
		})
		.filter(|v| !v.is_empty());

	Ok(CanonicalMessage {
		role,
		content,
		tool_calls,
		tool_call_id: obj
			.get("tool_call_id")
			.and_then(Value::as_str)
			.map(str::to_string),
		name: obj.get("name").and_then(Value::as_str).map(str::to_string),
	})
}

/// Tool-call arguments must be a JSON string on the wire; non-JSON
/// response-side arguments are rejected rather than silently kept.
fn parse_tool_call(v: Value) -> Option<ToolCall> {
	let obj = v.as_object()?;
	let id = obj.get("id")?.as_str()?.to_string();
	let func = obj.get("function")?.as_object()?;
	let name = func.get("name")?.as_str()?.to_string();
	let arguments = match func.get("arguments")? {
		Value::String(s) => s.clone(),
		other => serde_json::to_string(other).ok()?,
	};
	Some(ToolCall {
		id,
		kind: "function".to_string(),
		function: ToolCallFunction { name, arguments },
	})
}

fn parse_tool(v: Value) -> Option<CanonicalTool> {
	let obj = v.as_object()?;
	if obj.get("type").and_then(Value::as_str) != Some("function") {
		return None;
	}
	let func = obj.get("function")?.as_object()?;
	Some(CanonicalTool {
		name: func.get("name")?.as_str()?.to_string(),
		description: func
			.get("description")
			.and_then(Value::as_str)
			.map(str::to_string),
		parameters: func
			.get("parameters")
			.cloned()
			.unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
	})
}

/// Serialize a canonical request back into openai-chat wire shape (used both
/// as the pivot's own "passthrough" encode and by compatibility as the
/// starting point for provider-specific field mapping).
pub fn from_canonical(req: &CanonicalRequest) -> Value {
	let mut messages = Vec::new();
	for m in &req.messages {
		let mut obj = serde_json::Map::new();
		obj.insert(
			"role".to_string(),
			Value::String(role_str(m.role).to_string()),
		);
		match (&m.content, &m.tool_calls) {
			(content, Some(tool_calls)) => {
				// When tool_calls are present, content defaults to "" if absent.
				obj.insert(
					"content".to_string(),
					content
						.as_ref()
						.map(|c| Value::String(c.as_text()))
						.unwrap_or_else(|| Value::String(String::new())),
				);
				obj.insert(
					"tool_calls".to_string(),
					Value::Array(
						tool_calls
							.iter()
							.map(|tc| {
								serde_json::json!({
									"id": tc.id,
									"type": tc.kind,
									"function": { "name": tc.function.name, "arguments": tc.function.arguments },
								})
							})
							.collect(),
					),
				);
			},
			(Some(content), None) => {
				obj.insert("content".to_string(), Value::String(content.as_text()));
			},
			(None, None) => {},
		}
		if let Some(id) = &m.tool_call_id {
			obj.insert("tool_call_id".to_string(), Value::String(id.clone()));
		}
		if let Some(name) = &m.name {
			obj.insert("name".to_string(), Value::String(name.clone()));
		}
		messages.push(Value::Object(obj));
	}

	let mut obj = serde_json::Map::new();
	obj.insert("model".to_string(), Value::String(req.model.clone()));
	obj.insert("messages".to_string(), Value::Array(messages));
	if !req.tools.is_empty() {
		obj.insert(
			"tools".to_string(),
			Value::Array(
				req
					.tools
					.iter()
					.map(|t| {
						serde_json::json!({
							"type": "function",
							"function": {
								"name": t.name,
								"description": t.description,
								"parameters": t.parameters,
							}
						})
					})
					.collect(),
			),
		);
	}
	if let Some(t) = req.parameters.temperature {
		obj.insert("temperature".to_string(), serde_json::json!(t));
	}
	if let Some(t) = req.parameters.top_p {
		obj.insert("top_p".to_string(), serde_json::json!(t));
	}
	if let Some(t) = req.parameters.max_tokens {
		obj.insert("max_tokens".to_string(), serde_json::json!(t));
	}
	if let Some(stop) = &req.parameters.stop {
		obj.insert("stop".to_string(), serde_json::json!(stop));
	}
	obj.insert("stream".to_string(), Value::Bool(req.parameters.stream));
	for (k, v) in &req.extra {
		obj.entry(k.clone()).or_insert(v.clone());
	}
	Value::Object(obj)
}

fn role_str(role: MessageRole) -> &'static str {
	match role {
		MessageRole::System => "system",
		MessageRole::User => "user",
		MessageRole::Assistant => "assistant",
		MessageRole::Tool => "tool",
	}
}
