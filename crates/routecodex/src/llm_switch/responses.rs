//! OpenAI Responses canonicalization (the less common inbound direction).

use serde_json::Value;
use std::collections::HashMap;

use crate::error::RouteError;
use crate::types::canonical::{
	CanonicalMessage, CanonicalRequest, Content, MessageRole, RequestMetadata, RequestParameters,
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

	// Lift `instructions` into a leading system message unless a mode flag
	// requests inline handling.
	let inline_instructions = obj
		.remove("inline_instructions")
		.and_then(|v| v.as_bool())
		.unwrap_or(false);
	let instructions = obj.remove("instructions").and_then(|v| v.as_str().map(str::to_string));
	if let Some(instructions) = &instructions {
		if !inline_instructions {
			messages.push(CanonicalMessage {
				role: MessageRole::System,
				content: Some(Content::Text(instructions.clone())),
				tool_calls: None,
				tool_call_id: None,
				name: None,
			});
		}
	}

	// `input` may be a bare string or an array of message-like items.
	match obj.remove("input") {
		Some(Value::String(s)) => messages.push(CanonicalMessage {
			role: MessageRole::User,
			content: Some(Content::Text(s)),
			tool_calls: None,
			tool_call_id: None,
			name: None,
		}),
		Some(Value::Array(items)) => {
			for item in items {
				if let Some(m) = parse_input_item(item) {
					messages.push(m);
				}
			}
		},
		_ => {},
	}

	let parameters = RequestParameters {
		temperature: obj.remove("temperature").and_then(|v| v.as_f64()),
		top_p: obj.remove("top_p").and_then(|v| v.as_f64()),
		max_tokens: obj
			.remove("max_output_tokens")
			.and_then(|v| v.as_u64()),
		stop: None,
		stream,
	};

	let extra: HashMap<String, Value> = obj.clone().into_iter().collect();

	Ok(CanonicalRequest {
		model,
		messages,
		tools: Vec::new(),
		parameters,
		metadata: metadata(stream),
		extra,
	})
}

fn parse_input_item(v: Value) -> Option<CanonicalMessage> {
	let obj = v.as_object()?;
	let role_str = obj.get("role").and_then(Value::as_str).unwrap_or("user");
	let role = match role_str {
		"system" | "developer" => MessageRole::System,
		"assistant" => MessageRole::Assistant,
		_ => MessageRole::User,
	};
	let text = match obj.get("content") {
		Some(Value::String(s)) => s.clone(),
		Some(Value::Array(blocks)) => blocks
			.iter()
			.filter_map(|b| b.get("text").and_then(Value::as_str))
			.collect::<Vec<_>>()
			.join(""),
		_ => return None,
	};
	Some(CanonicalMessage {
		role,
		content: Some(Content::Text(text)),
		tool_calls: None,
		tool_call_id: None,
		name: None,
	})
}

/// Render a canonical request into OpenAI Responses wire shape.
pub fn from_canonical(req: &CanonicalRequest) -> Value {
	let system = req.system_text();
	let input: Vec<Value> = req
		.non_system_messages()
		.map(|m| {
			serde_json::json!({
				"role": match m.role {
					MessageRole::Assistant => "assistant",
					MessageRole::Tool => "tool",
					_ => "user",
				},
				"content": m.content.as_ref().map(Content::as_text).unwrap_or_default(),
			})
		})
		.collect();

	let mut obj = serde_json::Map::new();
	obj.insert("model".to_string(), Value::String(req.model.clone()));
	obj.insert("input".to_string(), Value::Array(input));
	if let Some(system) = system {
		obj.insert("instructions".to_string(), Value::String(system));
	}
	if let Some(t) = req.parameters.max_tokens {
		obj.insert("max_output_tokens".to_string(), serde_json::json!(t));
	}
	if let Some(t) = req.parameters.temperature {
		obj.insert("temperature".to_string(), serde_json::json!(t));
	}
	obj.insert("stream".to_string(), Value::Bool(req.parameters.stream));
	Value::Object(obj)
}
