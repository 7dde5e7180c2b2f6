//! Response Normalizer: rewraps a provider's non-streaming JSON body into
//! the client's originally requested protocol, and owns the SSE transcoding
//! state machine used for the streaming path.

pub mod frame;
pub mod sse;

use serde_json::Value;

use crate::error::RouteError;
use crate::types::protocol::WireProtocol;

/// `finish_reason -> stop_reason`, the fixed table from the streaming spec.
pub fn map_finish_reason(finish_reason: &str) -> &'static str {
	match finish_reason {
		"stop" => "end_turn",
		"length" => "max_tokens",
		"tool_calls" => "tool_use",
		"content_filter" => "blocked",
		_ => "end_turn",
	}
}

fn map_stop_reason_to_finish_reason(stop_reason: &str) -> &'static str {
	match stop_reason {
		"end_turn" | "stop_sequence" => "stop",
		"max_tokens" => "length",
		"tool_use" => "tool_calls",
		"blocked" => "content_filter",
		_ => "stop",
	}
}

/// `usage.prompt_tokens -> input_tokens`, `usage.completion_tokens ->
/// output_tokens`, carrying `total_tokens` through unchanged.
pub fn map_usage(usage: &Value) -> Value {
	serde_json::json!({
		"input_tokens": usage.get("prompt_tokens").or_else(|| usage.get("input_tokens")).cloned().unwrap_or(Value::Null),
		"output_tokens": usage.get("completion_tokens").or_else(|| usage.get("output_tokens")).cloned().unwrap_or(Value::Null),
	})
}

fn map_usage_to_openai(usage: &Value) -> Value {
	serde_json::json!({
		"prompt_tokens": usage.get("input_tokens").cloned().unwrap_or(Value::Null),
		"completion_tokens": usage.get("output_tokens").cloned().unwrap_or(Value::Null),
		"total_tokens": add_tokens(usage.get("input_tokens"), usage.get("output_tokens")),
	})
}

fn add_tokens(a: Option<&Value>, b: Option<&Value>) -> Value {
	match (a.and_then(Value::as_u64), b.and_then(Value::as_u64)) {
		(Some(a), Some(b)) => serde_json::json!(a + b),
		_ => Value::Null,
	}
}

/// Rewrap a non-streaming provider body, already through Compatibility's
/// outgoing inverse mapping, into the protocol the client originally spoke.
/// A body already shaped like `target` is returned unchanged.
pub fn normalize_response(body: Value, from: WireProtocol, to: WireProtocol) -> Result<Value, RouteError> {
	if from == to {
		return Ok(body);
	}
	match (from, to) {
		(WireProtocol::OpenaiChat, WireProtocol::AnthropicMessages) => Ok(openai_chat_to_anthropic(&body)),
		(WireProtocol::AnthropicMessages, WireProtocol::OpenaiChat) => Ok(anthropic_to_openai_chat(&body)),
		_ => Err(RouteError::UnsupportedConversion(rc_core::strng::new(&format!(
			"no response normalizer from {:?} to {:?}",
			from, to
		)))),
	}
}

fn openai_chat_to_anthropic(body: &Value) -> Value {
	let choice = body.get("choices").and_then(|c| c.as_array()).and_then(|a| a.first());
	let message = choice.and_then(|c| c.get("message"));

	let mut content = Vec::new();
	if let Some(text) = message.and_then(|m| m.get("content")).and_then(Value::as_str) {
		if !text.is_empty() {
			content.push(serde_json::json!({"type": "text", "text": text}));
		}
	}
	if let Some(tool_calls) = message.and_then(|m| m.get("tool_calls")).and_then(Value::as_array) {
		for tc in tool_calls {
			let id = tc.get("id").and_then(Value::as_str).unwrap_or_default();
			let name = tc.get("function").and_then(|f| f.get("name")).and_then(Value::as_str).unwrap_or_default();
			let arguments = tc.get("function").and_then(|f| f.get("arguments")).and_then(Value::as_str).unwrap_or("{}");
			let input: Value = serde_json::from_str(arguments).unwrap_or(Value::Object(Default::default()));
			content.push(serde_json::json!({"type": "tool_use", "id": id, "name": name, "input": input}));
		}
	}

	let finish_reason = choice.and_then(|c| c.get("finish_reason")).and_then(Value::as_str).unwrap_or("stop");
	let usage = body.get("usage").map(map_usage).unwrap_or_else(|| serde_json::json!({}));

	serde_json::json!({
		"id": body.get("id").cloned().unwrap_or(Value::Null),
		"type": "message",
		"role": "assistant",
		"model": body.get("model").cloned().unwrap_or(Value::Null),
		"content": content,
		"stop_reason": map_finish_reason(finish_reason),
		"usage": usage,
	})
}

fn anthropic_to_openai_chat(body: &Value) -> Value {
	let mut text_parts = Vec::new();
	let mut tool_calls = Vec::new();
	if let Some(blocks) = body.get("content").and_then(Value::as_array) {
		for block in blocks {
			match block.get("type").and_then(Value::as_str) {
				Some("text") => {
					if let Some(t) = block.get("text").and_then(Value::as_str) {
						text_parts.push(t.to_string());
					}
				},
				Some("tool_use") => {
					let id = block.get("id").and_then(Value::as_str).unwrap_or_default();
					let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
					let input = block.get("input").cloned().unwrap_or(Value::Object(Default::default()));
					tool_calls.push(serde_json::json!({
						"id": id,
						"type": "function",
						"function": {"name": name, "arguments": serde_json::to_string(&input).unwrap_or_default()},
					}));
				},
				_ => {},
			}
		}
	}

	let stop_reason = body.get("stop_reason").and_then(Value::as_str).unwrap_or("end_turn");
	let message = if tool_calls.is_empty() {
		serde_json::json!({"role": "assistant", "content": text_parts.join("")})
	} else {
		serde_json::json!({"role": "assistant", "content": text_parts.join(""), "tool_calls": tool_calls})
	};

	let usage = body.get("usage").map(map_usage_to_openai).unwrap_or_else(|| serde_json::json!({}));

	serde_json::json!({
		"id": body.get("id").cloned().unwrap_or(Value::Null),
		"object": "chat.completion",
		"model": body.get("model").cloned().unwrap_or(Value::Null),
		"choices": [{
			"index": 0,
			"message": message,
			"finish_reason": map_stop_reason_to_finish_reason(stop_reason),
		}],
		"usage": usage,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn collects_openai_text_into_anthropic_content_block() {
		let body = serde_json::json!({
			"id": "chatcmpl-1",
			"model": "glm-4.6",
			"choices": [{"message": {"role": "assistant", "content": "hi there"}, "finish_reason": "stop"}],
			"usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7},
		});
		let out = normalize_response(body, WireProtocol::OpenaiChat, WireProtocol::AnthropicMessages).unwrap();
		assert_eq!(out["content"][0]["type"], "text");
		assert_eq!(out["content"][0]["text"], "hi there");
		assert_eq!(out["stop_reason"], "end_turn");
		assert_eq!(out["usage"]["input_tokens"], 5);
	}

	#[test]
	fn folds_anthropic_tool_use_into_openai_tool_calls() {
		let body = serde_json::json!({
			"id": "msg_1",
			"model": "claude-3",
			"stop_reason": "tool_use",
			"content": [{"type": "tool_use", "id": "call_1", "name": "shell", "input": {"command": ["ls"]}}],
			"usage": {"input_tokens": 3, "output_tokens": 1},
		});
		let out = normalize_response(body, WireProtocol::AnthropicMessages, WireProtocol::OpenaiChat).unwrap();
		assert_eq!(out["choices"][0]["finish_reason"], "tool_calls");
		assert_eq!(out["choices"][0]["message"]["tool_calls"][0]["function"]["name"], "shell");
		assert_eq!(out["usage"]["total_tokens"], 4);
	}

	#[test]
	fn same_protocol_is_a_no_op() {
		let body = serde_json::json!({"a": 1});
		let out = normalize_response(body.clone(), WireProtocol::OpenaiChat, WireProtocol::OpenaiChat).unwrap();
		assert_eq!(out, body);
	}
}
