use super::*;
use crate::config::Config;
use http::HeaderMap;

fn req(endpoint: EntryEndpoint, body: Value) -> InboundRequest {
	InboundRequest {
		entry_endpoint: endpoint,
		target_protocol_override: None,
		headers: HeaderMap::new(),
		body,
		request_id: rc_core::strng::new("req-1"),
		session_id: None,
	}
}

#[test]
fn detects_anthropic_by_endpoint() {
	let switch = LlmSwitch::default();
	let config = Config::default();
	let body = serde_json::json!({"model": "glm-4.6", "max_tokens": 64, "messages": []});
	let protocol = switch.detect(&req(EntryEndpoint::Messages, body), &config);
	assert_eq!(protocol, WireProtocol::AnthropicMessages);
}

#[test]
fn detects_anthropic_by_content_on_chat_endpoint() {
	let switch = LlmSwitch::default();
	let config = Config::default();
	let body = serde_json::json!({"model": "x", "system": "be brief", "messages": []});
	let protocol = switch.detect(&req(EntryEndpoint::ChatCompletions, body), &config);
	assert_eq!(protocol, WireProtocol::AnthropicMessages);
}

#[test]
fn memoizes_decision_for_response_stage() {
	let switch = LlmSwitch::default();
	let config = Config::default();
	let body = serde_json::json!({"model": "glm-4.6", "max_tokens": 64, "system": "x", "messages": []});
	let canonical = switch
		.to_canonical(req(EntryEndpoint::Messages, body), &config)
		.unwrap();
	assert_eq!(canonical.metadata.original_protocol, WireProtocol::AnthropicMessages);
	let resolved = switch.resolve_response_protocol("req-1", WireProtocol::OpenaiChat);
	assert_eq!(resolved, WireProtocol::AnthropicMessages);
}

#[test]
fn anthropic_roundtrip_preserves_core_fields() {
	let body = serde_json::json!({
		"model": "glm-4.6",
		"max_tokens": 64,
		"system": "be brief",
		"stop_sequences": ["STOP"],
		"messages": [{"role": "user", "content": "hi"}],
		"tools": [{"name": "shell", "input_schema": {"type": "object"}}],
	});
	let canonical = anthropic::to_canonical(body, |_| dummy_metadata()).unwrap();
	assert_eq!(canonical.model, "glm-4.6");
	assert_eq!(canonical.system_text().as_deref(), Some("be brief"));
	assert_eq!(canonical.parameters.max_tokens, Some(64));
	assert_eq!(canonical.parameters.stop, Some(vec!["STOP".to_string()]));
	assert_eq!(canonical.tools[0].name, "shell");

	let rendered = anthropic::from_canonical(&canonical);
	assert_eq!(rendered["model"], "glm-4.6");
	assert_eq!(rendered["system"], "be brief");
	assert_eq!(rendered["max_tokens"], 64);
	assert_eq!(rendered["messages"][0]["role"], "user");
}

#[test]
fn openai_tool_call_arguments_are_stringified() {
	let body = serde_json::json!({
		"model": "glm-4.6",
		"messages": [
			{"role": "user", "content": "ls"},
			{"role": "assistant", "tool_calls": [{"id": "1", "type": "function", "function": {"name": "shell", "arguments": {"command": "ls"}}}]},
		],
	});
	let canonical = openai::to_canonical(body, |_| dummy_metadata()).unwrap();
	let tool_calls = canonical.messages[1].tool_calls.as_ref().unwrap();
	assert_eq!(tool_calls[0].function.arguments, "{\"command\":\"ls\"}");
}

fn dummy_metadata() -> RequestMetadata {
	RequestMetadata {
		request_id: rc_core::strng::new("req-1"),
		entry_endpoint: rc_core::strng::new("/v1/messages"),
		client_headers: HeaderMap::new(),
		original_protocol: WireProtocol::AnthropicMessages,
		inbound_stream: false,
		outbound_stream: false,
		session_id: None,
		raw_snapshot: Value::Null,
	}
}
