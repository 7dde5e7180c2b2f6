//! S1 — OpenAI chat -> GLM passthrough, non-stream, tools: the shell tool's
//! schema must be rewritten in flight (oneOf stripped, command coerced to
//! array<string> and required, strict dropped) before it reaches the
//! upstream.

mod common;

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn glm_tool_schema_is_cleaned_before_reaching_upstream() {
	let mock_server = MockServer::start().await;
	let captured: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
	let captured_clone = captured.clone();

	Mock::given(method("POST"))
		.and(path("/chat/completions"))
		.respond_with(move |req: &wiremock::Request| {
			let body: Value = serde_json::from_slice(&req.body).expect("upstream request body is valid json");
			*captured_clone.lock().unwrap() = Some(body);
			ResponseTemplate::new(200).set_body_json(json!({
				"id": "chatcmpl-1",
				"object": "chat.completion",
				"model": "glm-4.6",
				"choices": [{"index": 0, "message": {"role": "assistant", "content": "ok"}, "finish_reason": "stop"}],
				"usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4},
			}))
		})
		.expect(1)
		.mount(&mock_server)
		.await;

	let auth_dir = tempfile::tempdir().unwrap();
	let snapshot_dir = tempfile::tempdir().unwrap();
	let config = common::config_from_value(
		json!({
			"virtual_router": {
				"providers": {
					"glm": {
						"id": "glm",
						"type": "openai",
						"base_url": mock_server.uri(),
						"auth": {"type": "apikey", "api_key": "glm-secret"},
						"compatibility_profile": "chat:glm",
					}
				},
				"routing": {"default": ["glm.glm-4.6"]},
			},
			"compatibility": {"profiles": ["chat:glm"]},
		}),
		auth_dir.path(),
		snapshot_dir.path(),
	);

	let gateway = common::spawn(config).await;
	let client = reqwest::Client::new();

	let resp = client
		.post(gateway.url("/v1/chat/completions"))
		.json(&json!({
			"model": "glm-4.6",
			"messages": [{"role": "user", "content": "ls"}],
			"tools": [{
				"type": "function",
				"function": {
					"name": "shell",
					"strict": true,
					"parameters": {
						"type": "object",
						"properties": {"command": {"oneOf": [{"type": "string"}, {"type": "array", "items": {"type": "string"}}]}},
						"required": [],
					}
				}
			}],
		}))
		.send()
		.await
		.expect("request reaches the gateway");

	assert_eq!(resp.status(), 200);

	let upstream_body = captured.lock().unwrap().clone().expect("upstream call captured");
	let func = &upstream_body["tools"][0]["function"];
	assert!(func.get("strict").is_none(), "strict must be dropped: {func}");
	assert_eq!(func["parameters"]["properties"]["command"]["type"], "array");
	assert!(func["parameters"]["properties"]["command"].get("oneOf").is_none());
	assert_eq!(func["parameters"]["required"][0], "command");
}
