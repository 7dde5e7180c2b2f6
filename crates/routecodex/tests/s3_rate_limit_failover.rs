//! S3 — two keyed runtimes on the same provider/model: a short-term 429 on
//! the first-listed key must fail over to the second within the same
//! request, and a subsequent request must skip the cooled-down key entirely.

mod common;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn rate_limited_key_fails_over_and_then_cools_down() {
	let mock_server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/chat/completions"))
		.and(header("authorization", "Bearer key1-secret"))
		.respond_with(ResponseTemplate::new(429).set_body_json(json!({"error": {"message": "rate limited, slow down"}})))
		.expect(1)
		.mount(&mock_server)
		.await;

	Mock::given(method("POST"))
		.and(path("/chat/completions"))
		.and(header("authorization", "Bearer key2-secret"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"id": "chatcmpl-2",
			"object": "chat.completion",
			"model": "glm-4.6",
			"choices": [{"index": 0, "message": {"role": "assistant", "content": "ok"}, "finish_reason": "stop"}],
			"usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4},
		})))
		.expect(2)
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
						"auth": {
							"type": "apikey",
							"entries": [
								{"api_key": "key1-secret", "alias": "key1"},
								{"api_key": "key2-secret", "alias": "key2"},
							],
						},
					}
				},
				"routing": {"default": ["glm.glm-4.6.key1", "glm.glm-4.6.key2"]},
			},
		}),
		auth_dir.path(),
		snapshot_dir.path(),
	);

	let gateway = common::spawn(config).await;
	let client = reqwest::Client::new();

	let request_body = json!({
		"model": "glm-4.6",
		"messages": [{"role": "user", "content": "hi"}],
	});

	let first = client
		.post(gateway.url("/v1/chat/completions"))
		.json(&request_body)
		.send()
		.await
		.expect("first request reaches the gateway");
	assert_eq!(first.status(), 200, "first request fails over from key1 to key2 within the same call");

	let second = client
		.post(gateway.url("/v1/chat/completions"))
		.json(&request_body)
		.send()
		.await
		.expect("second request reaches the gateway");
	assert_eq!(second.status(), 200, "second request goes straight to key2 since key1 is cooling down");
}
