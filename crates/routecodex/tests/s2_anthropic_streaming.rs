//! S2 — Anthropic `/v1/messages` streaming request against an openai-chat
//! provider: the upstream's SSE chunks must come back transcoded into
//! Anthropic Messages streaming events.

mod common;

use futures_util::StreamExt;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn streaming_response_is_transcoded_to_anthropic_events() {
	let mock_server = MockServer::start().await;

	let sse_body = concat!(
		"data: {\"model\":\"glm-4.6\",\"choices\":[{\"delta\":{\"content\":\"Hi!\"},\"finish_reason\":null}]}\n\n",
		"data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":2,\"total_tokens\":7}}\n\n",
		"data: [DONE]\n\n",
	);

	Mock::given(method("POST"))
		.and(path("/chat/completions"))
		.respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
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
		.post(gateway.url("/v1/messages"))
		.header("user-agent", "integration-test/1.0")
		.json(&json!({
			"model": "glm-4.6",
			"max_tokens": 64,
			"system": "be brief",
			"messages": [{"role": "user", "content": "hi"}],
			"stream": true,
		}))
		.send()
		.await
		.expect("request reaches the gateway");

	assert_eq!(resp.status(), 200);

	let mut body_bytes = Vec::new();
	let mut stream = resp.bytes_stream();
	while let Some(chunk) = stream.next().await {
		body_bytes.extend_from_slice(&chunk.expect("stream chunk reads cleanly"));
	}
	let body = String::from_utf8(body_bytes).expect("body is utf8");

	let message_start_at = body.find("event: message_start").expect("message_start present");
	let block_start_at = body.find("event: content_block_start").expect("content_block_start present");
	let delta_at = body.find("event: content_block_delta").expect("content_block_delta present");
	let block_stop_at = body.find("event: content_block_stop").expect("content_block_stop present");
	let message_delta_at = body.find("event: message_delta").expect("message_delta present");
	let message_stop_at = body.find("event: message_stop").expect("message_stop present");

	assert!(message_start_at < block_start_at);
	assert!(block_start_at < delta_at);
	assert!(delta_at < block_stop_at);
	assert!(block_stop_at < message_delta_at);
	assert!(message_delta_at < message_stop_at);

	assert!(body.contains("\"text_delta\""));
	assert!(body.contains("\"Hi!\""));
	assert!(body.contains("\"stop_reason\":\"end_turn\""));
	assert!(body.trim_end().ends_with("data: [DONE]"));
}
