//! S5 — OAuth provider, stored access token rejected with 401: the runtime
//! must force a refresh against the token endpoint, replay the request with
//! the new bearer token, and succeed without the caller ever seeing the
//! intermediate failure.

mod common;

use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn expired_oauth_token_is_refreshed_and_the_request_retried() {
	let mock_server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/chat/completions"))
		.and(header("authorization", "Bearer old-token"))
		.respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "token expired"}})))
		.expect(1)
		.mount(&mock_server)
		.await;

	Mock::given(method("POST"))
		.and(path("/chat/completions"))
		.and(header("authorization", "Bearer new-token"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"id": "chatcmpl-3",
			"object": "chat.completion",
			"model": "qwen-plus",
			"choices": [{"index": 0, "message": {"role": "assistant", "content": "ok"}, "finish_reason": "stop"}],
			"usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4},
		})))
		.expect(1)
		.mount(&mock_server)
		.await;

	Mock::given(method("POST"))
		.and(path("/oauth/token"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"access_token": "new-token",
			"expires_in": 3600,
		})))
		.expect(1)
		.mount(&mock_server)
		.await;

	let auth_dir = tempfile::tempdir().unwrap();
	let snapshot_dir = tempfile::tempdir().unwrap();

	let token_path = auth_dir.path().join("qwen.json");
	std::fs::write(
		&token_path,
		serde_json::to_vec_pretty(&json!({
			"access_token": "old-token",
			"refresh_token": "refresh-abc",
		}))
		.unwrap(),
	)
	.expect("seed oauth token file");

	let config = common::config_from_value(
		json!({
			"system": {"snapshots_enabled": true},
			"virtual_router": {
				"providers": {
					"qwen": {
						"id": "qwen",
						"type": "openai",
						"base_url": mock_server.uri(),
						"auth": {
							"type": "oauth",
							"token_file": "qwen.json",
							"token_url": format!("{}/oauth/token", mock_server.uri()),
						},
					}
				},
				"routing": {"default": ["qwen.qwen-plus"]},
			},
		}),
		auth_dir.path(),
		snapshot_dir.path(),
	);

	let gateway = common::spawn(config).await;
	let client = reqwest::Client::new();

	let resp = client
		.post(gateway.url("/v1/chat/completions"))
		.json(&json!({
			"model": "qwen-plus",
			"messages": [{"role": "user", "content": "hi"}],
		}))
		.send()
		.await
		.expect("request reaches the gateway");

	assert_eq!(resp.status(), 200);

	let refreshed: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&token_path).unwrap()).unwrap();
	assert_matches!(refreshed.get("access_token").and_then(serde_json::Value::as_str), Some("new-token"));

	let request_dir_parent = snapshot_dir.path().join("v1-chat-completions").join("qwen.default");
	let mut request_dirs = std::fs::read_dir(&request_dir_parent).expect("snapshot request dir exists").collect::<Result<Vec<_>, _>>().unwrap();
	assert_eq!(request_dirs.len(), 1, "exactly one request_id directory is written");
	let request_dir = request_dirs.remove(0).path();

	assert!(request_dir.join("provider-request.json").exists());
	assert!(request_dir.join("provider-request.retry-response.json").exists());
	assert!(!request_dir.join("provider-error.json").exists(), "the initial 401 is never passed through finish(), so no error snapshot is written");
}
