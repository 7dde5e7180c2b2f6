//! S4 — a 429 whose body matches a daily-limit marker must mark the runtime
//! permanently fatal: the failing request returns the 429 untouched (not
//! retried), and a following request never reaches the upstream at all.

mod common;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn daily_limit_429_marks_the_runtime_fatal() {
	let mock_server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/chat/completions"))
		.respond_with(ResponseTemplate::new(429).set_body_json(json!({
			"error": {"message": "You have exceeded your daily limit for this model"},
		})))
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
					}
				},
				"routing": {"default": ["glm.glm-4.6"]},
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
	assert_eq!(first.status(), 429, "a daily-limit 429 is not recoverable, so it surfaces directly");

	let second = client
		.post(gateway.url("/v1/chat/completions"))
		.json(&request_body)
		.send()
		.await
		.expect("second request reaches the gateway");
	assert_eq!(second.status(), 503, "the only runtime is now fatal, so no candidate is selectable");
}
