//! S6 — a Claude Code warm-up probe on `/v1/messages` must get a canned
//! response without ever touching a provider: an empty/unroutable config is
//! enough proof, since a real dispatch attempt would have nothing to select.

mod common;

use serde_json::json;

#[tokio::test]
async fn claude_code_warmup_probe_short_circuits_before_routing() {
	let auth_dir = tempfile::tempdir().unwrap();
	let snapshot_dir = tempfile::tempdir().unwrap();
	let config = common::config_from_value(json!({}), auth_dir.path(), snapshot_dir.path());

	let gateway = common::spawn(config).await;
	let client = reqwest::Client::new();

	let resp = client
		.post(gateway.url("/v1/messages"))
		.header("user-agent", "claude-code/1.2.3")
		.json(&json!({
			"messages": [{"role": "user", "content": "warmup"}],
			"max_tokens": 1,
		}))
		.send()
		.await
		.expect("request reaches the gateway");

	assert_eq!(resp.status(), 200);

	let body: serde_json::Value = resp.json().await.expect("warmup response is json");
	assert_eq!(body["id"], "msg_warmup");
	assert_eq!(body["type"], "message");
	assert_eq!(body["role"], "assistant");
	assert_eq!(body["model"], serde_json::Value::Null);
	assert_eq!(body["content"], json!([{"type": "text", "text": ""}]));
	assert_eq!(body["stop_reason"], "end_turn");
	assert_eq!(body["usage"], json!({"input_tokens": 0, "output_tokens": 0}));
}
