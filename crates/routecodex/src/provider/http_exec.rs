//! HTTP execution against one upstream: endpoint resolution, header
//! assembly, a single provider-level retry for 5xx, and one
//! refresh-and-replay attempt when OAuth gets a 401.

use std::time::Duration;

use serde_json::Value;

use crate::config::ProviderType;
use crate::error::RouteError;
use crate::provider::classifier::{self, AuthMode, UpstreamFailure};

const METADATA_FIELDS: &[&str] = &["_metadata", "metadata"];

pub fn endpoint_path(provider_type: &ProviderType, model: &str) -> &'static str {
	match provider_type {
		ProviderType::Openai | ProviderType::Mock => "/chat/completions",
		ProviderType::Anthropic => "/messages",
		ProviderType::Responses => "/responses",
		ProviderType::Gemini | ProviderType::GeminiCli => gemini_path(model),
	}
}

/// Gemini's real path embeds the model id and is built in `resolve_url`;
/// this is just a display placeholder for callers that want a path shape.
fn gemini_path(_model: &str) -> &'static str {
	"/v1beta/models"
}

pub fn resolve_url(base_url: &str, provider_type: &ProviderType, model: &str) -> String {
	let base = base_url.trim_end_matches('/');
	match provider_type {
		ProviderType::Gemini | ProviderType::GeminiCli => format!("{base}/v1beta/models/{model}:generateContent"),
		_ => format!("{base}{}", endpoint_path(provider_type, model)),
	}
}

/// Strip internal bookkeeping fields before the body leaves the process.
pub fn strip_internal_metadata(body: &mut Value) {
	if let Some(obj) = body.as_object_mut() {
		for field in METADATA_FIELDS {
			obj.remove(*field);
		}
	}
}

pub struct ExecutedResponse {
	pub status: u16,
	pub headers: Vec<(String, String)>,
	pub body: reqwest::Response,
}

pub async fn execute(
	client: &reqwest::Client,
	url: &str,
	auth_header: (&str, &str),
	extra_headers: &[(String, String)],
	body: &Value,
	stream: bool,
	timeout: Duration,
) -> Result<ExecutedResponse, RouteError> {
	let mut request = client.post(url).timeout(timeout).header(auth_header.0, auth_header.1);
	for (k, v) in extra_headers {
		request = request.header(k, v);
	}
	if stream {
		request = request.header("Accept", "text/event-stream");
	}
	request = request.json(body);

	let response = request.send().await.map_err(|e| {
		if e.is_timeout() || e.is_connect() {
			RouteError::PipelineFailure(format!("network transport error: {e}"))
		} else {
			RouteError::PipelineFailure(format!("request failed: {e}"))
		}
	})?;

	let status = response.status().as_u16();
	let headers = response
		.headers()
		.iter()
		.map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
		.collect();

	Ok(ExecutedResponse { status, headers, body: response })
}

/// Provider-level retry policy: at most one extra attempt, and only for the
/// 5xx subset the classifier says is worth retrying.
pub async fn execute_with_single_retry(
	client: &reqwest::Client,
	url: &str,
	auth_header: (&str, &str),
	extra_headers: &[(String, String)],
	body: &Value,
	stream: bool,
	timeout: Duration,
) -> Result<ExecutedResponse, RouteError> {
	let first = execute(client, url, auth_header, extra_headers, body, stream, timeout).await?;
	if first.status < 500 {
		return Ok(first);
	}
	if !classifier::should_retry_provider_http_error(UpstreamFailure::Status(first.status)) {
		return Ok(first);
	}
	tokio::time::sleep(Duration::from_millis(classifier::retry_delay_ms(1))).await;
	execute(client, url, auth_header, extra_headers, body, stream, timeout).await
}

pub fn auth_mode_for(provider_type: &ProviderType, is_oauth: bool) -> AuthMode {
	let _ = provider_type;
	if is_oauth { AuthMode::OAuth } else { AuthMode::ApiKey }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn resolve_url_embeds_gemini_model() {
		let url = resolve_url("https://generativelanguage.googleapis.com", &ProviderType::Gemini, "gemini-2.0-flash");
		assert_eq!(url, "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent");
	}

	#[test]
	fn resolve_url_appends_fixed_path_for_anthropic() {
		let url = resolve_url("https://api.anthropic.com", &ProviderType::Anthropic, "claude-3");
		assert_eq!(url, "https://api.anthropic.com/messages");
	}

	#[test]
	fn strips_metadata_fields() {
		let mut body = serde_json::json!({"model": "x", "_metadata": {"a": 1}, "metadata": {"b": 2}});
		strip_internal_metadata(&mut body);
		assert!(body.get("_metadata").is_none());
		assert!(body.get("metadata").is_none());
		assert_eq!(body["model"], "x");
	}
}
