//! Stable error taxonomy surfaced to clients, snapshots, and logs.
//!
//! A flat `thiserror` enum, one variant per failure mode, with a
//! `code()`/`status()` pair so the HTTP layer never has to pattern-match the
//! whole enum to render a response.

use rc_core::strng::Strng;

#[derive(thiserror::Error, Debug)]
pub enum RouteError {
	#[error("compatibility: tool result text was empty after extraction")]
	CompatToolTextEmpty,
	#[error("compatibility: tool_call arguments are not valid JSON")]
	CompatToolcallArgsInvalid,
	#[error("compatibility: {0}")]
	Compatibility(Strng),
	#[error("unsupported provider type: {0}")]
	UnsupportedProviderType(Strng),
	#[error("no provider runtime found for key {0}")]
	RuntimeNotFound(Strng),
	#[error("no provider registered with id {0}")]
	ProviderNotFound(Strng),
	#[error("no healthy provider available for route {0}")]
	NoHealthyProvider(Strng),
	#[error("upstream returned HTTP {0}")]
	Http(u16),
	/// Same as `Http`, but carries the upstream response body's message text
	/// so the classifier can tell a daily-limit 429 from a rate-limit 429.
	#[error("upstream returned HTTP {0}: {1}")]
	HttpUpstream(u16, String),
	#[error("failed to convert SSE stream to JSON: {0}")]
	SseToJson(String),
	#[error("request body too large")]
	RequestTooLarge,
	#[error("response body too large")]
	ResponseTooLarge,
	#[error("failed to parse request body: {0}")]
	RequestParsing(serde_json::Error),
	#[error("failed to parse response body: {0}")]
	ResponseParsing(serde_json::Error),
	#[error("missing required field: {0}")]
	MissingField(Strng),
	#[error("authentication verification required: {0}")]
	AuthVerify(Strng),
	#[error("unsupported conversion: {0}")]
	UnsupportedConversion(Strng),
	#[error("invalid configuration: {0}")]
	InvalidConfig(String),
	#[error("pipeline failure: {0}")]
	PipelineFailure(String),
}

impl RouteError {
	/// The stable string code surfaced to clients and snapshots.
	pub fn code(&self) -> String {
		match self {
			RouteError::CompatToolTextEmpty => "ERR_COMPAT_TOOL_TEXT_EMPTY".to_string(),
			RouteError::CompatToolcallArgsInvalid => "ERR_COMPAT_TOOLCALL_ARGS_INVALID".to_string(),
			RouteError::Compatibility(_) => "ERR_COMPATIBILITY".to_string(),
			RouteError::UnsupportedProviderType(_) => "ERR_UNSUPPORTED_PROVIDER_TYPE".to_string(),
			RouteError::RuntimeNotFound(_) => "ERR_RUNTIME_NOT_FOUND".to_string(),
			RouteError::ProviderNotFound(_) => "ERR_PROVIDER_NOT_FOUND".to_string(),
			RouteError::NoHealthyProvider(_) => "ERR_NO_HEALTHY_PROVIDER".to_string(),
			RouteError::Http(n) | RouteError::HttpUpstream(n, _) => format!("HTTP_{n}"),
			RouteError::SseToJson(_) => "SSE_TO_JSON_ERROR".to_string(),
			RouteError::PipelineFailure(_) => "ERR_PIPELINE_FAILURE".to_string(),
			_ => "ERR_PIPELINE_FAILURE".to_string(),
		}
	}

	/// HTTP status to return to the client when this error terminates the pipeline.
	pub fn status(&self) -> u16 {
		match self {
			RouteError::CompatToolTextEmpty
			| RouteError::CompatToolcallArgsInvalid
			| RouteError::Compatibility(_)
			| RouteError::MissingField(_)
			| RouteError::RequestParsing(_)
			| RouteError::RequestTooLarge
			| RouteError::UnsupportedConversion(_) => 400,
			RouteError::AuthVerify(_) => 401,
			RouteError::UnsupportedProviderType(_) | RouteError::InvalidConfig(_) => 500,
			RouteError::RuntimeNotFound(_) | RouteError::ProviderNotFound(_) => 500,
			RouteError::NoHealthyProvider(_) => 503,
			RouteError::Http(n) | RouteError::HttpUpstream(n, _) => *n,
			RouteError::SseToJson(_) => 502,
			RouteError::ResponseTooLarge | RouteError::ResponseParsing(_) => 502,
			RouteError::PipelineFailure(_) => 500,
		}
	}

	/// Is this error a fatal, no-retry-no-failover condition?
	pub fn is_fatal(&self) -> bool {
		matches!(
			self,
			RouteError::UnsupportedProviderType(_) | RouteError::InvalidConfig(_) | RouteError::AuthVerify(_)
		)
	}
}
