//! LLM-Switch: detect the inbound wire protocol, canonicalize the request,
//! and remember the decision so the response stage can convert back to
//! whatever the client actually sent.

pub mod anthropic;
pub mod openai;
pub mod responses;

use http::HeaderMap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use rc_core::strng::Strng;
use serde_json::Value;

use crate::config::Config;
use crate::error::RouteError;
use crate::types::canonical::{CanonicalRequest, RequestMetadata};
use crate::types::protocol::{EntryEndpoint, WireProtocol};

/// Bounded LRU of `requestId -> originalProtocol`, consulted by the response
/// stage before it falls back to content detection.
pub struct ProtocolMemo {
	capacity: usize,
	inner: Mutex<IndexMap<Strng, WireProtocol>>,
}

impl ProtocolMemo {
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity,
			inner: Mutex::new(IndexMap::new()),
		}
	}

	pub fn remember(&self, request_id: Strng, protocol: WireProtocol) {
		let mut map = self.inner.lock();
		map.shift_remove(&request_id);
		map.insert(request_id, protocol);
		while map.len() > self.capacity {
			map.shift_remove_index(0);
		}
	}

	pub fn lookup(&self, request_id: &str) -> Option<WireProtocol> {
		self.inner.lock().get(request_id).copied()
	}
}

impl Default for ProtocolMemo {
	fn default() -> Self {
		Self::new(10_000)
	}
}

pub struct LlmSwitch {
	pub memo: ProtocolMemo,
}

impl Default for LlmSwitch {
	fn default() -> Self {
		Self {
			memo: ProtocolMemo::default(),
		}
	}
}

pub struct InboundRequest {
	pub entry_endpoint: EntryEndpoint,
	pub target_protocol_override: Option<WireProtocol>,
	pub headers: HeaderMap,
	pub body: Value,
	pub request_id: Strng,
	pub session_id: Option<Strng>,
}

impl LlmSwitch {
	/// Detection rules, first-match.
	pub fn detect(&self, req: &InboundRequest, config: &Config) -> WireProtocol {
		if let Some(p) = req.target_protocol_override {
			return p;
		}
		if let Some(p) = config
			.llm_switch
			.endpoint_protocol_override
			.get(&req.entry_endpoint)
		{
			return *p;
		}
		if let Some(p) = detect_by_content(&req.body) {
			return p;
		}
		if req.headers.get("anthropic-version").is_some() {
			return WireProtocol::AnthropicMessages;
		}
		req.entry_endpoint.default_protocol()
	}

	/// Canonicalize an inbound request, recording the decision for later.
	pub fn to_canonical(
		&self,
		req: InboundRequest,
		config: &Config,
	) -> Result<CanonicalRequest, RouteError> {
		let protocol = self.detect(&req, config);
		self.memo.remember(req.request_id.clone(), protocol);

		let metadata_base = |outbound_stream: bool| RequestMetadata {
			request_id: req.request_id.clone(),
			entry_endpoint: rc_core::strng::new(entry_endpoint_str(req.entry_endpoint)),
			client_headers: req.headers.clone(),
			original_protocol: protocol,
			inbound_stream: false,
			outbound_stream,
			session_id: req.session_id.clone(),
			raw_snapshot: req.body.clone(),
		};

		match protocol {
			WireProtocol::AnthropicMessages => anthropic::to_canonical(req.body, metadata_base),
			WireProtocol::OpenaiResponses => responses::to_canonical(req.body, metadata_base),
			// openai-chat is the pivot itself; gemini/gemini-cli are treated as
			// opaque families handled entirely by compatibility.
			_ => openai::to_canonical(req.body, metadata_base),
		}
	}

	/// Which protocol should the response be converted back into for this request id?
	/// Falls back to content detection on the response payload if the memo has
	/// nothing recorded (e.g. process restarted mid-stream).
	pub fn resolve_response_protocol(&self, request_id: &str, fallback: WireProtocol) -> WireProtocol {
		self.memo.lookup(request_id).unwrap_or(fallback)
	}
}

pub fn entry_endpoint_str(e: EntryEndpoint) -> &'static str {
	match e {
		EntryEndpoint::ChatCompletions => "/v1/chat/completions",
		EntryEndpoint::Messages => "/v1/messages",
		EntryEndpoint::Responses => "/v1/responses",
	}
}

/// Detection rule #3: content heuristics.
fn detect_by_content(body: &Value) -> Option<WireProtocol> {
	let obj = body.as_object()?;
	if obj.get("object").and_then(Value::as_str) == Some("chat.completion.chunk") {
		return Some(WireProtocol::OpenaiChat);
	}
	if obj.get("system").map(Value::is_string).unwrap_or(false) {
		return Some(WireProtocol::AnthropicMessages);
	}
	if let Some(messages) = obj.get("messages").and_then(Value::as_array) {
		let has_openai_tool_calls = messages
			.iter()
			.any(|m| m.get("tool_calls").is_some());
		if has_openai_tool_calls {
			return Some(WireProtocol::OpenaiChat);
		}
	}
	if let Some(tools) = obj.get("tools").and_then(Value::as_array) {
		let anthropic_shaped = tools.iter().any(|t| t.get("input_schema").is_some());
		if anthropic_shaped {
			return Some(WireProtocol::AnthropicMessages);
		}
	}
	None
}

#[cfg(test)]
mod tests;
