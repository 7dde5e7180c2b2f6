//! The canonical request shape, openai-chat-like, used as the pivot between
//! `llm_switch` and `compatibility`. Fields the gateway doesn't need to
//! reason about are preserved in `rest` so round-tripping never drops
//! provider-specific extensions.

use std::collections::HashMap;

use http::HeaderMap;
use rc_core::strng::Strng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::protocol::WireProtocol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
	System,
	User,
	Assistant,
	Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
	Text(String),
	Blocks(Vec<ContentBlock>),
}

impl Content {
	/// Flatten to a single string, joining block text in order.
	pub fn as_text(&self) -> String {
		match self {
			Content::Text(t) => t.clone(),
			Content::Blocks(blocks) => blocks
				.iter()
				.filter_map(|b| b.text.as_deref())
				.collect::<Vec<_>>()
				.join(""),
		}
	}

	pub fn is_empty(&self) -> bool {
		match self {
			Content::Text(t) => t.is_empty(),
			Content::Blocks(b) => b.is_empty(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	#[serde(flatten, default)]
	pub rest: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
	pub id: String,
	#[serde(rename = "type", default = "default_function_type")]
	pub kind: String,
	pub function: ToolCallFunction,
}

fn default_function_type() -> String {
	"function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
	pub name: String,
	/// Always a JSON string on the wire; invariant enforced by compatibility.
	pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalMessage {
	pub role: MessageRole,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content: Option<Content>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<ToolCall>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_call_id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalTool {
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub parameters: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestParameters {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stop: Option<Vec<String>>,
	#[serde(default)]
	pub stream: bool,
}

#[derive(Debug, Clone)]
pub struct RequestMetadata {
	pub request_id: Strng,
	pub entry_endpoint: Strng,
	pub client_headers: HeaderMap,
	pub original_protocol: WireProtocol,
	pub inbound_stream: bool,
	pub outbound_stream: bool,
	pub session_id: Option<Strng>,
	/// Raw, unmodified request body as received, kept for snapshotting.
	pub raw_snapshot: Value,
}

#[derive(Debug, Clone)]
pub struct CanonicalRequest {
	pub model: String,
	pub messages: Vec<CanonicalMessage>,
	pub tools: Vec<CanonicalTool>,
	pub parameters: RequestParameters,
	pub metadata: RequestMetadata,
	/// Fields neither modeled above nor stripped, preserved for passthrough providers.
	pub extra: HashMap<String, Value>,
}

impl CanonicalRequest {
	pub fn system_text(&self) -> Option<String> {
		let parts: Vec<String> = self
			.messages
			.iter()
			.filter(|m| m.role == MessageRole::System)
			.filter_map(|m| m.content.as_ref().map(Content::as_text))
			.collect();
		if parts.is_empty() {
			None
		} else {
			Some(parts.join("\n"))
		}
	}

	pub fn non_system_messages(&self) -> impl Iterator<Item = &CanonicalMessage> {
		self.messages.iter().filter(|m| m.role != MessageRole::System)
	}
}
