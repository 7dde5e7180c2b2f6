//! Wire protocols the gateway can speak to clients and upstreams.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WireProtocol {
	OpenaiChat,
	OpenaiResponses,
	AnthropicMessages,
	GeminiChat,
	GeminiCliChat,
}

impl WireProtocol {
	pub fn as_str(&self) -> &'static str {
		match self {
			WireProtocol::OpenaiChat => "openai",
			WireProtocol::OpenaiResponses => "responses",
			WireProtocol::AnthropicMessages => "anthropic",
			WireProtocol::GeminiChat => "gemini",
			WireProtocol::GeminiCliChat => "gemini-cli",
		}
	}

	pub fn from_str_loose(s: &str) -> Option<Self> {
		match s {
			"openai" | "openai-chat" | "chat" => Some(WireProtocol::OpenaiChat),
			"responses" | "openai-responses" => Some(WireProtocol::OpenaiResponses),
			"anthropic" | "anthropic-messages" | "messages" => Some(WireProtocol::AnthropicMessages),
			"gemini" | "gemini-chat" => Some(WireProtocol::GeminiChat),
			"gemini-cli" | "gemini-cli-chat" => Some(WireProtocol::GeminiCliChat),
			_ => None,
		}
	}
}

/// The three entry endpoints the server exposes, minus `/v1/models` which
/// carries no protocol of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryEndpoint {
	ChatCompletions,
	Messages,
	Responses,
}

impl EntryEndpoint {
	/// The default protocol mapping for an endpoint, used as detection rule #2.
	pub fn default_protocol(&self) -> WireProtocol {
		match self {
			EntryEndpoint::ChatCompletions => WireProtocol::OpenaiChat,
			EntryEndpoint::Messages => WireProtocol::AnthropicMessages,
			EntryEndpoint::Responses => WireProtocol::OpenaiResponses,
		}
	}
}
