//! Streaming transcoder: OpenAI-chat `chat.completion.chunk` SSE frames to
//! Anthropic Messages streaming events. Forward-only state machine, one
//! instance per in-flight request.

use serde_json::Value;

use crate::normalizer::{map_finish_reason, map_usage};

use super::frame::{write_frame, SseFrame};

#[derive(Debug, Clone, PartialEq, Eq)]
enum OpenBlock {
	Text,
	ToolUse { tool_call_index: u32 },
}

pub struct OpenaiToAnthropicStream {
	message_id: String,
	model: String,
	started: bool,
	open_blocks: Vec<OpenBlock>,
	text_block_index: Option<usize>,
	tool_block_index: std::collections::HashMap<u32, usize>,
	done_emitted: bool,
	stopped: bool,
}

impl OpenaiToAnthropicStream {
	pub fn new(message_id: impl Into<String>, model: impl Into<String>) -> Self {
		Self {
			message_id: message_id.into(),
			model: model.into(),
			started: false,
			open_blocks: Vec::new(),
			text_block_index: None,
			tool_block_index: std::collections::HashMap::new(),
			done_emitted: false,
			stopped: false,
		}
	}

	/// Feed one upstream SSE frame, returning zero or more rendered Anthropic
	/// SSE frames. Malformed frames are forwarded unchanged.
	pub fn feed(&mut self, frame: &SseFrame) -> Vec<String> {
		if self.stopped {
			return Vec::new();
		}

		if let Some(raw) = &frame.raw {
			return vec![format!("{raw}\n\n")];
		}

		if frame.is_done_marker() {
			if self.done_emitted {
				return Vec::new();
			}
			let mut out = self.close_open_blocks();
			out.extend(self.emit_message_delta_and_stop(map_finish_reason("stop"), None));
			return out;
		}

		let Ok(chunk) = serde_json::from_str::<Value>(&frame.data) else {
			return vec![write_frame(frame.event.as_deref(), &frame.data)];
		};

		let mut out = Vec::new();
		out.extend(self.ensure_started(&chunk));

		let Some(choice) = chunk.get("choices").and_then(|c| c.as_array()).and_then(|a| a.first()) else {
			return out;
		};

		if let Some(delta) = choice.get("delta") {
			if let Some(text) = delta.get("content").and_then(Value::as_str) {
				out.extend(self.emit_text_delta(text));
			}
			if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
				for tc in tool_calls {
					out.extend(self.emit_tool_delta(tc));
				}
			}
		}

		if let Some(finish_reason) = choice.get("finish_reason").and_then(Value::as_str) {
			out.extend(self.close_open_blocks());
			let usage = chunk.get("usage").cloned();
			out.extend(self.emit_message_delta_and_stop(map_finish_reason(finish_reason), usage));
		}

		out
	}

	fn ensure_started(&mut self, chunk: &Value) -> Vec<String> {
		if self.started {
			return Vec::new();
		}
		self.started = true;
		if let Some(model) = chunk.get("model").and_then(Value::as_str) {
			self.model = model.to_string();
		}
		let event = serde_json::json!({
			"type": "message_start",
			"message": {
				"id": self.message_id,
				"type": "message",
				"role": "assistant",
				"model": self.model,
				"content": [],
			}
		});
		vec![write_frame(Some("message_start"), &event.to_string())]
	}

	fn emit_text_delta(&mut self, text: &str) -> Vec<String> {
		let mut out = Vec::new();
		if self.text_block_index.is_none() {
			let index = self.open_blocks.len();
			self.open_blocks.push(OpenBlock::Text);
			self.text_block_index = Some(index);
			let start = serde_json::json!({
				"type": "content_block_start",
				"index": index,
				"content_block": {"type": "text", "text": ""},
			});
			out.push(write_frame(Some("content_block_start"), &start.to_string()));
		}
		let index = self.text_block_index.unwrap();
		let delta = serde_json::json!({
			"type": "content_block_delta",
			"index": index,
			"delta": {"type": "text_delta", "text": text},
		});
		out.push(write_frame(Some("content_block_delta"), &delta.to_string()));
		out
	}

	fn emit_tool_delta(&mut self, tool_call: &Value) -> Vec<String> {
		let mut out = Vec::new();
		let tool_index = tool_call.get("index").and_then(Value::as_u64).unwrap_or(0) as u32;

		if !self.tool_block_index.contains_key(&tool_index) {
			let index = self.open_blocks.len();
			self.open_blocks.push(OpenBlock::ToolUse { tool_call_index: tool_index });
			self.tool_block_index.insert(tool_index, index);
			let id = tool_call.get("id").and_then(Value::as_str).unwrap_or_default();
			let name = tool_call.get("function").and_then(|f| f.get("name")).and_then(Value::as_str).unwrap_or_default();
			let start = serde_json::json!({
				"type": "content_block_start",
				"index": index,
				"content_block": {"type": "tool_use", "id": id, "name": name, "input": {}},
			});
			out.push(write_frame(Some("content_block_start"), &start.to_string()));
		}

		let index = self.tool_block_index[&tool_index];
		if let Some(arguments) = tool_call.get("function").and_then(|f| f.get("arguments")).and_then(Value::as_str) {
			let delta = serde_json::json!({
				"type": "content_block_delta",
				"index": index,
				"delta": {"type": "input_json_delta", "partial_json": arguments},
			});
			out.push(write_frame(Some("content_block_delta"), &delta.to_string()));
		}
		out
	}

	fn close_open_blocks(&mut self) -> Vec<String> {
		let mut out = Vec::new();
		for (index, _) in self.open_blocks.iter().enumerate() {
			let stop = serde_json::json!({"type": "content_block_stop", "index": index});
			out.push(write_frame(Some("content_block_stop"), &stop.to_string()));
		}
		self.open_blocks.clear();
		self.text_block_index = None;
		self.tool_block_index.clear();
		out
	}

	fn emit_message_delta_and_stop(&mut self, stop_reason: &str, usage: Option<Value>) -> Vec<String> {
		if self.stopped {
			return Vec::new();
		}
		let mut out = Vec::new();
		let delta = serde_json::json!({
			"type": "message_delta",
			"delta": {"stop_reason": stop_reason},
			"usage": usage.map(|u| map_usage(&u)).unwrap_or_else(|| serde_json::json!({})),
		});
		out.push(write_frame(Some("message_delta"), &delta.to_string()));
		out.push(write_frame(Some("message_stop"), &serde_json::json!({"type": "message_stop"}).to_string()));
		out.push("data: [DONE]\n\n".to_string());
		self.stopped = true;
		self.done_emitted = true;
		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::normalizer::frame::FrameDecoder;

	fn chunk_frame(json: Value) -> SseFrame {
		SseFrame { event: None, data: json.to_string(), raw: None }
	}

	#[test]
	fn text_delta_then_finish_emits_full_sequence() {
		let mut stream = OpenaiToAnthropicStream::new("msg_1", "gpt-4o");
		let mut out = Vec::new();

		out.extend(stream.feed(&chunk_frame(serde_json::json!({
			"model": "gpt-4o",
			"choices": [{"delta": {"content": "hi"}, "finish_reason": null}],
		}))));
		out.extend(stream.feed(&chunk_frame(serde_json::json!({
			"choices": [{"delta": {}, "finish_reason": "stop"}],
			"usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12},
		}))));

		let joined = out.join("");
		assert!(joined.contains("message_start"));
		assert!(joined.contains("content_block_start"));
		assert!(joined.contains("text_delta"));
		assert!(joined.contains("\"stop_reason\":\"end_turn\""));
		assert!(joined.contains("message_stop"));
		assert!(joined.trim_end().ends_with("data: [DONE]"));
	}

	#[test]
	fn tool_call_chunks_allocate_and_reuse_block_index() {
		let mut stream = OpenaiToAnthropicStream::new("msg_1", "gpt-4o");
		let mut out = Vec::new();
		out.extend(stream.feed(&chunk_frame(serde_json::json!({
			"model": "gpt-4o",
			"choices": [{"delta": {"tool_calls": [{"index": 0, "id": "call_1", "function": {"name": "shell", "arguments": "{\"c"}}]}, "finish_reason": null}],
		}))));
		out.extend(stream.feed(&chunk_frame(serde_json::json!({
			"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "md\":\"ls\"}"}}]}, "finish_reason": "tool_calls"}],
		}))));
		let joined = out.join("");
		assert_eq!(joined.matches("content_block_start").count(), 1);
		assert!(joined.contains("input_json_delta"));
		assert!(joined.contains("\"stop_reason\":\"tool_use\""));
	}

	#[test]
	fn done_marker_without_finish_reason_synthesizes_end_turn() {
		let mut stream = OpenaiToAnthropicStream::new("msg_1", "gpt-4o");
		let mut out = Vec::new();
		out.extend(stream.feed(&chunk_frame(serde_json::json!({
			"model": "gpt-4o",
			"choices": [{"delta": {"content": "hi"}, "finish_reason": null}],
		}))));
		let mut decoder = FrameDecoder::new();
		for frame in decoder.push(b"data: [DONE]\n\n") {
			out.extend(stream.feed(&frame));
		}
		let joined = out.join("");
		assert!(joined.contains("\"stop_reason\":\"end_turn\""));
		assert_eq!(joined.matches("data: [DONE]").count(), 1);
	}

	#[test]
	fn malformed_frame_is_forwarded_raw() {
		let mut stream = OpenaiToAnthropicStream::new("msg_1", "gpt-4o");
		let frame = SseFrame { raw: Some(": keep-alive".to_string()), ..Default::default() };
		let out = stream.feed(&frame);
		assert_eq!(out, vec![": keep-alive\n\n"]);
	}
}
