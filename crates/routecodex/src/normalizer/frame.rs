//! SSE framing: incremental parsing of `event:`/`data:` lines terminated by
//! a blank line, plus the matching writer. Also owns the UTF-8 boundary
//! buffer so a chunk that ends mid-character never gets handed to the
//! parser as invalid bytes.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
	pub event: Option<String>,
	pub data: String,
	/// The frame didn't parse as `event:`/`data:` lines; forward verbatim.
	pub raw: Option<String>,
}

impl SseFrame {
	pub fn is_done_marker(&self) -> bool {
		self.data.trim() == "[DONE]"
	}
}

/// Buffers raw bytes across chunk boundaries, both for UTF-8 multi-byte
/// characters and for SSE frames split across multiple reads.
#[derive(Default)]
pub struct FrameDecoder {
	byte_buf: Vec<u8>,
	text_buf: String,
}

impl FrameDecoder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Feed raw bytes, returning any complete SSE frames now available.
	/// Bytes that end mid UTF-8 sequence are held back for the next call.
	pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
		self.byte_buf.extend_from_slice(bytes);

		let valid_len = utf8_valid_prefix_len(&self.byte_buf);
		let complete = self.byte_buf[..valid_len].to_vec();
		self.byte_buf.drain(..valid_len);

		self.text_buf.push_str(&String::from_utf8_lossy(&complete));

		let mut frames = Vec::new();
		while let Some(idx) = find_frame_boundary(&self.text_buf) {
			let raw_frame = self.text_buf[..idx].to_string();
			let rest_start = frame_boundary_len(&self.text_buf[idx..]) + idx;
			self.text_buf.drain(..rest_start);
			frames.push(parse_frame(&raw_frame));
		}
		frames
	}
}

/// Largest prefix of `bytes` that ends on a UTF-8 character boundary.
fn utf8_valid_prefix_len(bytes: &[u8]) -> usize {
	match std::str::from_utf8(bytes) {
		Ok(_) => bytes.len(),
		Err(e) => {
			let valid_up_to = e.valid_up_to();
			// If the error is "more bytes needed" (error_len is None), keep
			// the incomplete tail buffered; otherwise the bytes up to the
			// error are still valid and the rest is genuinely malformed, so
			// advance past it too rather than looping forever.
			if e.error_len().is_none() {
				valid_up_to
			} else {
				valid_up_to + 1
			}
		},
	}
}

fn find_frame_boundary(text: &str) -> Option<usize> {
	text.find("\n\n").or_else(|| text.find("\r\n\r\n"))
}

fn frame_boundary_len(tail: &str) -> usize {
	if tail.starts_with("\r\n\r\n") { 4 } else { 2 }
}

fn parse_frame(raw: &str) -> SseFrame {
	let mut event = None;
	let mut data_lines = Vec::new();
	let mut recognized_any = false;

	for line in raw.lines() {
		if let Some(rest) = line.strip_prefix("event:") {
			event = Some(rest.trim().to_string());
			recognized_any = true;
		} else if let Some(rest) = line.strip_prefix("data:") {
			data_lines.push(rest.trim_start().to_string());
			recognized_any = true;
		} else if line.trim().is_empty() {
			continue;
		} else {
			// Unknown field (id:, retry:, comments) — ignore but don't mark malformed.
		}
	}

	if !recognized_any {
		return SseFrame { raw: Some(raw.to_string()), ..Default::default() };
	}

	SseFrame { event, data: data_lines.join("\n"), raw: None }
}

/// Render one SSE frame as wire bytes.
pub fn write_frame(event: Option<&str>, data: &str) -> String {
	let mut out = String::new();
	if let Some(event) = event {
		out.push_str("event: ");
		out.push_str(event);
		out.push('\n');
	}
	for line in data.split('\n') {
		out.push_str("data: ");
		out.push_str(line);
		out.push('\n');
	}
	out.push('\n');
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_event_and_data_lines() {
		let mut decoder = FrameDecoder::new();
		let frames = decoder.push(b"event: message_start\ndata: {\"type\":\"message_start\"}\n\n");
		assert_eq!(frames.len(), 1);
		assert_eq!(frames[0].event.as_deref(), Some("message_start"));
		assert_eq!(frames[0].data, "{\"type\":\"message_start\"}");
	}

	#[test]
	fn buffers_split_utf8_across_pushes() {
		let mut decoder = FrameDecoder::new();
		let full = "data: {\"text\":\"caf\u{00e9}\"}\n\n".as_bytes().to_vec();
		// Split inside the two-byte encoding of 'é' so the first push ends
		// mid-character.
		let split_at = full.iter().position(|&b| b == 0xC3).unwrap() + 1;
		let (first, second) = full.split_at(split_at);
		let frames1 = decoder.push(first);
		assert!(frames1.is_empty());
		let frames2 = decoder.push(second);
		assert_eq!(frames2.len(), 1);
		assert!(frames2[0].data.contains('\u{00e9}'));
	}

	#[test]
	fn forwards_malformed_frame_raw() {
		let mut decoder = FrameDecoder::new();
		let frames = decoder.push(b"not-an-sse-line-at-all\n\n");
		assert_eq!(frames.len(), 1);
		assert!(frames[0].raw.is_some());
	}

	#[test]
	fn handles_multiple_frames_in_one_push() {
		let mut decoder = FrameDecoder::new();
		let frames = decoder.push(b"data: [DONE]\n\ndata: {\"a\":1}\n\n");
		assert_eq!(frames.len(), 2);
		assert!(frames[0].is_done_marker());
	}
}
