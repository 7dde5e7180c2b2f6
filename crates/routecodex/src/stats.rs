//! Usage stats: one JSONL line per completed request, written fire-and-forget
//! the same way snapshots are — a write failure is logged, never surfaced.

use std::path::PathBuf;

use rc_core::strng::Strng;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize)]
pub struct UsageEvent {
	pub request_id: Strng,
	pub provider_id: String,
	pub runtime_key: Strng,
	pub route: String,
	pub input_tokens: u64,
	pub output_tokens: u64,
	pub total_tokens: u64,
	pub latency_ms: u64,
	pub status_code: u16,
}

pub struct StatsWriter {
	path: PathBuf,
	enabled: bool,
	lock: Mutex<()>,
}

impl StatsWriter {
	pub fn new(path: PathBuf, enabled: bool) -> Self {
		Self { path, enabled, lock: Mutex::new(()) }
	}

	pub async fn record(&self, event: &UsageEvent) {
		if !self.enabled {
			return;
		}
		if let Err(e) = self.append(event).await {
			tracing::warn!(error = %e, "usage stats write failed");
		}
	}

	async fn append(&self, event: &UsageEvent) -> std::io::Result<()> {
		let _guard = self.lock.lock().await;
		if let Some(dir) = self.path.parent() {
			tokio::fs::create_dir_all(dir).await?;
		}
		let mut line = serde_json::to_string(event).unwrap_or_default();
		line.push('\n');
		let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&self.path).await?;
		file.write_all(line.as_bytes()).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn appends_one_json_line_per_event() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("stats/request-events.log");
		let writer = StatsWriter::new(path.clone(), true);
		let event = UsageEvent {
			request_id: rc_core::strng::new("req-1"),
			provider_id: "openai".to_string(),
			runtime_key: rc_core::strng::new("openai.default"),
			route: "default".to_string(),
			input_tokens: 10,
			output_tokens: 5,
			total_tokens: 15,
			latency_ms: 120,
			status_code: 200,
		};
		writer.record(&event).await;
		writer.record(&event).await;
		let contents = tokio::fs::read_to_string(&path).await.unwrap();
		assert_eq!(contents.lines().count(), 2);
	}

	#[tokio::test]
	async fn disabled_writer_creates_no_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("stats/request-events.log");
		let writer = StatsWriter::new(path.clone(), false);
		let event = UsageEvent {
			request_id: rc_core::strng::new("req-1"),
			provider_id: "openai".to_string(),
			runtime_key: rc_core::strng::new("openai.default"),
			route: "default".to_string(),
			input_tokens: 1,
			output_tokens: 1,
			total_tokens: 2,
			latency_ms: 1,
			status_code: 200,
		};
		writer.record(&event).await;
		assert!(!path.exists());
	}
}
