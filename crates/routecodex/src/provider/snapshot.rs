//! Forensic snapshot logging: best-effort, never fails the request. Writes
//! one JSON file per stage under
//! `<snapshotDir>/<endpointFolder>/<providerToken>/<requestId>/<stage>.json`.

use std::path::PathBuf;

use serde_json::Value;

const REDACTED_HEADERS: &[&str] = &["authorization", "x-api-key", "x-goog-api-key", "api-key"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStage {
	ProviderRequest,
	ProviderResponse,
	ProviderError,
	ProviderRequestRetry,
	ProviderRequestRetryResponse,
}

impl SnapshotStage {
	fn file_name(self) -> &'static str {
		match self {
			SnapshotStage::ProviderRequest => "provider-request.json",
			SnapshotStage::ProviderResponse => "provider-response.json",
			SnapshotStage::ProviderError => "provider-error.json",
			SnapshotStage::ProviderRequestRetry => "provider-request.retry.json",
			SnapshotStage::ProviderRequestRetryResponse => "provider-request.retry-response.json",
		}
	}
}

pub struct SnapshotWriter {
	root: PathBuf,
	enabled: bool,
}

impl SnapshotWriter {
	pub fn new(root: PathBuf, enabled: bool) -> Self {
		Self { root, enabled }
	}

	pub fn write(&self, endpoint_folder: &str, provider_token: &str, request_id: &str, stage: SnapshotStage, body: &Value, headers: &[(String, String)]) {
		if !self.enabled {
			return;
		}
		if let Err(e) = self.write_inner(endpoint_folder, provider_token, request_id, stage, body, headers) {
			tracing::warn!(error = %e, "snapshot write failed");
		}
	}

	fn write_inner(
		&self,
		endpoint_folder: &str,
		provider_token: &str,
		request_id: &str,
		stage: SnapshotStage,
		body: &Value,
		headers: &[(String, String)],
	) -> std::io::Result<()> {
		let dir = self.dir_for(endpoint_folder, provider_token, request_id);
		fs_err::create_dir_all(&dir)?;
		let payload = serde_json::json!({
			"headers": redact_headers(headers),
			"body": body,
		});
		let path = dir.join(stage.file_name());
		fs_err::write(path, serde_json::to_vec_pretty(&payload).unwrap_or_default())
	}

	fn dir_for(&self, endpoint_folder: &str, provider_token: &str, request_id: &str) -> PathBuf {
		self.root.join(endpoint_folder).join(provider_token).join(request_id)
	}
}

fn redact_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
	headers
		.iter()
		.map(|(k, v)| {
			if REDACTED_HEADERS.contains(&k.to_lowercase().as_str()) {
				(k.clone(), "***redacted***".to_string())
			} else {
				(k.clone(), v.clone())
			}
		})
		.collect()
}

pub fn endpoint_folder(entry_endpoint: &str) -> String {
	entry_endpoint.trim_start_matches('/').replace('/', "-")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn redacts_authorization_case_insensitively() {
		let headers = vec![("Authorization".to_string(), "Bearer secret".to_string()), ("content-type".to_string(), "application/json".to_string())];
		let redacted = redact_headers(&headers);
		assert_eq!(redacted[0].1, "***redacted***");
		assert_eq!(redacted[1].1, "application/json");
	}

	#[test]
	fn writes_snapshot_files_under_structured_path() {
		let dir = tempfile::tempdir().unwrap();
		let writer = SnapshotWriter::new(dir.path().to_path_buf(), true);
		writer.write("v1-messages", "anthropic.default", "req-1", SnapshotStage::ProviderRequest, &serde_json::json!({"a": 1}), &[]);
		let path = dir.path().join("v1-messages/anthropic.default/req-1/provider-request.json");
		assert!(path.exists());
	}

	#[test]
	fn disabled_writer_is_a_no_op() {
		let dir = tempfile::tempdir().unwrap();
		let writer = SnapshotWriter::new(dir.path().to_path_buf(), false);
		writer.write("v1-messages", "anthropic.default", "req-1", SnapshotStage::ProviderRequest, &serde_json::json!({}), &[]);
		assert!(!dir.path().join("v1-messages").exists());
	}

	#[test]
	fn endpoint_folder_strips_leading_slash() {
		assert_eq!(endpoint_folder("/v1/messages"), "v1-messages");
	}
}
