//! OAuth auth: token-file driven, re-read before every request since another
//! process may have refreshed it, with a best-effort refresh-on-expiry path
//! and an on-disk cooldown for interactive bootstrap flows.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::RouteError;

const EXPIRY_SKEW_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TokenFile {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub api_key: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub access_token: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub expires_at: Option<i64>,
	#[serde(default)]
	pub norefresh: bool,
}

impl TokenFile {
	/// Prefer the long-lived `api_key` field; fall back to `access_token`.
	pub fn bearer_value(&self) -> Option<&str> {
		self.api_key.as_deref().or(self.access_token.as_deref())
	}

	pub fn is_valid(&self, now_unix: i64) -> bool {
		match self.expires_at {
			None => true,
			Some(expires_at) => now_unix < expires_at - EXPIRY_SKEW_SECS,
		}
	}
}

pub fn read_token_file(path: &Path) -> Result<TokenFile, RouteError> {
	let raw = fs_err::read_to_string(path)
		.map_err(|e| RouteError::AuthVerify(rc_core::strng::new(&format!("reading token file {path:?}: {e}"))))?;
	serde_json::from_str(&raw)
		.map_err(|e| RouteError::AuthVerify(rc_core::strng::new(&format!("parsing token file {path:?}: {e}"))))
}

/// Write-temp-then-rename so a concurrent reader never observes a partial
/// write.
pub fn write_token_file(path: &Path, token: &TokenFile) -> Result<(), RouteError> {
	let dir = path.parent().unwrap_or_else(|| Path::new("."));
	fs_err::create_dir_all(dir).map_err(|e| RouteError::AuthVerify(rc_core::strng::new(&e.to_string())))?;
	let tmp_path = dir.join(format!(".{}.tmp", path.file_name().and_then(|n| n.to_str()).unwrap_or("token")));
	let body =
		serde_json::to_string_pretty(token).map_err(|e| RouteError::AuthVerify(rc_core::strng::new(&e.to_string())))?;
	fs_err::write(&tmp_path, body).map_err(|e| RouteError::AuthVerify(rc_core::strng::new(&e.to_string())))?;
	fs_err::rename(&tmp_path, path).map_err(|e| RouteError::AuthVerify(rc_core::strng::new(&e.to_string())))?;
	Ok(())
}

pub fn now_unix() -> i64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
	pub grant_type: &'static str,
	pub refresh_token: String,
	pub client_id: Option<String>,
	pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
	pub access_token: String,
	#[serde(default)]
	pub refresh_token: Option<String>,
	#[serde(default)]
	pub expires_in: Option<i64>,
}

/// Exchange a stored refresh token for a new access token, unless the token
/// file opted out with `norefresh`.
pub async fn refresh(
	client: &reqwest::Client,
	token_url: &str,
	token: &TokenFile,
	client_id: Option<&str>,
	client_secret: Option<&str>,
) -> Result<TokenFile, RouteError> {
	if token.norefresh {
		return Err(RouteError::AuthVerify(rc_core::strng::new("token file has norefresh set")));
	}
	let Some(refresh_token) = token.refresh_token.clone() else {
		return Err(RouteError::AuthVerify(rc_core::strng::new("no refresh_token stored")));
	};

	let body = RefreshRequest {
		grant_type: "refresh_token",
		refresh_token,
		client_id: client_id.map(str::to_string),
		client_secret: client_secret.map(str::to_string),
	};

	let resp = client
		.post(token_url)
		.json(&body)
		.send()
		.await
		.map_err(|e| RouteError::AuthVerify(rc_core::strng::new(&format!("refresh request failed: {e}"))))?;

	if !resp.status().is_success() {
		return Err(RouteError::AuthVerify(rc_core::strng::new(&format!(
			"refresh rejected with status {}",
			resp.status()
		))));
	}

	let parsed: RefreshResponse = resp
		.json()
		.await
		.map_err(|e| RouteError::AuthVerify(rc_core::strng::new(&format!("refresh response parse failed: {e}"))))?;

	Ok(TokenFile {
		api_key: None,
		access_token: Some(parsed.access_token),
		refresh_token: parsed.refresh_token.or_else(|| token.refresh_token.clone()),
		expires_at: parsed.expires_in.map(|secs| now_unix() + secs),
		norefresh: false,
	})
}

/// Interactive bootstrap state: device-code, authorization-code, or hybrid.
/// Kept entirely out of the request hot path; triggered only by an operator
/// running the CLI's login flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractiveFlowKind {
	DeviceCode,
	AuthorizationCode,
	Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownEntry {
	pub provider_type: String,
	pub token_file: String,
	pub reason: String,
	pub attempt_count: u32,
	pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CooldownState {
	#[serde(default)]
	pub entries: Vec<CooldownEntry>,
}

pub struct InteractiveCooldown {
	path: PathBuf,
	base_window_secs: i64,
	max_attempts: u32,
}

impl InteractiveCooldown {
	pub fn new(state_dir: &Path) -> Self {
		Self {
			path: state_dir.join("oauth-repair-cooldown.json"),
			base_window_secs: 300,
			max_attempts: 5,
		}
	}

	fn load(&self) -> CooldownState {
		fs_err::read_to_string(&self.path)
			.ok()
			.and_then(|raw| serde_json::from_str(&raw).ok())
			.unwrap_or_default()
	}

	fn save(&self, state: &CooldownState) -> Result<(), RouteError> {
		if let Some(dir) = self.path.parent() {
			fs_err::create_dir_all(dir).map_err(|e| RouteError::AuthVerify(rc_core::strng::new(&e.to_string())))?;
		}
		let body =
			serde_json::to_string_pretty(state).map_err(|e| RouteError::AuthVerify(rc_core::strng::new(&e.to_string())))?;
		fs_err::write(&self.path, body).map_err(|e| RouteError::AuthVerify(rc_core::strng::new(&e.to_string())))
	}

	/// Whether an interactive attempt is currently suppressed for this
	/// token file, either by an active cooldown window or by exhausting the
	/// max-attempts policy.
	pub fn is_suppressed(&self, token_file: &str) -> bool {
		let state = self.load();
		let Some(entry) = state.entries.iter().find(|e| e.token_file == token_file) else {
			return false;
		};
		if entry.attempt_count >= self.max_attempts {
			return true;
		}
		let window = self.base_window_secs * 2i64.pow(entry.attempt_count.min(8));
		now_unix() < entry.updated_at + window
	}

	pub fn record_attempt(&self, provider_type: &str, token_file: &str, reason: &str) -> Result<(), RouteError> {
		let mut state = self.load();
		if let Some(entry) = state.entries.iter_mut().find(|e| e.token_file == token_file) {
			entry.attempt_count += 1;
			entry.updated_at = now_unix();
			entry.reason = reason.to_string();
		} else {
			state.entries.push(CooldownEntry {
				provider_type: provider_type.to_string(),
				token_file: token_file.to_string(),
				reason: reason.to_string(),
				attempt_count: 1,
				updated_at: now_unix(),
			});
		}
		self.save(&state)
	}

	pub fn clear(&self, token_file: &str) -> Result<(), RouteError> {
		let mut state = self.load();
		state.entries.retain(|e| e.token_file != token_file);
		self.save(&state)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn token_validity_respects_expiry_skew() {
		let token = TokenFile { expires_at: Some(1000), ..Default::default() };
		assert!(!token.is_valid(1000 - 60));
		assert!(token.is_valid(1000 - 400));
	}

	#[test]
	fn prefers_api_key_over_access_token() {
		let token = TokenFile {
			api_key: Some("long-lived".to_string()),
			access_token: Some("short-lived".to_string()),
			..Default::default()
		};
		assert_eq!(token.bearer_value(), Some("long-lived"));
	}

	#[test]
	fn write_then_read_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("token.json");
		let token = TokenFile { access_token: Some("abc".to_string()), expires_at: Some(123), ..Default::default() };
		write_token_file(&path, &token).unwrap();
		let read_back = read_token_file(&path).unwrap();
		assert_eq!(read_back.access_token.as_deref(), Some("abc"));
	}

	#[test]
	fn cooldown_suppresses_after_recent_attempt() {
		let dir = tempfile::tempdir().unwrap();
		let cooldown = InteractiveCooldown::new(dir.path());
		assert!(!cooldown.is_suppressed("tok.json"));
		cooldown.record_attempt("anthropic", "tok.json", "device_code_failed").unwrap();
		assert!(cooldown.is_suppressed("tok.json"));
	}
}
