//! Provider Runtime: for one `runtimeKey`, perform the actual HTTP call to
//! the upstream, managing authentication, the single provider-level retry,
//! OAuth refresh-and-replay, and snapshot logging.

pub mod auth;
pub mod classifier;
pub mod http_exec;
pub mod oauth;
pub mod snapshot;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use rc_core::strng::Strng;
use serde_json::Value;

use crate::config::{AuthConfig, Config, ProviderConfig};
use crate::error::RouteError;
use auth::ApiKeyAuth;
use classifier::{classify, AuthMode, UpstreamFailure};
use http_exec::{execute_with_single_retry, resolve_url, strip_internal_metadata};
use snapshot::{endpoint_folder, SnapshotStage, SnapshotWriter};

/// Pull the human-readable message text out of an upstream error body for
/// the classifier's daily-limit keyword match. Most providers nest it under
/// `error.message`; a few put it at the top level; fall back to the whole
/// body serialized so keyword matching still has something to search.
fn upstream_message_text(parsed: &Value) -> String {
	parsed
		.get("error")
		.and_then(|e| e.get("message"))
		.and_then(Value::as_str)
		.or_else(|| parsed.get("message").and_then(Value::as_str))
		.map(str::to_string)
		.unwrap_or_else(|| parsed.to_string())
}

pub struct ProviderExecutionResult {
	pub status: u16,
	pub body: Value,
	pub request_id: Strng,
}

enum RuntimeAuth {
	ApiKey(ApiKeyAuth),
	OAuth { token_path: PathBuf, token_url: Option<String>, client_id: Option<String>, client_secret: Option<String> },
}

pub struct ProviderRuntime {
	pub provider_id: String,
	pub config: ProviderConfig,
	auth: RuntimeAuth,
	http: reqwest::Client,
}

impl ProviderRuntime {
	pub fn new(provider_id: &str, config: &ProviderConfig, auth_dir: &std::path::Path) -> Result<Self, RouteError> {
		let auth = match &config.auth {
			AuthConfig::Apikey { .. } => RuntimeAuth::ApiKey(
				ApiKeyAuth::from_config(&config.auth)
					.ok_or_else(|| RouteError::InvalidConfig(format!("provider {provider_id} has no resolvable api key auth")))?,
			),
			AuthConfig::Oauth { token_file, token_url, client_id, client_secret } => RuntimeAuth::OAuth {
				token_path: auth_dir.join(token_file),
				token_url: token_url.clone(),
				client_id: client_id.clone(),
				client_secret: client_secret.clone(),
			},
		};

		let http = reqwest::Client::builder()
			.timeout(Duration::from_secs(config.timeout_secs))
			.build()
			.map_err(|e| RouteError::InvalidConfig(format!("building http client for {provider_id}: {e}")))?;

		Ok(Self { provider_id: provider_id.to_string(), config: config.clone(), auth, http })
	}

	fn auth_mode(&self) -> AuthMode {
		match &self.auth {
			RuntimeAuth::ApiKey(_) => AuthMode::ApiKey,
			RuntimeAuth::OAuth { .. } => AuthMode::OAuth,
		}
	}

	fn auth_header(&self, key_alias: &str) -> Result<(String, String), RouteError> {
		match &self.auth {
			RuntimeAuth::ApiKey(key_auth) => {
				let (prefix, key) = key_auth.resolve(key_alias)?;
				Ok(("Authorization".to_string(), format!("{prefix} {key}")))
			},
			RuntimeAuth::OAuth { token_path, .. } => {
				let token = oauth::read_token_file(token_path)?;
				let value = token
					.bearer_value()
					.ok_or_else(|| RouteError::AuthVerify(rc_core::strng::new("oauth token file has neither api_key nor access_token")))?;
				Ok(("Authorization".to_string(), format!("Bearer {value}")))
			},
		}
	}

	async fn maybe_refresh_oauth(&self) -> Result<(), RouteError> {
		let RuntimeAuth::OAuth { token_path, token_url, client_id, client_secret } = &self.auth else {
			return Ok(());
		};
		let token = oauth::read_token_file(token_path)?;
		if token.is_valid(oauth::now_unix()) {
			return Ok(());
		}
		let Some(token_url) = token_url else {
			return Err(RouteError::AuthVerify(rc_core::strng::new("token expired and no token_url configured")));
		};
		let refreshed = oauth::refresh(&self.http, token_url, &token, client_id.as_deref(), client_secret.as_deref()).await?;
		oauth::write_token_file(token_path, &refreshed)
	}

	/// Execute one request against this runtime: resolve the endpoint, strip
	/// internal fields, attach auth and stream headers, send with the single
	/// provider-level retry, and on a 401 under OAuth attempt exactly one
	/// refresh-and-replay before giving up.
	pub async fn execute(
		&self,
		model: &str,
		key_alias: &str,
		mut body: Value,
		stream: bool,
		request_id: &Strng,
		snapshots: &SnapshotWriter,
		entry_endpoint: &str,
	) -> Result<ProviderExecutionResult, RouteError> {
		strip_internal_metadata(&mut body);
		self.maybe_refresh_oauth().await?;

		let url = resolve_url(&self.config.base_url, &self.config.provider_type, model);
		let provider_token = format!("{}.{key_alias}", self.provider_id);
		let folder = endpoint_folder(entry_endpoint);

		let (header_name, header_value) = self.auth_header(key_alias)?;
		snapshots.write(
			&folder,
			&provider_token,
			request_id,
			SnapshotStage::ProviderRequest,
			&body,
			&[(header_name.clone(), header_value.clone())],
		);

		let timeout = Duration::from_secs(self.config.timeout_secs);
		let response = execute_with_single_retry(&self.http, &url, (&header_name, &header_value), &[], &body, stream, timeout).await?;

		if response.status == 401 && self.auth_mode() == AuthMode::OAuth {
			self.force_refresh().await?;
			let (header_name, header_value) = self.auth_header(key_alias)?;
			let retried = execute_with_single_retry(&self.http, &url, (&header_name, &header_value), &[], &body, stream, timeout).await?;
			return self.finish(retried, &folder, &provider_token, request_id, snapshots, true).await;
		}

		self.finish(response, &folder, &provider_token, request_id, snapshots, false).await
	}

	/// Same lifecycle as [`Self::execute`] but returns the raw upstream
	/// response for the caller to stream byte-by-byte rather than parsing it
	/// as a single JSON body.
	pub async fn execute_stream(
		&self,
		model: &str,
		key_alias: &str,
		mut body: Value,
		request_id: &Strng,
		snapshots: &SnapshotWriter,
		entry_endpoint: &str,
	) -> Result<http_exec::ExecutedResponse, RouteError> {
		strip_internal_metadata(&mut body);
		self.maybe_refresh_oauth().await?;

		let url = resolve_url(&self.config.base_url, &self.config.provider_type, model);
		let provider_token = format!("{}.{key_alias}", self.provider_id);
		let folder = endpoint_folder(entry_endpoint);

		let (header_name, header_value) = self.auth_header(key_alias)?;
		snapshots.write(
			&folder,
			&provider_token,
			request_id,
			SnapshotStage::ProviderRequest,
			&body,
			&[(header_name.clone(), header_value.clone())],
		);

		let timeout = Duration::from_secs(self.config.timeout_secs);
		let response = execute_with_single_retry(&self.http, &url, (&header_name, &header_value), &[], &body, true, timeout).await?;

		if response.status == 401 && self.auth_mode() == AuthMode::OAuth {
			self.force_refresh().await?;
			let (header_name, header_value) = self.auth_header(key_alias)?;
			return execute_with_single_retry(&self.http, &url, (&header_name, &header_value), &[], &body, true, timeout).await;
		}

		if response.status >= 400 {
			snapshots.write(&folder, &provider_token, request_id, SnapshotStage::ProviderError, &serde_json::json!({}), &[]);
		}

		Ok(response)
	}

	async fn force_refresh(&self) -> Result<(), RouteError> {
		let RuntimeAuth::OAuth { token_path, token_url, client_id, client_secret } = &self.auth else {
			return Err(RouteError::AuthVerify(rc_core::strng::new("401 under non-oauth auth cannot refresh")));
		};
		let token = oauth::read_token_file(token_path)?;
		let Some(token_url) = token_url else {
			return Err(RouteError::AuthVerify(rc_core::strng::new("no token_url configured for refresh")));
		};
		let refreshed = oauth::refresh(&self.http, token_url, &token, client_id.as_deref(), client_secret.as_deref()).await?;
		oauth::write_token_file(token_path, &refreshed)
	}

	async fn finish(
		&self,
		response: http_exec::ExecutedResponse,
		folder: &str,
		provider_token: &str,
		request_id: &Strng,
		snapshots: &SnapshotWriter,
		was_retry: bool,
	) -> Result<ProviderExecutionResult, RouteError> {
		let status = response.status;
		if status >= 400 {
			let text = response.body.text().await.unwrap_or_default();
			let parsed: Value = serde_json::from_str(&text).unwrap_or_else(|_| serde_json::json!({"message": text}));
			snapshots.write(
				folder,
				provider_token,
				request_id,
				if was_retry { SnapshotStage::ProviderRequestRetryResponse } else { SnapshotStage::ProviderError },
				&parsed,
				&[],
			);
			return Err(RouteError::HttpUpstream(status, upstream_message_text(&parsed)));
		}

		let body: Value = response
			.body
			.json()
			.await
			.map_err(|e| RouteError::PipelineFailure(format!("failed to parse upstream response body: {e}")))?;
		snapshots.write(
			folder,
			provider_token,
			request_id,
			if was_retry { SnapshotStage::ProviderRequestRetryResponse } else { SnapshotStage::ProviderResponse },
			&body,
			&[],
		);

		Ok(ProviderExecutionResult { status, body, request_id: request_id.clone() })
	}

	pub fn classify_status(&self, status: u16, upstream_message: Option<&str>) -> classifier::Classified {
		classify(UpstreamFailure::Status(status), self.auth_mode(), upstream_message)
	}

	/// Classify a network-transport failure (connection reset, timeout,
	/// `fetch failed`) that never reached the point of getting a status code.
	pub fn classify_network_error(&self) -> classifier::Classified {
		classify(UpstreamFailure::NetworkTransport, self.auth_mode(), None)
	}

	/// Best-effort `GET /models` passthrough for `GET /v1/models`; a 404 or
	/// any transport failure is not fatal to the caller.
	pub async fn list_models(&self, key_alias: &str) -> Result<Value, RouteError> {
		let url = format!("{}/models", self.config.base_url.trim_end_matches('/'));
		let (header_name, header_value) = self.auth_header(key_alias)?;
		let response = self
			.http
			.get(&url)
			.header(header_name, header_value)
			.timeout(Duration::from_secs(self.config.timeout_secs))
			.send()
			.await
			.map_err(|e| RouteError::PipelineFailure(format!("models list request failed: {e}")))?;
		if !response.status().is_success() {
			return Err(RouteError::Http(response.status().as_u16()));
		}
		response
			.json()
			.await
			.map_err(|e| RouteError::PipelineFailure(format!("failed to parse models list response: {e}")))
	}
}

/// `runtimeKey -> ProviderRuntime`, built once from configuration at startup.
pub struct RuntimeManager {
	runtimes: HashMap<Strng, ProviderRuntime>,
}

impl RuntimeManager {
	pub fn build(config: &Config) -> Result<Self, RouteError> {
		let mut runtimes = HashMap::new();
		for (provider_id, provider_config) in &config.virtual_router.providers {
			let aliases = match &provider_config.auth {
				AuthConfig::Apikey { entries, .. } if !entries.is_empty() => {
					entries.iter().map(|e| e.alias.clone()).collect::<Vec<_>>()
				},
				_ => vec!["default".to_string()],
			};
			for alias in aliases {
				let runtime_key = crate::config::runtime_key(provider_id, &alias);
				let runtime = ProviderRuntime::new(provider_id, provider_config, &config.auth_dir)?;
				runtimes.insert(runtime_key, runtime);
			}
		}
		Ok(Self { runtimes })
	}

	pub fn get(&self, runtime_key: &Strng) -> Result<&ProviderRuntime, RouteError> {
		self.runtimes.get(runtime_key).ok_or_else(|| RouteError::RuntimeNotFound(runtime_key.clone()))
	}

	pub fn iter(&self) -> impl Iterator<Item = (&Strng, &ProviderRuntime)> {
		self.runtimes.iter()
	}
}

