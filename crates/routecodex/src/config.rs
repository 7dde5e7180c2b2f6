//! Configuration loading. A single JSON config file merged with recognized
//! environment variables. Structural errors
//! (unknown compatibility profile, route pointing at an undefined provider)
//! are fail-fast; a missing file falls back to built-in defaults unless
//! `ROUTECODEX_DISABLE_CONFIG_FALLBACK` is set.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rc_core::strng::Strng;
use serde::{Deserialize, Serialize};

use crate::error::RouteError;
use crate::router::balancer::BalancerKind;
use crate::types::protocol::{EntryEndpoint, WireProtocol};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
	Openai,
	Responses,
	Anthropic,
	Gemini,
	GeminiCli,
	Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum AuthConfig {
	Apikey {
		#[serde(skip_serializing_if = "Option::is_none")]
		api_key: Option<String>,
		#[serde(skip_serializing_if = "Option::is_none")]
		env: Option<String>,
		#[serde(default, skip_serializing_if = "Vec::is_empty")]
		entries: Vec<ApiKeyEntry>,
		#[serde(default = "default_auth_prefix")]
		prefix: String,
	},
	Oauth {
		token_file: String,
		#[serde(skip_serializing_if = "Option::is_none")]
		token_url: Option<String>,
		#[serde(skip_serializing_if = "Option::is_none")]
		client_id: Option<String>,
		#[serde(skip_serializing_if = "Option::is_none")]
		client_secret: Option<String>,
	},
}

fn default_auth_prefix() -> String {
	"Bearer".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyEntry {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub api_key: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub env: Option<String>,
	pub alias: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelLimits {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_context: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
	pub id: String,
	#[serde(rename = "type")]
	pub provider_type: ProviderType,
	pub base_url: String,
	pub auth: AuthConfig,
	#[serde(default)]
	pub models: HashMap<String, ModelLimits>,
	#[serde(default)]
	pub compatibility_profile: Option<String>,
	#[serde(default = "default_timeout_secs")]
	pub timeout_secs: u64,
	#[serde(default)]
	pub max_retries: u32,
}

fn default_timeout_secs() -> u64 {
	300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRuleConfig {
	pub route: String,
	#[serde(default)]
	pub priority: i32,
	#[serde(default)]
	pub token_threshold: Option<u64>,
	#[serde(default)]
	pub required_tools: Vec<String>,
	#[serde(default)]
	pub model_tier: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClassificationConfig {
	#[serde(default = "default_chars_per_token")]
	pub chars_per_token: f64,
	#[serde(default)]
	pub rules: Vec<RouteRuleConfig>,
	#[serde(default = "default_confidence_threshold")]
	pub confidence_threshold: f64,
}

fn default_chars_per_token() -> f64 {
	4.0
}

fn default_confidence_threshold() -> f64 {
	0.5
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VirtualRouterConfig {
	#[serde(default)]
	pub providers: HashMap<String, ProviderConfig>,
	/// routeName -> ordered list of "providerId.modelId.keyAlias" targets.
	#[serde(default)]
	pub routing: HashMap<String, Vec<String>>,
	#[serde(default)]
	pub classification: ClassificationConfig,
	#[serde(default)]
	pub balancer: BalancerKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmSwitchConfig {
	/// Per-endpoint protocol pin (detection rule #2), keyed by the kebab-case
	/// endpoint name ("chat-completions", "messages", "responses").
	#[serde(default)]
	pub endpoint_protocol_override: HashMap<EntryEndpoint, WireProtocol>,
	pub default_protocol: Option<WireProtocol>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityConfig {
	/// "<protocol>:<profile>" identifiers, e.g. "chat:glm".
	pub profiles: Vec<String>,
}

impl Default for CompatibilityConfig {
	fn default() -> Self {
		Self { profiles: vec![] }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SystemConfig {
	#[serde(default)]
	pub snapshots_enabled: bool,
	#[serde(default)]
	pub stats_enabled: bool,
	#[serde(default = "default_short_cooldown_ms")]
	pub short_cooldown_ms: u64,
	#[serde(default = "default_consecutive_fatal_threshold")]
	pub consecutive_fatal_threshold: u32,
}

fn default_short_cooldown_ms() -> u64 {
	// 30 minutes, configurable per deployment.
	30 * 60 * 1000
}

fn default_consecutive_fatal_threshold() -> u32 {
	5
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
	#[serde(default)]
	pub virtual_router: VirtualRouterConfig,
	#[serde(default)]
	pub llm_switch: LlmSwitchConfig,
	#[serde(default)]
	pub compatibility: CompatibilityConfig,
	#[serde(default)]
	pub system: SystemConfig,
	#[serde(skip)]
	pub auth_dir: PathBuf,
	#[serde(skip)]
	pub snapshot_dir: PathBuf,
}

impl Config {
	pub fn default_path() -> PathBuf {
		dirs_home_routecodex().join("config.json")
	}

	pub fn load(path: Option<&Path>) -> Result<Self, RouteError> {
		let path = path
			.map(Path::to_path_buf)
			.unwrap_or_else(Self::default_path);

		let mut config = match std::fs::read_to_string(&path) {
			Ok(raw) => serde_json::from_str::<Config>(&raw)
				.map_err(|e| RouteError::InvalidConfig(format!("{path:?}: {e}")))?,
			Err(_) if std::env::var("ROUTECODEX_DISABLE_CONFIG_FALLBACK").is_err() => Config::default(),
			Err(e) => {
				return Err(RouteError::InvalidConfig(format!(
					"config file {path:?} not found and fallback disabled: {e}"
				)));
			},
		};

		config.apply_env_overrides();
		config.validate()?;
		Ok(config)
	}

	fn apply_env_overrides(&mut self) {
		if let Ok(dir) = std::env::var("ROUTECODEX_AUTH_DIR") {
			self.auth_dir = PathBuf::from(shellexpand::tilde(&dir).into_owned());
		} else {
			self.auth_dir = dirs_home_routecodex().join("auth");
		}
		if let Ok(dir) = std::env::var("ROUTECODEX_SNAPSHOT_DIR") {
			self.snapshot_dir = PathBuf::from(shellexpand::tilde(&dir).into_owned());
		} else {
			self.snapshot_dir = dirs_home_routecodex().join("codex-samples");
		}
	}

	/// Fail-fast structural validation: an unknown profile or a route pointing
	/// at an undefined provider aborts startup rather than failing at request time.
	fn validate(&self) -> Result<(), RouteError> {
		for (route, targets) in &self.virtual_router.routing {
			for target in targets {
				let provider_id = target.split('.').next().unwrap_or(target);
				if !self.virtual_router.providers.contains_key(provider_id) {
					return Err(RouteError::InvalidConfig(format!(
						"route {route} references undefined provider {provider_id}"
					)));
				}
			}
		}
		Ok(())
	}

	pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
		self.virtual_router.providers.get(id)
	}
}

pub fn dirs_home_routecodex() -> PathBuf {
	let home = std::env::var("HOME").unwrap_or_else(|_| "/root".to_string());
	PathBuf::from(home).join(".routecodex")
}

pub fn runtime_key(provider_id: &str, key_alias: &str) -> Strng {
	rc_core::strng::new(&format!("{provider_id}.{key_alias}"))
}
