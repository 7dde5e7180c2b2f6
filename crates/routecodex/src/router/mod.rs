//! Virtual Router: turns a canonical request plus configuration into a
//! `RouteTarget` naming the provider runtime, protocol, and upstream model
//! that should handle it.

pub mod balancer;
pub mod classifier;
pub mod health;

use std::collections::HashMap;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rc_core::strng::Strng;
use regex::Regex;

use crate::config::{Config, ProviderType};
use crate::error::RouteError;
use crate::types::canonical::CanonicalRequest;
use crate::types::protocol::WireProtocol;

use balancer::{BalancerState, Candidate};
use classifier::{Classification, RouteRule, ToolCategory};
use health::{ErrorSignal, HealthRegistry, HealthState};

#[derive(Debug, Clone)]
pub struct RouteTarget {
	pub route: String,
	pub runtime_key: Strng,
	pub provider_id: String,
	pub provider_protocol: WireProtocol,
	pub upstream_model: String,
	pub key_alias: String,
}

/// Parsed `<**#providerId**>` / `<**!#providerId**>` user override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderOverride<'a> {
	Pin(&'a str),
	Exclude(&'a str),
}

static OVERRIDE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<\*\*(!?)#([A-Za-z0-9_\-]+)\*\*>").unwrap());

pub fn parse_overrides(text: &str) -> Vec<ProviderOverride<'_>> {
	OVERRIDE_RE
		.captures_iter(text)
		.map(|c| {
			let provider = c.get(2).unwrap().as_str();
			if c.get(1).unwrap().as_str() == "!" {
				ProviderOverride::Exclude(provider)
			} else {
				ProviderOverride::Pin(provider)
			}
		})
		.collect()
}

/// Bounded memo of session id -> pinned/excluded provider id, so an override
/// seen on one request in a session keeps applying to the rest of it.
#[derive(Default)]
struct SessionOverrideMemo {
	inner: Mutex<IndexMap<Strng, (Option<String>, Option<String>)>>,
}

const SESSION_MEMO_CAPACITY: usize = 10_000;

impl SessionOverrideMemo {
	fn remember(&self, session_id: Strng, pin: Option<String>, exclude: Option<String>) {
		let mut map = self.inner.lock();
		map.shift_remove(&session_id);
		map.insert(session_id, (pin, exclude));
		while map.len() > SESSION_MEMO_CAPACITY {
			map.shift_remove_index(0);
		}
	}

	fn lookup(&self, session_id: &str) -> Option<(Option<String>, Option<String>)> {
		self.inner.lock().get(session_id).cloned()
	}
}

pub struct VirtualRouter {
	health: HealthRegistry,
	balancer: BalancerState,
	session_overrides: SessionOverrideMemo,
}

impl VirtualRouter {
	pub fn new(config: &Config) -> Self {
		Self {
			health: HealthRegistry::new(
				config.system.short_cooldown_ms,
				config.system.consecutive_fatal_threshold,
			),
			balancer: BalancerState::new(),
			session_overrides: SessionOverrideMemo::default(),
		}
	}

	pub fn record_success(&self, runtime_key: &Strng, now_ms: u64) {
		self.health.record_success(runtime_key);
		self.balancer.record_used(runtime_key, now_ms);
	}

	pub fn record_failure(&self, runtime_key: &Strng, signal: ErrorSignal, now_ms: u64) -> HealthState {
		self.health.record_failure(runtime_key, signal, now_ms)
	}

	pub fn record_auth_verified(&self, runtime_key: &Strng) {
		self.health.record_auth_verified(runtime_key);
	}

	pub fn health_snapshot(&self, runtime_key: &Strng) -> Option<health::RuntimeHealth> {
		self.health.snapshot(runtime_key)
	}

	/// Classify the request, pick a route, and select a healthy runtime.
	pub fn select(&self, req: &CanonicalRequest, config: &Config, now_ms: u64) -> Result<RouteTarget, RouteError> {
		self.select_excluding(req, config, now_ms, &[])
	}

	/// Same as [`Self::select`] but additionally excludes the given runtime
	/// keys — used by request-level failover to avoid re-selecting a
	/// candidate that just failed within the same request.
	pub fn select_excluding(
		&self,
		req: &CanonicalRequest,
		config: &Config,
		now_ms: u64,
		excluded_runtime_keys: &[Strng],
	) -> Result<RouteTarget, RouteError> {
		let classification = classifier::classify(req, &config.virtual_router.classification);
		let rules = route_rules(config);
		let route = classifier::select_route(&classification, &rules, config.virtual_router.classification.confidence_threshold);

		let (pin, exclude) = self.resolve_overrides(req);

		let targets = config
			.virtual_router
			.routing
			.get(&route)
			.or_else(|| config.virtual_router.routing.get("default"))
			.ok_or_else(|| RouteError::NoHealthyProvider(rc_core::strng::new(&route)))?;

		let mut candidates = Vec::new();
		for target in targets {
			let Some(provider_id) = target.split('.').next() else { continue };
			let Some(provider) = config.provider(provider_id) else { continue };
			let Some((provider_id, model_id, key_alias)) = split_target(target, provider) else { continue };
			if let Some(pin) = &pin {
				if provider_id != pin {
					continue;
				}
			}
			if let Some(exclude) = &exclude {
				if provider_id == exclude {
					continue;
				}
			}
			let runtime_key = crate::config::runtime_key(provider_id, key_alias);
			if excluded_runtime_keys.contains(&runtime_key) {
				continue;
			}
			if !self.health.is_selectable(&runtime_key, now_ms) {
				continue;
			}
			candidates.push((
				Candidate { runtime_key, weight: 1 },
				provider_id.to_string(),
				model_id.to_string(),
				key_alias.to_string(),
				provider.provider_type.clone(),
			));
		}

		if candidates.is_empty() {
			return Err(RouteError::NoHealthyProvider(rc_core::strng::new(&route)));
		}

		let only_candidates: Vec<Candidate> = candidates.iter().map(|c| c.0.clone()).collect();
		let chosen_key = self
			.balancer
			.pick(&route, config.virtual_router.balancer, &only_candidates, now_ms)
			.map(|c| c.runtime_key.clone())
			.ok_or_else(|| RouteError::NoHealthyProvider(rc_core::strng::new(&route)))?;

		let (_, provider_id, model_id, key_alias, provider_type) = candidates
			.into_iter()
			.find(|c| c.0.runtime_key == chosen_key)
			.expect("balancer picked from the candidate list it was given");

		Ok(RouteTarget {
			route,
			runtime_key: chosen_key,
			provider_id,
			provider_protocol: provider_protocol(&provider_type),
			upstream_model: model_id,
			key_alias,
		})
	}

	fn resolve_overrides(&self, req: &CanonicalRequest) -> (Option<String>, Option<String>) {
		let text: String = req
			.messages
			.iter()
			.filter_map(|m| m.content.as_ref())
			.map(|c| c.as_text())
			.collect::<Vec<_>>()
			.join("\n");

		let mut pin = None;
		let mut exclude = None;
		for o in parse_overrides(&text) {
			match o {
				ProviderOverride::Pin(id) => pin = Some(id.to_string()),
				ProviderOverride::Exclude(id) => exclude = Some(id.to_string()),
			}
		}

		if let Some(session_id) = &req.metadata.session_id {
			if pin.is_some() || exclude.is_some() {
				self
					.session_overrides
					.remember(session_id.clone(), pin.clone(), exclude.clone());
			} else if let Some((stored_pin, stored_exclude)) = self.session_overrides.lookup(session_id) {
				pin = stored_pin;
				exclude = stored_exclude;
			}
		}

		(pin, exclude)
	}
}

/// Split a `providerId.modelId[.keyAlias]` target. Model ids routinely
/// contain dots themselves (`glm-4.6`), so a plain `splitn(3, '.')` silently
/// truncates them and fabricates a bogus alias. Instead: `provider` is
/// always the segment before the first dot; whether a trailing `.keyAlias`
/// is genuinely present is decided by checking the remainder's last segment
/// against the provider's actually-configured key aliases, not by counting
/// dots — `model` is everything in between, dots and all.
fn split_target<'a>(target: &'a str, provider: &crate::config::ProviderConfig) -> Option<(&'a str, &'a str, &'a str)> {
	let (provider_id, rest) = target.split_once('.')?;
	match rest.rsplit_once('.') {
		Some((model_id, alias)) if provider_aliases(provider).iter().any(|a| a == alias) => Some((provider_id, model_id, alias)),
		_ => Some((provider_id, rest, "default")),
	}
}

/// The key aliases this provider actually resolves to a runtime, mirroring
/// `RuntimeManager::build`'s own alias derivation.
fn provider_aliases(provider: &crate::config::ProviderConfig) -> Vec<&str> {
	match &provider.auth {
		crate::config::AuthConfig::Apikey { entries, .. } if !entries.is_empty() => {
			entries.iter().map(|e| e.alias.as_str()).collect()
		},
		_ => vec!["default"],
	}
}

fn provider_protocol(provider_type: &ProviderType) -> WireProtocol {
	match provider_type {
		ProviderType::Openai | ProviderType::Mock => WireProtocol::OpenaiChat,
		ProviderType::Responses => WireProtocol::OpenaiResponses,
		ProviderType::Anthropic => WireProtocol::AnthropicMessages,
		ProviderType::Gemini => WireProtocol::GeminiChat,
		ProviderType::GeminiCli => WireProtocol::GeminiCliChat,
	}
}

fn route_rules(config: &Config) -> Vec<RouteRule> {
	config
		.virtual_router
		.classification
		.rules
		.iter()
		.map(|r| RouteRule {
			route: r.route.clone(),
			priority: r.priority,
			token_threshold: r.token_threshold,
			required_tools: r
				.required_tools
				.iter()
				.filter_map(|s| ToolCategory::from_config_str(s))
				.collect(),
			model_tier: r.model_tier.clone(),
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_pin_and_exclude_overrides() {
		let text = "please use <**#openai**> for this and avoid <**!#anthropic**>";
		let overrides = parse_overrides(text);
		assert_eq!(overrides, vec![ProviderOverride::Pin("openai"), ProviderOverride::Exclude("anthropic")]);
	}

	fn provider_with_aliases(aliases: &[&str]) -> crate::config::ProviderConfig {
		crate::config::ProviderConfig {
			id: "p".to_string(),
			provider_type: ProviderType::Openai,
			base_url: "http://localhost".to_string(),
			auth: crate::config::AuthConfig::Apikey {
				api_key: None,
				env: None,
				entries: aliases
					.iter()
					.map(|a| crate::config::ApiKeyEntry { api_key: Some("k".to_string()), env: None, alias: a.to_string() })
					.collect(),
				prefix: "Bearer".to_string(),
			},
			models: HashMap::new(),
			compatibility_profile: None,
			timeout_secs: 300,
			max_retries: 0,
		}
	}

	#[test]
	fn split_target_handles_missing_key_alias() {
		let provider = provider_with_aliases(&[]);
		assert_eq!(split_target("openai.gpt-4o", &provider), Some(("openai", "gpt-4o", "default")));
	}

	#[test]
	fn split_target_recognizes_a_configured_alias_suffix() {
		let provider = provider_with_aliases(&["primary", "secondary"]);
		assert_eq!(split_target("openai.gpt-4o.primary", &provider), Some(("openai", "gpt-4o", "primary")));
	}

	#[test]
	fn split_target_does_not_split_a_dotted_model_id_without_a_matching_alias() {
		// glm-4.6 is the whole model id (S1/S2/S3); "6" is not a configured
		// alias for this provider, so it must not be peeled off.
		let provider = provider_with_aliases(&["primary", "secondary"]);
		assert_eq!(split_target("glm.glm-4.6", &provider), Some(("glm", "glm-4.6", "default")));
	}

	#[test]
	fn split_target_with_no_configured_aliases_defaults_to_the_default_alias() {
		let provider = provider_with_aliases(&[]);
		assert_eq!(split_target("glm.glm-4.6", &provider), Some(("glm", "glm-4.6", "default")));
	}
}
