//! API-key auth: a literal value, an `${ENV_VAR}` indirection, or rotation
//! over a list of aliased entries.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::{ApiKeyEntry, AuthConfig};
use crate::error::RouteError;

pub struct ApiKeyAuth {
	entries: Vec<ResolvedEntry>,
	prefix: String,
	cursor: AtomicUsize,
}

struct ResolvedEntry {
	alias: String,
	value_env: Option<String>,
	value_literal: Option<String>,
}

impl ApiKeyAuth {
	pub fn from_config(auth: &AuthConfig) -> Option<Self> {
		match auth {
			AuthConfig::Apikey { api_key, env, entries, prefix } => {
				let mut resolved = Vec::new();
				if api_key.is_some() || env.is_some() {
					resolved.push(ResolvedEntry {
						alias: "default".to_string(),
						value_env: env.clone(),
						value_literal: api_key.clone(),
					});
				}
				for entry in entries {
					resolved.push(ResolvedEntry {
						alias: entry.alias.clone(),
						value_env: entry.env.clone(),
						value_literal: entry.api_key.clone(),
					});
				}
				Some(Self {
					entries: resolved,
					prefix: prefix.clone(),
					cursor: AtomicUsize::new(0),
				})
			},
			AuthConfig::Oauth { .. } => None,
		}
	}

	/// Resolve one entry by alias, or round-robin through all entries if the
	/// alias is `"default"` and more than one is configured.
	pub fn resolve(&self, alias: &str) -> Result<(String, String), RouteError> {
		let entry = if alias == "default" && self.entries.len() > 1 {
			let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.entries.len();
			&self.entries[idx]
		} else {
			self
				.entries
				.iter()
				.find(|e| e.alias == alias)
				.ok_or_else(|| RouteError::AuthVerify(rc_core::strng::new(&format!("no api key entry aliased {alias}"))))?
		};

		let key = if let Some(env_name) = &entry.value_env {
			std::env::var(env_name)
				.map_err(|_| RouteError::AuthVerify(rc_core::strng::new(&format!("env var {env_name} not set"))))?
		} else if let Some(literal) = &entry.value_literal {
			expand_env_indirection(literal)?
		} else {
			return Err(RouteError::AuthVerify(rc_core::strng::new(&format!(
				"api key entry {alias} has neither a literal value nor an env indirection"
			))));
		};

		Ok((self.prefix.clone(), key))
	}
}

/// A literal value of the form `${NAME}` is resolved against the process
/// environment instead of being sent upstream verbatim.
fn expand_env_indirection(literal: &str) -> Result<String, RouteError> {
	if let Some(name) = literal.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
		std::env::var(name).map_err(|_| RouteError::AuthVerify(rc_core::strng::new(&format!("env var {name} not set"))))
	} else {
		Ok(literal.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn expands_env_indirection() {
		std::env::set_var("RC_TEST_KEY", "secret-value");
		assert_eq!(expand_env_indirection("${RC_TEST_KEY}").unwrap(), "secret-value");
		assert_eq!(expand_env_indirection("literal").unwrap(), "literal");
	}

	#[test]
	fn rotates_across_entries_for_default_alias() {
		let auth = AuthConfig::Apikey {
			api_key: None,
			env: None,
			entries: vec![
				ApiKeyEntry { api_key: Some("k1".to_string()), env: None, alias: "a".to_string() },
				ApiKeyEntry { api_key: Some("k2".to_string()), env: None, alias: "b".to_string() },
			],
			prefix: "Bearer".to_string(),
		};
		let key_auth = ApiKeyAuth::from_config(&auth).unwrap();
		let (_, first) = key_auth.resolve("default").unwrap();
		let (_, second) = key_auth.resolve("default").unwrap();
		assert_ne!(first, second);
	}
}
