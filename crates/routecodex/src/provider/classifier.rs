//! Error classifier: maps an upstream failure plus auth mode to the
//! recoverable/affects-health/force-fatal/rate-limit signals consumed by the
//! router's health state machine.

use crate::router::health::ErrorSignal;

const DAILY_LIMIT_MARKERS: &[&str] = &["daily limit", "quota exceeded for the day", "daily quota"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
	ApiKey,
	OAuth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamFailure {
	NetworkTransport,
	Status(u16),
	SseToJson,
	SyntheticCooldown,
}

#[derive(Debug, Clone, Copy)]
pub struct Classified {
	pub recoverable: bool,
	pub signal: ErrorSignal,
}

/// Classify one upstream failure per the fixed condition table: network
/// transport errors are always recoverable and health-neutral; 429s split
/// into short-term (health-affecting, cooldown) vs. daily-limit (force
/// fatal); 401 behavior depends on auth mode; 402/500/524 are health-fatal
/// but not force-fatal; other 4xx are recoverable and health-neutral.
pub fn classify(failure: UpstreamFailure, auth_mode: AuthMode, upstream_message: Option<&str>) -> Classified {
	match failure {
		UpstreamFailure::NetworkTransport => Classified {
			recoverable: true,
			signal: ErrorSignal { is_rate_limit: false, is_daily_limit_rate_limit: false, affects_health: false, force_fatal: false },
		},
		UpstreamFailure::SseToJson => Classified {
			recoverable: true,
			signal: ErrorSignal { is_rate_limit: false, is_daily_limit_rate_limit: false, affects_health: false, force_fatal: false },
		},
		UpstreamFailure::SyntheticCooldown => Classified {
			recoverable: true,
			signal: ErrorSignal { is_rate_limit: false, is_daily_limit_rate_limit: false, affects_health: false, force_fatal: false },
		},
		UpstreamFailure::Status(429) => {
			let daily = is_daily_limit_message(upstream_message);
			Classified {
				recoverable: !daily,
				signal: ErrorSignal {
					is_rate_limit: true,
					is_daily_limit_rate_limit: daily,
					affects_health: true,
					force_fatal: daily,
				},
			}
		},
		UpstreamFailure::Status(401) => match auth_mode {
			AuthMode::OAuth => Classified {
				recoverable: true,
				signal: ErrorSignal { is_rate_limit: false, is_daily_limit_rate_limit: false, affects_health: false, force_fatal: false },
			},
			AuthMode::ApiKey => Classified {
				recoverable: false,
				signal: ErrorSignal { is_rate_limit: false, is_daily_limit_rate_limit: false, affects_health: true, force_fatal: false },
			},
		},
		UpstreamFailure::Status(402) | UpstreamFailure::Status(500) | UpstreamFailure::Status(524) => Classified {
			recoverable: false,
			signal: ErrorSignal { is_rate_limit: false, is_daily_limit_rate_limit: false, affects_health: true, force_fatal: false },
		},
		UpstreamFailure::Status(_) => Classified {
			recoverable: true,
			signal: ErrorSignal { is_rate_limit: false, is_daily_limit_rate_limit: false, affects_health: false, force_fatal: false },
		},
	}
}

fn is_daily_limit_message(message: Option<&str>) -> bool {
	let Some(message) = message else { return false };
	let lower = message.to_lowercase();
	DAILY_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Should a provider-level retry (the single 5xx exception) be attempted?
pub fn should_retry_provider_http_error(failure: UpstreamFailure) -> bool {
	matches!(failure, UpstreamFailure::Status(500) | UpstreamFailure::Status(502) | UpstreamFailure::Status(503) | UpstreamFailure::Status(524))
}

pub fn retry_delay_ms(attempt: u32) -> u64 {
	(500u64.saturating_mul(attempt as u64)).min(2000)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn daily_limit_429_is_force_fatal() {
		let c = classify(UpstreamFailure::Status(429), AuthMode::ApiKey, Some("You've hit your daily limit"));
		assert!(!c.recoverable);
		assert!(c.signal.force_fatal);
		assert!(c.signal.is_daily_limit_rate_limit);
	}

	#[test]
	fn short_term_429_is_recoverable_but_affects_health() {
		let c = classify(UpstreamFailure::Status(429), AuthMode::ApiKey, Some("rate limited, slow down"));
		assert!(c.recoverable);
		assert!(c.signal.affects_health);
		assert!(!c.signal.force_fatal);
	}

	#[test]
	fn oauth_401_is_recoverable_api_key_401_is_not() {
		let oauth = classify(UpstreamFailure::Status(401), AuthMode::OAuth, None);
		let api_key = classify(UpstreamFailure::Status(401), AuthMode::ApiKey, None);
		assert!(oauth.recoverable);
		assert!(!api_key.recoverable);
		assert!(api_key.signal.affects_health);
	}

	#[test]
	fn retry_delay_caps_at_2000ms() {
		assert_eq!(retry_delay_ms(1), 500);
		assert_eq!(retry_delay_ms(5), 2000);
	}
}
