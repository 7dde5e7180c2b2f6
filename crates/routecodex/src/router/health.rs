//! Per-runtime Cooldown/Health state machine, driven by classified upstream
//! errors: healthy -> cooldown -> healthy on expiry, or healthy/cooldown ->
//! fatal on a daily-limit or non-recoverable status, with recovery back to
//! healthy only through a successful OAuth re-verification.

use std::collections::HashMap;

use parking_lot::Mutex;
use rc_core::strng::Strng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
	Healthy,
	Cooldown,
	Fatal,
}

#[derive(Debug, Clone)]
pub struct RuntimeHealth {
	pub state: HealthState,
	pub cooldown_until_ms: u64,
	pub cooldown_window_ms: u64,
	pub consecutive_errors: u32,
}

impl RuntimeHealth {
	fn new(base_cooldown_ms: u64) -> Self {
		Self {
			state: HealthState::Healthy,
			cooldown_until_ms: 0,
			cooldown_window_ms: base_cooldown_ms,
			consecutive_errors: 0,
		}
	}

	pub fn is_selectable(&self, now_ms: u64) -> bool {
		match self.state {
			HealthState::Healthy => true,
			HealthState::Cooldown => now_ms >= self.cooldown_until_ms,
			HealthState::Fatal => false,
		}
	}
}

/// Classification handed back from the provider runtime's error classifier,
/// consumed here to drive the state transition for one runtime.
#[derive(Debug, Clone, Copy)]
pub struct ErrorSignal {
	pub is_rate_limit: bool,
	pub is_daily_limit_rate_limit: bool,
	pub affects_health: bool,
	pub force_fatal: bool,
}

pub struct HealthRegistry {
	base_cooldown_ms: u64,
	fatal_threshold: u32,
	states: Mutex<HashMap<Strng, RuntimeHealth>>,
}

impl HealthRegistry {
	pub fn new(base_cooldown_ms: u64, fatal_threshold: u32) -> Self {
		Self {
			base_cooldown_ms,
			fatal_threshold,
			states: Mutex::new(HashMap::new()),
		}
	}

	pub fn is_selectable(&self, runtime_key: &Strng, now_ms: u64) -> bool {
		let mut states = self.states.lock();
		states
			.entry(runtime_key.clone())
			.or_insert_with(|| RuntimeHealth::new(self.base_cooldown_ms))
			.is_selectable(now_ms)
	}

	pub fn snapshot(&self, runtime_key: &Strng) -> Option<RuntimeHealth> {
		self.states.lock().get(runtime_key).cloned()
	}

	pub fn record_success(&self, runtime_key: &Strng) {
		let mut states = self.states.lock();
		let entry = states
			.entry(runtime_key.clone())
			.or_insert_with(|| RuntimeHealth::new(self.base_cooldown_ms));
		entry.consecutive_errors = 0;
		entry.cooldown_window_ms = self.base_cooldown_ms;
		if entry.state == HealthState::Cooldown {
			entry.state = HealthState::Healthy;
		}
	}

	/// Apply a classified failure and return the resulting state.
	pub fn record_failure(&self, runtime_key: &Strng, signal: ErrorSignal, now_ms: u64) -> HealthState {
		let mut states = self.states.lock();
		let entry = states
			.entry(runtime_key.clone())
			.or_insert_with(|| RuntimeHealth::new(self.base_cooldown_ms));

		if signal.force_fatal || signal.is_daily_limit_rate_limit {
			entry.state = HealthState::Fatal;
			return entry.state;
		}

		if signal.is_rate_limit {
			// Monotonically extend the cooldown window on repeated 429s.
			entry.cooldown_window_ms = entry.cooldown_window_ms.saturating_mul(2).min(self.base_cooldown_ms * 8);
			entry.cooldown_until_ms = now_ms + entry.cooldown_window_ms;
			entry.state = HealthState::Cooldown;
			return entry.state;
		}

		if signal.affects_health {
			entry.consecutive_errors += 1;
			if entry.consecutive_errors >= self.fatal_threshold {
				entry.state = HealthState::Fatal;
			} else {
				entry.cooldown_until_ms = now_ms + entry.cooldown_window_ms;
				entry.state = HealthState::Cooldown;
			}
		}
		entry.state
	}

	/// A runtime proved it can authenticate again; clear fatal/cooldown state.
	pub fn record_auth_verified(&self, runtime_key: &Strng) {
		let mut states = self.states.lock();
		let entry = states
			.entry(runtime_key.clone())
			.or_insert_with(|| RuntimeHealth::new(self.base_cooldown_ms));
		entry.state = HealthState::Healthy;
		entry.consecutive_errors = 0;
		entry.cooldown_window_ms = self.base_cooldown_ms;
	}
}
