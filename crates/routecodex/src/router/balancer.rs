//! Candidate selection among healthy runtimes for a chosen route.

use std::collections::HashMap;

use parking_lot::Mutex;
use rc_core::strng::Strng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BalancerKind {
	#[default]
	WeightedRoundRobin,
	RoundRobin,
	Lru,
}

#[derive(Debug, Clone)]
pub struct Candidate {
	pub runtime_key: Strng,
	pub weight: u32,
}

/// Per-route round-robin cursor and per-runtime last-used timestamps, shared
/// across requests. One instance lives on the `VirtualRouter`.
#[derive(Default)]
pub struct BalancerState {
	cursors: Mutex<HashMap<String, usize>>,
	last_used: Mutex<HashMap<Strng, u64>>,
}

impl BalancerState {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record_used(&self, runtime_key: &Strng, now_ms: u64) {
		self.last_used.lock().insert(runtime_key.clone(), now_ms);
	}

	pub fn pick<'a>(
		&self,
		route: &str,
		kind: BalancerKind,
		candidates: &'a [Candidate],
		now_ms: u64,
	) -> Option<&'a Candidate> {
		if candidates.is_empty() {
			return None;
		}
		match kind {
			BalancerKind::RoundRobin => {
				let mut cursors = self.cursors.lock();
				let cursor = cursors.entry(route.to_string()).or_insert(0);
				let chosen = &candidates[*cursor % candidates.len()];
				*cursor = (*cursor + 1) % candidates.len();
				Some(chosen)
			},
			BalancerKind::WeightedRoundRobin => {
				let total_weight: u32 = candidates.iter().map(|c| c.weight.max(1)).sum();
				let mut cursors = self.cursors.lock();
				let cursor = cursors.entry(route.to_string()).or_insert(0);
				let mut point = (*cursor as u32) % total_weight.max(1);
				*cursor = cursor.wrapping_add(1);
				for candidate in candidates {
					let weight = candidate.weight.max(1);
					if point < weight {
						return Some(candidate);
					}
					point -= weight;
				}
				candidates.first()
			},
			BalancerKind::Lru => {
				let _ = now_ms;
				let last_used = self.last_used.lock();
				candidates
					.iter()
					.min_by_key(|c| last_used.get(&c.runtime_key).copied().unwrap_or(0))
			},
		}
	}
}
