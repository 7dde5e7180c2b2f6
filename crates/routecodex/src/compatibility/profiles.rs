//! Built-in per-family profiles. Each resolves a `"<protocol>:<profile>"`
//! identifier to a field mapping, shape filter, and hook chain.

use crate::compatibility::hooks::{Hook, ResponsesC4mIncomingHook, ResponsesC4mOutgoingHook, ToolCleaningHook};
use crate::compatibility::shape_filter::ShapeFilter;
use crate::compatibility::CompatibilityProfile;

pub fn resolve_builtin(name: &str) -> Option<CompatibilityProfile> {
	match name {
		"chat:glm" => Some(glm()),
		"chat:qwen" => Some(qwen()),
		"chat:iflow" => Some(iflow()),
		"chat:lmstudio" => Some(lmstudio()),
		"chat:deepseek" => Some(deepseek()),
		"responses:responses-c4m" => Some(responses_c4m()),
		"chat:gemini" | "gemini:gemini" => Some(gemini()),
		"messages:anthropic-passthrough" => Some(anthropic_passthrough()),
		_ => None,
	}
}

fn with_tool_cleaning(mut profile: CompatibilityProfile) -> CompatibilityProfile {
	profile.hooks.push(Box::new(ToolCleaningHook));
	profile
}

/// GLM (Zhipu) openai-compatible endpoint: tool schemas need the same
/// cleanup as every other "shell tool" family, no field renames needed.
fn glm() -> CompatibilityProfile {
	with_tool_cleaning(CompatibilityProfile::default())
}

/// Qwen openai-compatible endpoint: same shape as glm.
fn qwen() -> CompatibilityProfile {
	with_tool_cleaning(CompatibilityProfile::default())
}

/// iFlow openai-compatible endpoint.
fn iflow() -> CompatibilityProfile {
	with_tool_cleaning(CompatibilityProfile::default())
}

/// Local lmstudio server: drop fields it 400s on, keep the rest passthrough.
fn lmstudio() -> CompatibilityProfile {
	let mut profile = CompatibilityProfile::default();
	profile.field_mapping.request.push(("logprobs".to_string(), None));
	profile.field_mapping.request.push(("user".to_string(), None));
	with_tool_cleaning(profile)
}

/// Deepseek openai-compatible endpoint.
fn deepseek() -> CompatibilityProfile {
	with_tool_cleaning(CompatibilityProfile::default())
}

/// OpenAI Responses upstream reached through a c4m-style relay: strips
/// `max_tokens`, folds `instructions` into the input array, and turns
/// embedded rate-limit notices into a proper 429.
fn responses_c4m() -> CompatibilityProfile {
	let mut profile = CompatibilityProfile::default();
	profile.hooks.push(Box::new(ResponsesC4mOutgoingHook));
	profile.hooks.push(Box::new(ResponsesC4mIncomingHook) as Box<dyn Hook>);
	profile
}

fn gemini() -> CompatibilityProfile {
	let mut profile = CompatibilityProfile::default();
	profile.shape_filter = ShapeFilter {
		allowed_paths: vec![
			"model".to_string(),
			"messages".to_string(),
			"messages.*.role".to_string(),
			"messages.*.content".to_string(),
			"tools".to_string(),
			"temperature".to_string(),
			"stream".to_string(),
		],
	};
	with_tool_cleaning(profile)
}

/// Upstream already speaks Anthropic Messages; nothing to transform.
fn anthropic_passthrough() -> CompatibilityProfile {
	CompatibilityProfile::default()
}
