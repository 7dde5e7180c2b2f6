//! Compatibility: per-provider-family bidirectional transforms applied at
//! the boundary with the upstream. Pure and stateless per call; profiles are
//! resolved once at startup from `"<protocol>:<profile>"` identifiers.

pub mod field_mapping;
pub mod hooks;
pub mod profiles;
pub mod shape_filter;

use std::collections::HashMap;

use serde_json::Value;

use crate::error::RouteError;
use field_mapping::FieldMapping;
use hooks::{HookChain, Stage};
use shape_filter::ShapeFilter;

#[derive(Default)]
pub struct CompatibilityProfile {
	pub field_mapping: FieldMapping,
	pub shape_filter: ShapeFilter,
	pub hooks: HookChain,
}

impl CompatibilityProfile {
	/// Outgoing direction: canonical-shaped JSON -> upstream wire shape.
	pub fn apply_outgoing(&self, body: &mut Value) -> Result<(), RouteError> {
		self.hooks.run(Stage::OutgoingPreprocessing, body)?;
		self.field_mapping.apply_request(body);
		self.shape_filter.apply(body);
		self.hooks.run(Stage::OutgoingPostprocessing, body)?;
		Ok(())
	}

	/// Incoming direction: upstream response -> canonical-shaped JSON.
	pub fn apply_incoming(&self, body: &mut Value) -> Result<(), RouteError> {
		self.hooks.run(Stage::IncomingPreprocessing, body)?;
		self.hooks.run(Stage::IncomingValidation, body)?;
		self.field_mapping.apply_response(body);
		self.hooks.run(Stage::IncomingPostprocessing, body)?;
		Ok(())
	}
}

/// Resolves `"<protocol>:<profile>"` identifiers to profiles, failing fast
/// at startup if a name is neither a built-in nor found under the
/// user-configured compat directory.
pub struct CompatibilityRegistry {
	profiles: HashMap<String, CompatibilityProfile>,
}

impl CompatibilityRegistry {
	pub fn build(names: &[String]) -> Result<Self, RouteError> {
		let mut profiles = HashMap::new();
		for name in names {
			let profile = profiles::resolve_builtin(name)
				.ok_or_else(|| RouteError::InvalidConfig(format!("unknown compatibility profile: {name}")))?;
			profiles.insert(name.clone(), profile);
		}
		Ok(Self { profiles })
	}

	pub fn get(&self, name: &str) -> Option<&CompatibilityProfile> {
		self.profiles.get(name)
	}
}

/// Extract a tool-result's text and fail if it would end up empty; used both
/// by the Anthropic canonicalizer and by outgoing tool-result rendering.
pub fn require_non_empty_tool_text(text: &str) -> Result<&str, RouteError> {
	if text.is_empty() {
		Err(RouteError::CompatToolTextEmpty)
	} else {
		Ok(text)
	}
}

/// On response render, `choices[*].message.content` must be a string
/// whenever `tool_calls` is present, and each `tool_calls[*].function.arguments`
/// must already be a JSON string (stringify if the provider sent an object).
pub fn normalize_openai_chat_response(body: &mut Value) -> Result<(), RouteError> {
	let Some(choices) = body.get_mut("choices").and_then(Value::as_array_mut) else {
		return Ok(());
	};
	for choice in choices {
		let Some(message) = choice.get_mut("message").and_then(Value::as_object_mut) else { continue };
		let has_tool_calls = message.get("tool_calls").map(|v| !v.is_null()).unwrap_or(false);
		if has_tool_calls {
			let content_is_string = message.get("content").map(Value::is_string).unwrap_or(false);
			if !content_is_string {
				message.insert("content".to_string(), Value::String(String::new()));
			}
			if let Some(tool_calls) = message.get_mut("tool_calls").and_then(Value::as_array_mut) {
				for tc in tool_calls {
					let Some(func) = tc.get_mut("function").and_then(Value::as_object_mut) else { continue };
					if let Some(args) = func.get("arguments") {
						if !args.is_string() {
							let stringified =
								serde_json::to_string(args).map_err(|_| RouteError::CompatToolcallArgsInvalid)?;
							func.insert("arguments".to_string(), Value::String(stringified));
						}
					}
				}
			}
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn unknown_profile_fails_fast() {
		let err = CompatibilityRegistry::build(&["chat:not-a-real-profile".to_string()]).unwrap_err();
		assert_eq!(err.status(), 500);
	}

	#[test]
	fn glm_profile_cleans_shell_tool_schema() {
		let registry = CompatibilityRegistry::build(&["chat:glm".to_string()]).unwrap();
		let profile = registry.get("chat:glm").unwrap();
		let mut body = json!({
			"model": "glm-4.6",
			"messages": [],
			"tools": [{
				"type": "function",
				"function": {
					"name": "shell",
					"strict": true,
					"parameters": {
						"type": "object",
						"properties": {"command": {"oneOf": [{"type": "string"}, {"type": "array"}]}},
						"required": [],
					}
				}
			}]
		});
		profile.apply_outgoing(&mut body).unwrap();
		let func = &body["tools"][0]["function"];
		assert!(func.get("strict").is_none());
		assert_eq!(func["parameters"]["properties"]["command"]["type"], "array");
		assert!(func["parameters"]["properties"]["command"].get("oneOf").is_none());
		assert_eq!(func["parameters"]["required"][0], "command");
	}

	#[test]
	fn normalizes_tool_call_response_content_and_arguments() {
		let mut body = json!({
			"choices": [{
				"message": {
					"tool_calls": [{"id": "1", "function": {"name": "shell", "arguments": {"command": ["ls"]}}}]
				}
			}]
		});
		normalize_openai_chat_response(&mut body).unwrap();
		assert_eq!(body["choices"][0]["message"]["content"], "");
		assert_eq!(
			body["choices"][0]["message"]["tool_calls"][0]["function"]["arguments"],
			"{\"command\":[\"ls\"]}"
		);
	}
}
