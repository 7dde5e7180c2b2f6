//! Hook chain: small, ordered transforms applied at specific pipeline stages.
//! Hooks never fabricate fields — a missing required field is surfaced as an
//! `ERR_COMPAT_*` error rather than defaulted away.

use serde_json::Value;

use crate::error::RouteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
	IncomingPreprocessing,
	IncomingValidation,
	IncomingPostprocessing,
	OutgoingPreprocessing,
	OutgoingPostprocessing,
}

pub trait Hook: Send + Sync {
	fn stage(&self) -> Stage;
	fn priority(&self) -> i32 {
		0
	}
	fn apply(&self, body: &mut Value) -> Result<(), RouteError>;
}

#[derive(Default)]
pub struct HookChain {
	hooks: Vec<Box<dyn Hook>>,
}

impl HookChain {
	pub fn push(&mut self, hook: Box<dyn Hook>) {
		self.hooks.push(hook);
	}

	pub fn run(&self, stage: Stage, body: &mut Value) -> Result<(), RouteError> {
		let mut ordered: Vec<&Box<dyn Hook>> = self.hooks.iter().filter(|h| h.stage() == stage).collect();
		ordered.sort_by_key(|h| h.priority());
		for hook in ordered {
			hook.apply(body)?;
		}
		Ok(())
	}
}

/// Normalize `tool_calls[*].function.arguments` to a JSON string, drop
/// `strict`, coerce a `shell` tool's `command` parameter to `array<string>`
/// and require it, and strip `oneOf` from tool parameter schemas.
pub struct ToolCleaningHook;

impl Hook for ToolCleaningHook {
	fn stage(&self) -> Stage {
		Stage::OutgoingPreprocessing
	}

	fn apply(&self, body: &mut Value) -> Result<(), RouteError> {
		if let Some(messages) = body.get_mut("messages").and_then(Value::as_array_mut) {
			for message in messages {
				let Some(tool_calls) = message.get_mut("tool_calls").and_then(Value::as_array_mut) else { continue };
				for tc in tool_calls {
					let Some(func) = tc.get_mut("function").and_then(Value::as_object_mut) else { continue };
					if let Some(args) = func.get("arguments") {
						if !args.is_string() {
							let stringified = serde_json::to_string(args).map_err(|_| RouteError::CompatToolcallArgsInvalid)?;
							func.insert("arguments".to_string(), Value::String(stringified));
						}
					}
				}
			}
		}

		if let Some(tools) = body.get_mut("tools").and_then(Value::as_array_mut) {
			for tool in tools {
				let Some(func) = tool.get_mut("function").and_then(Value::as_object_mut) else { continue };
				func.remove("strict");
				if let Some(params) = func.get_mut("parameters").and_then(Value::as_object_mut) {
					if func.get("name").and_then(Value::as_str) == Some("shell") {
						coerce_shell_command_schema(params);
					}
					strip_one_of(params);
				}
			}
		}
		Ok(())
	}
}

fn coerce_shell_command_schema(params: &mut serde_json::Map<String, Value>) {
	if let Some(properties) = params.get_mut("properties").and_then(Value::as_object_mut) {
		properties.insert(
			"command".to_string(),
			serde_json::json!({"type": "array", "items": {"type": "string"}}),
		);
	}
	let required = params.entry("required").or_insert_with(|| Value::Array(Vec::new()));
	if let Some(arr) = required.as_array_mut() {
		if !arr.iter().any(|v| v.as_str() == Some("command")) {
			arr.push(Value::String("command".to_string()));
		}
	}
}

fn strip_one_of(value: &mut serde_json::Map<String, Value>) {
	value.remove("oneOf");
	for child in value.values_mut() {
		match child {
			Value::Object(obj) => strip_one_of(obj),
			Value::Array(items) => {
				for item in items {
					if let Some(obj) = item.as_object_mut() {
						strip_one_of(obj);
					}
				}
			},
			_ => {},
		}
	}
}

#[derive(Debug, Clone)]
pub struct ValidationRule {
	/// Wildcard dotted path, e.g. `messages.*.role`.
	pub field: String,
	pub required: bool,
	#[allow(dead_code)]
	pub type_name: Option<String>,
}

/// Enumerated field-presence rules, evaluated with wildcard-path expansion.
pub struct RequestValidationHook {
	pub rules: Vec<ValidationRule>,
}

impl Hook for RequestValidationHook {
	fn stage(&self) -> Stage {
		Stage::IncomingValidation
	}

	fn apply(&self, body: &mut Value) -> Result<(), RouteError> {
		for rule in &self.rules {
			if !rule.required {
				continue;
			}
			let segments: Vec<&str> = rule.field.split('.').collect();
			if !path_present(body, &segments) {
				return Err(RouteError::MissingField(rc_core::strng::new(&rule.field)));
			}
		}
		Ok(())
	}
}

fn path_present(value: &Value, segments: &[&str]) -> bool {
	let Some((head, rest)) = segments.split_first() else {
		return true;
	};
	if *head == "*" {
		return match value.as_array() {
			Some(items) => items.iter().all(|item| path_present(item, rest)),
			None => false,
		};
	}
	match value.get(*head) {
		Some(child) => path_present(child, rest),
		None => false,
	}
}

/// `responses-c4m` family cleanup: strip `max_tokens`, fold `instructions`
/// into a leading system message, and surface upstream rate-limit notices
/// embedded in response text as a proper `HTTP_429`.
pub struct ResponsesC4mOutgoingHook;

impl Hook for ResponsesC4mOutgoingHook {
	fn stage(&self) -> Stage {
		Stage::OutgoingPreprocessing
	}

	fn apply(&self, body: &mut Value) -> Result<(), RouteError> {
		let Some(obj) = body.as_object_mut() else { return Ok(()) };
		obj.remove("max_tokens");
		if let Some(instructions) = obj.remove("instructions") {
			if let Some(input) = obj.get_mut("input").and_then(Value::as_array_mut) {
				input.insert(0, serde_json::json!({"role": "system", "content": instructions}));
			}
		}
		Ok(())
	}
}

pub struct ResponsesC4mIncomingHook;

const RATE_LIMIT_NOTICE_MARKERS: &[&str] = &["rate limit", "too many requests", "quota exceeded"];

impl Hook for ResponsesC4mIncomingHook {
	fn stage(&self) -> Stage {
		Stage::IncomingPostprocessing
	}

	fn apply(&self, body: &mut Value) -> Result<(), RouteError> {
		let mut texts = Vec::new();
		if let Some(message) = body.get("error").and_then(|e| e.get("message")).and_then(Value::as_str) {
			texts.push(message.to_string());
		}
		if let Some(outputs) = body.get("output").and_then(Value::as_array) {
			for output in outputs {
				if let Some(contents) = output.get("content").and_then(Value::as_array) {
					for c in contents {
						if let Some(t) = c.get("text").and_then(Value::as_str) {
							texts.push(t.to_string());
						}
					}
				}
			}
		}
		let lower: Vec<String> = texts.iter().map(|t| t.to_lowercase()).collect();
		if lower.iter().any(|t| RATE_LIMIT_NOTICE_MARKERS.iter().any(|m| t.contains(m))) {
			return Err(RouteError::Http(429));
		}
		Ok(())
	}
}
