//! Declarative field rename/move/drop, applied before a payload crosses the
//! provider boundary in either direction.

use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct FieldMapping {
	/// `from` -> `Some(to)` renames, `from` -> `None` drops the field entirely.
	pub request: Vec<(String, Option<String>)>,
	pub response: Vec<(String, Option<String>)>,
}

impl FieldMapping {
	pub fn apply_request(&self, value: &mut Value) {
		apply(&self.request, value);
	}

	pub fn apply_response(&self, value: &mut Value) {
		apply(&self.response, value);
	}
}

fn apply(mapping: &[(String, Option<String>)], value: &mut Value) {
	let Some(obj) = value.as_object_mut() else { return };
	for (from, to) in mapping {
		let Some(taken) = obj.remove(from) else { continue };
		if let Some(to) = to {
			obj.insert(to.clone(), taken);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn renames_and_drops_fields() {
		let mapping = FieldMapping {
			request: vec![
				("max_tokens".to_string(), Some("max_output_tokens".to_string())),
				("logit_bias".to_string(), None),
			],
			response: vec![],
		};
		let mut body = json!({"max_tokens": 64, "logit_bias": {}, "model": "x"});
		mapping.apply_request(&mut body);
		assert_eq!(body["max_output_tokens"], 64);
		assert!(body.get("max_tokens").is_none());
		assert!(body.get("logit_bias").is_none());
		assert_eq!(body["model"], "x");
	}
}
