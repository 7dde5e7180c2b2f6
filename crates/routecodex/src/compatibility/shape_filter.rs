//! Prune a JSON payload down to an allow-list of paths, so an upstream that
//! rejects unknown fields only ever sees what it declared support for.
//!
//! Paths are dotted, with `*` matching every element of an array: e.g.
//! `messages.*.role` keeps `role` on every element of `messages`.

use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct ShapeFilter {
	pub allowed_paths: Vec<String>,
}

impl ShapeFilter {
	/// No configured paths means "no filtering" rather than "drop everything":
	/// most families don't need pruning and only set paths when an upstream
	/// is known to reject extra fields.
	pub fn apply(&self, value: &mut Value) {
		if self.allowed_paths.is_empty() {
			return;
		}
		let segments: Vec<Vec<&str>> = self.allowed_paths.iter().map(|p| p.split('.').collect()).collect();
		prune(value, &segments, &[]);
	}
}

fn prune(value: &mut Value, allowed: &[Vec<&str>], path: &[&str]) {
	match value {
		Value::Object(map) => {
			map.retain(|key, _| path_is_allowed_prefix(allowed, path, key));
			for (key, child) in map.iter_mut() {
				let mut child_path = path.to_vec();
				child_path.push(key);
				prune(child, allowed, &child_path);
			}
		},
		Value::Array(items) => {
			for item in items.iter_mut() {
				let mut child_path = path.to_vec();
				child_path.push("*");
				prune(item, allowed, &child_path);
			}
		},
		_ => {},
	}
}

fn path_is_allowed_prefix(allowed: &[Vec<&str>], path: &[&str], next: &str) -> bool {
	allowed.iter().any(|segments| {
		if segments.len() <= path.len() {
			return false;
		}
		path.iter().zip(segments.iter()).all(|(a, b)| a == b || *b == "*") && (segments[path.len()] == next || segments[path.len()] == "*")
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn keeps_only_allowed_nested_paths() {
		let filter = ShapeFilter {
			allowed_paths: vec!["model".to_string(), "messages.*.role".to_string(), "messages.*.content".to_string()],
		};
		let mut body = json!({
			"model": "x",
			"messages": [{"role": "user", "content": "hi", "name": "bob"}],
			"logit_bias": {"1": 2},
		});
		filter.apply(&mut body);
		assert!(body.get("logit_bias").is_none());
		assert!(body["messages"][0].get("name").is_none());
		assert_eq!(body["messages"][0]["role"], "user");
	}

	#[test]
	fn empty_allow_list_is_a_no_op() {
		let filter = ShapeFilter::default();
		let mut body = json!({"a": 1});
		filter.apply(&mut body);
		assert_eq!(body, json!({"a": 1}));
	}
}
