//! Request classification: token estimation, tool-category detection, and
//! selection of the highest-priority routing decision.

use std::collections::HashSet;

use crate::config::ClassificationConfig;
use crate::types::canonical::{CanonicalRequest, Content};

const DEFAULT_IMAGE_TOKEN_COST: u64 = 255;
const PER_MESSAGE_OVERHEAD: u64 = 4;
const PER_TOOL_OVERHEAD: u64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolCategory {
	WebSearch,
	CodeExecution,
	FileSearch,
	DataAnalysis,
}

impl ToolCategory {
	fn keywords(self) -> &'static [&'static str] {
		match self {
			ToolCategory::WebSearch => &["web_search", "browser", "search_web", "fetch_url"],
			ToolCategory::CodeExecution => &["code_interpreter", "execute", "run_code", "shell", "bash"],
			ToolCategory::FileSearch => &["file_search", "retrieval", "read_file", "grep"],
			ToolCategory::DataAnalysis => &["data_analysis", "analyze", "pandas", "sql"],
		}
	}

	pub fn from_config_str(s: &str) -> Option<Self> {
		match s {
			"webSearch" | "web_search" => Some(ToolCategory::WebSearch),
			"codeExecution" | "code_execution" => Some(ToolCategory::CodeExecution),
			"fileSearch" | "file_search" => Some(ToolCategory::FileSearch),
			"dataAnalysis" | "data_analysis" => Some(ToolCategory::DataAnalysis),
			_ => None,
		}
	}
}

#[derive(Debug, Clone)]
pub struct Classification {
	pub token_count: u64,
	pub tool_categories: HashSet<ToolCategory>,
	pub model: String,
}

/// Estimate prompt tokens from message text, tool schemas, and a flat
/// per-image allowance; ratio and overheads come from configuration.
pub fn classify(req: &CanonicalRequest, config: &ClassificationConfig) -> Classification {
	let ratio = if config.chars_per_token > 0.0 { config.chars_per_token } else { 4.0 };

	let mut char_count: u64 = 0;
	let mut image_count: u64 = 0;
	for message in &req.messages {
		char_count += PER_MESSAGE_OVERHEAD;
		if let Some(content) = &message.content {
			match content {
				Content::Text(t) => char_count += t.len() as u64,
				Content::Blocks(blocks) => {
					for block in blocks {
						if let Some(t) = &block.text {
							char_count += t.len() as u64;
						}
						if block.kind == "image" || block.kind == "image_url" {
							image_count += 1;
						}
					}
				},
			}
		}
		if let Some(tool_calls) = &message.tool_calls {
			char_count += tool_calls.len() as u64 * PER_TOOL_OVERHEAD;
		}
	}

	let tool_token_overhead = req.tools.len() as u64 * PER_TOOL_OVERHEAD;
	let text_tokens = (char_count as f64 / ratio).ceil() as u64;
	let token_count = text_tokens + tool_token_overhead + image_count * DEFAULT_IMAGE_TOKEN_COST;

	let tool_categories = detect_tool_categories(req);

	Classification {
		token_count,
		tool_categories,
		model: req.model.clone(),
	}
}

fn detect_tool_categories(req: &CanonicalRequest) -> HashSet<ToolCategory> {
	let mut detected = HashSet::new();
	for tool in &req.tools {
		let name = tool.name.to_lowercase();
		for category in [
			ToolCategory::WebSearch,
			ToolCategory::CodeExecution,
			ToolCategory::FileSearch,
			ToolCategory::DataAnalysis,
		] {
			if category.keywords().iter().any(|kw| name.contains(kw)) {
				detected.insert(category);
			}
		}
	}
	detected
}

#[derive(Debug, Clone)]
pub struct RouteRule {
	pub route: String,
	pub priority: i32,
	pub token_threshold: Option<u64>,
	pub required_tools: Vec<ToolCategory>,
	pub model_tier: Option<String>,
}

/// Pick the highest-priority rule whose predicate the classification
/// satisfies, falling back to `default` when nothing qualifies or the
/// winning rule's confidence is below threshold.
pub fn select_route(classification: &Classification, rules: &[RouteRule], confidence_threshold: f64) -> String {
	let mut candidates: Vec<&RouteRule> = rules
		.iter()
		.filter(|rule| {
			let token_ok = rule
				.token_threshold
				.map(|t| classification.token_count >= t)
				.unwrap_or(true);
			let tools_ok = rule
				.required_tools
				.iter()
				.all(|t| classification.tool_categories.contains(t));
			let tier_ok = rule
				.model_tier
				.as_ref()
				.map(|tier| classification.model.contains(tier.as_str()))
				.unwrap_or(true);
			token_ok && tools_ok && tier_ok
		})
		.collect();

	candidates.sort_by(|a, b| b.priority.cmp(&a.priority));

	let Some(best) = candidates.first() else {
		return "default".to_string();
	};

	let confidence = score_confidence(classification, best);
	if confidence < confidence_threshold {
		return "default".to_string();
	}
	best.route.clone()
}

fn score_confidence(classification: &Classification, rule: &RouteRule) -> f64 {
	let mut score = 0.0;
	let mut weight_total = 0.0;

	if let Some(threshold) = rule.token_threshold {
		weight_total += 1.0;
		if threshold > 0 && classification.token_count >= threshold {
			score += 1.0;
		}
	}
	if !rule.required_tools.is_empty() {
		weight_total += 1.0;
		if rule.required_tools.iter().all(|t| classification.tool_categories.contains(t)) {
			score += 1.0;
		}
	}
	if let Some(tier) = &rule.model_tier {
		weight_total += 1.0;
		if classification.model.contains(tier.as_str()) {
			score += 1.0;
		}
	}
	if weight_total == 0.0 {
		1.0
	} else {
		score / weight_total
	}
}
