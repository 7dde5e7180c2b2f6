//! HTTP front-end: the axum `Router` that terminates the three wire
//! protocols at §6's endpoints and drives one request end-to-end through
//! LLM-Switch -> Virtual Router -> Compatibility -> Provider Runtime ->
//! Response Normalizer. The CLI (`routecodex-app`) owns `main()`; this
//! module only builds the `Router` and the shared [`Pipeline`] state.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::StreamExt;
use parking_lot::Mutex;
use rc_core::strng::Strng;
use serde_json::{json, Value};

use crate::compatibility::{self, CompatibilityRegistry};
use crate::config::Config;
use crate::error::RouteError;
use crate::llm_switch::{anthropic as llm_anthropic, openai as llm_openai, responses as llm_responses};
use crate::llm_switch::{InboundRequest, LlmSwitch};
use crate::normalizer;
use crate::normalizer::frame::{write_frame, FrameDecoder};
use crate::normalizer::sse::OpenaiToAnthropicStream;
use crate::provider::classifier::Classified;
use crate::provider::snapshot::SnapshotWriter;
use crate::provider::{ProviderRuntime, RuntimeManager};
use crate::router::{RouteTarget, VirtualRouter};
use crate::stats::{StatsWriter, UsageEvent};
use crate::types::canonical::CanonicalRequest;
use crate::types::protocol::{EntryEndpoint, WireProtocol};

/// Everything one request needs: configuration plus the five pipeline
/// stages. Built once at startup, shared behind an `Arc`.
pub struct Pipeline {
	pub config: Config,
	pub llm_switch: LlmSwitch,
	pub router: VirtualRouter,
	pub compatibility: CompatibilityRegistry,
	pub runtimes: RuntimeManager,
	pub snapshots: SnapshotWriter,
	pub stats: StatsWriter,
	messages_rate_limiter: RateLimiter,
	warmup: WarmupCounter,
}

impl Pipeline {
	pub fn build(config: Config) -> Result<Self, RouteError> {
		let router = VirtualRouter::new(&config);
		let compatibility = CompatibilityRegistry::build(&config.compatibility.profiles)?;
		let runtimes = RuntimeManager::build(&config)?;
		let snapshots = SnapshotWriter::new(config.snapshot_dir.clone(), config.system.snapshots_enabled);
		let stats_path = crate::config::dirs_home_routecodex().join("stats/request-events.log");
		let stats = StatsWriter::new(stats_path, config.system.stats_enabled);
		let messages_rpm_limit = std::env::var("ROUTECODEX_MESSAGES_RPM_LIMIT")
			.ok()
			.and_then(|v| v.parse::<u32>().ok())
			.unwrap_or(10);

		Ok(Self {
			config,
			llm_switch: LlmSwitch::default(),
			router,
			compatibility,
			runtimes,
			snapshots,
			stats,
			messages_rate_limiter: RateLimiter::new(messages_rpm_limit, Duration::from_secs(60)),
			warmup: WarmupCounter::default(),
		})
	}
}

/// Build the axum `Router` for the gateway's inbound endpoints.
pub fn build_router(pipeline: Arc<Pipeline>) -> Router {
	Router::new()
		.route("/v1/chat/completions", post(chat_completions))
		.route("/v1/messages", post(messages))
		.route("/v1/responses", post(responses))
		.route("/v1/models", get(models))
		.with_state(pipeline)
}

async fn chat_completions(State(pipeline): State<Arc<Pipeline>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
	handle_request(pipeline, EntryEndpoint::ChatCompletions, headers, body).await
}

async fn messages(State(pipeline): State<Arc<Pipeline>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
	if let Some(resp) = warmup_short_circuit(&pipeline, &headers, &body) {
		return resp;
	}
	if let Some(resp) = pipeline.messages_rate_limiter.check() {
		return resp;
	}
	handle_request(pipeline, EntryEndpoint::Messages, headers, body).await
}

async fn responses(State(pipeline): State<Arc<Pipeline>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
	handle_request(pipeline, EntryEndpoint::Responses, headers, body).await
}

/// `GET /v1/models`: best-effort passthrough to whichever configured
/// provider answers first. A 404 from every provider is not fatal.
async fn models(State(pipeline): State<Arc<Pipeline>>) -> Response {
	for (runtime_key, runtime) in pipeline.runtimes.iter() {
		let alias = runtime_key.split('.').next_back().unwrap_or("default");
		match runtime.list_models(alias).await {
			Ok(body) => return (StatusCode::OK, Json(body)).into_response(),
			Err(e) => {
				tracing::debug!(runtime_key = %runtime_key, error = %e, "models passthrough failed, trying next provider");
			},
		}
	}
	StatusCode::NOT_FOUND.into_response()
}

fn now_ms() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

fn request_id_from_headers(headers: &HeaderMap) -> Strng {
	headers
		.get("x-request-id")
		.and_then(|v| v.to_str().ok())
		.map(rc_core::strng::new)
		.unwrap_or_else(|| rc_core::strng::new(&uuid::Uuid::new_v4().to_string()))
}

fn session_id_from_headers(headers: &HeaderMap) -> Option<Strng> {
	headers.get("x-session-id").and_then(|v| v.to_str().ok()).map(rc_core::strng::new)
}

fn target_protocol_override(headers: &HeaderMap) -> Option<WireProtocol> {
	headers
		.get("x-target-protocol")
		.and_then(|v| v.to_str().ok())
		.and_then(WireProtocol::from_str_loose)
}

/// Warm-up short-circuit (§6): a `claude-code` user-agent sending a single
/// `warmup`/`count` message with `max_tokens:1` never reaches a provider.
fn warmup_short_circuit(pipeline: &Pipeline, headers: &HeaderMap, body: &Value) -> Option<Response> {
	let ua = headers.get("user-agent").and_then(|v| v.to_str().ok()).unwrap_or("");
	if !ua.contains("claude-code") {
		return None;
	}
	let max_tokens_is_one = body.get("max_tokens").and_then(Value::as_u64) == Some(1);
	if !max_tokens_is_one {
		return None;
	}
	let text = body
		.get("messages")
		.and_then(Value::as_array)
		.and_then(|m| m.first())
		.and_then(|m| m.get("content"))
		.and_then(Value::as_str)
		.unwrap_or("");
	if text != "warmup" && text != "count" {
		return None;
	}

	pipeline.warmup.hit();
	let canned = json!({
		"id": "msg_warmup",
		"type": "message",
		"role": "assistant",
		"model": body.get("model").cloned().unwrap_or(Value::Null),
		"content": [{"type": "text", "text": ""}],
		"stop_reason": "end_turn",
		"usage": {"input_tokens": 0, "output_tokens": 0},
	});
	Some((StatusCode::OK, Json(canned)).into_response())
}

/// Sliding-window ingress limiter, used for `/v1/messages` per §5.
struct RateLimiter {
	limit: u32,
	window: Duration,
	hits: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
	fn new(limit: u32, window: Duration) -> Self {
		Self { limit, window, hits: Mutex::new(VecDeque::new()) }
	}

	/// Returns `Some(429 response)` if the caller should be rejected.
	fn check(&self) -> Option<Response> {
		if self.limit == 0 {
			return None;
		}
		let now = Instant::now();
		let mut hits = self.hits.lock();
		while let Some(&front) = hits.front() {
			if now.duration_since(front) > self.window {
				hits.pop_front();
			} else {
				break;
			}
		}
		if hits.len() as u32 >= self.limit {
			let retry_after = self.window.as_secs().max(1);
			let body = json!({"type": "error", "error": {"type": "rate_limit_error", "message": "ingress rate limit exceeded"}});
			let mut resp = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
			resp.headers_mut().insert("Retry-After", retry_after.into());
			return Some(resp);
		}
		hits.push_back(now);
		None
	}
}

/// Counts warm-up short-circuits and logs a periodic summary instead of one
/// line per probe.
#[derive(Default)]
struct WarmupCounter {
	count: AtomicU64,
}

const WARMUP_LOG_INTERVAL: u64 = 50;

impl WarmupCounter {
	fn hit(&self) {
		let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
		if n % WARMUP_LOG_INTERVAL == 0 {
			tracing::info!(count = n, "warm-up probes short-circuited so far");
		}
	}
}

/// Outcome of one attempt against a single selected runtime.
enum DispatchOutcome {
	Response(Response, u64, u64),
	Streaming(Response),
	UpstreamFailure(RouteError, Classified),
	Fatal(RouteError),
}

/// Drive one request through the full pipeline, including request-level
/// failover across unhealthy/failing candidates within the chosen route.
async fn handle_request(pipeline: Arc<Pipeline>, endpoint: EntryEndpoint, headers: HeaderMap, body: Value) -> Response {
	let request_id = request_id_from_headers(&headers);
	let session_id = session_id_from_headers(&headers);
	let start = Instant::now();

	let inbound = InboundRequest {
		entry_endpoint: endpoint,
		target_protocol_override: target_protocol_override(&headers),
		headers: headers.clone(),
		body,
		request_id: request_id.clone(),
		session_id,
	};

	let canonical = match pipeline.llm_switch.to_canonical(inbound, &pipeline.config) {
		Ok(c) => c,
		Err(e) => return error_response(&e, WireProtocol::OpenaiChat),
	};

	let original_protocol = canonical.metadata.original_protocol;
	let client_wants_stream = canonical.metadata.outbound_stream;

	let mut excluded = Vec::new();
	loop {
		let target = match pipeline.router.select_excluding(&canonical, &pipeline.config, now_ms(), &excluded) {
			Ok(t) => t,
			Err(e) => return error_response(&e, original_protocol),
		};

		match dispatch_once(&pipeline, &canonical, &target, client_wants_stream).await {
			DispatchOutcome::Response(resp, input_tokens, output_tokens) => {
				pipeline.router.record_success(&target.runtime_key, now_ms());
				record_stats(&pipeline, &request_id, &target, start, input_tokens, output_tokens, 200).await;
				return resp;
			},
			DispatchOutcome::Streaming(resp) => {
				pipeline.router.record_success(&target.runtime_key, now_ms());
				record_stats(&pipeline, &request_id, &target, start, 0, 0, 200).await;
				return resp;
			},
			DispatchOutcome::UpstreamFailure(err, classified) => {
				let state = pipeline.router.record_failure(&target.runtime_key, classified.signal, now_ms());
				if classified.recoverable {
					tracing::warn!(runtime_key = %target.runtime_key, error = %err, state = ?state, "provider call failed, trying next candidate");
					excluded.push(target.runtime_key.clone());
					continue;
				}
				record_stats(&pipeline, &request_id, &target, start, 0, 0, err.status()).await;
				return error_response(&err, original_protocol);
			},
			DispatchOutcome::Fatal(err) => {
				record_stats(&pipeline, &request_id, &target, start, 0, 0, err.status()).await;
				return error_response(&err, original_protocol);
			},
		}
	}
}

async fn dispatch_once(pipeline: &Pipeline, canonical: &CanonicalRequest, target: &RouteTarget, client_wants_stream: bool) -> DispatchOutcome {
	let runtime = match pipeline.runtimes.get(&target.runtime_key) {
		Ok(r) => r,
		Err(e) => return DispatchOutcome::Fatal(e),
	};
	let provider_config = pipeline.config.provider(&target.provider_id);
	let profile = provider_config
		.and_then(|p| p.compatibility_profile.as_deref())
		.and_then(|name| pipeline.compatibility.get(name));

	let mut body = build_provider_body(canonical, target.provider_protocol);
	if let Some(profile) = profile {
		if let Err(e) = profile.apply_outgoing(&mut body) {
			return DispatchOutcome::Fatal(e);
		}
	}

	let entry_endpoint = canonical.metadata.entry_endpoint.as_str();

	if client_wants_stream {
		let executed = match runtime
			.execute_stream(&target.upstream_model, &target.key_alias, body, &canonical.metadata.request_id, &pipeline.snapshots, entry_endpoint)
			.await
		{
			Ok(e) => e,
			Err(e) => return classify_and_wrap(runtime, e),
		};

		if executed.status >= 400 {
			return classify_and_wrap(runtime, RouteError::Http(executed.status));
		}

		let stream_body = transcode_stream(executed.body, target.provider_protocol, canonical.metadata.original_protocol);
		let response = Response::builder()
			.status(StatusCode::OK)
			.header("content-type", "text/event-stream")
			.body(stream_body)
			.unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
		return DispatchOutcome::Streaming(response);
	}

	let result = match runtime
		.execute(&target.upstream_model, &target.key_alias, body, false, &canonical.metadata.request_id, &pipeline.snapshots, entry_endpoint)
		.await
	{
		Ok(r) => r,
		Err(e) => return classify_and_wrap(runtime, e),
	};

	let mut response_body = result.body;
	if let Some(profile) = profile {
		if let Err(e) = profile.apply_incoming(&mut response_body) {
			return DispatchOutcome::Fatal(e);
		}
	}
	if target.provider_protocol == WireProtocol::OpenaiChat {
		if let Err(e) = compatibility::normalize_openai_chat_response(&mut response_body) {
			return DispatchOutcome::Fatal(e);
		}
	}

	let (input_tokens, output_tokens) = extract_usage(response_body.get("usage"));

	let normalized = match normalizer::normalize_response(response_body, target.provider_protocol, canonical.metadata.original_protocol) {
		Ok(v) => v,
		Err(e) => return DispatchOutcome::Fatal(e),
	};

	DispatchOutcome::Response((StatusCode::OK, Json(normalized)).into_response(), input_tokens, output_tokens)
}

fn classify_and_wrap(runtime: &ProviderRuntime, err: RouteError) -> DispatchOutcome {
	let classified = match &err {
		RouteError::Http(status) => runtime.classify_status(*status, None),
		RouteError::HttpUpstream(status, message) => runtime.classify_status(*status, Some(message)),
		_ => runtime.classify_network_error(),
	};
	DispatchOutcome::UpstreamFailure(err, classified)
}

fn extract_usage(usage: Option<&Value>) -> (u64, u64) {
	let Some(usage) = usage else { return (0, 0) };
	let input = usage
		.get("prompt_tokens")
		.or_else(|| usage.get("input_tokens"))
		.and_then(Value::as_u64)
		.unwrap_or(0);
	let output = usage
		.get("completion_tokens")
		.or_else(|| usage.get("output_tokens"))
		.and_then(Value::as_u64)
		.unwrap_or(0);
	(input, output)
}

async fn record_stats(pipeline: &Pipeline, request_id: &Strng, target: &RouteTarget, start: Instant, input_tokens: u64, output_tokens: u64, status_code: u16) {
	let event = UsageEvent {
		request_id: request_id.clone(),
		provider_id: target.provider_id.clone(),
		runtime_key: target.runtime_key.clone(),
		route: target.route.clone(),
		input_tokens,
		output_tokens,
		total_tokens: input_tokens + output_tokens,
		latency_ms: start.elapsed().as_millis() as u64,
		status_code,
	};
	pipeline.stats.record(&event).await;
}

/// Render a canonical request into the wire shape the selected provider
/// expects. Gemini/Gemini-CLI are treated as an opaque family layered on top
/// of the openai-chat shape, per §9's "opaque family" note.
fn build_provider_body(req: &CanonicalRequest, provider_protocol: WireProtocol) -> Value {
	match provider_protocol {
		WireProtocol::AnthropicMessages => llm_anthropic::from_canonical(req),
		WireProtocol::OpenaiResponses => llm_responses::from_canonical(req),
		WireProtocol::OpenaiChat | WireProtocol::GeminiChat | WireProtocol::GeminiCliChat => llm_openai::from_canonical(req),
	}
}

/// Build the streaming response body: either a byte-for-byte passthrough
/// (provider and client already speak the same protocol) or the
/// openai-chat -> Anthropic-messages transcoder, the one direction §4.5
/// specifies explicitly. Any other mismatched combination is forwarded
/// untranscoded with a one-time warning, matching the malformed-frame
/// passthrough behavior the state machine already uses for frames it can't
/// parse.
fn transcode_stream(upstream: reqwest::Response, from: WireProtocol, to: WireProtocol) -> Body {
	let needs_transcode = from == WireProtocol::OpenaiChat && to == WireProtocol::AnthropicMessages;
	if from != to && !needs_transcode {
		tracing::warn!(?from, ?to, "no streaming transcoder for this protocol pair, forwarding frames untranscoded");
	}

	let stream = async_stream::stream! {
		let mut byte_stream = upstream.bytes_stream();
		let mut decoder = FrameDecoder::new();
		let mut transcoder = if needs_transcode {
			Some(OpenaiToAnthropicStream::new(format!("msg_{}", uuid::Uuid::new_v4()), String::new()))
		} else {
			None
		};

		while let Some(chunk) = byte_stream.next().await {
			match chunk {
				Ok(bytes) => {
					for frame in decoder.push(&bytes) {
						if let Some(t) = transcoder.as_mut() {
							for rendered in t.feed(&frame) {
								yield Ok::<Bytes, std::io::Error>(Bytes::from(rendered));
							}
						} else if let Some(raw) = &frame.raw {
							yield Ok(Bytes::from(format!("{raw}\n\n")));
						} else {
							yield Ok(Bytes::from(write_frame(frame.event.as_deref(), &frame.data)));
						}
					}
				},
				Err(e) => {
					tracing::warn!(error = %e, "upstream SSE stream read failed");
					break;
				},
			}
		}
	};
	Body::from_stream(stream)
}

/// Render a `RouteError` as the protocol-native error body the client
/// originally asked for, per §7's client-visible-failure rule.
fn error_response(err: &RouteError, protocol: WireProtocol) -> Response {
	let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
	let body = match protocol {
		WireProtocol::AnthropicMessages => json!({
			"type": "error",
			"error": {"type": err.code(), "message": err.to_string()},
		}),
		_ => json!({
			"error": {"message": err.to_string(), "code": err.code(), "type": "invalid_request_error"},
		}),
	};
	(status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rate_limiter_rejects_past_the_window_limit() {
		let limiter = RateLimiter::new(2, Duration::from_secs(60));
		assert!(limiter.check().is_none());
		assert!(limiter.check().is_none());
		assert!(limiter.check().is_some());
	}

	#[test]
	fn zero_limit_disables_the_limiter() {
		let limiter = RateLimiter::new(0, Duration::from_secs(60));
		for _ in 0..100 {
			assert!(limiter.check().is_none());
		}
	}

	#[test]
	fn error_response_uses_anthropic_shape_for_anthropic_protocol() {
		let err = RouteError::NoHealthyProvider(rc_core::strng::new("default"));
		let resp = error_response(&err, WireProtocol::AnthropicMessages);
		assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
	}

	#[test]
	fn extract_usage_reads_either_naming_convention() {
		assert_eq!(extract_usage(Some(&json!({"prompt_tokens": 3, "completion_tokens": 4}))), (3, 4));
		assert_eq!(extract_usage(Some(&json!({"input_tokens": 1, "output_tokens": 2}))), (1, 2));
		assert_eq!(extract_usage(None), (0, 0));
	}
}
