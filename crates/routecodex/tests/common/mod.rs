//! Shared integration-test harness: spins up the real axum `Router` on an
//! ephemeral port so tests exercise the pipeline exactly as `routecodex-app`
//! does, rather than calling handler functions directly.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use routecodex::server::{build_router, Pipeline};
use routecodex::Config;

pub struct TestGateway {
	pub addr: SocketAddr,
	_task: tokio::task::JoinHandle<()>,
}

impl TestGateway {
	pub fn url(&self, path: &str) -> String {
		format!("http://{}{}", self.addr, path)
	}
}

/// Build a `Config` from a `serde_json::json!` value, pointed at a
/// test-local auth/snapshot directory instead of `$HOME/.routecodex`.
pub fn config_from_value(value: serde_json::Value, auth_dir: &Path, snapshot_dir: &Path) -> Config {
	let mut config: Config = serde_json::from_value(value).expect("test config matches Config shape");
	config.auth_dir = auth_dir.to_path_buf();
	config.snapshot_dir = snapshot_dir.to_path_buf();
	config
}

/// Build the real `Pipeline`/`Router` and serve it on `127.0.0.1:0`.
pub async fn spawn(config: Config) -> TestGateway {
	let pipeline = Arc::new(Pipeline::build(config).expect("pipeline builds from a valid test config"));
	let router = build_router(pipeline);

	let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
		.await
		.expect("bind ephemeral port");
	let addr = listener.local_addr().expect("listener has a local addr");

	let task = tokio::spawn(async move {
		axum::serve(listener, router).await.expect("test server exits cleanly");
	});

	TestGateway { addr, _task: task }
}
