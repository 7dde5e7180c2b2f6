//! `routecodex` binary: the only place `main()` lives. Parses the CLI,
//! loads configuration, builds the pipeline, and either serves it, checks
//! it, or reports runtime health without sending traffic.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use routecodex::server::{build_router, Pipeline};
use routecodex::Config;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "routecodex", about = "RouteCodex LLM API gateway", version)]
struct Args {
	/// Path to the JSON config file. Defaults to ~/.routecodex/config.json.
	#[arg(long, global = true, value_name = "file")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the HTTP front-end.
	Serve {
		#[arg(long, default_value = "127.0.0.1:8123")]
		addr: SocketAddr,
	},
	/// Validate and print the resolved configuration.
	Config {
		#[command(subcommand)]
		action: ConfigAction,
	},
	/// Print auth/health state for every configured runtime without sending traffic.
	Doctor,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
	Check,
}

fn main() -> anyhow::Result<()> {
	setup_logging();

	let args = Args::parse();
	tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()?
		.block_on(run(args))
}

async fn run(args: Args) -> anyhow::Result<()> {
	match args.command {
		Command::Serve { addr } => serve(args.config.as_deref(), addr).await,
		Command::Config { action: ConfigAction::Check } => config_check(args.config.as_deref()),
		Command::Doctor => doctor(args.config.as_deref()).await,
	}
}

async fn serve(config_path: Option<&std::path::Path>, addr: SocketAddr) -> anyhow::Result<()> {
	let config = Config::load(config_path)?;
	info!(%addr, "starting routecodex gateway");
	let pipeline = Arc::new(Pipeline::build(config)?);
	let router = build_router(pipeline);

	let listener = tokio::net::TcpListener::bind(addr).await?;
	axum::serve(listener, router).await?;
	Ok(())
}

fn config_check(config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
	let config = Config::load(config_path)?;
	println!("{}", serde_json::to_string_pretty(&config_summary(&config))?);
	println!("configuration is valid");
	Ok(())
}

fn config_summary(config: &Config) -> serde_json::Value {
	serde_json::json!({
		"providers": config.virtual_router.providers.keys().collect::<Vec<_>>(),
		"routes": config.virtual_router.routing.keys().collect::<Vec<_>>(),
		"compatibility_profiles": config.compatibility.profiles,
		"snapshots_enabled": config.system.snapshots_enabled,
		"stats_enabled": config.system.stats_enabled,
	})
}

async fn doctor(config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
	let config = Config::load(config_path)?;
	let runtimes = routecodex::provider::RuntimeManager::build(&config)?;
	for (runtime_key, _runtime) in runtimes.iter() {
		println!("{runtime_key}: configured, no traffic sent");
	}
	Ok(())
}

/// `RUST_LOG` drives the filter; `ROUTECODEX_LOG_FORMAT=json` switches the
/// formatter, matching the teacher's pretty-by-default / json-in-prod split.
fn setup_logging() {
	use tracing_subscriber::prelude::*;
	use tracing_subscriber::{fmt, EnvFilter};

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let json = std::env::var("ROUTECODEX_LOG_FORMAT").as_deref() == Ok("json");

	if json {
		tracing_subscriber::registry().with(filter).with(fmt::layer().json()).init();
	} else {
		tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
	}
}
