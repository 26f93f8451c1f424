//! cqrpc binary.
//!
//! `cqrpc serve` runs the demo `TestService` over TCP until interrupted.
//! `cqrpc call` issues a single call against a running server, or with
//! `query` all three methods pipelined on one connection.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cqrpc_rpc::Outcome;
use cqrpc_server::{App, Client, ServerConfig};
use cqrpc_wire::messages::{
	GET_META_DATA, HEALTH_CHECK, HealthCheckReply, HealthCheckRequest, HelloReply, HelloRequest, MetaReply, MetaRequest, SAY_HELLO,
};
use cqrpc_wire::{decode, encode};
use tracing::info;

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "cqrpc")]
#[command(about = "Completion-queue RPC server and client")]
struct Args {
	/// Verbose logging
	#[arg(short, long, global = true)]
	verbose: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Serve TestService until Ctrl-C
	Serve {
		/// TOML config file
		#[arg(short, long, value_name = "PATH")]
		config: Option<PathBuf>,

		/// Listen address (overrides the config file)
		#[arg(short, long, value_name = "ADDR")]
		listen: Option<SocketAddr>,

		/// Dispatch worker count (overrides the config file)
		#[arg(short, long)]
		workers: Option<usize>,
	},
	/// Issue one call and print the response
	Call {
		/// Server address
		addr: String,

		#[command(subcommand)]
		method: CallMethod,
	},
}

#[derive(Subcommand, Debug)]
enum CallMethod {
	/// SayHello
	Hello {
		#[arg(default_value = "world")]
		name: String,
	},
	/// HealthCheck
	Health {
		#[arg(default_value = "cqrpc")]
		service: String,
	},
	/// GetMetaData
	Meta {
		#[arg(default_value = "key")]
		key: String,
		#[arg(default_value = "value")]
		value: String,
	},
	/// SayHello, HealthCheck and GetMetaData in flight together
	Query {
		#[arg(default_value = "world")]
		name: String,
	},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	match args.command {
		Command::Serve { config, listen, workers } => {
			let mut config = match config {
				Some(path) => ServerConfig::load(&path).with_context(|| format!("loading {}", path.display()))?,
				None => ServerConfig::default(),
			};
			if let Some(listen) = listen {
				config.listen = listen;
			}
			if workers.is_some() {
				config.workers = workers;
			}
			config.validate()?;
			setup_tracing(args.verbose, config.log_filter.as_deref());
			serve(&config).await
		}
		Command::Call { addr, method } => {
			setup_tracing(args.verbose, None);
			call(&addr, method).await
		}
	}
}

async fn serve(config: &ServerConfig) -> anyhow::Result<()> {
	info!(listen = %config.listen, workers = ?config.workers, "starting cqrpc");
	let app = App::start(config).await?;
	info!(addr = %app.local_addr(), methods = ?app.server().methods(), "serving");

	tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
	info!("interrupted, shutting down");

	let report = app.shutdown().await?;
	info!(
		completed = report.stats.completed,
		failures = report.stats.failures,
		reclaimed = report.reclaimed.len(),
		"stopped"
	);
	Ok(())
}

async fn call(addr: &str, method: CallMethod) -> anyhow::Result<()> {
	let mut client = Client::connect(addr).await.with_context(|| format!("connecting to {addr}"))?;
	match method {
		CallMethod::Hello { name } => {
			let reply: HelloReply = client.unary(SAY_HELLO, &HelloRequest { name }).await?;
			println!("{}", reply.message);
		}
		CallMethod::Health { service } => {
			let reply: HealthCheckReply = client.unary(HEALTH_CHECK, &HealthCheckRequest { service }).await?;
			println!("{}", reply.status);
		}
		CallMethod::Meta { key, value } => {
			let reply: MetaReply = client.unary(GET_META_DATA, &MetaRequest { key, value }).await?;
			for entry in reply.data {
				println!("{entry}");
			}
		}
		CallMethod::Query { name } => {
			let calls = vec![
				(SAY_HELLO.to_owned(), encode(&HelloRequest { name: name.clone() })?),
				(HEALTH_CHECK.to_owned(), encode(&HealthCheckRequest { service: name.clone() })?),
				(GET_META_DATA.to_owned(), encode(&MetaRequest { key: name, value: "value".into() })?),
			];
			let [hello, health, meta]: [Outcome; 3] = client
				.pipeline(calls)
				.await?
				.try_into()
				.map_err(|outcomes: Vec<Outcome>| anyhow::anyhow!("expected 3 responses, got {}", outcomes.len()))?;
			let hello: HelloReply = decode(&hello.into_result()?)?;
			let health: HealthCheckReply = decode(&health.into_result()?)?;
			let meta: MetaReply = decode(&meta.into_result()?)?;
			println!("{}", hello.message);
			println!("{}", health.status);
			for entry in meta.data {
				println!("{entry}");
			}
		}
	}
	Ok(())
}

fn setup_tracing(verbose: bool, configured: Option<&str>) {
	use std::fs::OpenOptions;

	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::prelude::*;

	let filter = || {
		EnvFilter::try_from_default_env().unwrap_or_else(|_| match configured {
			Some(directive) => EnvFilter::new(directive),
			None if verbose => EnvFilter::new("cqrpc=debug,info"),
			None => EnvFilter::new("cqrpc=info,warn"),
		})
	};

	// CQRPC_LOG_DIR redirects logs to a per-process file.
	if let Some(log_dir) = std::env::var("CQRPC_LOG_DIR").ok().map(PathBuf::from)
		&& std::fs::create_dir_all(&log_dir).is_ok()
	{
		let log_path = log_dir.join(format!("cqrpc.{}.log", std::process::id()));
		if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
			let file_layer = tracing_subscriber::fmt::layer().with_writer(file).with_ansi(false).with_target(true);
			tracing_subscriber::registry().with(filter()).with(file_layer).init();
			info!(path = ?log_path, "tracing initialized");
			return;
		}
	}

	tracing_subscriber::fmt().with_env_filter(filter()).with_writer(std::io::stderr).init();
}
