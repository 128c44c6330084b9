//! Command line entry point for the fixture directory.
use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use ldap_fixture::{server, Config, Directory};
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// In-memory LDAP directory for integration tests.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
	/// Path to a TOML configuration file
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Address to listen on, overriding the configuration
	#[arg(short, long)]
	listen: Option<SocketAddr>,

	/// Port to listen on, overriding the configured port
	#[arg(long, env = "PORT")]
	port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let filter =
		EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy();
	tracing_subscriber::fmt().with_env_filter(filter).init();

	let cli = Cli::parse();
	let mut config = match &cli.config {
		Some(path) => Config::from_file(path)
			.with_context(|| format!("while reading configuration from {}", path.display()))?,
		None => Config::default(),
	};
	if let Some(listen) = cli.listen {
		config.listen = listen;
	}
	if let Some(port) = cli.port {
		config.listen.set_port(port);
	}

	let directory = Directory::from_config(&config).context("invalid directory configuration")?;
	info!("User base DN: {}", directory.user_base());
	info!("Group base DN: {}", directory.group_base());
	for user in &config.users {
		info!("Test user {} (admin: {})", user.username, user.admin);
	}

	let listener = tokio::net::TcpListener::bind(config.listen)
		.await
		.with_context(|| format!("while binding to {}", config.listen))?;
	server::serve(listener, Arc::new(directory)).await?;
	Ok(())
}
