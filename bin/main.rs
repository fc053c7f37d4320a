#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

use std::path::PathBuf;

use authpatch::{config::Config, controller::Controller};
use clap::Parser;

/// Relay SMTP to an upstream server, advertising AUTH LOGIN next to AUTH PLAIN
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Upstream SMTP server host name
    host: String,

    /// Upstream SMTP server port
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Configuration file (defaults to $AUTHPATCH_CONFIG, ./authpatch.toml,
    /// then /etc/authpatch/authpatch.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match Config::locate(args.config)? {
        Some(path) => Config::from_file(&path)?,
        None => Config::default(),
    };

    config.upstream.host = args.host;
    config.upstream.port = args.port;
    config.validate()?;

    Controller::new(config).run().await
}
