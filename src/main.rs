//! Image Service - gRPC image writer/reader backed by object storage

use clap::Parser;
use image_service::logging::{self, LogFormat};
use image_service::server::{Role, Server};
use image_service::Config;
use std::path::PathBuf;
use tracing::info;

/// Image Service - streaming image upload and retrieval over gRPC
#[derive(Parser, Debug)]
#[command(name = "image-service")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Service to expose
    #[arg(short, long, value_enum, default_value_t = Role::Writer)]
    role: Role,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "json")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logging::init_subscriber(&args.log_level, args.log_format)?;

    info!("Starting Image Service v{}", image_service::VERSION);

    let config = Config::load(&args.config)?;
    info!("Loaded configuration from {:?}", args.config);

    let server = Server::new(config, args.role)?;
    server.run().await?;

    Ok(())
}
