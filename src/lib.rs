//! Image Service Library
//!
//! gRPC writer/reader service for image binaries stored in an
//! S3-compatible object store.
//!
//! # Features
//!
//! - **Streaming Upload**: Clients send an image as a stream of chunks; the
//!   object is committed with a single atomic put once the stream ends
//! - **Writer/Reader Roles**: Upload/Delete and Get run as separate services
//! - **Pluggable Store**: S3 backend plus an in-memory store for local runs
//! - **Prometheus Metrics**: Upload, delete and read counters
//!
//! # Example
//!
//! ```no_run
//! use image_service::{config::Config, server::{Role, Server}};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let server = Server::new(config, Role::Writer)?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod logging;
pub mod metrics;
pub mod s3;
pub mod server;
pub mod storage;
pub mod upload;

/// Generated protobuf and gRPC types for `image.v1`
pub mod pb {
    #![allow(missing_docs)]
    #![allow(clippy::doc_markdown)]
    tonic::include_proto!("image.v1");
}

// Re-export commonly used types
pub use config::Config;
pub use server::Server;
pub use storage::Store;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
