//! Kura Uploadr Library
//!
//! Vendor-agnostic multipart object-storage upload engine.
//!
//! # Features
//!
//! - **Pluggable Backends**: One trait, one implementation per vendor,
//!   selected at configuration time
//! - **Collision-Safe Naming**: Desired keys that already exist fall back to
//!   random names that keep the original suffix
//! - **Chunked Uploads**: Large files are split into fixed-size parts with
//!   bounded per-part retry and abort-on-failure
//! - **Progress Observation**: Callers watch uploads through a sink trait
//!
//! # Example
//!
//! ```no_run
//! use kura_uploadr::backend;
//! use kura_uploadr::config::Config;
//! use kura_uploadr::upload::engine::Uploader;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let backend = backend::from_config(&config.storage)?;
//!
//! let uploader = Uploader::new(backend, &config.storage.public_url_prefix)
//!     .with_upload_config(&config.upload);
//!
//! let stored = uploader.upload_file("video.mp4".as_ref(), "video.mp4").await?;
//! println!("Stored at {}", stored.full_url);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod metrics;
pub mod upload;

// Re-export commonly used types
pub use backend::{BackendError, StorageBackend};
pub use config::Config;
pub use upload::engine::Uploader;
pub use upload::progress::ProgressSink;
pub use upload::{StoredFile, UploadError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
