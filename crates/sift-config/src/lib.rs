//! # Sift Configuration
//!
//! Typed configuration for the criteria compiler, the nested path resolver,
//! the update-cascade engine and the relational backend.
//!
//! Every section has a `Default`, so an empty file (or no file at all) yields
//! a working configuration.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sift_config::ConfigLoader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::load_from_file("sift.toml").await?;
//!     assert!(config.query.default_page_size > 0);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod loader;

pub use config::*;
pub use loader::*;
