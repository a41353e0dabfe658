//! adaptest-providers: Supplementary question sources.
//!
//! Implements the `SupplementarySource` trait for an HTTP question service
//! and for on-disk pool directories, plus the layered configuration file
//! that wires them into the engine.

pub mod config;
pub mod directory;
pub mod error;
pub mod http;
pub mod mock;

pub use config::{create_sources, load_config, load_config_from, AdaptestConfig, SourceConfig};
pub use directory::DirectorySource;
pub use error::SourceError;
pub use http::HttpSource;
pub use mock::MockSource;
