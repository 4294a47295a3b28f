//! External object storage behind a uniform gateway interface.
//!
//! The core abstraction is [`StorageGateway`]. Backends are interchangeable:
//! - `LocalFileGateway`: a directory on local disk (development and single-node installs)
//! - `InMemoryGateway`: process-local map (tests and ephemeral dev servers)
//!
//! `build_gateway` picks one from configuration.

pub mod factory;
pub mod gateway;
pub mod in_memory;
pub mod local;

pub use factory::build_gateway;
pub use gateway::{FileMetadata, StorageGateway, StorageStats, StoredObject, join_path};
pub use in_memory::InMemoryGateway;
pub use local::LocalFileGateway;
