//! Kraken Sync Library
//!
//! Exposes core modules for use by binaries and tests.

pub mod config;
pub mod error;
pub mod export;
pub mod kraken;
pub mod models;
pub mod storage;
pub mod sync;

pub use config::Config;
pub use error::SyncError;
pub use storage::SyncStore;
pub use sync::Coordinator;
