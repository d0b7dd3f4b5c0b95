pub mod config_service;
pub mod dto;
pub mod file_store;
pub mod memory_store;
pub mod paths;
pub mod storage;

pub use crate::config_service::ConfigService;
pub use crate::file_store::FileKeyValueStore;
pub use crate::memory_store::InMemoryKeyValueStore;
pub use crate::paths::CardsmithPaths;
