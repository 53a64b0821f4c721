//! palctl - game server console client
//!
//! Keeps the registry of known game servers, tracks which one is active, and
//! talks to the console backend's REST API on its behalf.

pub mod api;
pub mod config;
pub mod logging;
pub mod models;
pub mod paths;
pub mod registry;
pub mod storage;

pub use api::{ApiClient, ApiError, Route, Target};
pub use config::{get_config_value, set_config_value, Config, ConfigError};
pub use models::{ServerPatch, ServerRecord};
pub use paths::Paths;
pub use registry::Registry;
pub use storage::{ActiveServerStore, FileStore, MemoryStore, StoreError};
