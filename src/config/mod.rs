//! Configuration: warehouse connections and TOML settings.

pub mod connection;
pub mod settings;

pub use connection::{BackendConfig, ConnectionError, Driver};
pub use settings::{Settings, SettingsError, WarehouseSettings};
