//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
#[cfg(feature = "http")]
pub mod openai_adapter;
pub mod provider_file;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
