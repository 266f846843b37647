//! Concrete adapter implementations for ports.

pub mod cached_adapter;
pub mod csv_adapter;
pub mod csv_weights_writer;
pub mod file_config_adapter;
