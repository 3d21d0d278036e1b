pub mod csv_store;
pub mod fetch;
pub mod file_config_adapter;
