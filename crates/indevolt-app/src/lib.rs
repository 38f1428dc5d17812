pub mod cli;
pub mod config;

pub use cli::{Action, CliArgs};
pub use config::{AppConfig, DeviceConfig};
