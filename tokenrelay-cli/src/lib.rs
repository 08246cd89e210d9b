//! tokenrelay CLI library
//!
//! Configuration and command logic of the `tokenrelay` binary, exposed for
//! testing.

pub mod app;
pub mod config;

pub use app::{App, RequestSpec, StatusReport, build_request, parse_key_value};
pub use config::{CliConfig, default_config_path, load_config};
