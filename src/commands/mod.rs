//! CLI command implementations.
//!
//! - **analyze**: run the detector over class listings
//! - **init**: write a default configuration file

pub mod analyze;
pub mod init;

pub use analyze::{handle_analyze, AnalyzeConfig};
pub use init::init_config;
