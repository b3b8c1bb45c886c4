pub mod cli;
pub mod config;
pub mod evidence;
pub mod generator;
pub mod i18n;
pub mod llm;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use generator::workflow::{ReportGenerator, launch};
