//! Show persistence for LUX - configuration and project files

mod config;
mod error;
mod project;

pub use config::Config;
pub use error::ShowError;
pub use project::Project;
