pub mod config;
pub mod error;

pub use config::RendererConfig;
pub use error::CoreError;
