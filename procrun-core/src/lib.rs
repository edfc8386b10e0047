pub mod config;
pub mod error;
pub mod models;

pub use config::RunnerConfig;
pub use error::{ProcrunError, Result};
pub use models::*;
