mod config;
mod dispatch;
mod processor;

pub use config::{ConfigError, ValidationError};
pub use dispatch::{DispatchError, StorageError};
pub use processor::ProcessorError;
