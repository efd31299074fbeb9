pub mod app;
pub mod error;
pub mod models;
pub mod queue;
pub mod services;
pub mod utils;

pub use app::config::Config;
pub use error::{ChargeError, ConfigError, ProcessingError, StoreError, TransportError};
