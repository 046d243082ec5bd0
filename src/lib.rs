//! Decoding of CDN access logs into [`LogRecord`]s, a base-1024 transfer
//! total ([`SizeAccumulator`]) and the URL token expiry check
//! ([`expiry::is_expired`]).

pub mod config;
pub mod error;
pub mod expiry;
pub mod log_reader;
pub mod models;
pub mod output;
pub mod parser;
pub mod progress_events;
pub mod size;
pub mod summary;

pub use error::{DecodeError, ExpiryError, SchemaError};
pub use models::LogRecord;
pub use parser::LogParser;
pub use size::SizeAccumulator;
