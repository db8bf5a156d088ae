pub mod access;
pub mod config;
pub mod error;

pub use access::{AccessEvent, LogFormat};
pub use config::{NegotiationHeader, VigilConfig};
pub use error::VigilError;
