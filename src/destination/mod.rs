//! Artifact sinks.
//!
//! A [`Destination`] is a small capability set (`has` / `write` /
//! `delete`) rather than a class hierarchy; [`Index`](crate::index::Index)
//! and [`AttachmentsDirectory`](crate::attachments::AttachmentsDirectory)
//! compose by holding one, never by extending one.

pub mod local;
pub mod remote;

#[cfg(test)]
pub mod mock;

use thiserror::Error;

pub use local::LocalDestination;
pub use remote::S3Destination;

#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid artifact URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}

pub trait Destination: Send + Sync {
    /// Where this destination writes, for display purposes.
    fn location(&self) -> &str;

    fn has(&self, filename: &str) -> Result<bool, DestinationError>;

    fn write(&self, filename: &str, data: &[u8]) -> Result<(), DestinationError>;

    fn delete(&self, filenames: &[String]) -> Result<(), DestinationError>;
}
