//! Asynchronous outbound pipeline for continuous-integration artifacts.
//!
//! Streams an open-ended log to an S3-compatible object store in
//! append-only chunks so consumers can tail it before the producer
//! finishes, mirrors attachment trees next to it, maintains an HTML
//! listing over everything written, and keeps a status service informed
//! of run state. All outbound traffic funnels through a single signing,
//! pacing, drain-before-exit request queue, so producers never block on
//! the network.

pub mod api;
pub mod attachments;
pub mod cache;
pub mod config;
pub mod destination;
pub mod http;
pub mod index;
pub mod queue;
pub mod s3;
pub mod status;
pub mod streamer;

#[cfg(test)]
pub(crate) mod testutil;

pub use api::{ApiClient, ApiError, Reducer};
pub use attachments::AttachmentsDirectory;
pub use cache::LruCache;
pub use config::{Config, ConfigError};
pub use destination::{Destination, DestinationError, LocalDestination, S3Destination};
pub use http::{HttpError, HttpHandle, HttpQueue, HttpRequest};
pub use index::Index;
pub use queue::AsyncQueue;
pub use s3::{S3Error, S3Key};
pub use status::{LocalStatus, ServiceStatus, Status};
pub use streamer::{ChunkedUploader, StreamError};
