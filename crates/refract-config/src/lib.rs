#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Typed configuration for the Refract upload pipeline.
//!
//! Layout: `model.rs` (typed config sections, defaults, and validation),
//! `env.rs` (environment-variable loader), `error.rs` (error taxonomy).

pub mod env;
pub mod error;
pub mod model;

pub use env::from_env;
pub use error::{ConfigError, ConfigResult};
pub use model::{
    DEFAULT_ALLOWED_MIME_TYPES, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_POLL_ATTEMPTS,
    DEFAULT_POLL_INTERVAL_MS, Endpoints, PipelineConfig, PollPlan, TransformDefaults,
    UploadLimits,
};
