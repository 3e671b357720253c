#![forbid(unsafe_code)]
//! mailscope-core library.
//!
//! Shared vocabulary for the mailscope workspace: the message model, the
//! [`source::MessageSource`] contract consumed by the live coordinator,
//! configuration loading, and machine-readable error codes.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums at library seams; `anyhow::Result`
//!   for config loading.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod model;
pub mod source;
pub mod timing;

pub use error::{ErrorCode, SourceError, WindowError};
pub use model::{Message, MessageKey, Priority, Target};
