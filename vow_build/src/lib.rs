//! Vow Build
//!
//! Build-side wrapper that drives an external source-to-source compiler
//! over a configured set of file globs. The batch outcome is reported
//! through success/failure callbacks, or bridged into a
//! [`vow_core::Deferred`] so builds compose with settlement chains.

pub mod compiler;
pub mod config;
pub mod error;

pub use compiler::SourceCompiler;
pub use config::BuildConfig;
pub use error::{BuildError, Result};
