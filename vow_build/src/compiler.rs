//! Source compiler invocation
//!
//! Thin wrapper around an external source-to-source compiler: expands
//! the configured globs, runs the compiler once per matched file, and
//! reports the batch outcome through success/failure callbacks or a
//! deferred.

use crate::config::BuildConfig;
use crate::error::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::process::Command;
use vow_core::{Deferred, Value};

/// Drives the external compiler over a configured file set
pub struct SourceCompiler {
    config: BuildConfig,
}

impl SourceCompiler {
    /// Create a compiler wrapper from a configuration
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    /// Compile every file under `root` matched by the configured globs.
    ///
    /// `on_success` runs once after all matched files compile cleanly;
    /// zero matched files counts as immediate success and the compiler
    /// is never spawned. `on_failure` runs with the first error text
    /// encountered and ends the batch.
    pub fn compile<P, S, F>(&self, root: P, on_success: S, on_failure: F) -> Result<()>
    where
        P: AsRef<Path>,
        S: FnOnce() -> Result<()>,
        F: FnOnce(String) -> Result<()>,
    {
        let files = self.expand_globs(root.as_ref())?;
        if files.is_empty() {
            tracing::info!("No files matched, treating as success");
            return on_success();
        }

        tracing::info!("Compiling {} files", files.len());
        for path in &files {
            if let Some(error) = self.run_compiler(path)? {
                return on_failure(error);
            }
            tracing::debug!("Compiled {}", path.display());
        }

        on_success()
    }

    /// Compile and deliver the batch outcome through a deferred.
    ///
    /// The deferred fulfills without a value on success and rejects with
    /// the first error text on failure. Settlement is synchronous with
    /// this call; the deferred form exists so build outcomes compose
    /// with `then` chains and combinators.
    pub fn compile_deferred<P: AsRef<Path>>(&self, root: P) -> Result<Deferred> {
        let (deferred, settle) = Deferred::pending();
        let fulfill = settle.clone();
        let reject = settle;

        self.compile(
            root,
            move || {
                fulfill.fulfill(Value::Null)?;
                Ok(())
            },
            move |error| {
                reject.reject(Some(Value::String(error)))?;
                Ok(())
            },
        )?;

        Ok(deferred)
    }

    /// Run the compiler on one file.
    ///
    /// Returns the error text on failure: anything the compiler wrote to
    /// stderr, or a generic message when it exited nonzero in silence.
    fn run_compiler(&self, path: &Path) -> Result<Option<String>> {
        let output = Command::new(&self.config.compiler_path)
            .args(&self.config.compiler_flags)
            .arg(path)
            .output()?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            return Ok(Some(stderr.trim().to_string()));
        }
        if !output.status.success() {
            return Ok(Some(format!("Compilation of {} failed.", path.display())));
        }

        Ok(None)
    }

    /// Expand the configured glob patterns against a walk of `root`.
    ///
    /// Patterns match paths relative to `root`. Results are sorted so a
    /// batch compiles in a stable order.
    fn expand_globs(&self, root: &Path) -> Result<Vec<PathBuf>> {
        if self.config.files.is_empty() {
            return Ok(Vec::new());
        }

        let set = self.build_glob_set()?;
        let mut matched = Vec::new();

        for entry in WalkBuilder::new(root).standard_filters(false).build() {
            let entry = entry?;
            if !entry.file_type().is_some_and(|kind| kind.is_file()) {
                continue;
            }
            let relative = entry.path().strip_prefix(root).unwrap_or_else(|_| entry.path());
            if set.is_match(relative) {
                matched.push(entry.path().to_path_buf());
            }
        }

        matched.sort();
        Ok(matched)
    }

    fn build_glob_set(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.config.files {
            builder.add(Glob::new(pattern)?);
        }
        Ok(builder.build()?)
    }
}
