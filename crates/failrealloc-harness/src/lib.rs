//! Test harness for the `realloc` fault-injection shim.
//!
//! This crate provides:
//! - Scenario definitions shared by the `append-check` binary and the
//!   in-process seam run ([`scenario`], [`seam`]).
//! - A supervisor that runs `append-check` under `LD_PRELOAD` with a chosen
//!   `FAIL_REALLOC_AFTER` and classifies the outcome ([`supervisor`]).
//! - A configuration matrix over both subjects ([`matrix`]).
//! - A concurrency check of ordinal assignment ([`stress`]).
//! - Structured JSONL logging with an artifact index ([`structured_log`]).

#![forbid(unsafe_code)]

pub mod error;
pub mod matrix;
pub mod scenario;
pub mod seam;
pub mod stress;
pub mod structured_log;
pub mod supervisor;

pub use error::HarnessError;
pub use matrix::{MatrixReport, run_matrix};
pub use supervisor::{PreloadRun, RunRecord, RunVerdict};
