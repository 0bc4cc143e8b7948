//! Record store for probe results.
//!
//! One directory per site holds append-only CSV files named by their UTC
//! creation time. A single writer per site appends rows and rotates to a new
//! file once the active one grows past the configured size.

mod files;
mod models;
mod reader;
mod writer;

pub use files::*;
pub use models::*;
pub use reader::*;
pub use writer::*;

use thiserror::Error;

/// Record store error types.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
