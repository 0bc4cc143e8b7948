//! Probe module for site monitoring.
//!
//! An HTTP probe checks one site; the recorder turns successful probes into
//! stored entries.

mod http;
mod recorder;

pub use http::*;
pub use recorder::*;

use std::time::Duration;
use thiserror::Error;

/// Timeout applied to both connecting and the whole request.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to read response body: {0}")]
    Body(String),
}
