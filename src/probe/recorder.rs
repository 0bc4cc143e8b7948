//! Per-site probe recorder.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

use super::{build_probe_client, run_http_probe, ProbeError, PROBE_TIMEOUT};
use crate::store::{MonitorEntry, RecordWriter, StoreError};

/// Errors that end a recorder. Probe failures are not among them.
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("failed to open record store for {site}: {source}")]
    Open { site: String, source: StoreError },
    #[error("failed to build HTTP client for {site}: {source}")]
    Client { site: String, source: ProbeError },
    #[error("failed to record entry for {site}: {source}")]
    Write { site: String, source: StoreError },
    #[error("recorder for {0} is closed")]
    Closed(String),
}

/// Probes one site and appends each result to the site's record store.
///
/// Writes are serialized through an async mutex, so overlapping probes of the
/// same site never interleave rows or race a rotation.
pub struct ProbeRecorder {
    site: String,
    url: String,
    timeout: Duration,
    client: reqwest::Client,
    writer: Mutex<Option<RecordWriter>>,
}

impl ProbeRecorder {
    /// Open the site's record directory under `data_dir` and pick the active file.
    pub fn open(
        site: &str,
        url: &str,
        data_dir: &Path,
        max_file_size: u64,
    ) -> Result<Self, RecorderError> {
        Self::open_with_timeout(site, url, data_dir, max_file_size, PROBE_TIMEOUT)
    }

    pub fn open_with_timeout(
        site: &str,
        url: &str,
        data_dir: &Path,
        max_file_size: u64,
        timeout: Duration,
    ) -> Result<Self, RecorderError> {
        let writer = RecordWriter::open(site_dir(data_dir, site), max_file_size).map_err(|source| {
            RecorderError::Open {
                site: site.to_string(),
                source,
            }
        })?;
        let client = build_probe_client(timeout).map_err(|source| RecorderError::Client {
            site: site.to_string(),
            source,
        })?;

        Ok(Self {
            site: site.to_string(),
            url: url.to_string(),
            timeout,
            client,
            writer: Mutex::new(Some(writer)),
        })
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    /// Probe the site once and record the result.
    ///
    /// A failed probe is logged and records nothing. Only a storage failure
    /// is returned, after which the recorder is closed for good.
    pub async fn probe(&self) -> Result<(), RecorderError> {
        let response = match run_http_probe(&self.client, &self.url, self.timeout).await {
            Ok(r) => r,
            Err(ProbeError::Timeout(t)) => {
                tracing::warn!("Probe of {} ({}) timed out after {:?}", self.site, self.url, t);
                return Ok(());
            }
            Err(e) => {
                tracing::warn!("Probe of {} ({}) failed: {}", self.site, self.url, e);
                return Ok(());
            }
        };

        let entry = MonitorEntry {
            timestamp: response.started_at.fixed_offset(),
            url: self.url.clone(),
            response_code: response.status,
            response_time_ms: response.elapsed_ms,
            details: response.details,
        };

        tracing::debug!(
            "Probe of {}: {} in {} ms",
            self.site,
            entry.response_code,
            entry.response_time_ms
        );

        self.record(&entry).await
    }

    /// Append an entry to the active file.
    pub async fn record(&self, entry: &MonitorEntry) -> Result<(), RecorderError> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| RecorderError::Closed(self.site.clone()))?;

        if let Err(source) = writer.append(entry) {
            tracing::error!("Recording for {} stopped: {}", self.site, source);
            // Drop the broken writer; nothing more is written for this site
            guard.take();
            return Err(RecorderError::Write {
                site: self.site.clone(),
                source,
            });
        }
        Ok(())
    }

    /// Current active file, if the recorder is still open.
    pub async fn active_file(&self) -> Option<PathBuf> {
        self.writer
            .lock()
            .await
            .as_ref()
            .map(|w| w.path().to_path_buf())
    }

    /// Flush and close the active file. Later calls do nothing.
    pub async fn close(&self) {
        let writer = self.writer.lock().await.take();
        if let Some(writer) = writer {
            match writer.close() {
                Ok(()) => tracing::info!("Closed record file for {}", self.site),
                Err(e) => tracing::error!("Failed to close record file for {}: {}", self.site, e),
            }
        }
    }
}

/// Directory holding one site's record files.
pub fn site_dir(data_dir: &Path, site: &str) -> PathBuf {
    data_dir.join(site)
}
