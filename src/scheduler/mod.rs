//! Scheduler module for running site probes and report jobs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use uuid::Uuid;

use crate::config::SiteConfig;
use crate::probe::{ProbeRecorder, RecorderError};
use crate::report::{Interval, ReportGenerator};

/// Probes of one site that may run at the same time.
const MAX_IN_FLIGHT: usize = 4;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("cron scheduler error: {0}")]
    Cron(#[from] JobSchedulerError),
    #[error(transparent)]
    Recorder(#[from] RecorderError),
    #[error("{0} is already scheduled")]
    Duplicate(String),
}

struct SiteTask {
    stop_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns every running site loop and report job.
pub struct Scheduler {
    sites: RwLock<HashMap<String, SiteTask>>,
    reports: RwLock<HashMap<String, Uuid>>,
    cron: Mutex<JobScheduler>,
}

impl Scheduler {
    pub async fn new() -> Result<Self, SchedulerError> {
        Ok(Self {
            sites: RwLock::new(HashMap::new()),
            reports: RwLock::new(HashMap::new()),
            cron: Mutex::new(JobScheduler::new().await?),
        })
    }

    /// Start probing a site at a fixed rate.
    pub async fn add_site(
        &self,
        site: &SiteConfig,
        data_dir: &Path,
        max_file_size: u64,
    ) -> Result<(), SchedulerError> {
        let mut sites = self.sites.write().await;
        if sites.contains_key(&site.name) {
            return Err(SchedulerError::Duplicate(site.name.clone()));
        }

        let recorder = Arc::new(ProbeRecorder::open(&site.name, &site.url, data_dir, max_file_size)?);
        let period = Duration::from_secs(site.interval.max(1));
        let (stop_tx, stop_rx) = broadcast::channel(1);

        tracing::info!("Scheduler: Adding site {} every {:?}", site.name, period);
        let handle = tokio::spawn(run_site_loop(recorder, period, stop_rx));
        sites.insert(site.name.clone(), SiteTask { stop_tx, handle });
        Ok(())
    }

    /// Register a report to run on its cron schedule.
    pub async fn add_report(
        &self,
        generator: Arc<ReportGenerator>,
        interval: Interval,
    ) -> Result<(), SchedulerError> {
        let name = generator.job().name.clone();
        let mut reports = self.reports.write().await;
        if reports.contains_key(&name) {
            return Err(SchedulerError::Duplicate(name));
        }

        let job = Job::new_async(interval.cron(), move |_uuid, _l| {
            let generator = generator.clone();
            Box::pin(async move {
                run_report(generator).await;
            })
        })?;
        let id = self.cron.lock().await.add(job).await?;

        tracing::info!("Scheduler: Report {} runs {} ({})", name, interval, interval.cron());
        reports.insert(name, id);
        Ok(())
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        self.cron.lock().await.start().await?;
        tracing::info!(
            "Scheduler started with {} sites and {} reports",
            self.sites.read().await.len(),
            self.reports.read().await.len()
        );
        Ok(())
    }

    /// Stop report jobs, then stop every site and wait for its file to close.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        tracing::info!("Scheduler shutting down");
        self.cron.lock().await.shutdown().await?;
        self.reports.write().await.clear();

        let tasks: Vec<(String, SiteTask)> = self.sites.write().await.drain().collect();
        for (_, task) in &tasks {
            let _ = task.stop_tx.send(());
        }
        for (name, task) in tasks {
            if let Err(e) = task.handle.await {
                tracing::error!("Site task for {} ended abnormally: {}", name, e);
            }
        }
        tracing::info!("Scheduler stopped");
        Ok(())
    }

    pub async fn site_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sites.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn report_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.reports.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Generate a report on the blocking pool and log the outcome.
pub async fn run_report(generator: Arc<ReportGenerator>) {
    let name = generator.job().name.clone();
    tracing::info!("Running report {}", name);
    match tokio::task::spawn_blocking(move || generator.generate()).await {
        Ok(Ok(outcome)) => {
            for (site, status) in &outcome.sites {
                tracing::info!("Report {}: {} {:?}", name, site, status);
            }
        }
        Ok(Err(e)) => tracing::error!("Report {} failed: {}", name, e),
        Err(e) => tracing::error!("Report {} task failed: {}", name, e),
    }
}

/// Probe one site on every tick until stopped.
///
/// Ticks fire at a fixed rate and each probe runs as its own task, so a slow
/// probe never delays the next one. A tick that finds `MAX_IN_FLIGHT` probes
/// still running is skipped. A storage failure ends the loop.
async fn run_site_loop(
    recorder: Arc<ProbeRecorder>,
    period: Duration,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let semaphore = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
    let mut in_flight: JoinSet<Result<(), RecorderError>> = JoinSet::new();

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                break;
            }
            Some(joined) = in_flight.join_next() => {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::error!("Stopping probes of {}: {}", recorder.site(), e);
                        break;
                    }
                    Err(e) => tracing::error!("Probe task for {} failed: {}", recorder.site(), e),
                }
            }
            _ = interval.tick() => {
                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(p) => p,
                    Err(_) => {
                        tracing::warn!("Skipping probe for {} due to overlap limit", recorder.site());
                        continue;
                    }
                };

                let recorder = recorder.clone();
                in_flight.spawn(async move {
                    let _permit = permit;
                    recorder.probe().await
                });
            }
        }
    }

    // Let running probes finish writing before the file is closed
    while let Some(joined) = in_flight.join_next().await {
        if let Ok(Err(e)) = joined {
            tracing::debug!("Probe of {} after stop: {}", recorder.site(), e);
        }
    }
    recorder.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReportConfig;
    use crate::measure::MeasurementEngine;
    use crate::report::ReportJob;
    use crate::store::read_record_file;
    use axum::{routing::get, Router};
    use tempfile::TempDir;

    async fn serve() -> String {
        let app = Router::new().route("/", get(|| async { "ok" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    fn site(name: &str, url: &str) -> SiteConfig {
        SiteConfig {
            name: name.to_string(),
            url: url.to_string(),
            interval: 1,
        }
    }

    #[tokio::test]
    async fn test_site_loop_records_and_closes() {
        let tmp = TempDir::new().unwrap();
        let url = serve().await;
        let scheduler = Scheduler::new().await.unwrap();
        scheduler
            .add_site(&site("local", &url), tmp.path(), 1024 * 1024)
            .await
            .unwrap();
        scheduler.start().await.unwrap();

        // First tick fires immediately, the second after one second
        tokio::time::sleep(Duration::from_millis(1500)).await;
        scheduler.shutdown().await.unwrap();
        assert!(scheduler.site_names().await.is_empty());

        let files: Vec<_> = std::fs::read_dir(tmp.path().join("local"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        let entries = read_record_file(&files[0]).unwrap();
        assert!(entries.len() >= 2);
        assert!(entries.iter().all(|e| e.response_code == 200 && e.url == url));
    }

    #[tokio::test]
    async fn test_duplicate_site_rejected() {
        let tmp = TempDir::new().unwrap();
        let scheduler = Scheduler::new().await.unwrap();
        let cfg = site("dup", "http://127.0.0.1:9/");
        scheduler.add_site(&cfg, tmp.path(), 1024).await.unwrap();
        let err = scheduler.add_site(&cfg, tmp.path(), 1024).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Duplicate(_)));
        assert_eq!(scheduler.site_names().await, vec!["dup".to_string()]);
        scheduler.start().await.unwrap();
        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_add_report() {
        let tmp = TempDir::new().unwrap();
        let job = ReportJob::from_config(&ReportConfig {
            name: "Monthly".to_string(),
            sites: vec!["example".to_string()],
            interval: Some("monthly".to_string()),
            span: Some("P1M".to_string()),
            format: Some("json".to_string()),
            ..Default::default()
        })
        .unwrap();
        let generator = Arc::new(ReportGenerator::new(
            job,
            MeasurementEngine::new(tmp.path().join("sites")),
            tmp.path().join("reports"),
        ));

        let scheduler = Scheduler::new().await.unwrap();
        scheduler.add_report(generator.clone(), Interval::Monthly).await.unwrap();
        assert!(matches!(
            scheduler.add_report(generator, Interval::Weekly).await,
            Err(SchedulerError::Duplicate(_))
        ));
        assert_eq!(scheduler.report_names().await, vec!["Monthly".to_string()]);
        scheduler.start().await.unwrap();
        scheduler.shutdown().await.unwrap();
        assert!(scheduler.report_names().await.is_empty());
    }
}
