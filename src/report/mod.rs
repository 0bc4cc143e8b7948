//! Report jobs: measure a set of sites, render each one, bundle and distribute.

mod archive;
mod distribute;
mod format;

pub use archive::*;
pub use distribute::*;
pub use format::*;

use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

use crate::config::{AppConfig, ConfigError, Period, ReportConfig};
use crate::measure::{FocusInterval, MeasureError, MeasurementEngine};
use crate::store::FILE_TIMESTAMP_FORMAT;

/// Errors that abort a whole report run.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("span of report \"{0}\" reaches outside the supported date range")]
    Span(String),
    #[error("failed to create staging directory {path}: {source}")]
    Staging {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no formatter registered for {0}")]
    NoFormatter(Format),
    #[error("report \"{0}\": no site could be rendered")]
    NoSites(String),
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),
}

/// Failure rendering one site of a report.
#[derive(Error, Debug)]
pub enum SiteReportError {
    #[error(transparent)]
    Measure(#[from] MeasureError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How often a report runs on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    Weekly,
    Monthly,
}

impl Interval {
    /// Six-field cron expression, evaluated in UTC.
    pub fn cron(self) -> &'static str {
        match self {
            // Monday 01:00
            Interval::Weekly => "0 0 1 * * Mon",
            // First of the month, 01:00
            Interval::Monthly => "0 0 1 1 * *",
        }
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weekly" => Ok(Interval::Weekly),
            "monthly" => Ok(Interval::Monthly),
            _ => Err(format!("unknown interval \"{}\", expected weekly or monthly", s)),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Interval::Weekly => "weekly",
            Interval::Monthly => "monthly",
        })
    }
}

/// Means of distributing a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Via {
    Email,
}

impl FromStr for Via {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(Via::Email),
            _ => Err(format!("unknown distribution \"{}\", expected email", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionTarget {
    pub via: Via,
    pub to: String,
}

/// Validated, immutable parameters of one report.
#[derive(Debug, Clone)]
pub struct ReportJob {
    pub name: String,
    pub sites: Vec<String>,
    pub format: Format,
    pub span: Period,
    pub focus_intervals: Vec<FocusInterval>,
    pub distribution: Vec<DistributionTarget>,
    pub interval: Option<Interval>,
    pub include_entries: bool,
}

impl ReportJob {
    pub fn from_config(cfg: &ReportConfig) -> Result<Self, ConfigError> {
        let report = cfg.name.clone();
        let missing = |field: &'static str| ConfigError::MissingField {
            report: report.clone(),
            field,
        };
        let invalid = |message: String| ConfigError::Invalid {
            report: report.clone(),
            message,
        };

        if cfg.name.trim().is_empty() {
            return Err(missing("name"));
        }
        if cfg.sites.is_empty() {
            return Err(missing("sites"));
        }

        let format = cfg
            .format
            .as_deref()
            .ok_or_else(|| missing("format"))?
            .parse::<Format>()
            .map_err(|e| invalid(e.to_string()))?;
        let span = Period::parse(cfg.span.as_deref().ok_or_else(|| missing("span"))?)
            .map_err(|e| invalid(e.to_string()))?;
        let interval = cfg
            .interval
            .as_deref()
            .map(str::parse::<Interval>)
            .transpose()
            .map_err(invalid)?;
        let focus_intervals = cfg
            .focus_intervals
            .iter()
            .map(|s| s.parse::<FocusInterval>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| invalid(e.to_string()))?;
        let distribution = cfg
            .distribution
            .iter()
            .map(|d| {
                Ok(DistributionTarget {
                    via: d.via.parse()?,
                    to: d.to.clone(),
                })
            })
            .collect::<Result<Vec<_>, String>>()
            .map_err(invalid)?;

        Ok(Self {
            name: cfg.name.clone(),
            sites: cfg.sites.clone(),
            format,
            span,
            focus_intervals,
            distribution,
            interval,
            include_entries: cfg.include_entries,
        })
    }
}

/// Result of rendering one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteStatus {
    /// File name of the rendered report inside the archive.
    Rendered(String),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub archive: PathBuf,
    pub sites: Vec<(String, SiteStatus)>,
}

impl ReportOutcome {
    pub fn failed_sites(&self) -> usize {
        self.sites
            .iter()
            .filter(|(_, s)| matches!(s, SiteStatus::Failed(_)))
            .count()
    }
}

/// Generates one report job on demand.
pub struct ReportGenerator {
    job: ReportJob,
    engine: MeasurementEngine,
    reports_dir: PathBuf,
    formatters: FormatterRegistry,
    distributors: HashMap<Via, Arc<dyn Distributor>>,
}

impl ReportGenerator {
    pub fn new(job: ReportJob, engine: MeasurementEngine, reports_dir: PathBuf) -> Self {
        let formatters = FormatterRegistry::new(FormatOptions {
            include_entries: job.include_entries,
        });
        Self {
            job,
            engine,
            reports_dir,
            formatters,
            distributors: HashMap::new(),
        }
    }

    /// Build a generator for a configured report, wiring in SMTP if it is needed.
    pub fn from_config(app: &AppConfig, cfg: &ReportConfig) -> Result<Self, ConfigError> {
        let job = ReportJob::from_config(cfg)?;
        let needs_email = job.distribution.iter().any(|d| d.via == Via::Email);
        let mut generator = Self::new(
            job,
            MeasurementEngine::new(app.data_dir.clone()),
            app.reports_dir.clone(),
        );

        if needs_email {
            let mail = app.mail.as_ref().ok_or_else(|| ConfigError::MissingField {
                report: cfg.name.clone(),
                field: "mail.smtp",
            })?;
            generator = generator.with_distributor(
                Via::Email,
                Arc::new(EmailDistributor::new(mail.smtp.clone())),
            );
        }
        Ok(generator)
    }

    pub fn with_distributor(mut self, via: Via, distributor: Arc<dyn Distributor>) -> Self {
        self.distributors.insert(via, distributor);
        self
    }

    pub fn job(&self) -> &ReportJob {
        &self.job
    }

    pub fn generate(&self) -> Result<ReportOutcome, ReportError> {
        self.generate_at(Utc::now())
    }

    /// Generate the report as if it were `now`.
    pub fn generate_at(&self, now: DateTime<Utc>) -> Result<ReportOutcome, ReportError> {
        let (start, end) = self.window(now)?;
        let formatter = self
            .formatters
            .get(self.job.format)
            .ok_or(ReportError::NoFormatter(self.job.format))?;

        let staging = self.reports_dir.join(format!(
            "{}_{}",
            now.format(FILE_TIMESTAMP_FORMAT),
            slug(&self.job.name)
        ));
        fs::create_dir_all(&staging).map_err(|source| ReportError::Staging {
            path: staging.clone(),
            source,
        })?;
        tracing::info!(
            "Generating report {} for {} to {} in {}",
            self.job.name,
            start,
            end,
            staging.display()
        );

        let mut sites = Vec::with_capacity(self.job.sites.len());
        for site in &self.job.sites {
            let status = match self.render_site(site, start, end, formatter.as_ref(), &staging) {
                Ok(name) => SiteStatus::Rendered(name),
                Err(e) => {
                    tracing::error!("Report {}: site {} failed: {}", self.job.name, site, e);
                    SiteStatus::Failed(e.to_string())
                }
            };
            sites.push((site.clone(), status));
        }

        if sites.iter().all(|(_, s)| matches!(s, SiteStatus::Failed(_))) {
            if let Err(e) = fs::remove_dir_all(&staging) {
                tracing::warn!("Failed to remove staging directory {}: {}", staging.display(), e);
            }
            return Err(ReportError::NoSites(self.job.name.clone()));
        }

        let archive = bundle_directory(&staging)?;
        let outcome = ReportOutcome { archive, sites };
        tracing::info!(
            "Report {} written to {} ({} of {} sites rendered)",
            self.job.name,
            outcome.archive.display(),
            outcome.sites.len() - outcome.failed_sites(),
            outcome.sites.len()
        );

        self.distribute(&outcome.archive);
        Ok(outcome)
    }

    /// Inclusive date window ending at `now`.
    pub fn window(&self, now: DateTime<Utc>) -> Result<(NaiveDate, NaiveDate), ReportError> {
        let start = now
            .checked_sub_months(Months::new(self.job.span.months))
            .and_then(|t| t.checked_sub_days(Days::new(self.job.span.days)))
            .ok_or_else(|| ReportError::Span(self.job.name.clone()))?;
        Ok((start.date_naive(), now.date_naive()))
    }

    fn render_site(
        &self,
        site: &str,
        start: NaiveDate,
        end: NaiveDate,
        formatter: &dyn Formatter,
        staging: &Path,
    ) -> Result<String, SiteReportError> {
        let data = self
            .engine
            .measure(site, Some(start), Some(end), &self.job.focus_intervals)?;
        let name = format!("{}.{}", site, formatter.extension());

        let mut out = BufWriter::new(File::create(staging.join(&name))?);
        formatter.write(&data, &mut out)?;
        out.flush()?;
        Ok(name)
    }

    fn distribute(&self, archive: &Path) {
        for target in &self.job.distribution {
            let Some(distributor) = self.distributors.get(&target.via) else {
                tracing::warn!("Report {}: no distributor for {:?}", self.job.name, target.via);
                continue;
            };
            if let Err(e) = distributor.distribute(&self.job, &target.to, archive) {
                tracing::error!(
                    "Report {}: distribution to {} failed: {}",
                    self.job.name,
                    target.to,
                    e
                );
            }
        }
    }
}

/// Replace each run of whitespace with a single dash.
fn slug(name: &str) -> String {
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();
    let re = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"));
    re.replace_all(name.trim(), "-").into_owned()
}
