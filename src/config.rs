//! Configuration module.
//!
//! Loads the YAML configuration file and applies environment overrides.

use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid size \"{0}\", expected e.g. 512KB, 4MB or 1GB")]
    Size(String),
    #[error("invalid period \"{0}\", expected an ISO-8601 period such as P7D or P1M")]
    Period(String),
    #[error("report \"{report}\": missing {field}")]
    MissingField { report: String, field: &'static str },
    #[error("report \"{report}\": {message}")]
    Invalid { report: String, message: String },
}

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AppConfig {
    /// Maximum record file size before rotation, e.g. "4MB".
    #[serde(default = "default_max_file_size", alias = "maxFileSize")]
    pub max_file_size: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
    #[serde(default)]
    pub reports: Vec<ReportConfig>,
    #[serde(default)]
    pub mail: Option<MailConfig>,
}

/// A monitored site.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SiteConfig {
    pub name: String,
    pub url: String,
    /// Probe interval in seconds.
    #[serde(alias = "interval-seconds", default = "default_site_interval")]
    pub interval: u64,
}

/// A report definition as written in the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportConfig {
    pub name: String,
    #[serde(default)]
    pub sites: Vec<String>,
    /// "weekly" or "monthly".
    pub interval: Option<String>,
    /// ISO-8601 period, e.g. "P7D".
    pub span: Option<String>,
    /// "text", "json" or "pdf".
    pub format: Option<String>,
    #[serde(default)]
    pub include_entries: bool,
    #[serde(default)]
    pub focus_intervals: Vec<String>,
    #[serde(default, alias = "distributions")]
    pub distribution: Vec<DistributionConfig>,
}

/// Where to send a generated report.
#[derive(Debug, Clone, Deserialize)]
pub struct DistributionConfig {
    /// Means of distribution, e.g. "email".
    pub via: String,
    /// Destination, e.g. an email address.
    pub to: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

fn default_max_file_size() -> String {
    "4MB".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("sites")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_site_interval() -> u64 {
    60
}

fn default_smtp_port() -> u16 {
    465
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            data_dir: default_data_dir(),
            reports_dir: default_reports_dir(),
            sites: Vec::new(),
            reports: Vec::new(),
            mail: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file, then apply environment overrides.
    ///
    /// Environment variables:
    /// - `UPTIME_MONITOR_DATA_DIR`: directory holding per-site record files
    /// - `UPTIME_MONITOR_REPORTS_DIR`: directory reports are written to
    /// - `UPTIME_MONITOR_MAX_FILE_SIZE`: record file rotation size
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cfg = Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = env::var("UPTIME_MONITOR_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = env::var("UPTIME_MONITOR_REPORTS_DIR") {
            self.reports_dir = PathBuf::from(dir);
        }

        if let Ok(size) = env::var("UPTIME_MONITOR_MAX_FILE_SIZE") {
            self.max_file_size = size;
        }
    }

    /// Maximum record file size in bytes.
    pub fn max_file_size_bytes(&self) -> Result<u64, ConfigError> {
        parse_size(&self.max_file_size)
    }
}

/// Parse a human size such as "4MB" into bytes.
///
/// The decimal value is multiplied by 1024 per K, M or G step; without a
/// suffix (or with a bare "B") the value is taken as bytes.
pub fn parse_size(text: &str) -> Result<u64, ConfigError> {
    static SIZE_RE: OnceLock<Regex> = OnceLock::new();
    let re = SIZE_RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*([0-9]+(?:\.[0-9]+)?)\s*([KMG]?)B?\s*$").expect("valid size regex")
    });

    let caps = re
        .captures(text)
        .ok_or_else(|| ConfigError::Size(text.to_string()))?;
    let value: f64 = caps[1]
        .parse()
        .map_err(|_| ConfigError::Size(text.to_string()))?;
    let multiplier = match caps[2].to_ascii_uppercase().as_str() {
        "K" => 1024f64,
        "M" => 1024f64 * 1024.0,
        "G" => 1024f64 * 1024.0 * 1024.0,
        _ => 1f64,
    };
    Ok((value * multiplier).round() as u64)
}

/// A calendar period, as in ISO-8601 `PnYnMnWnD`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Period {
    pub months: u32,
    pub days: u64,
}

impl Period {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        static PERIOD_RE: OnceLock<Regex> = OnceLock::new();
        let re = PERIOD_RE.get_or_init(|| {
            Regex::new(r"(?i)^P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)W)?(?:(\d+)D)?$")
                .expect("valid period regex")
        });

        let trimmed = text.trim();
        let caps = re
            .captures(trimmed)
            .filter(|_| trimmed.len() > 1)
            .ok_or_else(|| ConfigError::Period(text.to_string()))?;

        let num = |i: usize| -> Result<u64, ConfigError> {
            caps.get(i)
                .map(|m| m.as_str().parse::<u64>())
                .transpose()
                .map(|v| v.unwrap_or(0))
                .map_err(|_| ConfigError::Period(text.to_string()))
        };

        let months = num(1)? * 12 + num(2)?;
        let days = num(3)? * 7 + num(4)?;
        Ok(Self {
            months: u32::try_from(months).map_err(|_| ConfigError::Period(text.to_string()))?,
            days,
        })
    }
}
