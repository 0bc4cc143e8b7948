//! Report distribution.

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::ReportJob;
use crate::config::SmtpConfig;

#[derive(Error, Debug)]
pub enum DistributionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("invalid content type: {0}")]
    ContentType(String),
}

/// Delivers a finished report archive to a recipient.
pub trait Distributor: Send + Sync {
    fn distribute(&self, job: &ReportJob, recipient: &str, archive: &Path)
        -> Result<(), DistributionError>;
}

/// Sends report archives as email attachments over SMTP with implicit TLS.
pub struct EmailDistributor {
    smtp: SmtpConfig,
}

impl EmailDistributor {
    pub fn new(smtp: SmtpConfig) -> Self {
        Self { smtp }
    }

    fn message(&self, job: &ReportJob, recipient: &str, archive: &Path) -> Result<Message, DistributionError> {
        let from: Mailbox = self.smtp.from_address.parse()?;
        let to: Mailbox = recipient.parse()?;

        let file_name = archive
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("report.zip")
            .to_string();
        let zip_type = ContentType::parse("application/zip")
            .map_err(|e| DistributionError::ContentType(e.to_string()))?;
        let attachment = Attachment::new(file_name).body(fs::read(archive)?, zip_type);

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(format!("Uptime Report - {}", job.name))
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::html(email_body(job)))
                    .singlepart(attachment),
            )?;
        Ok(message)
    }
}

impl Distributor for EmailDistributor {
    fn distribute(&self, job: &ReportJob, recipient: &str, archive: &Path) -> Result<(), DistributionError> {
        let message = self.message(job, recipient, archive)?;
        let mailer = SmtpTransport::relay(&self.smtp.host)?
            .port(self.smtp.port)
            .credentials(Credentials::new(
                self.smtp.username.clone(),
                self.smtp.password.clone(),
            ))
            .build();

        mailer.send(&message)?;
        tracing::info!("Sent report {} to {}", job.name, recipient);
        Ok(())
    }
}

/// HTML body describing a report.
pub fn email_body(job: &ReportJob) -> String {
    let sites: String = job
        .sites
        .iter()
        .map(|s| format!("<li>{}</li>", escape_html(s)))
        .collect();
    format!(
        "<h1>Uptime Report</h1>\
         <p>Report name: <strong>{}</strong></p>\
         <p>Sites:</p><ul>{}</ul>\
         <p>Format: {}</p>\
         <p>The report files are attached as a ZIP archive.</p>",
        escape_html(&job.name),
        sites,
        job.format
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
