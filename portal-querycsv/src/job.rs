//! Tracked file uploads
//!
//! An [`UploadJob`] records one file upload from submission to a terminal
//! status: timestamped log lines, a processed-row counter, success and
//! failure counts, wall-clock start/end and the report files written when the
//! batch completes.

use crate::error::{SourceError, UploadError};
use crate::mapping::FieldMapping;
use crate::service::QueryCsvService;
use crate::source::{read_source, SourceFormat};
use chrono::{DateTime, Duration, Utc};
use portal_common::{Clock, PortalEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Processing,
    /// Batch-fatal error
    Failed,
    Success,
    /// Finished with at least one rejected row
    ContainsErrors,
    /// File cannot be processed at all (missing or unsupported)
    Invalid,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Processing)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Failed => "failed",
            Self::Success => "success",
            Self::ContainsErrors => "contains_errors",
            Self::Invalid => "invalid",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobLog {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
    pub id: Uuid,
    pub model: String,
    pub file: PathBuf,
    pub mappings: Vec<FieldMapping>,
    pub status: UploadStatus,
    pub logs: Vec<JobLog>,
    pub processed: usize,
    pub total_rows: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub reports: Vec<PathBuf>,
    pub error: Option<String>,
}

impl UploadJob {
    pub fn new(model: impl Into<String>, file: impl Into<PathBuf>, mappings: Vec<FieldMapping>) -> Self {
        Self {
            id: Uuid::new_v4(),
            model: model.into(),
            file: file.into(),
            mappings,
            status: UploadStatus::Pending,
            logs: Vec::new(),
            processed: 0,
            total_rows: 0,
            success_count: 0,
            failure_count: 0,
            started_at: None,
            finished_at: None,
            reports: Vec::new(),
            error: None,
        }
    }

    pub fn add_log(&mut self, clock: &dyn Clock, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(job_id = %self.id, message = %message, "Upload job log");
        self.logs.push(JobLog {
            timestamp: clock.now(),
            message,
        });
    }

    /// Time between start and finish, or start and now while running
    pub fn elapsed(&self, clock: &dyn Clock) -> Option<Duration> {
        let start = self.started_at?;
        Some(self.finished_at.unwrap_or_else(|| clock.now()) - start)
    }

    fn finish(&mut self, clock: &dyn Clock, status: UploadStatus) {
        self.status = status;
        self.finished_at = Some(clock.now());
        self.add_log(clock, format!("Finished with status {}", status));
    }

    /// Problems that make the file unprocessable, checked before starting
    fn check_file(&self) -> Result<(), SourceError> {
        SourceFormat::from_path(&self.file)?;
        if !self.file.is_file() {
            return Err(SourceError::Io {
                path: self.file.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            });
        }
        Ok(())
    }
}

/// Drive a job to a terminal status
///
/// Row failures give `ContainsErrors`; a batch-fatal error gives `Failed`
/// with its message. Only report-writing problems are returned as errors.
pub async fn run_job(
    job: &mut UploadJob,
    service: &QueryCsvService,
    clock: &dyn Clock,
    reports_dir: &Path,
) -> Result<(), SourceError> {
    if let Err(err) = job.check_file() {
        job.error = Some(err.to_string());
        job.add_log(clock, format!("Invalid upload: {}", err));
        job.finish(clock, UploadStatus::Invalid);
        return Ok(());
    }

    job.status = UploadStatus::Processing;
    job.started_at = Some(clock.now());
    job.add_log(clock, format!("Processing {}", job.file.display()));

    tracing::info!(job_id = %job.id, model = %job.model, file = %job.file.display(), "Upload job started");

    let result = match read_source(&job.file) {
        Ok(tabular) => {
            job.total_rows = tabular.len();
            job.add_log(clock, format!("Read {} rows", tabular.len()));

            let processed = &mut job.processed;
            service
                .upload_batch_with_progress(&tabular, &job.mappings, |count| *processed = count)
                .await
        }
        Err(err) => Err(UploadError::Source(err)),
    };

    match result {
        Ok(report) => {
            job.success_count = report.success_count();
            job.failure_count = report.failure_count();
            job.add_log(
                clock,
                format!("{} rows saved, {} rows failed", job.success_count, job.failure_count),
            );

            job.reports = report.write_reports(reports_dir, &job.id.to_string(), service.schema())?;

            let status = if report.failure_count() == 0 {
                UploadStatus::Success
            } else {
                UploadStatus::ContainsErrors
            };
            job.finish(clock, status);
        }
        Err(err) => {
            tracing::error!(job_id = %job.id, error = %err, "Upload job failed");
            job.error = Some(err.to_string());
            job.add_log(clock, format!("Upload failed: {}", err));
            job.finish(clock, UploadStatus::Failed);
        }
    }

    service.hooks().notify(&PortalEvent::UploadFinished {
        model: job.model.clone(),
        job_id: Some(job.id),
        success_count: job.success_count,
        failed_count: job.failure_count,
        timestamp: clock.now(),
    });

    tracing::info!(
        job_id = %job.id,
        status = %job.status,
        successes = job.success_count,
        failures = job.failure_count,
        "Upload job finished"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use portal_common::FixedClock;

    #[test]
    fn test_terminal_statuses() {
        assert!(!UploadStatus::Pending.is_terminal());
        assert!(!UploadStatus::Processing.is_terminal());
        assert!(UploadStatus::Failed.is_terminal());
        assert!(UploadStatus::ContainsErrors.is_terminal());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(serde_json::to_value(UploadStatus::ContainsErrors).unwrap(), "contains_errors");
        assert_eq!(UploadStatus::ContainsErrors.to_string(), "contains_errors");
    }

    #[test]
    fn test_elapsed_uses_clock_while_running() {
        let start = Utc.with_ymd_and_hms(2024, 9, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        let mut job = UploadJob::new("club", "x.csv", Vec::new());
        assert!(job.elapsed(&clock).is_none());

        job.started_at = Some(start);
        clock.set(start + Duration::seconds(90));
        assert_eq!(job.elapsed(&clock), Some(Duration::seconds(90)));

        job.finished_at = Some(start + Duration::seconds(30));
        assert_eq!(job.elapsed(&clock), Some(Duration::seconds(30)));
    }
}
