//! Batch upload, templates and downloads for one model

use crate::error::{FieldErrors, RowError, SourceError, UploadError, UpsertError};
use crate::flat::{flatten, unflatten, FlatRecord, NestedRecord};
use crate::mapping::{ColumnPlan, FieldMapping};
use crate::media::MediaFetcher;
use crate::schema::{FieldPolicy, ModelSchema};
use crate::source::{read_source, write_csv, Tabular};
use crate::store::Store;
use crate::upsert::UpsertEngine;
use portal_common::HookList;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Column added to failed-row reports
pub const ERRORS_COLUMN: &str = "errors";

/// A row that was written
#[derive(Debug, Clone, Serialize)]
pub struct RowSuccess {
    /// Zero-based input row
    pub row: usize,
    pub entity_id: Uuid,
    pub created: bool,
    pub representation: NestedRecord,
}

/// A row that was rejected, with the data it carried
#[derive(Debug, Clone, Serialize)]
pub struct FailedRow {
    pub row: usize,
    pub data: FlatRecord,
    pub error: RowError,
}

impl FailedRow {
    pub fn field_errors(&self) -> FieldErrors {
        self.error.field_errors()
    }
}

/// Per-row outcome of one batch, both lists in input order
#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadReport {
    pub successes: Vec<RowSuccess>,
    pub failures: Vec<FailedRow>,
}

impl UploadReport {
    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    /// Write `<stem>_successful.csv` and `<stem>_failed.csv` into `dir`
    pub fn write_reports(&self, dir: &Path, stem: &str, schema: &ModelSchema) -> Result<Vec<PathBuf>, SourceError> {
        let success_rows: Vec<FlatRecord> = self
            .successes
            .iter()
            .map(|s| flatten(&s.representation, schema))
            .collect();
        let success_headers = ordered_headers(schema, &success_rows);
        let success_path = dir.join(format!("{}_successful.csv", stem));
        write_csv(&success_path, &success_headers, &success_rows)?;

        let mut failed_rows = Vec::with_capacity(self.failures.len());
        for failure in &self.failures {
            let mut row = failure.data.clone();
            let errors = serde_json::to_string(&failure.field_errors())?;
            row.insert(ERRORS_COLUMN.to_string(), Value::String(errors));
            failed_rows.push(row);
        }
        let mut failed_headers = ordered_headers(schema, &self.failures.iter().map(|f| f.data.clone()).collect::<Vec<_>>());
        failed_headers.push(ERRORS_COLUMN.to_string());
        let failed_path = dir.join(format!("{}_failed.csv", stem));
        write_csv(&failed_path, &failed_headers, &failed_rows)?;

        Ok(vec![success_path, failed_path])
    }
}

/// Upload/download entry point for one model
pub struct QueryCsvService {
    engine: UpsertEngine,
}

impl QueryCsvService {
    pub fn new(schema: Arc<ModelSchema>, store: Arc<dyn Store>) -> Self {
        Self {
            engine: UpsertEngine::new(schema, store),
        }
    }

    pub fn with_media(mut self, media: Arc<dyn MediaFetcher>) -> Self {
        self.engine = self.engine.with_media(media);
        self
    }

    pub fn with_hooks(mut self, hooks: HookList) -> Self {
        self.engine = self.engine.with_hooks(hooks);
        self
    }

    pub fn schema(&self) -> &Arc<ModelSchema> {
        self.engine.schema()
    }

    pub fn engine(&self) -> &UpsertEngine {
        &self.engine
    }

    pub fn hooks(&self) -> &HookList {
        self.engine.hooks()
    }

    /// Upsert every row; row problems are collected, never raised
    pub async fn upload_batch(&self, tabular: &Tabular, mappings: &[FieldMapping]) -> Result<UploadReport, UploadError> {
        self.upload_batch_with_progress(tabular, mappings, |_| {}).await
    }

    /// [`Self::upload_batch`] calling `on_row` with the processed count after each row
    pub async fn upload_batch_with_progress<F>(
        &self,
        tabular: &Tabular,
        mappings: &[FieldMapping],
        mut on_row: F,
    ) -> Result<UploadReport, UploadError>
    where
        F: FnMut(usize) + Send,
    {
        let schema = self.engine.schema().clone();
        let plan = ColumnPlan::resolve(mappings, &schema.get_flat_fields())?;
        let mut report = UploadReport::default();

        tracing::info!(
            model = schema.model(),
            rows = tabular.len(),
            mappings = mappings.len(),
            "Starting batch upload"
        );

        for (index, raw_row) in tabular.rows.iter().enumerate() {
            let row = plan.apply(raw_row);

            let outcome = match unflatten(&row, &schema) {
                Ok(nested) => self.engine.upsert(&nested).await,
                Err(err) => Err(UpsertError::Row(RowError::FieldValidation(err.into_field_errors()))),
            };

            match outcome {
                Ok(outcome) => {
                    let representation = self.engine.to_representation(&outcome.entity).await?;
                    report.successes.push(RowSuccess {
                        row: index,
                        entity_id: outcome.entity.id,
                        created: outcome.created,
                        representation,
                    });
                }
                Err(UpsertError::Row(error)) => {
                    tracing::warn!(model = schema.model(), row = index, error = %error, "Row rejected");
                    report.failures.push(FailedRow {
                        row: index,
                        data: row,
                        error,
                    });
                }
                Err(UpsertError::Store(err)) => {
                    tracing::error!(model = schema.model(), row = index, error = %err, "Store failure during upload");
                    return Err(err.into());
                }
            }

            on_row(index + 1);
        }

        tracing::info!(
            model = schema.model(),
            successes = report.success_count(),
            failures = report.failure_count(),
            "Batch upload finished"
        );

        Ok(report)
    }

    /// Read a source file and upload its rows
    pub async fn upload_file(&self, path: &Path, mappings: &[FieldMapping]) -> Result<UploadReport, UploadError> {
        let tabular = read_source(path)?;
        self.upload_batch(&tabular, mappings).await
    }

    /// Header row for an upload template
    pub fn csv_template(&self, policy: FieldPolicy) -> Vec<String> {
        self.schema().get_flat_fields().keys(policy)
    }

    pub fn write_csv_template(&self, path: &Path, policy: FieldPolicy) -> Result<Vec<String>, SourceError> {
        let headers = self.csv_template(policy);
        write_csv(path, &headers, &[])?;
        tracing::info!(model = self.schema().model(), policy = %policy, path = %path.display(), "Wrote upload template");
        Ok(headers)
    }

    /// Every entity of the model, flattened
    pub async fn download_rows(&self) -> portal_common::Result<Tabular> {
        let schema = self.schema();
        let mut rows = Vec::new();

        for entity in self.engine.store().all(schema.model()).await? {
            let representation = self.engine.to_representation(&entity).await?;
            rows.push(flatten(&representation, schema));
        }

        Ok(Tabular::new(ordered_headers(schema, &rows), rows))
    }

    /// Write every entity of the model as CSV; returns the row count
    pub async fn download(&self, path: &Path) -> Result<usize, UploadError> {
        let tabular = self.download_rows().await?;
        write_csv(path, &tabular.headers, &tabular.rows)?;
        tracing::info!(model = self.schema().model(), rows = tabular.len(), path = %path.display(), "Wrote download");
        Ok(tabular.len())
    }
}

/// Columns present in `rows`, in catalogue order with list items by index
///
/// Keys unknown to the catalogue follow in first-seen order.
fn ordered_headers(schema: &ModelSchema, rows: &[FlatRecord]) -> Vec<String> {
    let mut present: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !present.contains(key) {
                present.push(key.clone());
            }
        }
    }

    let mut headers = Vec::with_capacity(present.len());
    for field in schema.get_flat_fields().all() {
        let mut matching: Vec<(usize, &String)> = present
            .iter()
            .filter(|key| !headers.contains(*key) && field.path.matches(key))
            .map(|key| {
                let index = crate::field_path::FieldPath::parse(key)
                    .ok()
                    .and_then(|p| p.index())
                    .unwrap_or(0);
                (index, key)
            })
            .collect();
        matching.sort_by_key(|(index, _)| *index);
        headers.extend(matching.into_iter().map(|(_, key)| key.clone()));
    }

    for key in present {
        if !headers.contains(&key) {
            headers.push(key);
        }
    }

    headers
}
