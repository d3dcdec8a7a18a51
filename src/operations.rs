//! User-facing operations built on the engine.
//!
//! Each operation validates its object type against the portal's catalogue
//! before touching data, writes its artifacts under the output folder, and
//! returns a summary for the caller to print.

use crate::api::{CrmClient, CrmRecord, FilterOperator, RetryPolicy, SearchFilter};
use crate::config::Config;
use crate::engine::{
    write_error_ledger, write_field_metadata, write_records_csv, BatchProcessor, ChunkedCsvWriter,
    OperationResult, PageSource, Paginator, ProgressReporter,
};
use crate::error::{EngineError, Result};
use crate::objects::{self, ObjectCatalog};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Filter used by orphan extraction when the caller gives none
#[must_use]
pub fn default_orphan_filter(object: &str) -> Option<SearchFilter> {
    match object {
        "contacts" => Some(SearchFilter::missing("associatedcompanyid")),
        "companies" => Some(SearchFilter::missing("hs_parent_company_id")),
        "deals" | "tickets" => Some(SearchFilter {
            property_name: "num_associated_contacts".to_string(),
            operator: FilterOperator::Eq,
            value: Some("0".to_string()),
        }),
        _ => None,
    }
}

/// Per-object outcome of an "all objects" export
#[derive(Debug, Default)]
pub struct BulkExport {
    pub written: Vec<PathBuf>,
    /// Object type and the error that skipped it
    pub failed: Vec<(String, String)>,
}

/// What a chunked extraction reads
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// ANDed search filters
    pub filters: Vec<SearchFilter>,
    /// Properties to fetch; every property of the object when `None`
    pub properties: Option<Vec<String>>,
    /// Cursor logged by an earlier run that stopped early
    pub start_after: Option<String>,
}

/// Result of a chunked extraction
#[derive(Debug, Default)]
pub struct ExtractSummary {
    pub object: String,
    pub files: Vec<PathBuf>,
    pub records: usize,
}

/// Identifiers read from one input file, ready for confirmation
#[derive(Debug, Clone)]
pub struct DeletePlan {
    pub path: PathBuf,
    pub object: String,
    pub ids: Vec<String>,
}

/// Result of archiving one input file
#[derive(Debug)]
pub struct DeleteSummary {
    pub object: String,
    pub result: OperationResult,
    pub ledger: Option<PathBuf>,
}

pub struct Operations {
    client: CrmClient,
    config: Config,
    cancel: CancellationToken,
}

impl Operations {
    #[must_use]
    pub const fn new(client: CrmClient, config: Config, cancel: CancellationToken) -> Self {
        Self {
            client,
            config,
            cancel,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    fn output_dir(&self) -> Result<&Path> {
        let dir = self.config.paths.output_dir.as_path();
        std::fs::create_dir_all(dir)?;
        Ok(dir)
    }

    fn paginator(&self, object: &str, properties: Vec<String>, source: PageSource) -> Paginator<'_> {
        Paginator::new(&self.client, object, properties, source)
            .page_size(self.config.batch.page_size)
            .throttle(Duration::from_millis(self.config.batch.page_delay_ms))
            .retry(RetryPolicy::from(&self.config.retry))
            .cancel_token(self.cancel.clone())
    }

    /// Every object type the portal exposes
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SchemaLookup`] if the schema list cannot be read.
    pub async fn catalog(&self) -> Result<ObjectCatalog> {
        ObjectCatalog::load(&self.client).await
    }

    async fn resolve(&self, object: &str) -> Result<String> {
        self.catalog().await?.resolve(object)
    }

    async fn property_names(&self, object: &str) -> Result<Vec<String>> {
        let properties = self
            .client
            .list_properties(object)
            .await
            .map_err(|source| EngineError::SchemaLookup {
                object: object.to_string(),
                source,
            })?;
        Ok(properties.into_iter().map(|p| p.name).collect())
    }

    /// Writes `fields_<object>.csv`
    ///
    /// # Errors
    ///
    /// - [`EngineError::UnknownObjectType`] for an unknown object
    /// - [`EngineError::SchemaLookup`] if properties cannot be listed
    pub async fn export_fields(&self, object: &str) -> Result<PathBuf> {
        let object = self.resolve(object).await?;
        self.export_fields_resolved(&object).await
    }

    async fn export_fields_resolved(&self, object: &str) -> Result<PathBuf> {
        let properties = self
            .client
            .list_properties(object)
            .await
            .map_err(|source| EngineError::SchemaLookup {
                object: object.to_string(),
                source,
            })?;
        let path = self.output_dir()?.join(format!("fields_{object}.csv"));
        write_field_metadata(&path, &properties)?;
        Ok(path)
    }

    /// Field listing for every object type; one failing object does not stop the rest
    ///
    /// # Errors
    ///
    /// Returns an error if the catalogue cannot be loaded or the run is cancelled.
    pub async fn export_all_fields(&self) -> Result<BulkExport> {
        let catalog = self.catalog().await?;
        let mut export = BulkExport::default();
        for object in catalog.all() {
            if self.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            match self.export_fields_resolved(object).await {
                Ok(path) => export.written.push(path),
                Err(err) => {
                    warn!(object, error = %err, "Skipping object");
                    export.failed.push((object.to_string(), err.to_string()));
                }
            }
        }
        Ok(export)
    }

    /// Writes `sample_<object>.csv` with up to `sample_size` records
    ///
    /// # Errors
    ///
    /// - [`EngineError::UnknownObjectType`] for an unknown object
    /// - [`EngineError::SchemaLookup`] if properties cannot be listed
    /// - [`EngineError::Transport`] if a page fails after its retries
    pub async fn export_sample(&self, object: &str) -> Result<PathBuf> {
        let object = self.resolve(object).await?;
        self.export_sample_resolved(&object).await
    }

    async fn export_sample_resolved(&self, object: &str) -> Result<PathBuf> {
        let properties = self.property_names(object).await?;
        let wanted = self.config.batch.sample_size;
        let page_size = self.config.batch.page_size.min(wanted);

        let mut pages = self
            .paginator(object, properties, PageSource::List)
            .page_size(page_size);
        let mut records: Vec<CrmRecord> = Vec::with_capacity(wanted);
        while records.len() < wanted {
            let Some(page) = pages.next_page().await? else {
                break;
            };
            records.extend(page.results);
        }
        records.truncate(wanted);

        let path = self.output_dir()?.join(format!("sample_{object}.csv"));
        write_records_csv(&path, &records)?;
        Ok(path)
    }

    /// Data sample for every object type; one failing object does not stop the rest
    ///
    /// # Errors
    ///
    /// Returns an error if the catalogue cannot be loaded or the run is cancelled.
    pub async fn export_all_samples(&self) -> Result<BulkExport> {
        let catalog = self.catalog().await?;
        let mut export = BulkExport::default();
        for object in catalog.all() {
            match self.export_sample_resolved(object).await {
                Ok(path) => export.written.push(path),
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(err) => {
                    warn!(object, error = %err, "Skipping object");
                    export.failed.push((object.to_string(), err.to_string()));
                }
            }
        }
        Ok(export)
    }

    /// Streams every record matching the filters into chunked files
    /// `<object>_extract_<n>.csv`.
    ///
    /// When the walk stops early (failure or cancellation) the partial chunk
    /// is still written and the cursor to resume from is logged, then the
    /// error is returned.
    ///
    /// # Errors
    ///
    /// - [`EngineError::UnknownObjectType`] for an unknown object
    /// - [`EngineError::SchemaLookup`] if properties cannot be listed
    /// - [`EngineError::Transport`] if a page fails after its retries
    /// - [`EngineError::Cancelled`] if interrupted
    pub async fn extract(
        &self,
        object: &str,
        options: ExtractOptions,
        progress: &mut dyn ProgressReporter,
    ) -> Result<ExtractSummary> {
        let object = self.resolve(object).await?;
        let properties = match options.properties {
            Some(p) if !p.is_empty() => p,
            _ => self.property_names(&object).await?,
        };

        let dir = self.output_dir()?.to_path_buf();
        let mut writer =
            ChunkedCsvWriter::new(dir, format!("{object}_extract"), self.config.batch.chunk_size);
        let mut pages = self.paginator(&object, properties, PageSource::Search(options.filters));
        if let Some(after) = options.start_after {
            pages = pages.start_after(after);
        }

        progress.begin(&format!("Extracting {object}"), None);
        let outcome = loop {
            match pages.next_page().await {
                Ok(Some(page)) => {
                    if let (Some(total), 1) = (page.total, pages.pages_fetched()) {
                        progress.set_total(total);
                    }
                    let count = page.results.len() as u64;
                    for record in page.results {
                        writer.ingest(record)?;
                    }
                    progress.advance(count);
                }
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            }
        };

        let resume_after = pages.last_cursor().map(str::to_string);
        let records = writer.records_written() + writer.pending();
        let files = writer.finalize()?;
        progress.finish(&format!("{records} records in {} file(s)", files.len()));

        match outcome {
            Ok(()) => {
                info!(object = %object, records, files = files.len(), "Extraction complete");
                Ok(ExtractSummary {
                    object,
                    files,
                    records,
                })
            }
            Err(err) => {
                warn!(
                    object = %object,
                    records,
                    resume_after = ?resume_after,
                    error = %err,
                    "Extraction stopped early"
                );
                Err(err)
            }
        }
    }

    /// Extraction of records with no parent association.
    ///
    /// `missing` names the parent property; otherwise the object's default
    /// filter applies.
    ///
    /// # Errors
    ///
    /// As [`Self::extract`]; [`EngineError::UnknownObjectType`] also covers
    /// an object with no default filter when `missing` is not given.
    pub async fn export_orphans(
        &self,
        object: &str,
        missing: Option<&str>,
        mut options: ExtractOptions,
        progress: &mut dyn ProgressReporter,
    ) -> Result<ExtractSummary> {
        let resolved = self.resolve(object).await?;
        let filter = match missing {
            Some(property) => SearchFilter::missing(property),
            None => default_orphan_filter(&resolved).ok_or_else(|| {
                EngineError::UnknownObjectType(format!(
                    "{resolved} (no default parent property; pass one explicitly)"
                ))
            })?,
        };
        options.filters.push(filter);
        self.extract(&resolved, options, progress).await
    }

    /// Reads and validates one input file without deleting anything
    ///
    /// # Errors
    ///
    /// - [`EngineError::InputFormat`] if the file lacks a `Record ID` column
    /// - [`EngineError::UnknownObjectType`] if the file name maps to no known object
    pub async fn plan_delete(&self, path: &Path) -> Result<DeletePlan> {
        let catalog = self.catalog().await?;
        Self::plan_delete_with(&catalog, path)
    }

    fn plan_delete_with(catalog: &ObjectCatalog, path: &Path) -> Result<DeletePlan> {
        let object = objects::object_type_from_filename(path);
        if !catalog.contains(&object) {
            return Err(EngineError::UnknownObjectType(object));
        }
        let ids = objects::read_record_ids(path)?;
        Ok(DeletePlan {
            path: path.to_path_buf(),
            object,
            ids,
        })
    }

    /// Plans every CSV in the input folder; unusable files are reported, not fatal
    ///
    /// # Errors
    ///
    /// Returns an error if the catalogue or the folder cannot be read.
    pub async fn plan_input_dir(&self) -> Result<(Vec<DeletePlan>, Vec<(PathBuf, EngineError)>)> {
        let dir = &self.config.paths.input_dir;
        std::fs::create_dir_all(dir)?;
        let catalog = self.catalog().await?;

        let mut plans = Vec::new();
        let mut rejected = Vec::new();
        for path in objects::find_input_files(dir)? {
            match Self::plan_delete_with(&catalog, &path) {
                Ok(plan) => plans.push(plan),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Skipping input file");
                    rejected.push((path, err));
                }
            }
        }
        Ok((plans, rejected))
    }

    /// Archives every identifier in `plan` in batches, then writes the error
    /// ledger if any batch failed
    ///
    /// # Errors
    ///
    /// Returns an error only if the ledger cannot be written; failed batches
    /// are reported in the summary.
    pub async fn execute_delete(
        &self,
        plan: &DeletePlan,
        progress: &mut dyn ProgressReporter,
    ) -> Result<DeleteSummary> {
        let client = &self.client;
        let object = plan.object.as_str();

        progress.begin(&format!("Archiving {object}"), Some(plan.ids.len() as u64));
        let result = BatchProcessor::new(self.config.batch.batch_size)
            .with_cancel(self.cancel.clone())
            .with_progress(&mut *progress)
            .run(&plan.ids, |batch| async move {
                client.archive_batch(object, &batch).await
            })
            .await;
        progress.finish(&format!(
            "{}/{} archived",
            result.success_count, result.total_count
        ));

        info!(
            object,
            succeeded = result.success_count,
            total = result.total_count,
            failed_batches = result.errors.len(),
            cancelled = result.cancelled,
            "Archive run finished"
        );

        let ledger = write_error_ledger(self.output_dir()?, object, &result.errors)?;
        Ok(DeleteSummary {
            object: plan.object.clone(),
            result,
            ledger,
        })
    }

    /// Plans and executes one input file
    ///
    /// # Errors
    ///
    /// As [`Self::plan_delete`] and [`Self::execute_delete`].
    pub async fn delete_from_file(
        &self,
        path: &Path,
        progress: &mut dyn ProgressReporter,
    ) -> Result<DeleteSummary> {
        let plan = self.plan_delete(path).await?;
        self.execute_delete(&plan, progress).await
    }
}
