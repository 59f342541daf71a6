/// Business logic services layer
use crate::csv_io::{
    export_file_name, parse_upload, write_export, write_id_export, ID_EXPORT_FILE_NAME,
};
use crate::domain::{
    BatchReport, EnrichedObservation, ObservationFilter, ObservationUpload, RowOutcome,
    RowResult, Stats,
};
use crate::errors::{ApiError, ApiResult, StoreError};
use crate::pipeline::Pipeline;
use crate::repo::{NewObservation, ObservationStore};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Validates, enriches and stores a single row
#[derive(Clone)]
struct RowProcessor {
    pipeline: Pipeline,
    store: Arc<dyn ObservationStore>,
}

impl RowProcessor {
    async fn process(&self, row_index: usize, upload: ObservationUpload) -> RowResult {
        let request = upload.request();
        let outcome = match self.pipeline.validate_and_enrich(&request).await {
            Err(reason) => {
                info!(
                    row = row_index,
                    catalog = ?request.catalog_number,
                    reason = reason.code(),
                    "observation rejected"
                );
                RowOutcome::Rejected {
                    reason: reason.code().to_string(),
                    message: reason.to_string(),
                }
            }
            Ok(enriched) => match self.persist(upload, &enriched).await {
                Ok(observation_id) => {
                    info!(row = row_index, observation_id, "observation accepted");
                    RowOutcome::Accepted {
                        observation_id,
                        acceptance: enriched.acceptance,
                        enrichment: enriched.fields,
                    }
                }
                Err(err) => {
                    error!(row = row_index, error = %err, "failed to store observation");
                    RowOutcome::StorageFailed {
                        message: err.to_string(),
                    }
                }
            },
        };

        RowResult {
            row_index,
            satellite_name: request.satellite_name,
            catalog_number: request.catalog_number,
            outcome,
        }
    }

    async fn persist(
        &self,
        upload: ObservationUpload,
        enriched: &EnrichedObservation,
    ) -> Result<i64, StoreError> {
        let obs = &enriched.observation;
        // fall back to the catalog's name when the observer left it blank
        let name = if obs.satellite_name.is_empty() {
            enriched.fields.satellite_name.as_deref().unwrap_or("")
        } else {
            obs.satellite_name.as_str()
        };

        let satellite_id = self
            .store
            .upsert_satellite(
                name,
                obs.catalog_number,
                enriched.fields.intl_designator.as_deref(),
            )
            .await?;
        let location_id = self
            .store
            .upsert_location(obs.latitude_deg, obs.longitude_deg, obs.altitude_m)
            .await?;

        self.store
            .insert_observation(&NewObservation {
                satellite_id,
                location_id,
                observed_at: obs.observed_at,
                upload,
                enrichment: enriched.fields.clone(),
            })
            .await
    }
}

/// Observation ingest, export and lookup service
pub struct ObservationService {
    processor: RowProcessor,
    concurrency: usize,
}

impl ObservationService {
    pub fn new(pipeline: Pipeline, store: Arc<dyn ObservationStore>, concurrency: usize) -> Self {
        Self {
            processor: RowProcessor { pipeline, store },
            concurrency: concurrency.max(1),
        }
    }

    fn store(&self) -> &dyn ObservationStore {
        self.processor.store.as_ref()
    }

    /// Single submission, handled as a one-row batch
    pub async fn submit(&self, upload: ObservationUpload) -> RowResult {
        self.processor.process(1, upload).await
    }

    /// Bulk CSV upload
    pub async fn process_upload(&self, csv_text: &str) -> BatchReport {
        let uploads = parse_upload(csv_text);
        info!(rows = uploads.len(), "processing bulk upload");
        self.process_batch(uploads).await
    }

    /// Run every row to completion. Each upload carries its 1-based row index.
    /// Rows never affect each other and the report is ordered by row index,
    /// whatever order rows finish in.
    pub async fn process_batch(&self, uploads: Vec<(usize, ObservationUpload)>) -> BatchReport {
        let rows = if self.concurrency == 1 {
            let mut rows = Vec::with_capacity(uploads.len());
            for (row_index, upload) in uploads {
                rows.push(self.processor.process(row_index, upload).await);
            }
            rows
        } else {
            self.process_concurrently(uploads).await
        };

        let report = BatchReport::from_rows(rows);
        info!(
            status = ?report.status,
            accepted = report.accepted,
            rejected = report.rejected,
            ids = ?report.accepted_ids(),
            "batch finished"
        );
        report
    }

    async fn process_concurrently(
        &self,
        uploads: Vec<(usize, ObservationUpload)>,
    ) -> Vec<RowResult> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut rows: Vec<RowResult> = uploads
            .iter()
            .map(|(row_index, upload)| RowResult {
                row_index: *row_index,
                satellite_name: upload.satellite_name.trim().to_string(),
                catalog_number: upload.norad_cat_id,
                outcome: RowOutcome::Rejected {
                    reason: "INTERNAL_ERROR".to_string(),
                    message: "row processing was interrupted".to_string(),
                },
            })
            .collect();

        let mut tasks = JoinSet::new();
        for (slot, (row_index, upload)) in uploads.into_iter().enumerate() {
            let processor = self.processor.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                // the semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                (slot, processor.process(row_index, upload).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, row)) => rows[slot] = row,
                Err(err) => error!(error = %err, "batch row task failed"),
            }
        }
        rows
    }

    /// CSV export of the observations matching a filter, with its download name
    pub async fn export(&self, filter: &ObservationFilter) -> ApiResult<(String, Vec<u8>)> {
        let records = self.store().search(filter).await?;
        let bytes = write_export(&records).map_err(|e| ApiError::Internal(e.to_string()))?;
        info!(rows = records.len(), "export written");
        Ok((export_file_name(filter), bytes))
    }

    /// CSV receipt for a list of observation ids, e.g. a batch's accepted rows
    pub async fn export_ids(&self, ids: &[i64]) -> ApiResult<(String, Vec<u8>)> {
        let records = self.store().find_by_ids(ids).await?;
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !records.iter().any(|r| r.id == **id))
            .map(i64::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(ApiError::NotFound(format!(
                "observation ids {}",
                missing.join(", ")
            )));
        }
        let bytes = write_id_export(&records).map_err(|e| ApiError::Internal(e.to_string()))?;
        Ok((ID_EXPORT_FILE_NAME.to_string(), bytes))
    }

    pub async fn stats(&self) -> ApiResult<Stats> {
        Ok(self.store().stats().await?)
    }

    /// Current catalog name for a catalog number, if the service knows one
    pub async fn current_name(&self, catalog_number: u32) -> Option<String> {
        match self
            .processor
            .pipeline
            .source()
            .names_by_catalog_number(catalog_number)
            .await
        {
            Ok(records) => records
                .into_iter()
                .find(|r| r.is_current_version)
                .map(|r| r.name),
            Err(err) => {
                warn!(catalog = catalog_number, error = %err, "name lookup failed");
                None
            }
        }
    }

    /// Current catalog number for a satellite name, if the service knows one
    pub async fn current_catalog_number(&self, name: &str) -> Option<u32> {
        match self
            .processor
            .pipeline
            .source()
            .catalog_numbers_by_name(name)
            .await
        {
            Ok(records) => records
                .into_iter()
                .find(|r| r.is_current_version)
                .and_then(|r| r.catalog_number),
            Err(err) => {
                warn!(name, error = %err, "catalog number lookup failed");
                None
            }
        }
    }
}
