/// Observation validation and enrichment pipeline
pub mod enrichment;
pub mod name_fallback;
pub mod validator;

use crate::clients::{EphemerisQuery, EphemerisSource};
use crate::domain::{
    before_name_check_cutoff, Acceptance, EnrichedObservation, ObservationRequest,
    ValidationOutcome,
};
use crate::errors::RejectionReason;
use crate::utils::julian_date;
use std::sync::Arc;
use tracing::{debug, warn};

/// Validates observations against the ephemeris service and attaches geometry.
#[derive(Clone)]
pub struct Pipeline {
    source: Arc<dyn EphemerisSource>,
}

impl Pipeline {
    pub fn new(source: Arc<dyn EphemerisSource>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &dyn EphemerisSource {
        self.source.as_ref()
    }

    /// Single entry point shared by the single and bulk upload paths.
    ///
    /// Incomplete requests are rejected before any network call. A transport
    /// failure on the ephemeris query is terminal for the observation.
    pub async fn validate_and_enrich(
        &self,
        request: &ObservationRequest,
    ) -> Result<EnrichedObservation, RejectionReason> {
        let query = request.to_query()?;

        let ephemeris = self
            .source
            .query_ephemeris(&EphemerisQuery {
                catalog_number: query.catalog_number,
                latitude_deg: query.latitude_deg,
                longitude_deg: query.longitude_deg,
                elevation_m: query.altitude_m,
                julian_date: julian_date(&query.observed_at),
            })
            .await
            .map_err(|err| {
                warn!(catalog = query.catalog_number, error = %err, "ephemeris query failed");
                RejectionReason::TransportFailure
            })?;

        let mut outcome = validator::classify(&query, &ephemeris);
        debug!(catalog = query.catalog_number, ?outcome, "primary validation");

        // an upstream failure ends the row before any name lookup
        let terminal = matches!(
            outcome,
            ValidationOutcome::Archival
                | ValidationOutcome::Rejected(RejectionReason::TransportFailure)
        );
        if before_name_check_cutoff(&query.observed_at) && !terminal {
            outcome = name_fallback::reconcile(self.source.as_ref(), &query, outcome).await;
        }

        match outcome {
            ValidationOutcome::Archival => {
                let name = if query.satellite_name.is_empty() {
                    ephemeris
                        .records
                        .first()
                        .and_then(|r| r.name.as_deref())
                        .unwrap_or_default()
                } else {
                    query.satellite_name.as_str()
                };
                let fields = enrichment::archival(name);
                Ok(EnrichedObservation {
                    observation: query,
                    acceptance: Acceptance::Archival,
                    fields,
                })
            }
            ValidationOutcome::Valid => {
                let record = ephemeris
                    .records
                    .first()
                    .ok_or(RejectionReason::NotVisible)?;
                Ok(EnrichedObservation {
                    observation: query,
                    acceptance: Acceptance::Validated,
                    fields: enrichment::from_record(record),
                })
            }
            ValidationOutcome::Rejected(reason) => Err(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EphemerisQueryResult, NameLookupRecord};
    use crate::errors::TransportError;
    use crate::fakes::{ephemeris_response, iss_request, StubSatChecker};
    use chrono::{TimeZone, Utc};

    fn pipeline(stub: &Arc<StubSatChecker>) -> Pipeline {
        Pipeline::new(stub.clone())
    }

    #[tokio::test]
    async fn test_iss_end_to_end_valid() {
        let stub = Arc::new(StubSatChecker::default().with_ephemeris(
            25544,
            Ok(ephemeris_response("ISS (ZARYA)", 45.0, "2024-05-31 18:00:00 UTC")),
        ));
        let enriched = pipeline(&stub)
            .validate_and_enrich(&iss_request())
            .await
            .unwrap();

        assert_eq!(enriched.acceptance, Acceptance::Validated);
        assert_eq!(enriched.fields.alt_deg, Some(45.0));
        assert_eq!(enriched.fields.phase_angle_deg, Some(12.3456789));
        assert_eq!(enriched.fields.range_km, Some(812.1234568));
        assert_eq!(enriched.fields.satellite_name.as_deref(), Some("ISS (ZARYA)"));
        assert_eq!(enriched.fields.intl_designator.as_deref(), Some("1998-067A"));
        assert_eq!(stub.ephemeris_calls(), 1);
        // after the cutoff no name lookup happens
        assert_eq!(stub.name_calls(), 0);
    }

    #[tokio::test]
    async fn test_iss_end_to_end_below_horizon() {
        let stub = Arc::new(StubSatChecker::default().with_ephemeris(
            25544,
            Ok(ephemeris_response("ISS (ZARYA)", -10.0, "2024-05-31 18:00:00 UTC")),
        ));
        let result = pipeline(&stub).validate_and_enrich(&iss_request()).await;
        assert_eq!(result, Err(RejectionReason::BelowHorizon));
    }

    #[tokio::test]
    async fn test_incomplete_input_makes_no_calls() {
        let stub = Arc::new(StubSatChecker::default());
        let requests = [
            ObservationRequest {
                catalog_number: None,
                ..iss_request()
            },
            ObservationRequest {
                observed_at: None,
                ..iss_request()
            },
            ObservationRequest {
                latitude_deg: Some(-90.5),
                ..iss_request()
            },
            ObservationRequest {
                longitude_deg: Some(181.0),
                ..iss_request()
            },
        ];
        for request in &requests {
            let result = pipeline(&stub).validate_and_enrich(request).await;
            assert!(matches!(
                result,
                Err(RejectionReason::InputIncomplete { .. })
            ));
        }
        assert_eq!(stub.ephemeris_calls(), 0);
        assert_eq!(stub.name_calls(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_is_terminal() {
        let stub = Arc::new(
            StubSatChecker::default().with_ephemeris(25544, Err(TransportError::Timeout)),
        );
        let request = ObservationRequest {
            observed_at: Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()),
            ..iss_request()
        };
        let result = pipeline(&stub).validate_and_enrich(&request).await;
        assert_eq!(result, Err(RejectionReason::TransportFailure));
        assert_eq!(stub.name_calls(), 0);
    }

    #[tokio::test]
    async fn test_non_200_status_rejected() {
        let stub = Arc::new(StubSatChecker::default().with_ephemeris(
            25544,
            Ok(EphemerisQueryResult {
                status: 500,
                records: Vec::new(),
            }),
        ));
        let result = pipeline(&stub).validate_and_enrich(&iss_request()).await;
        assert_eq!(result, Err(RejectionReason::TransportFailure));
    }

    #[tokio::test]
    async fn test_pre_cutoff_non_200_status_skips_name_lookup() {
        let stub = Arc::new(
            StubSatChecker::default()
                .with_ephemeris(
                    25544,
                    Ok(EphemerisQueryResult {
                        status: 503,
                        records: Vec::new(),
                    }),
                )
                .with_names(25544, Err(TransportError::Timeout)),
        );
        let request = ObservationRequest {
            observed_at: Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()),
            ..iss_request()
        };
        let result = pipeline(&stub).validate_and_enrich(&request).await;
        assert_eq!(result, Err(RejectionReason::TransportFailure));
        assert_eq!(stub.name_calls(), 0);
    }

    #[tokio::test]
    async fn test_archival_skips_fallback_and_geometry() {
        let stub = Arc::new(StubSatChecker::default().with_ephemeris(
            25544,
            Ok(ephemeris_response("RENAMED", -40.0, "2023-03-01 00:00:00 UTC")),
        ));
        let request = ObservationRequest {
            observed_at: Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()),
            ..iss_request()
        };
        let enriched = pipeline(&stub).validate_and_enrich(&request).await.unwrap();
        assert_eq!(enriched.acceptance, Acceptance::Archival);
        assert_eq!(enriched.fields.satellite_name.as_deref(), Some("ISS (ZARYA)"));
        assert_eq!(enriched.fields.range_km, None);
        assert_eq!(stub.name_calls(), 0);
    }

    #[tokio::test]
    async fn test_pre_cutoff_rename_accepted() {
        let stub = Arc::new(
            StubSatChecker::default()
                .with_ephemeris(
                    25544,
                    Ok(ephemeris_response("ISS", 30.0, "2023-01-02 00:00:00 UTC")),
                )
                .with_names(
                    25544,
                    Ok(vec![
                        NameLookupRecord {
                            name: "ISS".to_string(),
                            catalog_number: Some(25544),
                            is_current_version: true,
                        },
                        NameLookupRecord {
                            name: "ISS (ZARYA)".to_string(),
                            catalog_number: Some(25544),
                            is_current_version: false,
                        },
                    ]),
                ),
        );
        let request = ObservationRequest {
            observed_at: Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()),
            ..iss_request()
        };
        let enriched = pipeline(&stub).validate_and_enrich(&request).await.unwrap();
        assert_eq!(enriched.acceptance, Acceptance::Validated);
        assert_eq!(enriched.fields.satellite_name.as_deref(), Some("ISS"));
        assert_eq!(stub.name_calls(), 1);
    }

    #[tokio::test]
    async fn test_pre_cutoff_lookup_failure_rejects_valid_observation() {
        let stub = Arc::new(
            StubSatChecker::default()
                .with_ephemeris(
                    25544,
                    Ok(ephemeris_response("ISS (ZARYA)", 30.0, "2023-01-02 00:00:00 UTC")),
                )
                .with_names(25544, Err(TransportError::Connect("refused".to_string()))),
        );
        let request = ObservationRequest {
            observed_at: Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()),
            ..iss_request()
        };
        let result = pipeline(&stub).validate_and_enrich(&request).await;
        assert_eq!(result, Err(RejectionReason::SatelliteInfoUnavailable));
    }
}
