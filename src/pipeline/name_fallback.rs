use crate::clients::EphemerisSource;
use crate::domain::{PositionQuery, ValidationOutcome};
use crate::errors::RejectionReason;
use tracing::{info, warn};

/// Second opinion for observations older than the name-check cutoff.
///
/// Catalog names drift over time, so a name that no longer matches the
/// current catalog entry may still have been correct when observed. A name
/// mismatch is lifted when any historical record for the catalog number
/// carries the submitted name; other outcomes pass through unchanged. Without
/// historical records nothing can be confirmed and the observation is
/// rejected.
pub async fn reconcile(
    source: &dyn EphemerisSource,
    query: &PositionQuery,
    outcome: ValidationOutcome,
) -> ValidationOutcome {
    let records = match source.names_by_catalog_number(query.catalog_number).await {
        Ok(records) if !records.is_empty() => records,
        Ok(_) => {
            warn!(catalog = query.catalog_number, "no name records for catalog number");
            return ValidationOutcome::Rejected(RejectionReason::SatelliteInfoUnavailable);
        }
        Err(err) => {
            warn!(catalog = query.catalog_number, error = %err, "name lookup failed");
            return ValidationOutcome::Rejected(RejectionReason::SatelliteInfoUnavailable);
        }
    };

    let known_name = !query.satellite_name.is_empty()
        && records.iter().any(|r| r.name == query.satellite_name);

    match outcome {
        ValidationOutcome::Rejected(RejectionReason::NameMismatch) if known_name => {
            info!(
                catalog = query.catalog_number,
                name = %query.satellite_name,
                "historical name accepted"
            );
            ValidationOutcome::Valid
        }
        other => other,
    }
}
