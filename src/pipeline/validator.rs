use crate::domain::{
    EphemerisQueryResult, PositionQuery, ValidationOutcome, ARCHIVAL_WINDOW_DAYS,
    MIN_ALTITUDE_DEG,
};
use crate::errors::RejectionReason;
use crate::utils::{days_between, parse_tle_epoch};
use tracing::warn;

/// Classify an observation against the ephemeris returned for it.
///
/// Only the first position record is considered. An archival match wins over
/// every later check.
pub fn classify(query: &PositionQuery, result: &EphemerisQueryResult) -> ValidationOutcome {
    if result.status != 200 {
        return ValidationOutcome::Rejected(RejectionReason::TransportFailure);
    }

    let Some(record) = result.records.first() else {
        return ValidationOutcome::Rejected(RejectionReason::NotVisible);
    };

    match record.tle_epoch.as_deref().map(|raw| (raw, parse_tle_epoch(raw))) {
        Some((_, Some(epoch))) => {
            if days_between(&query.observed_at, &epoch) > ARCHIVAL_WINDOW_DAYS {
                return ValidationOutcome::Archival;
            }
        }
        Some((raw, None)) => {
            warn!(catalog = query.catalog_number, epoch = raw, "unparseable TLE epoch");
        }
        None => {
            warn!(catalog = query.catalog_number, "ephemeris record has no TLE epoch");
        }
    }

    if !query.satellite_name.is_empty()
        && record.name.as_deref() != Some(query.satellite_name.as_str())
    {
        return ValidationOutcome::Rejected(RejectionReason::NameMismatch);
    }

    match record.altitude_deg {
        Some(alt) if alt < MIN_ALTITUDE_DEG => {
            ValidationOutcome::Rejected(RejectionReason::BelowHorizon)
        }
        Some(_) => ValidationOutcome::Valid,
        None => ValidationOutcome::Rejected(RejectionReason::NotVisible),
    }
}
