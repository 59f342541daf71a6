use crate::domain::{EnrichedFields, EphemerisRecord, ENRICHMENT_DECIMALS};
use crate::utils::round_to;

fn rounded(value: Option<f64>) -> Option<f64> {
    Some(round_to(value.unwrap_or(0.0), ENRICHMENT_DECIMALS))
}

/// Geometry for a validated observation. Missing numbers become 0.
pub fn from_record(record: &EphemerisRecord) -> EnrichedFields {
    EnrichedFields {
        phase_angle_deg: rounded(record.phase_angle_deg),
        range_km: rounded(record.range_km),
        range_rate_km_per_sec: rounded(record.range_rate_km_per_sec),
        illuminated: record.illuminated,
        alt_deg: rounded(record.altitude_deg),
        az_deg: rounded(record.azimuth_deg),
        ddec_deg_per_sec: rounded(record.ddec_deg_per_sec),
        dra_cosdec_deg_per_sec: rounded(record.dra_cosdec_deg_per_sec),
        sat_dec_deg: rounded(record.declination_deg),
        sat_ra_deg: rounded(record.right_ascension_deg),
        satellite_name: record.name.clone(),
        intl_designator: record.international_designator.clone(),
    }
}

/// Archival observations carry only a name.
pub fn archival(satellite_name: &str) -> EnrichedFields {
    EnrichedFields {
        satellite_name: Some(satellite_name.to_string()).filter(|s| !s.is_empty()),
        ..EnrichedFields::default()
    }
}
