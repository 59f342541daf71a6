/// Domain models for the application
use crate::errors::RejectionReason;
use crate::utils::{flag, num, parse_observation_time, text};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Observations made before this instant (2024-05-01T00:00:00Z) get a second
/// name check against the historical catalog.
pub const NAME_CHECK_CUTOFF_UNIX: i64 = 1_714_521_600;

/// TLE epochs newer than the observation by more than this are archival.
pub const ARCHIVAL_WINDOW_DAYS: f64 = 14.0;

/// Lowest accepted topocentric altitude, allowing for refraction near the horizon.
pub const MIN_ALTITUDE_DEG: f64 = -5.0;

/// Decimal places kept for every enriched numeric field.
pub const ENRICHMENT_DECIMALS: i32 = 7;

pub fn before_name_check_cutoff(at: &DateTime<Utc>) -> bool {
    at.timestamp() < NAME_CHECK_CUTOFF_UNIX
}

/// Raw observation as handed to the pipeline. Fields may be absent when the
/// ingestion layer could not parse them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ObservationRequest {
    pub satellite_name: String,
    pub catalog_number: Option<u32>,
    pub observed_at: Option<DateTime<Utc>>,
    pub latitude_deg: Option<f64>,
    pub longitude_deg: Option<f64>,
    pub altitude_m: Option<f64>,
}

/// An observation that passed the completeness check, ready for the ephemeris query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionQuery {
    pub satellite_name: String,
    pub catalog_number: u32,
    pub observed_at: DateTime<Utc>,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_m: f64,
}

impl ObservationRequest {
    /// Names of fields that are missing or out of range
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        // stored as a signed 32-bit column
        if !matches!(self.catalog_number, Some(n) if n > 0 && n <= i32::MAX as u32) {
            missing.push("sat_number");
        }
        if self.observed_at.is_none() {
            missing.push("observation_time");
        }
        if !in_range(self.latitude_deg, 90.0) {
            missing.push("latitude");
        }
        if !in_range(self.longitude_deg, 180.0) {
            missing.push("longitude");
        }
        if !matches!(self.altitude_m, Some(a) if a.is_finite()) {
            missing.push("altitude");
        }
        missing
    }

    pub fn to_query(&self) -> Result<PositionQuery, RejectionReason> {
        match (
            self.catalog_number,
            self.observed_at,
            self.latitude_deg,
            self.longitude_deg,
            self.altitude_m,
        ) {
            (Some(catalog_number), Some(observed_at), Some(lat), Some(lon), Some(alt))
                if self.missing_fields().is_empty() =>
            {
                Ok(PositionQuery {
                    satellite_name: self.satellite_name.clone(),
                    catalog_number,
                    observed_at,
                    latitude_deg: lat,
                    longitude_deg: lon,
                    altitude_m: alt,
                })
            }
            _ => Err(RejectionReason::InputIncomplete {
                fields: self.missing_fields(),
            }),
        }
    }
}

fn in_range(value: Option<f64>, bound: f64) -> bool {
    matches!(value, Some(v) if v.is_finite() && (-bound..=bound).contains(&v))
}

/// One position row of an ephemeris response, decoded by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EphemerisRecord {
    pub name: Option<String>,
    pub catalog_id: Option<String>,
    pub tle_epoch: Option<String>,
    pub phase_angle_deg: Option<f64>,
    pub range_km: Option<f64>,
    pub range_rate_km_per_sec: Option<f64>,
    pub illuminated: Option<bool>,
    pub altitude_deg: Option<f64>,
    pub azimuth_deg: Option<f64>,
    pub ddec_deg_per_sec: Option<f64>,
    pub dra_cosdec_deg_per_sec: Option<f64>,
    pub declination_deg: Option<f64>,
    pub right_ascension_deg: Option<f64>,
    pub international_designator: Option<String>,
}

impl EphemerisRecord {
    /// Build a record from the parallel `fields` / row arrays. Unknown fields
    /// are ignored and the order of columns does not matter.
    pub fn from_columns(fields: &[String], row: &[Value]) -> Self {
        let by_name: HashMap<&str, &Value> = fields
            .iter()
            .map(String::as_str)
            .zip(row.iter())
            .collect();
        let get = |key: &str| by_name.get(key).copied().unwrap_or(&Value::Null);

        Self {
            name: text(get("name")),
            catalog_id: text(get("catalog_id")),
            // older service versions reported the epoch as `tle_date`
            tle_epoch: text(get("tle_epoch")).or_else(|| text(get("tle_date"))),
            phase_angle_deg: num(get("phase_angle_deg")),
            range_km: num(get("range_km")),
            range_rate_km_per_sec: num(get("range_rate_km_per_sec")),
            illuminated: flag(get("illuminated")),
            altitude_deg: num(get("altitude_deg")),
            azimuth_deg: num(get("azimuth_deg")),
            ddec_deg_per_sec: num(get("ddec_deg_per_sec")),
            dra_cosdec_deg_per_sec: num(get("dra_cosdec_deg_per_sec")),
            declination_deg: num(get("declination_deg")),
            right_ascension_deg: num(get("right_ascension_deg")),
            international_designator: text(get("international_designator")),
        }
    }
}

/// Decoded ephemeris response with the upstream status code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EphemerisQueryResult {
    pub status: u16,
    pub records: Vec<EphemerisRecord>,
}

/// Classification of an observation against its ephemeris.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    /// TLE data is too new to say anything about the observation time;
    /// name and horizon checks were skipped.
    Archival,
    Rejected(RejectionReason),
}

/// Geometry attached to an accepted observation. Numeric fields are `None`
/// only for archival observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedFields {
    pub phase_angle_deg: Option<f64>,
    pub range_km: Option<f64>,
    pub range_rate_km_per_sec: Option<f64>,
    pub illuminated: Option<bool>,
    pub alt_deg: Option<f64>,
    pub az_deg: Option<f64>,
    pub ddec_deg_per_sec: Option<f64>,
    pub dra_cosdec_deg_per_sec: Option<f64>,
    pub sat_dec_deg: Option<f64>,
    pub sat_ra_deg: Option<f64>,
    pub satellite_name: Option<String>,
    pub intl_designator: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Acceptance {
    Validated,
    Archival,
}

/// Pipeline result for an accepted observation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedObservation {
    pub observation: PositionQuery,
    pub acceptance: Acceptance,
    pub fields: EnrichedFields,
}

/// Historical catalog entry returned by the name lookup tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameLookupRecord {
    #[serde(default)]
    pub name: String,
    #[serde(
        default,
        rename = "norad_id",
        deserialize_with = "lenient_catalog_number"
    )]
    pub catalog_number: Option<u32>,
    #[serde(default)]
    pub is_current_version: bool,
}

fn lenient_catalog_number<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(num(&value)
        .filter(|n| n.fract() == 0.0 && *n > 0.0 && *n <= f64::from(u32::MAX))
        .map(|n| n as u32))
}

/// Full observation as uploaded, one CSV row or one JSON body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationUpload {
    pub satellite_name: String,
    pub norad_cat_id: Option<u32>,
    pub observation_time_utc: Option<String>,
    pub observation_time_uncertainty_sec: Option<f64>,
    pub apparent_magnitude: Option<f64>,
    pub apparent_magnitude_uncertainty: Option<f64>,
    pub observer_latitude_deg: Option<f64>,
    pub observer_longitude_deg: Option<f64>,
    pub observer_altitude_m: Option<f64>,
    pub limiting_magnitude: Option<f64>,
    pub instrument: String,
    pub observing_mode: String,
    pub observing_filter: String,
    pub observer_email: String,
    pub observer_orcid: Vec<String>,
    pub satellite_right_ascension_deg: Option<f64>,
    pub satellite_declination_deg: Option<f64>,
    pub sigma_2_ra: Option<f64>,
    pub sigma_ra_sigma_dec: Option<f64>,
    pub sigma_2_dec: Option<f64>,
    pub range_to_satellite_km: Option<f64>,
    pub range_to_satellite_uncertainty_km: Option<f64>,
    pub range_rate_of_satellite_km_per_sec: Option<f64>,
    pub range_rate_of_satellite_uncertainty_km_per_sec: Option<f64>,
    pub comments: String,
    pub data_archive_link: String,
    pub mpc_code: String,
}

impl ObservationUpload {
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        self.observation_time_utc
            .as_deref()
            .and_then(parse_observation_time)
    }

    pub fn request(&self) -> ObservationRequest {
        ObservationRequest {
            satellite_name: self.satellite_name.trim().to_string(),
            catalog_number: self.norad_cat_id,
            observed_at: self.observed_at(),
            latitude_deg: self.observer_latitude_deg,
            longitude_deg: self.observer_longitude_deg,
            altitude_m: self.observer_altitude_m,
        }
    }
}

/// Stored observation joined with its satellite and location, as exported.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ObservationRecord {
    pub id: i64,
    pub sat_name: String,
    pub sat_number: i32,
    pub intl_designator: Option<String>,
    pub obs_time_utc: DateTime<Utc>,
    pub obs_time_uncert_sec: Option<f64>,
    pub apparent_mag: Option<f64>,
    pub apparent_mag_uncert: Option<f64>,
    pub obs_lat_deg: f64,
    pub obs_long_deg: f64,
    pub obs_alt_m: f64,
    pub limiting_magnitude: Option<f64>,
    pub instrument: String,
    pub obs_mode: String,
    pub obs_filter: String,
    pub obs_orc_id: Vec<String>,
    pub sat_ra_deg: Option<f64>,
    pub sat_dec_deg: Option<f64>,
    pub sigma_2_ra: Option<f64>,
    pub sigma_ra_sigma_dec: Option<f64>,
    pub sigma_2_dec: Option<f64>,
    pub range_to_sat_km: Option<f64>,
    pub range_to_sat_uncert_km: Option<f64>,
    pub range_rate_sat_km_s: Option<f64>,
    pub range_rate_sat_uncert_km_s: Option<f64>,
    pub comments: String,
    pub data_archive_link: String,
    pub mpc_code: String,
    pub sat_ra_deg_satchecker: Option<f64>,
    pub sat_dec_deg_satchecker: Option<f64>,
    pub range_to_sat_km_satchecker: Option<f64>,
    pub range_rate_sat_km_s_satchecker: Option<f64>,
    pub ddec_deg_s_satchecker: Option<f64>,
    pub dra_cosdec_deg_s_satchecker: Option<f64>,
    pub phase_angle: Option<f64>,
    pub alt_deg_satchecker: Option<f64>,
    pub az_deg_satchecker: Option<f64>,
    pub illuminated: Option<bool>,
}

/// Search criteria for stored observations
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ObservationFilter {
    pub sat_name: Option<String>,
    pub sat_number: Option<i32>,
    pub obs_mode: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub observation_id: Option<i64>,
    pub observer_orcid: Option<String>,
}

impl ObservationFilter {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Number of recent observations listed with the statistics
pub const LATEST_OBSERVATIONS_SHOWN: i64 = 7;

/// Counts shown on the landing page, with the newest observations
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub satellite_count: i64,
    pub observation_count: i64,
    /// Distinct (location, email) pairs
    pub observer_count: i64,
    pub latest_observations: Vec<ObservationRecord>,
}

/// Per-row result of a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RowOutcome {
    Accepted {
        observation_id: i64,
        acceptance: Acceptance,
        enrichment: EnrichedFields,
    },
    Rejected {
        reason: String,
        message: String,
    },
    /// Row validated but could not be stored
    StorageFailed { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowResult {
    /// 1-based position of the row in the submitted batch
    pub row_index: usize,
    pub satellite_name: String,
    pub catalog_number: Option<u32>,
    #[serde(flatten)]
    pub outcome: RowOutcome,
}

impl RowResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self.outcome, RowOutcome::Accepted { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Success,
    PartialSuccess,
    Failure,
}

/// Result manifest of a batch upload, ordered by row index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub status: BatchStatus,
    pub accepted: usize,
    pub rejected: usize,
    pub rows: Vec<RowResult>,
}

impl BatchReport {
    pub fn from_rows(mut rows: Vec<RowResult>) -> Self {
        rows.sort_by_key(|r| r.row_index);
        let accepted = rows.iter().filter(|r| r.is_accepted()).count();
        let rejected = rows.len() - accepted;
        let status = match (accepted, rejected) {
            (0, _) => BatchStatus::Failure,
            (_, 0) => BatchStatus::Success,
            _ => BatchStatus::PartialSuccess,
        };
        Self {
            status,
            accepted,
            rejected,
            rows,
        }
    }

    pub fn accepted_ids(&self) -> Vec<i64> {
        self.rows
            .iter()
            .filter_map(|r| match r.outcome {
                RowOutcome::Accepted { observation_id, .. } => Some(observation_id),
                _ => None,
            })
            .collect()
    }
}

/// Health check response
#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub now: DateTime<Utc>,
}
