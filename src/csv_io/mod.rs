/// CSV upload parsing and export writing
use crate::domain::{ObservationFilter, ObservationRecord, ObservationUpload};
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use tracing::warn;

/// Column order of the bulk upload format
pub const UPLOAD_COLUMNS: [&str; 27] = [
    "satellite_name",
    "norad_cat_id",
    "observation_time_utc",
    "observation_time_uncertainty_sec",
    "apparent_magnitude",
    "apparent_magnitude_uncertainty",
    "observer_latitude_deg",
    "observer_longitude_deg",
    "observer_altitude_m",
    "limiting_magnitude",
    "instrument",
    "observing_mode",
    "observing_filter",
    "observer_email",
    "observer_orcid",
    "satellite_right_ascension_deg",
    "satellite_declination_deg",
    "sigma_2_ra",
    "sigma_ra_sigma_dec",
    "sigma_2_dec",
    "range_to_satellite_km",
    "range_to_satellite_uncertainty_km",
    "range_rate_of_satellite_km_per_sec",
    "range_rate_of_satellite_uncertainty_km_per_sec",
    "comments",
    "data_archive_link",
    "mpc_code",
];

/// Export header: the upload columns minus the email, plus the computed fields
pub const EXPORT_COLUMNS: [&str; 37] = [
    "satellite_name",
    "norad_cat_id",
    "observation_time_utc",
    "observation_time_uncertainty_sec",
    "apparent_magnitude",
    "apparent_magnitude_uncertainty",
    "observer_latitude_deg",
    "observer_longitude_deg",
    "observer_altitude_m",
    "limiting_magnitude",
    "instrument",
    "observing_mode",
    "observing_filter",
    "observer_orcid",
    "satellite_right_ascension_deg",
    "satellite_declination_deg",
    "sigma_2_ra",
    "sigma_ra_sigma_dec",
    "sigma_2_dec",
    "range_to_satellite_km",
    "range_to_satellite_uncertainty_km",
    "range_rate_of_satellite_km_per_sec",
    "range_rate_of_satellite_uncertainty_km_per_sec",
    "comments",
    "data_archive_link",
    "mpc_code",
    "sat_ra_deg_satchecker",
    "sat_dec_deg_satchecker",
    "range_to_sat_km_satchecker",
    "range_rate_sat_km_s_satchecker",
    "ddec_deg_s_satchecker",
    "dra_cosdec_deg_s_satchecker",
    "phase_angle_deg_satchecker",
    "alt_deg_satchecker",
    "az_deg_satchecker",
    "illuminated",
    "international_designator",
];

fn cell(record: &StringRecord, index: usize) -> &str {
    record.get(index).unwrap_or("")
}

fn opt_f64(record: &StringRecord, index: usize) -> Option<f64> {
    cell(record, index)
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn opt_u32(record: &StringRecord, index: usize) -> Option<u32> {
    let raw = cell(record, index);
    raw.parse().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.fract() == 0.0 && *v > 0.0 && *v <= f64::from(u32::MAX))
            .map(|v| v as u32)
    })
}

fn orcids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn upload_from_record(record: &StringRecord) -> ObservationUpload {
    let text = |i| cell(record, i).to_string();
    ObservationUpload {
        satellite_name: text(0),
        norad_cat_id: opt_u32(record, 1),
        observation_time_utc: Some(text(2)).filter(|s| !s.is_empty()),
        observation_time_uncertainty_sec: opt_f64(record, 3),
        apparent_magnitude: opt_f64(record, 4),
        apparent_magnitude_uncertainty: opt_f64(record, 5),
        observer_latitude_deg: opt_f64(record, 6),
        observer_longitude_deg: opt_f64(record, 7),
        observer_altitude_m: opt_f64(record, 8),
        limiting_magnitude: opt_f64(record, 9),
        instrument: text(10),
        observing_mode: text(11),
        observing_filter: text(12),
        observer_email: text(13),
        observer_orcid: orcids(cell(record, 14)),
        satellite_right_ascension_deg: opt_f64(record, 15),
        satellite_declination_deg: opt_f64(record, 16),
        sigma_2_ra: opt_f64(record, 17),
        sigma_ra_sigma_dec: opt_f64(record, 18),
        sigma_2_dec: opt_f64(record, 19),
        range_to_satellite_km: opt_f64(record, 20),
        range_to_satellite_uncertainty_km: opt_f64(record, 21),
        range_rate_of_satellite_km_per_sec: opt_f64(record, 22),
        range_rate_of_satellite_uncertainty_km_per_sec: opt_f64(record, 23),
        comments: text(24),
        data_archive_link: text(25),
        mpc_code: text(26),
    }
}

/// Parse a bulk upload. The first line is a header and is skipped; columns
/// are read by position. Each upload is paired with its 1-based position
/// among the data rows, counting rows that were skipped as blank. A row that
/// cannot be read becomes an empty upload so it is rejected on its own
/// instead of sinking the batch.
pub fn parse_upload(data: &str) -> Vec<(usize, ObservationUpload)> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(data.as_bytes());

    if let Ok(header) = reader.headers() {
        if header.len() < UPLOAD_COLUMNS.len() {
            warn!(
                columns = header.len(),
                expected = UPLOAD_COLUMNS.len(),
                "upload header is short; missing columns read as empty"
            );
        }
    }

    reader
        .records()
        .enumerate()
        .filter_map(|(i, record)| match record {
            Ok(record) if record.iter().all(str::is_empty) => None,
            Ok(record) => Some((i + 1, upload_from_record(&record))),
            Err(err) => {
                warn!(row = i + 1, error = %err, "unreadable upload row");
                Some((i + 1, ObservationUpload::default()))
            }
        })
        .collect()
}

fn float(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

fn boolean(v: Option<bool>) -> String {
    match v {
        Some(true) => "True".to_string(),
        Some(false) => "False".to_string(),
        None => String::new(),
    }
}

fn export_row(r: &ObservationRecord) -> Vec<String> {
    vec![
        r.sat_name.clone(),
        r.sat_number.to_string(),
        r.obs_time_utc.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        float(r.obs_time_uncert_sec),
        float(r.apparent_mag),
        float(r.apparent_mag_uncert),
        r.obs_lat_deg.to_string(),
        r.obs_long_deg.to_string(),
        r.obs_alt_m.to_string(),
        float(r.limiting_magnitude),
        r.instrument.clone(),
        r.obs_mode.clone(),
        r.obs_filter.clone(),
        r.obs_orc_id.join(", "),
        float(r.sat_ra_deg),
        float(r.sat_dec_deg),
        float(r.sigma_2_ra),
        float(r.sigma_ra_sigma_dec),
        float(r.sigma_2_dec),
        float(r.range_to_sat_km),
        float(r.range_to_sat_uncert_km),
        float(r.range_rate_sat_km_s),
        float(r.range_rate_sat_uncert_km_s),
        r.comments.clone(),
        r.data_archive_link.clone(),
        r.mpc_code.clone(),
        float(r.sat_ra_deg_satchecker),
        float(r.sat_dec_deg_satchecker),
        float(r.range_to_sat_km_satchecker),
        float(r.range_rate_sat_km_s_satchecker),
        float(r.ddec_deg_s_satchecker),
        float(r.dra_cosdec_deg_s_satchecker),
        float(r.phase_angle),
        float(r.alt_deg_satchecker),
        float(r.az_deg_satchecker),
        boolean(r.illuminated),
        r.intl_designator.clone().unwrap_or_default(),
    ]
}

/// Write observations as CSV with the export header
pub fn write_export(records: &[ObservationRecord]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(EXPORT_COLUMNS)?;
    for record in records {
        writer.write_record(export_row(record))?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Header of the accepted-id receipt
pub const ID_EXPORT_COLUMNS: [&str; 3] = ["observation_id", "satellite_name", "date_observed"];

pub const ID_EXPORT_FILE_NAME: &str = "satellite_observation_ids.csv";

/// Write the id, satellite and observation time of each record
pub fn write_id_export(records: &[ObservationRecord]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(ID_EXPORT_COLUMNS)?;
    for r in records {
        writer.write_record([
            r.id.to_string(),
            r.sat_name.clone(),
            r.obs_time_utc.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Download name for an export
pub fn export_file_name(filter: &ObservationFilter) -> String {
    match filter.sat_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => {
            let safe: String = name
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
                .collect();
            format!("{}_observations.csv", safe)
        }
        _ if filter.is_empty() => "satellite_observations_all.csv".to_string(),
        _ => "satellite_observations_search_results.csv".to_string(),
    }
}
