//! In-memory stand-ins for the ephemeris service and the database.
use crate::clients::{EphemerisQuery, EphemerisSource};
use crate::domain::{
    EphemerisQueryResult, EphemerisRecord, NameLookupRecord, ObservationFilter,
    ObservationRecord, ObservationRequest, PositionQuery, Stats, LATEST_OBSERVATIONS_SHOWN,
};
use crate::errors::{StoreError, TransportError};
use crate::repo::{NewObservation, ObservationStore};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn iss_request() -> ObservationRequest {
    ObservationRequest {
        satellite_name: "ISS (ZARYA)".to_string(),
        catalog_number: Some(25544),
        observed_at: Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()),
        latitude_deg: Some(33.0),
        longitude_deg: Some(-110.0),
        altitude_m: Some(1000.0),
    }
}

pub fn iss_query() -> PositionQuery {
    iss_request().to_query().unwrap()
}

/// A 200 response with one position row in the service's column layout.
pub fn ephemeris_response(name: &str, altitude_deg: f64, tle_epoch: &str) -> EphemerisQueryResult {
    let fields: Vec<String> = [
        "name",
        "catalog_id",
        "julian_date",
        "satellite_gcrs_km",
        "right_ascension_deg",
        "declination_deg",
        "tle_date",
        "dra_cosdec_deg_per_sec",
        "ddec_deg_per_sec",
        "altitude_deg",
        "azimuth_deg",
        "range_km",
        "range_rate_km_per_sec",
        "phase_angle_deg",
        "illuminated",
        "data_source",
        "observer_gcrs_km",
        "international_designator",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let row = vec![
        json!(name),
        json!("25544"),
        json!(2460462.5),
        json!([1.0, 2.0, 3.0]),
        json!(201.98765432109),
        json!(-12.00000001),
        json!(tle_epoch),
        json!(0.0123456789),
        json!(-0.0012345678),
        json!(altitude_deg),
        json!(123.45678901),
        json!(812.12345678),
        json!(-3.2109876543),
        json!(12.3456789123),
        json!(true),
        json!("celestrak"),
        json!([4.0, 5.0, 6.0]),
        json!("1998-067A"),
    ];
    EphemerisQueryResult {
        status: 200,
        records: vec![EphemerisRecord::from_columns(&fields, &row)],
    }
}

/// Scripted ephemeris service. Unscripted catalog numbers answer with a
/// timeout.
#[derive(Default)]
pub struct StubSatChecker {
    ephemeris: HashMap<u32, Result<EphemerisQueryResult, TransportError>>,
    names: HashMap<u32, Result<Vec<NameLookupRecord>, TransportError>>,
    delays: HashMap<u32, Duration>,
    ephemeris_calls: AtomicUsize,
    name_calls: AtomicUsize,
}

impl StubSatChecker {
    pub fn with_ephemeris(
        mut self,
        catalog: u32,
        result: Result<EphemerisQueryResult, TransportError>,
    ) -> Self {
        self.ephemeris.insert(catalog, result);
        self
    }

    pub fn with_names(
        mut self,
        catalog: u32,
        result: Result<Vec<NameLookupRecord>, TransportError>,
    ) -> Self {
        self.names.insert(catalog, result);
        self
    }

    pub fn with_delay(mut self, catalog: u32, delay: Duration) -> Self {
        self.delays.insert(catalog, delay);
        self
    }

    pub fn ephemeris_calls(&self) -> usize {
        self.ephemeris_calls.load(Ordering::SeqCst)
    }

    pub fn name_calls(&self) -> usize {
        self.name_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EphemerisSource for StubSatChecker {
    async fn query_ephemeris(
        &self,
        query: &EphemerisQuery,
    ) -> Result<EphemerisQueryResult, TransportError> {
        self.ephemeris_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(&query.catalog_number) {
            tokio::time::sleep(*delay).await;
        }
        self.ephemeris
            .get(&query.catalog_number)
            .cloned()
            .unwrap_or(Err(TransportError::Timeout))
    }

    async fn names_by_catalog_number(
        &self,
        catalog_number: u32,
    ) -> Result<Vec<NameLookupRecord>, TransportError> {
        self.name_calls.fetch_add(1, Ordering::SeqCst);
        self.names
            .get(&catalog_number)
            .cloned()
            .unwrap_or(Err(TransportError::Timeout))
    }

    async fn catalog_numbers_by_name(
        &self,
        name: &str,
    ) -> Result<Vec<NameLookupRecord>, TransportError> {
        self.name_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .names
            .values()
            .filter_map(|r| r.as_ref().ok())
            .flatten()
            .filter(|r| r.name == name)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct MemoryTables {
    satellites: Vec<(String, u32, Option<String>)>,
    locations: Vec<(f64, f64, f64)>,
    observations: Vec<NewObservation>,
}

/// Store keeping everything in vectors; ids are 1-based positions.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<MemoryTables>,
    failing_names: Vec<String>,
}

impl MemoryStore {
    /// Store whose satellite upserts fail for the given names
    pub fn failing(names: &[&str]) -> Self {
        Self {
            failing_names: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn observation_count(&self) -> usize {
        self.tables.lock().unwrap().observations.len()
    }

    pub fn satellite_count(&self) -> usize {
        self.tables.lock().unwrap().satellites.len()
    }
}

fn records(tables: &MemoryTables) -> Vec<ObservationRecord> {
    tables
        .observations
        .iter()
        .enumerate()
        .map(|(i, obs)| {
            let (sat_name, sat_number, intl) =
                tables.satellites[(obs.satellite_id - 1) as usize].clone();
            let (lat, lon, alt) = tables.locations[(obs.location_id - 1) as usize];
            let u = &obs.upload;
            let e = &obs.enrichment;
            ObservationRecord {
                id: i as i64 + 1,
                sat_name,
                sat_number: sat_number as i32,
                intl_designator: intl,
                obs_time_utc: obs.observed_at,
                obs_time_uncert_sec: u.observation_time_uncertainty_sec,
                apparent_mag: u.apparent_magnitude,
                apparent_mag_uncert: u.apparent_magnitude_uncertainty,
                obs_lat_deg: lat,
                obs_long_deg: lon,
                obs_alt_m: alt,
                limiting_magnitude: u.limiting_magnitude,
                instrument: u.instrument.clone(),
                obs_mode: u.observing_mode.clone(),
                obs_filter: u.observing_filter.clone(),
                obs_orc_id: u.observer_orcid.clone(),
                sat_ra_deg: u.satellite_right_ascension_deg,
                sat_dec_deg: u.satellite_declination_deg,
                sigma_2_ra: u.sigma_2_ra,
                sigma_ra_sigma_dec: u.sigma_ra_sigma_dec,
                sigma_2_dec: u.sigma_2_dec,
                range_to_sat_km: u.range_to_satellite_km,
                range_to_sat_uncert_km: u.range_to_satellite_uncertainty_km,
                range_rate_sat_km_s: u.range_rate_of_satellite_km_per_sec,
                range_rate_sat_uncert_km_s: u.range_rate_of_satellite_uncertainty_km_per_sec,
                comments: u.comments.clone(),
                data_archive_link: u.data_archive_link.clone(),
                mpc_code: u.mpc_code.clone(),
                sat_ra_deg_satchecker: e.sat_ra_deg,
                sat_dec_deg_satchecker: e.sat_dec_deg,
                range_to_sat_km_satchecker: e.range_km,
                range_rate_sat_km_s_satchecker: e.range_rate_km_per_sec,
                ddec_deg_s_satchecker: e.ddec_deg_per_sec,
                dra_cosdec_deg_s_satchecker: e.dra_cosdec_deg_per_sec,
                phase_angle: e.phase_angle_deg,
                alt_deg_satchecker: e.alt_deg,
                az_deg_satchecker: e.az_deg,
                illuminated: e.illuminated,
            }
        })
        .collect()
}

#[async_trait]
impl ObservationStore for MemoryStore {
    async fn upsert_satellite(
        &self,
        name: &str,
        number: u32,
        intl_designator: Option<&str>,
    ) -> Result<i64, StoreError> {
        if self.failing_names.iter().any(|n| n == name) {
            return Err(StoreError(sqlx::Error::PoolClosed));
        }
        let mut tables = self.tables.lock().unwrap();
        if let Some(pos) = tables
            .satellites
            .iter()
            .position(|(n, num, _)| n == name && *num == number)
        {
            if intl_designator.is_some() {
                tables.satellites[pos].2 = intl_designator.map(str::to_string);
            }
            return Ok(pos as i64 + 1);
        }
        tables
            .satellites
            .push((name.to_string(), number, intl_designator.map(str::to_string)));
        Ok(tables.satellites.len() as i64)
    }

    async fn upsert_location(&self, lat: f64, lon: f64, alt: f64) -> Result<i64, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(pos) = tables.locations.iter().position(|l| *l == (lat, lon, alt)) {
            return Ok(pos as i64 + 1);
        }
        tables.locations.push((lat, lon, alt));
        Ok(tables.locations.len() as i64)
    }

    async fn insert_observation(&self, observation: &NewObservation) -> Result<i64, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        tables.observations.push(observation.clone());
        Ok(tables.observations.len() as i64)
    }

    async fn search(&self, filter: &ObservationFilter) -> Result<Vec<ObservationRecord>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let records = records(&tables)
            .into_iter()
            .filter(|r| {
                filter
                    .sat_name
                    .as_ref()
                    .map_or(true, |n| r.sat_name.eq_ignore_ascii_case(n))
                    && filter.sat_number.map_or(true, |n| r.sat_number == n)
                    && filter.observation_id.map_or(true, |id| r.id == id)
            })
            .collect();
        Ok(records)
    }

    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<ObservationRecord>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(records(&tables)
            .into_iter()
            .filter(|r| ids.contains(&r.id))
            .collect())
    }

    async fn stats(&self) -> Result<Stats, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut observers: Vec<(i64, &str)> = tables
            .observations
            .iter()
            .map(|o| (o.location_id, o.upload.observer_email.as_str()))
            .collect();
        observers.sort();
        observers.dedup();
        let mut latest = records(&tables);
        latest.reverse();
        latest.truncate(LATEST_OBSERVATIONS_SHOWN as usize);
        Ok(Stats {
            satellite_count: tables.satellites.len() as i64,
            observation_count: tables.observations.len() as i64,
            observer_count: observers.len() as i64,
            latest_observations: latest,
        })
    }
}
