/// Repository layer for database operations
use crate::domain::{
    EnrichedFields, ObservationFilter, ObservationRecord, ObservationUpload, Stats,
    LATEST_OBSERVATIONS_SHOWN,
};
use crate::errors::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

/// Observation ready to be written, with its resolved foreign keys
#[derive(Debug, Clone, PartialEq)]
pub struct NewObservation {
    pub satellite_id: i64,
    pub location_id: i64,
    pub observed_at: DateTime<Utc>,
    pub upload: ObservationUpload,
    pub enrichment: EnrichedFields,
}

/// Create-or-update contract consumed by the observation service
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Satellites are keyed on (name, catalog number)
    async fn upsert_satellite(
        &self,
        name: &str,
        number: u32,
        intl_designator: Option<&str>,
    ) -> Result<i64, StoreError>;

    /// Locations are keyed on (lat, long, alt)
    async fn upsert_location(&self, lat: f64, lon: f64, alt: f64) -> Result<i64, StoreError>;

    async fn insert_observation(&self, observation: &NewObservation) -> Result<i64, StoreError>;

    async fn search(&self, filter: &ObservationFilter) -> Result<Vec<ObservationRecord>, StoreError>;

    /// Observations with the given ids; unknown ids are absent from the result
    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<ObservationRecord>, StoreError>;

    async fn stats(&self) -> Result<Stats, StoreError>;
}

/// Satellite repository
#[derive(Clone)]
pub struct SatelliteRepo {
    pool: PgPool,
}

impl SatelliteRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert satellite by (name, number), keeping a known designator
    pub async fn upsert(
        &self,
        name: &str,
        number: u32,
        intl_designator: Option<&str>,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO satellites(sat_name, sat_number, intl_designator)
             VALUES($1,$2,$3)
             ON CONFLICT (sat_name, sat_number) DO UPDATE
             SET intl_designator = COALESCE(EXCLUDED.intl_designator, satellites.intl_designator),
                 date_added = now()
             RETURNING id",
        )
        .bind(name)
        .bind(sat_number_column(number)?)
        .bind(intl_designator)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let row = sqlx::query_as::<_, (i64,)>("SELECT count(*) FROM satellites")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

/// Catalog numbers are stored as INTEGER
fn sat_number_column(number: u32) -> Result<i32, StoreError> {
    i32::try_from(number).map_err(|_| {
        StoreError(sqlx::Error::Protocol(format!(
            "catalog number {} does not fit the sat_number column",
            number
        )))
    })
}

/// Observer location repository
#[derive(Clone)]
pub struct LocationRepo {
    pool: PgPool,
}

impl LocationRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, lat: f64, lon: f64, alt: f64) -> Result<i64, StoreError> {
        let row = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO locations(obs_lat_deg, obs_long_deg, obs_alt_m)
             VALUES($1,$2,$3)
             ON CONFLICT (obs_lat_deg, obs_long_deg, obs_alt_m) DO UPDATE
             SET date_added = now()
             RETURNING id",
        )
        .bind(lat)
        .bind(lon)
        .bind(alt)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }
}

const SELECT_OBSERVATIONS: &str = "SELECT o.id, s.sat_name, s.sat_number, s.intl_designator,
        o.obs_time_utc, o.obs_time_uncert_sec, o.apparent_mag, o.apparent_mag_uncert,
        l.obs_lat_deg, l.obs_long_deg, l.obs_alt_m, o.limiting_magnitude,
        o.instrument, o.obs_mode, o.obs_filter, o.obs_orc_id,
        o.sat_ra_deg, o.sat_dec_deg, o.sigma_2_ra, o.sigma_ra_sigma_dec, o.sigma_2_dec,
        o.range_to_sat_km, o.range_to_sat_uncert_km,
        o.range_rate_sat_km_s, o.range_rate_sat_uncert_km_s,
        o.comments, o.data_archive_link, o.mpc_code,
        o.sat_ra_deg_satchecker, o.sat_dec_deg_satchecker,
        o.range_to_sat_km_satchecker, o.range_rate_sat_km_s_satchecker,
        o.ddec_deg_s_satchecker, o.dra_cosdec_deg_s_satchecker,
        o.phase_angle, o.alt_deg_satchecker, o.az_deg_satchecker, o.illuminated
     FROM observations o
     JOIN satellites s ON s.id = o.satellite_id
     JOIN locations l ON l.id = o.location_id
     WHERE TRUE";

/// Observation repository
#[derive(Clone)]
pub struct ObservationRepo {
    pool: PgPool,
}

impl ObservationRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, obs: &NewObservation) -> Result<i64, StoreError> {
        let u = &obs.upload;
        let e = &obs.enrichment;
        let row = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO observations(
                satellite_id, location_id, obs_time_utc, obs_time_uncert_sec,
                apparent_mag, apparent_mag_uncert, limiting_magnitude,
                instrument, obs_mode, obs_filter, obs_email, obs_orc_id,
                sat_ra_deg, sat_dec_deg, sigma_2_ra, sigma_ra_sigma_dec, sigma_2_dec,
                range_to_sat_km, range_to_sat_uncert_km,
                range_rate_sat_km_s, range_rate_sat_uncert_km_s,
                comments, data_archive_link, mpc_code,
                sat_ra_deg_satchecker, sat_dec_deg_satchecker,
                range_to_sat_km_satchecker, range_rate_sat_km_s_satchecker,
                ddec_deg_s_satchecker, dra_cosdec_deg_s_satchecker,
                phase_angle, alt_deg_satchecker, az_deg_satchecker, illuminated)
             VALUES($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,
                    $18,$19,$20,$21,$22,$23,$24,$25,$26,$27,$28,$29,$30,$31,$32,$33,$34)
             RETURNING id",
        )
        .bind(obs.satellite_id)
        .bind(obs.location_id)
        .bind(obs.observed_at)
        .bind(u.observation_time_uncertainty_sec)
        .bind(u.apparent_magnitude)
        .bind(u.apparent_magnitude_uncertainty)
        .bind(u.limiting_magnitude)
        .bind(&u.instrument)
        .bind(&u.observing_mode)
        .bind(&u.observing_filter)
        .bind(&u.observer_email)
        .bind(&u.observer_orcid)
        .bind(u.satellite_right_ascension_deg)
        .bind(u.satellite_declination_deg)
        .bind(u.sigma_2_ra)
        .bind(u.sigma_ra_sigma_dec)
        .bind(u.sigma_2_dec)
        .bind(u.range_to_satellite_km)
        .bind(u.range_to_satellite_uncertainty_km)
        .bind(u.range_rate_of_satellite_km_per_sec)
        .bind(u.range_rate_of_satellite_uncertainty_km_per_sec)
        .bind(&u.comments)
        .bind(&u.data_archive_link)
        .bind(&u.mpc_code)
        .bind(e.sat_ra_deg)
        .bind(e.sat_dec_deg)
        .bind(e.range_km)
        .bind(e.range_rate_km_per_sec)
        .bind(e.ddec_deg_per_sec)
        .bind(e.dra_cosdec_deg_per_sec)
        .bind(e.phase_angle_deg)
        .bind(e.alt_deg)
        .bind(e.az_deg)
        .bind(e.illuminated)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Search observations, newest first
    pub async fn search(
        &self,
        filter: &ObservationFilter,
    ) -> Result<Vec<ObservationRecord>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_OBSERVATIONS);
        if let Some(name) = &filter.sat_name {
            qb.push(" AND lower(s.sat_name) = lower(");
            qb.push_bind(name.clone());
            qb.push(")");
        }
        if let Some(number) = filter.sat_number {
            qb.push(" AND s.sat_number = ");
            qb.push_bind(number);
        }
        if let Some(mode) = &filter.obs_mode {
            qb.push(" AND o.obs_mode ILIKE ");
            qb.push_bind(format!("%{}%", mode));
        }
        if let Some(start) = filter.start_date {
            qb.push(" AND o.obs_time_utc >= ");
            qb.push_bind(start);
        }
        if let Some(end) = filter.end_date {
            qb.push(" AND o.obs_time_utc <= ");
            qb.push_bind(end);
        }
        if let Some(id) = filter.observation_id {
            qb.push(" AND o.id = ");
            qb.push_bind(id);
        }
        if let Some(orcid) = &filter.observer_orcid {
            qb.push(" AND array_to_string(o.obs_orc_id, ',') ILIKE ");
            qb.push_bind(format!("%{}%", orcid));
        }
        qb.push(" ORDER BY o.date_added DESC, o.id DESC");

        let rows = qb
            .build_query_as::<ObservationRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Newest observations first
    pub async fn latest(&self, limit: i64) -> Result<Vec<ObservationRecord>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_OBSERVATIONS);
        qb.push(" ORDER BY o.date_added DESC, o.id DESC LIMIT ");
        qb.push_bind(limit);
        let rows = qb
            .build_query_as::<ObservationRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<ObservationRecord>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_OBSERVATIONS);
        qb.push(" AND o.id = ANY(");
        qb.push_bind(ids.to_vec());
        qb.push(") ORDER BY o.id");
        let rows = qb
            .build_query_as::<ObservationRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Observation count and distinct (location, email) observer count
    pub async fn counts(&self) -> Result<(i64, i64), StoreError> {
        let row = sqlx::query_as::<_, (i64, i64)>(
            "SELECT
                (SELECT count(*) FROM observations),
                (SELECT count(*) FROM (SELECT DISTINCT location_id, obs_email FROM observations) d)",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    satellites: SatelliteRepo,
    locations: LocationRepo,
    observations: ObservationRepo,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            satellites: SatelliteRepo::new(pool.clone()),
            locations: LocationRepo::new(pool.clone()),
            observations: ObservationRepo::new(pool),
        }
    }
}

#[async_trait]
impl ObservationStore for PgStore {
    async fn upsert_satellite(
        &self,
        name: &str,
        number: u32,
        intl_designator: Option<&str>,
    ) -> Result<i64, StoreError> {
        self.satellites.upsert(name, number, intl_designator).await
    }

    async fn upsert_location(&self, lat: f64, lon: f64, alt: f64) -> Result<i64, StoreError> {
        self.locations.upsert(lat, lon, alt).await
    }

    async fn insert_observation(&self, observation: &NewObservation) -> Result<i64, StoreError> {
        self.observations.insert(observation).await
    }

    async fn search(&self, filter: &ObservationFilter) -> Result<Vec<ObservationRecord>, StoreError> {
        self.observations.search(filter).await
    }

    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<ObservationRecord>, StoreError> {
        self.observations.find_by_ids(ids).await
    }

    async fn stats(&self) -> Result<Stats, StoreError> {
        let satellite_count = self.satellites.count().await?;
        let (observation_count, observer_count) = self.observations.counts().await?;
        let latest_observations = self.observations.latest(LATEST_OBSERVATIONS_SHOWN).await?;
        Ok(Stats {
            satellite_count,
            observation_count,
            observer_count,
            latest_observations,
        })
    }
}

/// Initialize database tables
pub async fn init_db(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS satellites(
            id BIGSERIAL PRIMARY KEY,
            sat_name TEXT NOT NULL,
            sat_number INTEGER NOT NULL,
            intl_designator TEXT,
            date_added TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (sat_name, sat_number)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS locations(
            id BIGSERIAL PRIMARY KEY,
            obs_lat_deg DOUBLE PRECISION NOT NULL,
            obs_long_deg DOUBLE PRECISION NOT NULL,
            obs_alt_m DOUBLE PRECISION NOT NULL,
            date_added TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (obs_lat_deg, obs_long_deg, obs_alt_m)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS observations(
            id BIGSERIAL PRIMARY KEY,
            satellite_id BIGINT NOT NULL REFERENCES satellites(id),
            location_id BIGINT NOT NULL REFERENCES locations(id),
            obs_time_utc TIMESTAMPTZ NOT NULL,
            obs_time_uncert_sec DOUBLE PRECISION,
            apparent_mag DOUBLE PRECISION,
            apparent_mag_uncert DOUBLE PRECISION,
            limiting_magnitude DOUBLE PRECISION,
            instrument TEXT NOT NULL DEFAULT '',
            obs_mode TEXT NOT NULL DEFAULT '',
            obs_filter TEXT NOT NULL DEFAULT '',
            obs_email TEXT NOT NULL DEFAULT '',
            obs_orc_id TEXT[] NOT NULL DEFAULT '{}',
            sat_ra_deg DOUBLE PRECISION,
            sat_dec_deg DOUBLE PRECISION,
            sigma_2_ra DOUBLE PRECISION,
            sigma_ra_sigma_dec DOUBLE PRECISION,
            sigma_2_dec DOUBLE PRECISION,
            range_to_sat_km DOUBLE PRECISION,
            range_to_sat_uncert_km DOUBLE PRECISION,
            range_rate_sat_km_s DOUBLE PRECISION,
            range_rate_sat_uncert_km_s DOUBLE PRECISION,
            comments TEXT NOT NULL DEFAULT '',
            data_archive_link TEXT NOT NULL DEFAULT '',
            mpc_code TEXT NOT NULL DEFAULT '',
            sat_ra_deg_satchecker DOUBLE PRECISION,
            sat_dec_deg_satchecker DOUBLE PRECISION,
            range_to_sat_km_satchecker DOUBLE PRECISION,
            range_rate_sat_km_s_satchecker DOUBLE PRECISION,
            ddec_deg_s_satchecker DOUBLE PRECISION,
            dra_cosdec_deg_s_satchecker DOUBLE PRECISION,
            phase_angle DOUBLE PRECISION,
            alt_deg_satchecker DOUBLE PRECISION,
            az_deg_satchecker DOUBLE PRECISION,
            illuminated BOOLEAN,
            date_added TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS ix_observations_time
         ON observations(obs_time_utc DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sat_number_column_rejects_overflow() {
        assert_eq!(sat_number_column(25544).unwrap(), 25544);
        assert!(sat_number_column(i32::MAX as u32).is_ok());
        assert!(sat_number_column(i32::MAX as u32 + 1).is_err());
    }
}
