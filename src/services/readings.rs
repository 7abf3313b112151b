//! Read interface: masked readings for one device over a time window.

use crate::db::models::{LegacyReading, SensorReading};
use crate::error::AccessError;
use crate::models::access::Entitlement;
use crate::policy::{MaskedLegacyReading, MaskedReading, mask_legacy_reading, mask_reading};
use crate::schema;
use crate::services::devices::find_device;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use log::debug;
use std::num::NonZeroU32;

/// Half-open window `[from, to)`, newest rows first.
#[derive(Debug, Clone)]
pub struct ReadingQuery {
    pub device_public_id: String,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<NonZeroU32>,
}

impl ReadingQuery {
    pub fn for_device(public_id: impl Into<String>) -> Self {
        ReadingQuery {
            device_public_id: public_id.into(),
            from: None,
            to: None,
            limit: None,
        }
    }

    fn validate(&self) -> Result<(), AccessError> {
        if let (Some(from), Some(to)) = (self.from, self.to)
            && from >= to
        {
            return Err(AccessError::malformed(format!(
                "time range start {} is not before end {}",
                from, to
            )));
        }
        Ok(())
    }

    /// Requested limit, never above `max`.
    pub fn effective_limit(&self, max: NonZeroU32) -> i64 {
        let requested = self.limit.unwrap_or(max).min(max);
        i64::from(requested.get())
    }
}

pub fn masked_readings(
    conn: &mut PgConnection,
    ent: &Entitlement,
    query: &ReadingQuery,
    max_limit: NonZeroU32,
) -> Result<Vec<MaskedReading>, AccessError> {
    use schema::sensor_readings::dsl as S;

    query.validate()?;
    let device = find_device(conn, ent, &query.device_public_id)?;

    let mut q = S::sensor_readings
        .filter(S::device_id.eq(device.id))
        .select(SensorReading::as_select())
        .order((S::time.desc(), S::id.desc()))
        .limit(query.effective_limit(max_limit))
        .into_boxed();
    if let Some(from) = query.from {
        q = q.filter(S::time.ge(from));
    }
    if let Some(to) = query.to {
        q = q.filter(S::time.lt(to));
    }
    let rows: Vec<SensorReading> = q.load(conn)?;

    debug!(
        "Readings: {} read {} row(s) from {}",
        ent.caller,
        rows.len(),
        device.public_id
    );
    Ok(rows.iter().map(|r| mask_reading(r, ent)).collect())
}

pub fn legacy_readings(
    conn: &mut PgConnection,
    ent: &Entitlement,
    query: &ReadingQuery,
    max_limit: NonZeroU32,
) -> Result<Vec<MaskedLegacyReading>, AccessError> {
    use schema::legacy_readings::dsl as L;

    query.validate()?;
    let device = find_device(conn, ent, &query.device_public_id)?;

    let mut q = L::legacy_readings
        .filter(L::device_id.eq(device.id))
        .select(LegacyReading::as_select())
        .order((L::time.desc(), L::id.desc()))
        .limit(query.effective_limit(max_limit))
        .into_boxed();
    if let Some(from) = query.from {
        q = q.filter(L::time.ge(from));
    }
    if let Some(to) = query.to {
        q = q.filter(L::time.lt(to));
    }
    let rows: Vec<LegacyReading> = q.load(conn)?;

    Ok(rows.iter().map(|r| mask_legacy_reading(r, ent)).collect())
}
