use crate::db::models::{NewLegacyReading, NewSensorReading};
use crate::error::AccessError;
use crate::models::access::Entitlement;
use crate::models::measurements::Measurements;
use crate::schema;
use crate::services::devices::find_device;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use log::debug;
use serde::Deserialize;
use serde_json::{Map, Value};

pub fn insert_sensor_readings(conn: &mut PgConnection, rows: &[NewSensorReading]) -> Result<usize, AccessError> {
    if rows.is_empty() {
        return Ok(0);
    }

    use schema::sensor_readings::dsl as S;

    let count = diesel::insert_into(S::sensor_readings).values(rows).execute(conn)?;
    Ok(count)
}

pub fn insert_legacy_readings(conn: &mut PgConnection, rows: &[NewLegacyReading]) -> Result<usize, AccessError> {
    if rows.is_empty() {
        return Ok(0);
    }

    use schema::legacy_readings::dsl as L;

    let count = diesel::insert_into(L::legacy_readings).values(rows).execute(conn)?;
    Ok(count)
}

/// Append one reading to a device the actor owns (or any device, for admins).
pub fn append_reading(
    conn: &mut PgConnection,
    actor: &Entitlement,
    device_public_id: &str,
    time: DateTime<Utc>,
    values: Measurements,
) -> Result<usize, AccessError> {
    let device = find_device(conn, actor, device_public_id)?;
    let row = NewSensorReading::new(device.id, time, values);
    let count = insert_sensor_readings(conn, std::slice::from_ref(&row))?;
    debug!(
        "Ingest: {} appended reading for {} at {} (fields={})",
        actor.caller,
        device.public_id,
        time,
        row.values.present_fields().join(",")
    );
    Ok(count)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct LegacyValues {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub dew_point: Option<f64>,
}

/// One JSON line of `ingest` input: a timestamp plus any measurement fields.
/// Keys that name no column end up in `unknown` and reject the line.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadingLine {
    pub time: DateTime<Utc>,
    #[serde(flatten)]
    pub values: Measurements,
    #[serde(flatten)]
    pub unknown: Map<String, Value>,
}

impl ReadingLine {
    pub fn checked(self) -> Result<(DateTime<Utc>, Measurements), AccessError> {
        reject_unknown(&self.unknown)?;
        Ok((self.time, self.values))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyLine {
    pub time: DateTime<Utc>,
    #[serde(flatten)]
    pub values: LegacyValues,
    #[serde(flatten)]
    pub unknown: Map<String, Value>,
}

impl LegacyLine {
    pub fn checked(self) -> Result<(DateTime<Utc>, LegacyValues), AccessError> {
        reject_unknown(&self.unknown)?;
        Ok((self.time, self.values))
    }
}

fn reject_unknown(unknown: &Map<String, Value>) -> Result<(), AccessError> {
    if unknown.is_empty() {
        return Ok(());
    }
    let names = unknown.keys().map(String::as_str).collect::<Vec<_>>().join(", ");
    Err(AccessError::malformed(format!("unknown field(s): {}", names)))
}

pub fn append_legacy_reading(
    conn: &mut PgConnection,
    actor: &Entitlement,
    device_public_id: &str,
    time: DateTime<Utc>,
    values: LegacyValues,
) -> Result<usize, AccessError> {
    let device = find_device(conn, actor, device_public_id)?;
    let row = NewLegacyReading {
        device_id: device.id,
        time,
        temperature: values.temperature,
        humidity: values.humidity,
        pressure: values.pressure,
        dew_point: values.dew_point,
    };
    let count = insert_legacy_readings(conn, std::slice::from_ref(&row))?;
    debug!(
        "Ingest: {} appended legacy reading for {} at {}",
        actor.caller, device.public_id, time
    );
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing;
    use crate::models::access::Tier;
    use crate::services::entitlements;
    use chrono::TimeZone;

    #[test]
    fn parses_ingest_lines() {
        let line: ReadingLine =
            serde_json::from_str(r#"{"time":"2024-06-01T12:00:00Z","temperature":21.5,"shock_detected":true}"#).unwrap();
        assert_eq!(line.time, Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        assert_eq!(line.values.present_fields(), ["temperature", "shock_detected"]);

        let legacy: LegacyLine = serde_json::from_str(r#"{"time":"2019-01-01T00:00:00Z","dew_point":4.5}"#).unwrap();
        assert_eq!(legacy.values.dew_point, Some(4.5));
        assert_eq!(legacy.values.temperature, None);

        assert!(serde_json::from_str::<ReadingLine>(r#"{"temperature":1.0}"#).is_err());
    }

    #[test]
    fn misspelled_fields_reject_the_line() {
        let line: ReadingLine =
            serde_json::from_str(r#"{"time":"2024-06-01T12:00:00Z","temperature":21.5,"battery_volt":3.7}"#).unwrap();
        let err = line.checked().unwrap_err();
        assert!(matches!(&err, AccessError::MalformedInput(m) if m.contains("battery_volt")));

        let legacy: LegacyLine = serde_json::from_str(r#"{"time":"2019-01-01T00:00:00Z","dewpoint":4.5}"#).unwrap();
        assert!(matches!(legacy.checked(), Err(AccessError::MalformedInput(_))));

        let clean: ReadingLine =
            serde_json::from_str(r#"{"time":"2024-06-01T12:00:00Z","battery_voltage":3.7}"#).unwrap();
        let (_, values) = clean.checked().unwrap();
        assert_eq!(values.battery_voltage, Some(3.7));
    }

    #[test]
    fn empty_batches_skip_the_database() {
        let Some(mut conn) = testing::test_connection() else { return };
        assert_eq!(insert_sensor_readings(&mut conn, &[]).unwrap(), 0);
        assert_eq!(insert_legacy_readings(&mut conn, &[]).unwrap(), 0);
    }

    #[test]
    fn owner_appends_and_stranger_is_denied() {
        let Some(mut conn) = testing::test_connection() else { return };
        let owner = testing::profile(&mut conn, Tier::Free, false);
        let stranger = testing::profile(&mut conn, Tier::Premium, false);
        testing::device(&mut conn, owner.caller(), "air-ingest");
        let owner_ent = entitlements::resolve(&mut conn, owner.caller()).unwrap();
        let stranger_ent = entitlements::resolve(&mut conn, stranger.caller()).unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        let values = Measurements {
            temperature: Some(21.5),
            ..Default::default()
        };
        assert_eq!(append_reading(&mut conn, &owner_ent, "air-ingest", ts, values.clone()).unwrap(), 1);
        assert!(matches!(
            append_reading(&mut conn, &stranger_ent, "air-ingest", ts, values),
            Err(AccessError::AccessDenied(_))
        ));

        let legacy = LegacyValues {
            temperature: Some(18.0),
            ..Default::default()
        };
        assert_eq!(append_legacy_reading(&mut conn, &owner_ent, "air-ingest", ts, legacy).unwrap(), 1);
    }

    #[test]
    fn readings_cannot_be_updated() {
        use schema::sensor_readings::dsl as S;

        let Some(mut conn) = testing::test_connection() else { return };
        let owner = testing::profile(&mut conn, Tier::Free, false);
        let device = testing::device(&mut conn, owner.caller(), "air-immutable");
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        insert_sensor_readings(&mut conn, &[NewSensorReading::new(device.id, ts, Measurements::default())]).unwrap();

        let result = conn.transaction(|conn| {
            diesel::update(S::sensor_readings.filter(S::device_id.eq(device.id)))
                .set(S::temperature.eq(Some(99.0)))
                .execute(conn)
        });
        assert!(matches!(AccessError::from(result.unwrap_err()), AccessError::ConstraintViolation(_)));
    }
}
