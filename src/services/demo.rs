//! Deterministic synthetic history for a demo owner and one AIR device.

use crate::db::models::{Device, NewSensorReading};
use crate::error::AccessError;
use crate::models::access::{CallerId, DeviceType, Entitlement};
use crate::models::measurements::Measurements;
use crate::schema;
use crate::services::devices::{DeviceRegistration, register_device};
use crate::services::ingest::insert_sensor_readings;
use crate::services::registration::provision_profile;
use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};
use diesel::dsl::max;
use diesel::prelude::*;
use diesel::PgConnection;
use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use uuid::Uuid;

pub const DEMO_OWNER: CallerId = CallerId(Uuid::from_u128(0x0420_1337_0000_0000_0000_0000_0000_0001));
pub const DEMO_DEVICE: &str = "demo-air-0001";
const STEP_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub days: u32,
    pub inserted: usize,
}

pub fn seed(conn: &mut PgConnection, days: u32) -> Result<SeedSummary, AccessError> {
    let end = Utc::now()
        .duration_trunc(Duration::minutes(STEP_MINUTES))
        .map_err(|e| AccessError::malformed(format!("cannot align demo clock: {}", e)))?;
    seed_until(conn, days, end)
}

/// Fill `[end - days, end)` at the sampling step, skipping slots the demo
/// device already has readings for.
fn seed_until(
    conn: &mut PgConnection,
    days: u32,
    end: DateTime<Utc>,
) -> Result<SeedSummary, AccessError> {
    use schema::sensor_readings::dsl as S;

    let start = window_start(end, days)?;
    provision_profile(
        conn,
        DEMO_OWNER,
        Some("demo@example.invalid".to_string()),
        Some("Demo Grower".to_string()),
    )?;
    let device = ensure_device(conn)?;

    let step = Duration::minutes(STEP_MINUTES);
    let latest: Option<DateTime<Utc>> = S::sensor_readings
        .filter(S::device_id.eq(device.id))
        .select(max(S::time))
        .get_result(conn)?;
    let resume = match latest {
        Some(t) if t >= start => t + step,
        _ => start,
    };
    let mut rng = SmallRng::seed_from_u64(0x0420_1337_DEAD_BEEFu64);

    info!(
        "Demo: generating {} day(s) of readings for {} from {} to {}",
        days, DEMO_DEVICE, resume, end
    );

    let mut batch = Vec::with_capacity(samples_per_day());
    let mut inserted = 0;
    let mut ts = resume;
    let mut current_day = resume.date_naive();
    while ts < end {
        if ts.date_naive() != current_day {
            inserted += insert_sensor_readings(conn, &batch)?;
            batch.clear();
            current_day = ts.date_naive();
        }
        batch.push(NewSensorReading::new(device.id, ts, synthesize(ts, &mut rng)));
        ts += step;
    }
    inserted += insert_sensor_readings(conn, &batch)?;

    info!("Demo: complete (days={}, inserted={})", days, inserted);
    Ok(SeedSummary { days, inserted })
}

fn window_start(end: DateTime<Utc>, days: u32) -> Result<DateTime<Utc>, AccessError> {
    Duration::try_days(i64::from(days))
        .and_then(|span| end.checked_sub_signed(span))
        .ok_or_else(|| AccessError::malformed(format!("a demo window of {} day(s) is out of range", days)))
}

fn ensure_device(conn: &mut PgConnection) -> Result<Device, AccessError> {
    use schema::devices::dsl as D;

    let existing: Option<Device> = D::devices
        .filter(D::public_id.eq(DEMO_DEVICE))
        .select(Device::as_select())
        .first(conn)
        .optional()?;
    if let Some(device) = existing {
        return Ok(device);
    }

    let owner = Entitlement::unprovisioned(DEMO_OWNER);
    register_device(
        conn,
        &owner,
        DeviceRegistration {
            public_id: DEMO_DEVICE.to_string(),
            name: "Demo greenhouse".to_string(),
            device_type: DeviceType::Air,
            owner: None,
        },
    )
}

fn samples_per_day() -> usize {
    (24 * 60 / STEP_MINUTES) as usize
}

fn synthesize(ts: DateTime<Utc>, rng: &mut SmallRng) -> Measurements {
    let day_fraction = ts.time().num_seconds_from_midnight() as f64 / 86_400.0;
    let diurnal = (2.0 * PI * (day_fraction - 0.25)).sin();

    let temperature = 21.0 + 4.0 * diurnal + rng.random_range(-0.4..=0.4);
    let humidity = (55.0 - 12.0 * diurnal + rng.random_range(-2.0..=2.0)).clamp(10.0, 100.0);
    let pressure = 1013.0 + rng.random_range(-3.0..=3.0);
    let daylight = diurnal.max(0.0);

    Measurements {
        temperature: Some(round1(temperature)),
        humidity: Some(round1(humidity)),
        pressure: Some(round1(pressure)),
        co2: Some(round1(420.0 + 180.0 * (1.0 - daylight) + rng.random_range(0.0..=25.0))),
        dew_point: Some(round1(dew_point(temperature, humidity))),
        vpd: Some(round2(vpd_kpa(temperature, humidity))),
        light_lux: Some(round1(daylight * 30_000.0)),
        uv_index: Some(round1(daylight * 6.0)),
        par: Some(round1(daylight * 1_500.0)),
        shock_detected: Some(rng.random_bool(0.001)),
        battery_voltage: Some(round2(3.6 + 0.4 * rng.random_range(0.9..=1.0))),
        battery_pct: Some(round1(rng.random_range(80.0..=100.0))),
        ..Default::default()
    }
}

// Magnus approximation.
fn dew_point(temp_c: f64, rh_pct: f64) -> f64 {
    let (a, b) = (17.62, 243.12);
    let gamma = (rh_pct / 100.0).ln() + a * temp_c / (b + temp_c);
    b * gamma / (a - gamma)
}

fn vpd_kpa(temp_c: f64, rh_pct: f64) -> f64 {
    let svp = 0.6108 * (17.27 * temp_c / (temp_c + 237.3)).exp();
    svp * (1.0 - rh_pct / 100.0)
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
