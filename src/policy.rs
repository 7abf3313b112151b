//! Authorization predicates and the tiered projection of readings.
//!
//! Everything here is a pure function of `(row, entitlement)`: no storage
//! access, no shared state. Two callers reading the same row each get their
//! own masked copy.

use crate::db::models::{Device, LegacyReading, SensorReading};
use crate::error::AccessError;
use crate::models::access::{AppRole, Entitlement, Tier};
use crate::models::measurements::{FIELD_POLICY, Measurements};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Caller is premium by subscription, or an admin.
pub fn is_premium(ent: &Entitlement) -> bool {
    ent.tier == Tier::Premium || ent.is_admin
}

/// Keys off the profile admin flag only. `user_roles` rows do not grant admin.
pub fn is_admin(ent: &Entitlement) -> bool {
    ent.is_admin
}

pub fn has_role(ent: &Entitlement, role: AppRole) -> bool {
    ent.roles.contains(&role)
}

/// Visibility class of a measurement field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible to anyone who can see the device.
    Baseline,
    /// Premium tier or admin.
    Premium,
    /// Admin flag only; premium alone does not unlock these.
    Admin,
}

impl Visibility {
    pub fn permits(self, ent: &Entitlement) -> bool {
        match self {
            Visibility::Baseline => true,
            Visibility::Premium => is_premium(ent),
            Visibility::Admin => is_admin(ent),
        }
    }
}

pub fn visibility_of(field: &str) -> Option<Visibility> {
    FIELD_POLICY.iter().find(|(name, _)| *name == field).map(|(_, v)| *v)
}

/// A reading as seen by one caller. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaskedReading {
    pub id: i64,
    pub device_id: i64,
    pub time: DateTime<Utc>,
    #[serde(flatten)]
    pub values: Measurements,
}

pub fn mask_reading(reading: &SensorReading, ent: &Entitlement) -> MaskedReading {
    let mut values = reading.values.clone();
    values.retain_visible(ent);
    MaskedReading {
        id: reading.id,
        device_id: reading.device_id,
        time: reading.time,
        values,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaskedLegacyReading {
    pub id: i64,
    pub device_id: i64,
    pub time: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub dew_point: Option<f64>,
}

/// Legacy rows share field names with the current table, so they follow the
/// same classes. A legacy column missing from the field table stays hidden.
pub fn mask_legacy_reading(reading: &LegacyReading, ent: &Entitlement) -> MaskedLegacyReading {
    macro_rules! gate {
        ($field:ident) => {{
            let visibility = visibility_of(stringify!($field)).unwrap_or(Visibility::Admin);
            reading.$field.filter(|_| visibility.permits(ent))
        }};
    }
    MaskedLegacyReading {
        id: reading.id,
        device_id: reading.device_id,
        time: reading.time,
        temperature: gate!(temperature),
        humidity: gate!(humidity),
        pressure: gate!(pressure),
        dew_point: gate!(dew_point),
    }
}

pub fn require_admin(ent: &Entitlement, action: &str) -> Result<(), AccessError> {
    if is_admin(ent) {
        Ok(())
    } else {
        Err(AccessError::denied(format!("{} requires admin (caller {})", action, ent.caller)))
    }
}

/// Owner or admin.
pub fn can_access_device(ent: &Entitlement, device: &Device) -> bool {
    is_admin(ent) || device.owner() == ent.caller
}

pub fn require_device_access(ent: &Entitlement, device: &Device) -> Result<(), AccessError> {
    if can_access_device(ent, device) {
        Ok(())
    } else {
        Err(AccessError::denied(format!(
            "device {} is not accessible to {}",
            device.public_id, ent.caller
        )))
    }
}
