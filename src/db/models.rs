//! Diesel model structs for profiles, roles, devices and the two reading tables.
//!
//! Enum-valued columns (`subscription_tier`, `role`, `device_type`) are stored
//! as text guarded by CHECK constraints; the accessors below parse them into
//! the closed enums from `models::access`.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AccessError;
use crate::models::access::{AppRole, CallerId, DeviceType, Tier};
use crate::models::measurements::Measurements;
use crate::schema;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::profiles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Profile {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub subscription_tier: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn caller(&self) -> CallerId {
        CallerId(self.id)
    }

    pub fn tier(&self) -> Result<Tier, AccessError> {
        self.subscription_tier.parse()
    }
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::profiles)]
pub struct NewProfile {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub subscription_tier: String,
    pub is_admin: bool,
}

impl NewProfile {
    /// Profile as provisioned on first sign-in: free tier, not admin.
    pub fn provisioned(caller: CallerId, email: Option<String>, display_name: Option<String>) -> Self {
        NewProfile {
            id: caller.0,
            display_name,
            email,
            subscription_tier: Tier::Free.as_str().to_string(),
            is_admin: false,
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::user_roles)]
#[diesel(belongs_to(Profile, foreign_key = user_id))]
pub struct UserRole {
    pub id: i64,
    pub user_id: Uuid,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl UserRole {
    pub fn role(&self) -> Result<AppRole, AccessError> {
        self.role.parse()
    }
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::user_roles)]
pub struct NewUserRole {
    pub user_id: Uuid,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::devices)]
#[diesel(belongs_to(Profile, foreign_key = owner_id))]
pub struct Device {
    pub id: i64,
    pub public_id: String,
    pub name: String,
    pub owner_id: Uuid,
    pub device_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    pub fn owner(&self) -> CallerId {
        CallerId(self.owner_id)
    }

    pub fn kind(&self) -> Result<DeviceType, AccessError> {
        self.device_type.parse()
    }
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::devices)]
pub struct NewDevice {
    pub public_id: String,
    pub name: String,
    pub owner_id: Uuid,
    pub device_type: String,
}

// Append-only: sensor_readings
#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::sensor_readings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(belongs_to(Device))]
pub struct SensorReading {
    pub id: i64,
    pub device_id: i64,
    pub time: DateTime<Utc>,
    #[diesel(embed)]
    #[serde(flatten)]
    pub values: Measurements,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::sensor_readings)]
pub struct NewSensorReading {
    pub device_id: i64,
    pub time: DateTime<Utc>,
    #[diesel(embed)]
    #[serde(flatten)]
    pub values: Measurements,
}

impl NewSensorReading {
    pub fn new(device_id: i64, time: DateTime<Utc>, values: Measurements) -> Self {
        NewSensorReading { device_id, time, values }
    }
}

// Append-only: legacy_readings
#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::legacy_readings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(belongs_to(Device))]
pub struct LegacyReading {
    pub id: i64,
    pub device_id: i64,
    pub time: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub dew_point: Option<f64>,
}

#[derive(Debug, Clone, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::legacy_readings)]
pub struct NewLegacyReading {
    pub device_id: i64,
    pub time: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub dew_point: Option<f64>,
}
