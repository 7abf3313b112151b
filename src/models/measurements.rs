//! Measurement columns of `sensor_readings` together with the visibility
//! class of each one. Moving a field to another class is a one-line change
//! in the `measurement_fields!` invocation below; the SQL view in
//! `migrations/*_access_policies` mirrors the same table.

use crate::models::access::Entitlement;
use crate::policy::Visibility;
use crate::schema;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

macro_rules! measurement_fields {
    ($( $field:ident : $ty:ty => $class:ident ),+ $(,)?) => {
        /// Optional measurement values of one reading. `None` is both "sensor
        /// did not report" and, after masking, "caller may not see this".
        #[derive(
            Debug, Clone, Default, PartialEq, Queryable, QueryableByName, Selectable, Insertable, Serialize, Deserialize,
        )]
        #[diesel(table_name = schema::sensor_readings)]
        #[diesel(check_for_backend(diesel::pg::Pg))]
        pub struct Measurements {
            $( #[serde(default)] pub $field: Option<$ty>, )+
        }

        /// Field name to visibility class, in column order.
        pub const FIELD_POLICY: &[(&str, Visibility)] = &[
            $( (stringify!($field), Visibility::$class), )+
        ];

        impl Measurements {
            /// Clear every field whose class the entitlement does not permit.
            pub(crate) fn retain_visible(&mut self, ent: &Entitlement) {
                $(
                    if !Visibility::$class.permits(ent) {
                        self.$field = None;
                    }
                )+
            }

            /// Names of the fields currently holding a value.
            pub fn present_fields(&self) -> Vec<&'static str> {
                let mut out = Vec::new();
                $(
                    if self.$field.is_some() {
                        out.push(stringify!($field));
                    }
                )+
                out
            }
        }
    };
}

measurement_fields! {
    temperature: f64 => Baseline,
    humidity: f64 => Baseline,
    pressure: f64 => Baseline,

    co2: f64 => Premium,
    vpd: f64 => Premium,
    heat_index: f64 => Premium,
    wet_bulb_temperature: f64 => Premium,
    absolute_humidity: f64 => Premium,
    altitude: f64 => Premium,
    weather_trend: i16 => Premium,
    uv_index: f64 => Premium,
    light_lux: f64 => Premium,
    light_visible: f64 => Premium,
    light_infrared: f64 => Premium,
    par: f64 => Premium,
    accel_x: f64 => Premium,
    accel_y: f64 => Premium,
    accel_z: f64 => Premium,
    shock_detected: bool => Premium,
    soil_capacitance: i32 => Premium,
    soil_moisture_pct: f64 => Premium,
    dew_point: f64 => Premium,

    battery_voltage: f64 => Admin,
    battery_pct: f64 => Admin,
    battery_health: f64 => Admin,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_table_covers_every_measurement_column() {
        assert_eq!(FIELD_POLICY.len(), 25);
        let admin_only: Vec<_> = FIELD_POLICY
            .iter()
            .filter(|(_, v)| *v == Visibility::Admin)
            .map(|(n, _)| *n)
            .collect();
        assert_eq!(admin_only, ["battery_voltage", "battery_pct", "battery_health"]);
    }

    #[test]
    fn present_fields_lists_only_set_values() {
        let m = Measurements {
            temperature: Some(20.0),
            shock_detected: Some(false),
            ..Default::default()
        };
        assert_eq!(m.present_fields(), ["temperature", "shock_detected"]);
    }

    #[test]
    fn deserializes_sparse_json() {
        let m: Measurements = serde_json::from_str(r#"{"temperature": 21.5, "co2": 410.0}"#).unwrap();
        assert_eq!(m.temperature, Some(21.5));
        assert_eq!(m.co2, Some(410.0));
        assert_eq!(m.battery_voltage, None);
    }
}
