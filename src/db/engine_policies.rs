//! The SQL predicates, row-level security policies and the tiered view,
//! checked against their Rust counterparts.

use crate::db::models::{NewProfile, NewSensorReading, NewUserRole, Profile, SensorReading};
use crate::db::testing;
use crate::models::access::{AppRole, CallerId, Tier};
use crate::models::measurements::{FIELD_POLICY, Measurements};
use crate::policy::{self, mask_reading};
use crate::schema;
use crate::services::{entitlements, ingest, registration};
use chrono::{TimeZone, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bool};
use diesel::PgConnection;
use uuid::Uuid;

#[derive(Debug, QueryableByName)]
struct SqlPredicates {
    #[diesel(sql_type = Bool)]
    premium: bool,
    #[diesel(sql_type = Bool)]
    admin: bool,
    #[diesel(sql_type = Bool)]
    admin_role: bool,
}

fn sql_predicates(conn: &mut PgConnection, caller: CallerId) -> SqlPredicates {
    diesel::sql_query("SELECT is_premium($1) AS premium, is_admin($1) AS admin, has_role($1, 'admin') AS admin_role")
        .bind::<diesel::sql_types::Uuid, _>(caller.0)
        .get_result(conn)
        .unwrap()
}

fn tiered_view(conn: &mut PgConnection, caller: CallerId, reading_id: i64) -> Measurements {
    testing::set_current_user(conn, caller);
    diesel::sql_query("SELECT * FROM sensor_readings_tiered WHERE id = $1")
        .bind::<BigInt, _>(reading_id)
        .get_result(conn)
        .unwrap()
}

fn grant_directly(conn: &mut PgConnection, user: &Profile, role: AppRole) {
    use schema::user_roles::dsl as R;

    diesel::insert_into(R::user_roles)
        .values(&NewUserRole {
            user_id: user.id,
            role: role.as_str().to_string(),
        })
        .execute(conn)
        .unwrap();
}

fn every_field_set() -> Measurements {
    Measurements {
        temperature: Some(19.0),
        humidity: Some(48.0),
        pressure: Some(1012.5),
        co2: Some(600.0),
        vpd: Some(1.1),
        heat_index: Some(19.2),
        wet_bulb_temperature: Some(13.0),
        absolute_humidity: Some(7.8),
        altitude: Some(240.0),
        weather_trend: Some(-1),
        uv_index: Some(2.0),
        light_lux: Some(350.0),
        light_visible: Some(120.0),
        light_infrared: Some(40.0),
        par: Some(90.0),
        accel_x: Some(0.01),
        accel_y: Some(-0.02),
        accel_z: Some(0.98),
        shock_detected: Some(true),
        soil_capacitance: Some(512),
        soil_moisture_pct: Some(33.0),
        dew_point: Some(7.9),
        battery_voltage: Some(3.9),
        battery_pct: Some(87.0),
        battery_health: Some(98.0),
    }
}

#[test]
fn sql_predicates_agree_with_resolved_entitlements() {
    let Some(mut conn) = testing::test_connection() else { return };
    let free = testing::profile(&mut conn, Tier::Free, false);
    let premium = testing::profile(&mut conn, Tier::Premium, false);
    let free_admin = testing::profile(&mut conn, Tier::Free, true);
    let role_only = testing::profile(&mut conn, Tier::Free, false);
    grant_directly(&mut conn, &role_only, AppRole::Admin);

    let callers = [
        free.caller(),
        premium.caller(),
        free_admin.caller(),
        role_only.caller(),
        CallerId(Uuid::new_v4()),
    ];
    for caller in callers {
        let ent = entitlements::resolve(&mut conn, caller).unwrap();
        let sql = sql_predicates(&mut conn, caller);
        assert_eq!(sql.premium, policy::is_premium(&ent), "is_premium for {}", caller);
        assert_eq!(sql.admin, policy::is_admin(&ent), "is_admin for {}", caller);
        assert_eq!(sql.admin_role, policy::has_role(&ent, AppRole::Admin), "has_role for {}", caller);
    }

    let sql = sql_predicates(&mut conn, role_only.caller());
    assert!(sql.admin_role);
    assert!(!sql.admin);
}

#[test]
fn tiered_view_masks_like_the_field_table() {
    use schema::sensor_readings::dsl as S;

    let Some(mut conn) = testing::test_connection() else { return };
    let owner = testing::profile(&mut conn, Tier::Free, false);
    let premium = testing::profile(&mut conn, Tier::Premium, false);
    let free_admin = testing::profile(&mut conn, Tier::Free, true);
    let device = testing::device(&mut conn, owner.caller(), "air-view");

    let scenario = Measurements {
        temperature: Some(21.5),
        co2: Some(410.0),
        battery_voltage: Some(3.7),
        ..Default::default()
    };
    let rows = [
        NewSensorReading::new(device.id, Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(), scenario),
        NewSensorReading::new(device.id, Utc.with_ymd_and_hms(2024, 6, 1, 12, 15, 0).unwrap(), every_field_set()),
    ];
    ingest::insert_sensor_readings(&mut conn, &rows).unwrap();
    let stored: Vec<SensorReading> = S::sensor_readings
        .filter(S::device_id.eq(device.id))
        .select(SensorReading::as_select())
        .order(S::time.asc())
        .load(&mut conn)
        .unwrap();
    assert_eq!(stored.len(), 2);

    for caller in [owner.caller(), premium.caller(), free_admin.caller()] {
        let ent = entitlements::resolve(&mut conn, caller).unwrap();
        for row in &stored {
            let from_view = tiered_view(&mut conn, caller, row.id);
            let masked = mask_reading(row, &ent).values;
            assert_eq!(from_view, masked, "view and mask differ for {} on reading {}", caller, row.id);
        }
    }

    // A premium caller sees every permitted field of the full row and nothing else.
    let full = &stored[1];
    let ent = entitlements::resolve(&mut conn, premium.caller()).unwrap();
    let visible = tiered_view(&mut conn, premium.caller(), full.id).present_fields();
    let expected: Vec<&str> = FIELD_POLICY
        .iter()
        .filter(|(_, v)| v.permits(&ent))
        .map(|(name, _)| *name)
        .collect();
    assert_eq!(visible, expected);

    let scenario_row = &stored[0];
    let free_view = tiered_view(&mut conn, owner.caller(), scenario_row.id);
    assert_eq!((free_view.temperature, free_view.co2, free_view.battery_voltage), (Some(21.5), None, None));
    let admin_view = tiered_view(&mut conn, free_admin.caller(), scenario_row.id);
    assert_eq!(
        (admin_view.temperature, admin_view.co2, admin_view.battery_voltage),
        (Some(21.5), Some(410.0), Some(3.7))
    );
}

#[test]
fn non_owner_session_cannot_raise_its_own_entitlement() {
    use schema::profiles::dsl as P;
    use schema::user_roles::dsl as R;

    let Some(mut conn) = testing::test_connection() else { return };
    let user = testing::profile(&mut conn, Tier::Free, false);
    let admin = testing::profile(&mut conn, Tier::Free, true);
    grant_directly(&mut conn, &user, AppRole::User);
    if !testing::assume_app_role(&mut conn) {
        return;
    }
    testing::set_current_user(&mut conn, user.caller());

    let updated = diesel::update(P::profiles.filter(P::id.eq(user.id)))
        .set((P::subscription_tier.eq(Tier::Premium.as_str()), P::is_admin.eq(true)))
        .execute(&mut conn)
        .unwrap();
    assert_eq!(updated, 0);

    let own: Profile = P::profiles
        .find(user.id)
        .select(Profile::as_select())
        .first(&mut conn)
        .unwrap();
    assert_eq!(own.tier().unwrap(), Tier::Free);
    assert!(!own.is_admin);
    let others: i64 = P::profiles.filter(P::id.eq(admin.id)).count().get_result(&mut conn).unwrap();
    assert_eq!(others, 0);

    let removed = diesel::delete(R::user_roles.filter(R::user_id.eq(user.id)))
        .execute(&mut conn)
        .unwrap();
    assert_eq!(removed, 0);
    let self_grant = conn.transaction(|conn| {
        diesel::insert_into(R::user_roles)
            .values(&NewUserRole {
                user_id: user.id,
                role: AppRole::Admin.as_str().to_string(),
            })
            .execute(conn)
    });
    assert!(self_grant.is_err());

    // Self-provisioning is limited to the default free, non-admin profile.
    let newcomer = CallerId(Uuid::new_v4());
    testing::set_current_user(&mut conn, newcomer);
    let mut elevated = NewProfile::provisioned(newcomer, None, None);
    elevated.subscription_tier = Tier::Premium.as_str().to_string();
    elevated.is_admin = true;
    let rejected = conn.transaction(|conn| diesel::insert_into(P::profiles).values(&elevated).execute(conn));
    assert!(rejected.is_err());
    let provisioned = registration::provision_profile(&mut conn, newcomer, None, None).unwrap();
    assert_eq!(provisioned.tier().unwrap(), Tier::Free);
    assert!(!provisioned.is_admin);

    // Admin sessions may change another caller's tier.
    testing::set_current_user(&mut conn, admin.caller());
    let upgraded = diesel::update(P::profiles.filter(P::id.eq(user.id)))
        .set(P::subscription_tier.eq(Tier::Premium.as_str()))
        .execute(&mut conn)
        .unwrap();
    assert_eq!(upgraded, 1);
}
