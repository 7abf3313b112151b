//! Storage-backed test support. Tests skip themselves when
//! `TEST_DATABASE_URL` is unset.

use crate::db::models::{Device, NewDevice, NewProfile, Profile};
use crate::models::access::{CallerId, DeviceType, Tier};
use crate::schema;
use diesel::prelude::*;
use diesel::PgConnection;
use std::sync::Once;
use uuid::Uuid;

static MIGRATE: Once = Once::new();

pub fn test_connection() -> Option<PgConnection> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    MIGRATE.call_once(|| {
        let mut conn = PgConnection::establish(&url).expect("connect to TEST_DATABASE_URL");
        crate::apply_database_migrations(&mut conn).expect("apply migrations");
    });
    let mut conn = PgConnection::establish(&url).expect("connect to TEST_DATABASE_URL");
    conn.begin_test_transaction().expect("begin test transaction");
    Some(conn)
}

pub fn profile(conn: &mut PgConnection, tier: Tier, is_admin: bool) -> Profile {
    use schema::profiles::dsl as P;

    let mut row = NewProfile::provisioned(CallerId(Uuid::new_v4()), None, None);
    row.subscription_tier = tier.as_str().to_string();
    row.is_admin = is_admin;
    diesel::insert_into(P::profiles)
        .values(&row)
        .returning(Profile::as_returning())
        .get_result(conn)
        .expect("insert profile")
}

pub fn device(conn: &mut PgConnection, owner: CallerId, public_id: &str) -> Device {
    use schema::devices::dsl as D;

    diesel::insert_into(D::devices)
        .values(&NewDevice {
            public_id: public_id.to_string(),
            name: format!("{public_id} unit"),
            owner_id: owner.0,
            device_type: DeviceType::Air.as_str().to_string(),
        })
        .returning(Device::as_returning())
        .get_result(conn)
        .expect("insert device")
}

/// Scope `app.current_user_id` to the current transaction.
pub fn set_current_user(conn: &mut PgConnection, caller: CallerId) {
    diesel::sql_query("SELECT set_config('app.current_user_id', $1, true)")
        .bind::<diesel::sql_types::Text, _>(caller.to_string())
        .execute(conn)
        .expect("set app.current_user_id");
}

/// Switch the session to a fresh role that owns nothing, so row-level
/// security applies. Returns false when the test login may not create roles.
pub fn assume_app_role(conn: &mut PgConnection) -> bool {
    let role = format!("sensor_tiers_app_{}", Uuid::new_v4().simple());
    let created = conn.transaction(|conn| {
        diesel::sql_query(format!("CREATE ROLE {role} NOLOGIN")).execute(conn)?;
        diesel::sql_query(format!("GRANT {role} TO CURRENT_USER")).execute(conn)
    });
    if created.is_err() {
        eprintln!("skipping: TEST_DATABASE_URL login cannot create roles");
        return false;
    }

    let grants = [
        format!("GRANT USAGE ON SCHEMA public TO {role}"),
        format!(
            "GRANT SELECT, INSERT, UPDATE, DELETE \
             ON profiles, user_roles, devices, sensor_readings, legacy_readings TO {role}"
        ),
        format!("GRANT USAGE ON ALL SEQUENCES IN SCHEMA public TO {role}"),
        format!("SET LOCAL ROLE {role}"),
    ];
    for statement in grants {
        diesel::sql_query(statement).execute(conn).expect("prepare app role");
    }
    true
}
