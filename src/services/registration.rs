use crate::db::models as dbm;
use crate::error::AccessError;
use crate::models::access::CallerId;
use crate::schema;
use diesel::prelude::*;
use diesel::PgConnection;
use log::info;

/// Create the profile for a newly established identity.
///
/// Upsert-by-identity: a second call for the same caller inserts nothing and
/// leaves tier, admin flag and contact details as they are.
pub fn provision_profile(
    conn: &mut PgConnection,
    caller: CallerId,
    email: Option<String>,
    display_name: Option<String>,
) -> Result<dbm::Profile, AccessError> {
    use schema::profiles::dsl as P;

    let new_row = dbm::NewProfile::provisioned(caller, email, display_name);
    let inserted = diesel::insert_into(P::profiles)
        .values(&new_row)
        .on_conflict(P::id)
        .do_nothing()
        .execute(conn)?;

    let profile = P::profiles
        .find(caller.0)
        .select(dbm::Profile::as_select())
        .first(conn)?;

    if inserted > 0 {
        info!("Registration: provisioned profile {}", profile.caller());
    }
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing;
    use crate::models::access::Tier;
    use uuid::Uuid;

    #[test]
    fn provisioning_twice_keeps_one_default_profile() {
        use schema::profiles::dsl as P;

        let Some(mut conn) = testing::test_connection() else { return };
        let caller = CallerId(Uuid::new_v4());

        let first = provision_profile(&mut conn, caller, Some("a@example.com".into()), None).unwrap();
        let second = provision_profile(&mut conn, caller, Some("b@example.com".into()), None).unwrap();

        let count: i64 = P::profiles.filter(P::id.eq(caller.0)).count().get_result(&mut conn).unwrap();
        assert_eq!(count, 1);
        assert_eq!(first.tier().unwrap(), Tier::Free);
        assert!(!first.is_admin);
        assert_eq!(second.email.as_deref(), Some("a@example.com"));
        assert_eq!(second.created_at, first.created_at);
    }

    #[test]
    fn provisioning_does_not_reset_an_upgraded_profile() {
        let Some(mut conn) = testing::test_connection() else { return };
        let existing = testing::profile(&mut conn, Tier::Premium, true);

        let again = provision_profile(&mut conn, existing.caller(), None, None).unwrap();
        assert_eq!(again.tier().unwrap(), Tier::Premium);
        assert!(again.is_admin);
    }
}
