use crate::db::models as dbm;
use crate::error::AccessError;
use crate::models::access::{AppRole, CallerId, Entitlement};
use crate::policy::{has_role, is_admin};
use crate::schema;
use diesel::prelude::*;
use diesel::PgConnection;
use log::debug;

/// Resolve the caller's tier, admin flag and role rows.
///
/// An identity without a profile row resolves to the free, non-admin
/// entitlement, the same answer the SQL predicates give for it.
pub fn resolve(conn: &mut PgConnection, caller: CallerId) -> Result<Entitlement, AccessError> {
    use schema::profiles::dsl as P;
    use schema::user_roles::dsl as R;

    let profile: Option<dbm::Profile> = P::profiles
        .find(caller.0)
        .select(dbm::Profile::as_select())
        .first(conn)
        .optional()?;

    let mut ent = match profile {
        Some(p) => Entitlement::new(caller, p.tier()?, p.is_admin),
        None => {
            debug!("Entitlements: no profile for {}; treating as free", caller);
            Entitlement::unprovisioned(caller)
        }
    };

    let roles: Vec<dbm::UserRole> = R::user_roles
        .filter(R::user_id.eq(caller.0))
        .select(dbm::UserRole::as_select())
        .load(conn)?;
    for row in &roles {
        ent = ent.with_role(row.role()?);
    }

    if has_role(&ent, AppRole::Admin) && !is_admin(&ent) {
        debug!(
            "Entitlements: {} holds an admin role row without the admin flag; flag wins",
            caller
        );
    }

    Ok(ent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing;
    use crate::models::access::Tier;
    use crate::policy::is_premium;
    use uuid::Uuid;

    #[test]
    fn unknown_identity_is_free_and_not_admin() {
        let Some(mut conn) = testing::test_connection() else { return };
        let ent = resolve(&mut conn, CallerId(Uuid::new_v4())).unwrap();
        assert_eq!(ent.tier, Tier::Free);
        assert!(!is_admin(&ent));
        assert!(ent.roles.is_empty());
    }

    #[test]
    fn role_rows_are_loaded_but_do_not_grant_admin() {
        use schema::user_roles::dsl as R;

        let Some(mut conn) = testing::test_connection() else { return };
        let profile = testing::profile(&mut conn, Tier::Premium, false);
        diesel::insert_into(R::user_roles)
            .values(&dbm::NewUserRole {
                user_id: profile.id,
                role: AppRole::Admin.as_str().to_string(),
            })
            .execute(&mut conn)
            .unwrap();

        let ent = resolve(&mut conn, profile.caller()).unwrap();
        assert!(is_premium(&ent));
        assert!(has_role(&ent, AppRole::Admin));
        assert!(!is_admin(&ent));
    }
}
