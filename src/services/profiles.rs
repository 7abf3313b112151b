use crate::db::models as dbm;
use crate::error::AccessError;
use crate::models::access::{CallerId, Entitlement, Tier};
use crate::policy::require_admin;
use crate::schema;
use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use log::info;

pub fn set_tier(
    conn: &mut PgConnection,
    actor: &Entitlement,
    target: CallerId,
    tier: Tier,
) -> Result<dbm::Profile, AccessError> {
    use schema::profiles::dsl as P;

    require_admin(actor, "changing a subscription tier")?;
    let profile = diesel::update(P::profiles.find(target.0))
        .set((P::subscription_tier.eq(tier.as_str()), P::updated_at.eq(Utc::now())))
        .returning(dbm::Profile::as_returning())
        .get_result(conn)
        .optional()?
        .ok_or_else(|| AccessError::NotFound(format!("profile {}", target)))?;

    info!("Profiles: {} set tier of {} to {}", actor.caller, target, tier);
    Ok(profile)
}

pub fn set_admin(
    conn: &mut PgConnection,
    actor: &Entitlement,
    target: CallerId,
    is_admin: bool,
) -> Result<dbm::Profile, AccessError> {
    use schema::profiles::dsl as P;

    require_admin(actor, "changing the admin flag")?;
    let profile = diesel::update(P::profiles.find(target.0))
        .set((P::is_admin.eq(is_admin), P::updated_at.eq(Utc::now())))
        .returning(dbm::Profile::as_returning())
        .get_result(conn)
        .optional()?
        .ok_or_else(|| AccessError::NotFound(format!("profile {}", target)))?;

    info!("Profiles: {} set admin flag of {} to {}", actor.caller, target, is_admin);
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing;
    use crate::services::entitlements;
    use uuid::Uuid;

    #[test]
    fn admin_upgrades_tier() {
        let Some(mut conn) = testing::test_connection() else { return };
        let admin = testing::profile(&mut conn, Tier::Free, true);
        let user = testing::profile(&mut conn, Tier::Free, false);
        let actor = entitlements::resolve(&mut conn, admin.caller()).unwrap();

        let updated = set_tier(&mut conn, &actor, user.caller(), Tier::Premium).unwrap();
        assert_eq!(updated.tier().unwrap(), Tier::Premium);
        assert!(!updated.is_admin);
    }

    #[test]
    fn premium_user_cannot_grant_admin() {
        let Some(mut conn) = testing::test_connection() else { return };
        let user = testing::profile(&mut conn, Tier::Premium, false);
        let actor = entitlements::resolve(&mut conn, user.caller()).unwrap();

        let err = set_admin(&mut conn, &actor, user.caller(), true).unwrap_err();
        assert!(matches!(err, AccessError::AccessDenied(_)));
        let after = entitlements::resolve(&mut conn, user.caller()).unwrap();
        assert!(!after.is_admin);
    }

    #[test]
    fn unknown_target_is_not_found() {
        let Some(mut conn) = testing::test_connection() else { return };
        let admin = testing::profile(&mut conn, Tier::Free, true);
        let actor = entitlements::resolve(&mut conn, admin.caller()).unwrap();

        let err = set_admin(&mut conn, &actor, CallerId(Uuid::new_v4()), true).unwrap_err();
        assert!(matches!(err, AccessError::NotFound(_)));
    }
}
