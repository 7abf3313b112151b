use crate::db::models as dbm;
use crate::error::AccessError;
use crate::models::access::{AppRole, CallerId, Entitlement};
use crate::policy::require_admin;
use crate::schema;
use diesel::prelude::*;
use diesel::PgConnection;
use log::info;

/// Idempotent: granting a role the target already holds is a no-op.
pub fn grant_role(
    conn: &mut PgConnection,
    actor: &Entitlement,
    target: CallerId,
    role: AppRole,
) -> Result<bool, AccessError> {
    use schema::user_roles::dsl as R;

    require_admin(actor, "granting a role")?;
    let new_row = dbm::NewUserRole {
        user_id: target.0,
        role: role.as_str().to_string(),
    };
    let inserted = conn.transaction(|conn| {
        diesel::insert_into(R::user_roles)
            .values(&new_row)
            .on_conflict((R::user_id, R::role))
            .do_nothing()
            .execute(conn)
    })?;

    if inserted > 0 {
        info!("Roles: {} granted {} to {}", actor.caller, role, target);
    }
    Ok(inserted > 0)
}

/// Returns whether a row was removed.
pub fn revoke_role(
    conn: &mut PgConnection,
    actor: &Entitlement,
    target: CallerId,
    role: AppRole,
) -> Result<bool, AccessError> {
    use schema::user_roles::dsl as R;

    require_admin(actor, "revoking a role")?;
    let removed = diesel::delete(R::user_roles.filter(R::user_id.eq(target.0).and(R::role.eq(role.as_str()))))
        .execute(conn)?;

    if removed > 0 {
        info!("Roles: {} revoked {} from {}", actor.caller, role, target);
    }
    Ok(removed > 0)
}

/// Roles held by `target`. Callers may list their own; admins may list anyone's.
pub fn list_roles(
    conn: &mut PgConnection,
    actor: &Entitlement,
    target: CallerId,
) -> Result<Vec<AppRole>, AccessError> {
    use schema::user_roles::dsl as R;

    if target != actor.caller {
        require_admin(actor, "listing another caller's roles")?;
    }
    let rows: Vec<dbm::UserRole> = R::user_roles
        .filter(R::user_id.eq(target.0))
        .select(dbm::UserRole::as_select())
        .order(R::role.asc())
        .load(conn)?;
    rows.iter().map(dbm::UserRole::role).collect()
}
