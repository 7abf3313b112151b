use crate::db::models as dbm;
use crate::error::AccessError;
use crate::models::access::{CallerId, DeviceType, Entitlement};
use crate::policy::{is_admin, require_device_access};
use crate::schema;
use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use log::{debug, info};

#[derive(Debug, Clone)]
pub struct DeviceRegistration {
    pub public_id: String,
    pub name: String,
    pub device_type: DeviceType,
    /// Defaults to the acting caller. Only admins may register for someone else.
    pub owner: Option<CallerId>,
}

fn non_blank(field: &str, value: &str) -> Result<String, AccessError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(AccessError::malformed(format!("{} must not be blank", field)))
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn register_device(
    conn: &mut PgConnection,
    actor: &Entitlement,
    registration: DeviceRegistration,
) -> Result<dbm::Device, AccessError> {
    use schema::devices::dsl as D;

    let public_id = non_blank("device public id", &registration.public_id)?;
    let name = non_blank("device name", &registration.name)?;
    let owner = registration.owner.unwrap_or(actor.caller);
    if owner != actor.caller && !is_admin(actor) {
        return Err(AccessError::denied(format!(
            "{} may not register devices for {}",
            actor.caller, owner
        )));
    }

    let new_row = dbm::NewDevice {
        public_id,
        name,
        owner_id: owner.0,
        device_type: registration.device_type.as_str().to_string(),
    };

    // Savepoint, so a rejected duplicate does not poison an enclosing transaction.
    let device = conn.transaction(|conn| {
        diesel::insert_into(D::devices)
            .values(&new_row)
            .returning(dbm::Device::as_returning())
            .get_result::<dbm::Device>(conn)
    })?;

    info!(
        "Devices: registered {} ({}) for {}",
        device.public_id, device.device_type, owner
    );
    Ok(device)
}

/// Look up a device the caller may see. Devices owned by someone else are
/// reported exactly like missing ones.
pub fn find_device(conn: &mut PgConnection, actor: &Entitlement, public_id: &str) -> Result<dbm::Device, AccessError> {
    use schema::devices::dsl as D;

    let device: Option<dbm::Device> = D::devices
        .filter(D::public_id.eq(public_id))
        .select(dbm::Device::as_select())
        .first(conn)
        .optional()?;

    match device {
        Some(d) => {
            require_device_access(actor, &d)?;
            Ok(d)
        }
        None => {
            debug!("Devices: {} looked up unknown device {}", actor.caller, public_id);
            Err(AccessError::denied(format!(
                "device {} is not accessible to {}",
                public_id, actor.caller
            )))
        }
    }
}

pub fn rename_device(
    conn: &mut PgConnection,
    actor: &Entitlement,
    public_id: &str,
    name: &str,
) -> Result<dbm::Device, AccessError> {
    use schema::devices::dsl as D;

    let name = non_blank("device name", name)?;
    let device = find_device(conn, actor, public_id)?;
    let updated = diesel::update(D::devices.find(device.id))
        .set((D::name.eq(&name), D::updated_at.eq(Utc::now())))
        .returning(dbm::Device::as_returning())
        .get_result(conn)?;

    info!("Devices: {} renamed {} to {:?}", actor.caller, public_id, name);
    Ok(updated)
}

/// Own devices, or every device for admins.
pub fn list_devices(conn: &mut PgConnection, actor: &Entitlement) -> Result<Vec<dbm::Device>, AccessError> {
    use schema::devices::dsl as D;

    let mut query = D::devices.select(dbm::Device::as_select()).order(D::public_id.asc()).into_boxed();
    if !is_admin(actor) {
        query = query.filter(D::owner_id.eq(actor.caller.0));
    }
    Ok(query.load(conn)?)
}
