//! Identity and entitlement types shared by the policy layer and the services.

use crate::error::AccessError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identity of the calling principal, as resolved by the external auth system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallerId(pub Uuid);

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CallerId {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(CallerId)
            .map_err(|e| AccessError::malformed(format!("invalid identity {:?}: {}", s, e)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Premium,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
        }
    }
}

impl FromStr for Tier {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Tier::Free),
            "premium" => Ok(Tier::Premium),
            other => Err(AccessError::malformed(format!("unknown subscription tier {:?}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppRole {
    Admin,
    User,
}

impl AppRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AppRole::Admin => "admin",
            AppRole::User => "user",
        }
    }
}

impl FromStr for AppRole {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(AppRole::Admin),
            "user" => Ok(AppRole::User),
            other => Err(AccessError::malformed(format!("unknown role {:?}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceType {
    Air,
    Soil,
}

impl DeviceType {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceType::Air => "AIR",
            DeviceType::Soil => "SOIL",
        }
    }
}

impl FromStr for DeviceType {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AIR" => Ok(DeviceType::Air),
            "SOIL" => Ok(DeviceType::Soil),
            other => Err(AccessError::malformed(format!("unknown device type {:?}", other))),
        }
    }
}

macro_rules! display_as_str {
    ($($t:ty),+) => {
        $(
            impl fmt::Display for $t {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )+
    };
}

display_as_str!(Tier, AppRole, DeviceType);

/// Resolved entitlement state of one caller for the duration of one request.
///
/// Tier and the admin flag are independent axes; role rows are carried
/// alongside but do not feed into the admin decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entitlement {
    pub caller: CallerId,
    pub tier: Tier,
    pub is_admin: bool,
    pub roles: BTreeSet<AppRole>,
}

impl Entitlement {
    pub fn new(caller: CallerId, tier: Tier, is_admin: bool) -> Self {
        Entitlement {
            caller,
            tier,
            is_admin,
            roles: BTreeSet::new(),
        }
    }

    /// Identity without a profile row: free tier, no admin flag, no roles.
    pub fn unprovisioned(caller: CallerId) -> Self {
        Entitlement::new(caller, Tier::Free, false)
    }

    pub fn with_role(mut self, role: AppRole) -> Self {
        self.roles.insert(role);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_parse_their_stored_spelling_only() {
        assert_eq!("premium".parse::<Tier>().unwrap(), Tier::Premium);
        assert_eq!("SOIL".parse::<DeviceType>().unwrap(), DeviceType::Soil);
        assert_eq!("admin".parse::<AppRole>().unwrap(), AppRole::Admin);

        assert!(matches!("Premium".parse::<Tier>(), Err(AccessError::MalformedInput(_))));
        assert!(matches!("air".parse::<DeviceType>(), Err(AccessError::MalformedInput(_))));
        assert!(matches!("superuser".parse::<AppRole>(), Err(AccessError::MalformedInput(_))));
    }

    #[test]
    fn enums_round_trip_through_display() {
        for tier in [Tier::Free, Tier::Premium] {
            assert_eq!(tier.to_string().parse::<Tier>().unwrap(), tier);
        }
        for device_type in [DeviceType::Air, DeviceType::Soil] {
            assert_eq!(device_type.to_string().parse::<DeviceType>().unwrap(), device_type);
        }
    }

    #[test]
    fn serde_names_match_storage() {
        assert_eq!(serde_json::to_value(DeviceType::Air).unwrap(), "AIR");
        assert_eq!(serde_json::to_value(Tier::Premium).unwrap(), "premium");
    }

    #[test]
    fn caller_id_rejects_garbage() {
        assert!(matches!("not-a-uuid".parse::<CallerId>(), Err(AccessError::MalformedInput(_))));
        let id = Uuid::new_v4();
        assert_eq!(id.to_string().parse::<CallerId>().unwrap(), CallerId(id));
    }

    #[test]
    fn role_set_ignores_duplicates() {
        let ent = Entitlement::unprovisioned(CallerId(Uuid::nil()))
            .with_role(AppRole::User)
            .with_role(AppRole::User);
        assert_eq!(ent.roles.len(), 1);
        assert_eq!(ent.tier, Tier::Free);
        assert!(!ent.is_admin);
    }
}
