//! Hand-parsed command line. Every command that acts on behalf of someone
//! takes the acting identity explicitly via `--as <uuid>`.

use crate::models::access::{AppRole, CallerId, DeviceType, Tier};
use crate::services::readings::ReadingQuery;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::path::PathBuf;

pub const USAGE: &str = "\
usage: sensor-tiers [--env-file PATH] <command> [args]

commands:
  migrate
  provision <uuid> [--email EMAIL] [--name NAME]
  set-tier --as <uuid> <target-uuid> <free|premium>
  set-admin --as <uuid> <target-uuid> <true|false>
  grant-role --as <uuid> <target-uuid> <admin|user>
  revoke-role --as <uuid> <target-uuid> <admin|user>
  roles --as <uuid> [target-uuid]
  register-device --as <uuid> <public-id> <AIR|SOIL> <name> [--owner <uuid>]
  rename-device --as <uuid> <public-id> <name>
  whoami --as <uuid>
  devices --as <uuid>
  ingest --as <uuid> <public-id> [--legacy]      (JSON lines on stdin)
  readings --as <uuid> <public-id> [--from RFC3339] [--to RFC3339] [--limit N]
  legacy-readings --as <uuid> <public-id> [--from RFC3339] [--to RFC3339] [--limit N]
  seed-demo [days]";

const SWITCHES: [&str; 1] = ["--legacy"];

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub env_file: Option<PathBuf>,
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Migrate,
    Provision {
        caller: CallerId,
        email: Option<String>,
        display_name: Option<String>,
    },
    SetTier {
        actor: CallerId,
        target: CallerId,
        tier: Tier,
    },
    SetAdmin {
        actor: CallerId,
        target: CallerId,
        is_admin: bool,
    },
    GrantRole {
        actor: CallerId,
        target: CallerId,
        role: AppRole,
    },
    RevokeRole {
        actor: CallerId,
        target: CallerId,
        role: AppRole,
    },
    Roles {
        actor: CallerId,
        target: Option<CallerId>,
    },
    RegisterDevice {
        actor: CallerId,
        public_id: String,
        device_type: DeviceType,
        name: String,
        owner: Option<CallerId>,
    },
    RenameDevice {
        actor: CallerId,
        public_id: String,
        name: String,
    },
    Whoami {
        actor: CallerId,
    },
    Devices {
        actor: CallerId,
    },
    Ingest {
        actor: CallerId,
        public_id: String,
        legacy: bool,
    },
    Readings {
        actor: CallerId,
        query: QueryArgs,
        legacy: bool,
    },
    SeedDemo {
        days: Option<u32>,
    },
}

/// `ReadingQuery` minus the limit clamp, which needs the runtime config.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryArgs {
    pub public_id: String,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<NonZeroU32>,
}

impl QueryArgs {
    pub fn to_query(&self) -> ReadingQuery {
        ReadingQuery {
            from: self.from,
            to: self.to,
            limit: self.limit,
            ..ReadingQuery::for_device(self.public_id.clone())
        }
    }
}

#[derive(Debug, Default)]
struct RawArgs {
    positional: Vec<String>,
    options: BTreeMap<String, String>,
    switches: Vec<String>,
}

impl RawArgs {
    fn take(&mut self, name: &str) -> Option<String> {
        self.options.remove(name)
    }

    fn switch(&mut self, name: &str) -> bool {
        match self.switches.iter().position(|s| s == name) {
            Some(i) => {
                self.switches.remove(i);
                true
            }
            None => false,
        }
    }

    fn actor(&mut self) -> Result<CallerId, String> {
        let raw = self.take("--as").ok_or_else(|| "missing required `--as <uuid>`".to_string())?;
        parse_with(&raw, "--as")
    }

    fn positional(&mut self, what: &str) -> Result<String, String> {
        if self.positional.is_empty() {
            Err(format!("missing argument: {}", what))
        } else {
            Ok(self.positional.remove(0))
        }
    }

    fn finish(self) -> Result<(), String> {
        if let Some(extra) = self.positional.first() {
            return Err(format!("unexpected argument: {}", extra));
        }
        if let Some(opt) = self.options.keys().next() {
            return Err(format!("option {} is not valid here", opt));
        }
        if let Some(sw) = self.switches.first() {
            return Err(format!("option {} is not valid here", sw));
        }
        Ok(())
    }
}

fn parse_with<T>(raw: &str, what: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| format!("{}: {}", what, e))
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(format!("expected true or false, got {:?}", other)),
    }
}

fn parse_time(raw: &str, what: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("{} must be RFC 3339: {}", what, e))
}

fn split_args(args: Vec<String>) -> Result<(Option<PathBuf>, RawArgs), String> {
    let mut raw = RawArgs::default();
    let mut env_file = None;
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        if arg == "--" {
            raw.positional.extend(iter.by_ref());
            break;
        }
        if !arg.starts_with("--") {
            raw.positional.push(arg);
            continue;
        }
        if SWITCHES.contains(&arg.as_str()) {
            raw.switches.push(arg);
            continue;
        }

        let (name, value) = match arg.split_once('=') {
            Some((n, v)) => (n.to_string(), v.to_string()),
            None => {
                let v = iter.next().ok_or_else(|| format!("`{}` requires a value", arg))?;
                (arg, v)
            }
        };
        if value.is_empty() {
            return Err(format!("`{}` requires a value", name));
        }
        if name == "--env-file" {
            if env_file.is_some() {
                return Err("`--env-file` provided more than once".to_string());
            }
            env_file = Some(PathBuf::from(value));
            continue;
        }
        if raw.options.insert(name.clone(), value).is_some() {
            return Err(format!("`{}` provided more than once", name));
        }
    }

    Ok((env_file, raw))
}

fn query_args(raw: &mut RawArgs) -> Result<QueryArgs, String> {
    let public_id = raw.positional("device public id")?;
    let from = raw.take("--from").map(|s| parse_time(&s, "--from")).transpose()?;
    let to = raw.take("--to").map(|s| parse_time(&s, "--to")).transpose()?;
    let limit = raw
        .take("--limit")
        .map(|s| parse_with::<NonZeroU32>(&s, "--limit"))
        .transpose()?;
    Ok(QueryArgs {
        public_id,
        from,
        to,
        limit,
    })
}

/// Parse arguments without the program name.
pub fn parse(args: Vec<String>) -> Result<Invocation, String> {
    let (env_file, mut raw) = split_args(args)?;
    if raw.positional.is_empty() {
        return Err(format!("missing command\n\n{}", USAGE));
    }
    let name = raw.positional.remove(0);

    let command = match name.as_str() {
        "migrate" => Command::Migrate,
        "provision" => {
            let caller = parse_with(&raw.positional("identity uuid")?, "identity")?;
            Command::Provision {
                caller,
                email: raw.take("--email"),
                display_name: raw.take("--name"),
            }
        }
        "set-tier" => Command::SetTier {
            actor: raw.actor()?,
            target: parse_with(&raw.positional("target uuid")?, "target")?,
            tier: parse_with(&raw.positional("tier")?, "tier")?,
        },
        "set-admin" => Command::SetAdmin {
            actor: raw.actor()?,
            target: parse_with(&raw.positional("target uuid")?, "target")?,
            is_admin: parse_bool(&raw.positional("admin flag")?)?,
        },
        "grant-role" | "revoke-role" => {
            let actor = raw.actor()?;
            let target = parse_with(&raw.positional("target uuid")?, "target")?;
            let role = parse_with(&raw.positional("role")?, "role")?;
            if name == "grant-role" {
                Command::GrantRole { actor, target, role }
            } else {
                Command::RevokeRole { actor, target, role }
            }
        }
        "roles" => {
            let actor = raw.actor()?;
            let target = if raw.positional.is_empty() {
                None
            } else {
                Some(parse_with(&raw.positional("target uuid")?, "target")?)
            };
            Command::Roles { actor, target }
        }
        "register-device" => Command::RegisterDevice {
            actor: raw.actor()?,
            public_id: raw.positional("device public id")?,
            device_type: parse_with(&raw.positional("device type")?, "device type")?,
            name: raw.positional("device name")?,
            owner: raw.take("--owner").map(|s| parse_with(&s, "--owner")).transpose()?,
        },
        "rename-device" => Command::RenameDevice {
            actor: raw.actor()?,
            public_id: raw.positional("device public id")?,
            name: raw.positional("device name")?,
        },
        "whoami" => Command::Whoami { actor: raw.actor()? },
        "devices" => Command::Devices { actor: raw.actor()? },
        "ingest" => Command::Ingest {
            actor: raw.actor()?,
            public_id: raw.positional("device public id")?,
            legacy: raw.switch("--legacy"),
        },
        "readings" | "legacy-readings" => Command::Readings {
            actor: raw.actor()?,
            query: query_args(&mut raw)?,
            legacy: name == "legacy-readings",
        },
        "seed-demo" => {
            let days = if raw.positional.is_empty() {
                None
            } else {
                Some(parse_with::<u32>(&raw.positional("days")?, "days")?)
            };
            Command::SeedDemo { days }
        }
        other => return Err(format!("unrecognised command: {}\n\n{}", other, USAGE)),
    };

    raw.finish()?;
    Ok(Invocation { env_file, command })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    const A: &str = "00000000-0000-0000-0000-00000000000a";
    const B: &str = "00000000-0000-0000-0000-00000000000b";

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    fn id(s: &str) -> CallerId {
        CallerId(Uuid::parse_str(s).unwrap())
    }

    #[test]
    fn parses_readings_with_window() {
        let inv = parse(args(&format!(
            "--env-file=prod.env readings --as {A} air-1 --from 2024-06-01T00:00:00Z --to 2024-06-02T00:00:00+02:00 --limit 10"
        )))
        .unwrap();
        assert_eq!(inv.env_file, Some(PathBuf::from("prod.env")));
        match inv.command {
            Command::Readings { actor, query, legacy } => {
                assert_eq!(actor, id(A));
                assert!(!legacy);
                assert_eq!(query.public_id, "air-1");
                assert_eq!(query.from, Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));
                assert_eq!(query.to, Some(Utc.with_ymd_and_hms(2024, 6, 1, 22, 0, 0).unwrap()));
                assert_eq!(query.limit.map(NonZeroU32::get), Some(10));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_privileged_commands() {
        assert_eq!(
            parse(args(&format!("set-tier --as {A} {B} premium"))).unwrap().command,
            Command::SetTier {
                actor: id(A),
                target: id(B),
                tier: Tier::Premium
            }
        );
        assert_eq!(
            parse(args(&format!("revoke-role {B} admin --as {A}"))).unwrap().command,
            Command::RevokeRole {
                actor: id(A),
                target: id(B),
                role: AppRole::Admin
            }
        );
    }

    #[test]
    fn roles_target_defaults_to_self() {
        assert_eq!(
            parse(args(&format!("roles --as {A}"))).unwrap().command,
            Command::Roles {
                actor: id(A),
                target: None
            }
        );
        assert_eq!(
            parse(args(&format!("roles --as {A} {B}"))).unwrap().command,
            Command::Roles {
                actor: id(A),
                target: Some(id(B))
            }
        );
        assert!(parse(args(&format!("roles --as {A} {B} {A}"))).is_err());
    }

    #[test]
    fn register_device_with_owner() {
        let cmd = parse(args(&format!("register-device --as {A} soil-9 SOIL Beds --owner {B}")))
            .unwrap()
            .command;
        assert_eq!(
            cmd,
            Command::RegisterDevice {
                actor: id(A),
                public_id: "soil-9".into(),
                device_type: DeviceType::Soil,
                name: "Beds".into(),
                owner: Some(id(B)),
            }
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(args("")).is_err());
        assert!(parse(args("frobnicate")).is_err());
        assert!(parse(args(&format!("set-tier {A} premium"))).unwrap_err().contains("--as"));
        assert!(parse(args(&format!("set-tier --as {A} {B} gold"))).is_err());
        assert!(parse(args(&format!("register-device --as {A} x air name"))).is_err());
        assert!(parse(args(&format!("devices --as {A} --legacy"))).is_err());
        assert!(parse(args(&format!("devices --as {A} --as {B}"))).is_err());
        assert!(parse(args("--env-file a --env-file b migrate")).is_err());
    }

    #[test]
    fn seed_demo_days_are_optional() {
        assert_eq!(parse(args("seed-demo")).unwrap().command, Command::SeedDemo { days: None });
        assert_eq!(
            parse(args("seed-demo 3")).unwrap().command,
            Command::SeedDemo { days: Some(3) }
        );
    }
}
