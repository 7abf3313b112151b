pub mod models {
    pub mod access;
    pub mod measurements;
}

pub mod cli;
pub mod config;
pub mod db {
    pub mod models;
    #[cfg(test)]
    mod engine_policies;
    #[cfg(test)]
    pub mod testing;
}
pub mod envfile;
pub mod error;
pub mod policy;
pub mod schema;
pub mod services {
    pub mod demo;
    pub mod devices;
    pub mod entitlements;
    pub mod ingest;
    pub mod profiles;
    pub mod readings;
    pub mod registration;
    pub mod roles;
}

use crate::cli::{Command, Invocation};
use crate::config::Config;
use crate::models::access::CallerId;
use crate::policy::is_premium;
use crate::services::{demo, devices, entitlements, ingest, profiles, readings, registration, roles};
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{error, info, warn};
use serde::Serialize;
use std::io::{BufRead, Write};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

fn apply_database_migrations(conn: &mut PgConnection) -> Result<(), String> {
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) => {
            if applied.is_empty() {
                info!("Database schema is up to date; no migrations were applied");
            } else {
                let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                info!("Applied {} database migration(s): {}", applied.len(), names);
            }
            Ok(())
        }
        Err(e) => Err(format!("Applying database migrations failed: {}", e)),
    }
}

fn print_json<T: Serialize>(out: &mut impl Write, value: &T) -> Result<(), String> {
    serde_json::to_writer(&mut *out, value).map_err(|e| format!("encoding output failed: {}", e))?;
    writeln!(out).map_err(|e| format!("writing output failed: {}", e))
}

fn resolve(conn: &mut PgConnection, caller: CallerId) -> Result<models::access::Entitlement, String> {
    entitlements::resolve(conn, caller).map_err(|e| format!("resolving {} failed: {}", caller, e))
}

pub fn run(invocation: Invocation) -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (run_migrations={}, readings_max_limit={}, demo_seed_days={})",
        cfg.run_migrations,
        cfg.readings_max_limit.get(),
        cfg.demo_seed_days
    );

    // 2) Connect DB
    let mut conn = PgConnection::establish(&cfg.database_url).map_err(|e| format!("DB connection failed: {}", e))?;
    info!("Connected to database");

    // 3) Apply pending database migrations
    if cfg.run_migrations || invocation.command == Command::Migrate {
        apply_database_migrations(&mut conn)?;
    } else {
        info!("Skipping migrations via RUN_MIGRATIONS={}", cfg.run_migrations);
    }

    // 4) Execute the command on behalf of its explicit caller
    execute(&mut conn, &cfg, invocation.command)
}

fn execute(conn: &mut PgConnection, cfg: &Config, command: Command) -> Result<(), String> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match command {
        Command::Migrate => Ok(()),
        Command::Provision {
            caller,
            email,
            display_name,
        } => {
            let profile = registration::provision_profile(conn, caller, email, display_name)
                .map_err(|e| format!("provisioning {} failed: {}", caller, e))?;
            print_json(&mut out, &profile)
        }
        Command::SetTier { actor, target, tier } => {
            let ent = resolve(conn, actor)?;
            let profile = profiles::set_tier(conn, &ent, target, tier).map_err(|e| e.to_string())?;
            print_json(&mut out, &profile)
        }
        Command::SetAdmin {
            actor,
            target,
            is_admin,
        } => {
            let ent = resolve(conn, actor)?;
            let profile = profiles::set_admin(conn, &ent, target, is_admin).map_err(|e| e.to_string())?;
            print_json(&mut out, &profile)
        }
        Command::GrantRole { actor, target, role } => {
            let ent = resolve(conn, actor)?;
            let changed = roles::grant_role(conn, &ent, target, role).map_err(|e| e.to_string())?;
            if !changed {
                info!("{} already holds role {}", target, role);
            }
            Ok(())
        }
        Command::RevokeRole { actor, target, role } => {
            let ent = resolve(conn, actor)?;
            let changed = roles::revoke_role(conn, &ent, target, role).map_err(|e| e.to_string())?;
            if !changed {
                warn!("{} did not hold role {}", target, role);
            }
            Ok(())
        }
        Command::Roles { actor, target } => {
            let ent = resolve(conn, actor)?;
            let target = target.unwrap_or(actor);
            let held = roles::list_roles(conn, &ent, target).map_err(|e| e.to_string())?;
            print_json(&mut out, &serde_json::json!({ "user_id": target, "roles": held }))
        }
        Command::RegisterDevice {
            actor,
            public_id,
            device_type,
            name,
            owner,
        } => {
            let ent = resolve(conn, actor)?;
            let registration = devices::DeviceRegistration {
                public_id,
                name,
                device_type,
                owner,
            };
            let device = devices::register_device(conn, &ent, registration).map_err(|e| e.to_string())?;
            print_json(&mut out, &device)
        }
        Command::RenameDevice { actor, public_id, name } => {
            let ent = resolve(conn, actor)?;
            let device = devices::rename_device(conn, &ent, &public_id, &name).map_err(|e| e.to_string())?;
            print_json(&mut out, &device)
        }
        Command::Whoami { actor } => {
            let ent = resolve(conn, actor)?;
            let premium = is_premium(&ent);
            print_json(
                &mut out,
                &serde_json::json!({ "entitlement": ent, "is_premium": premium }),
            )
        }
        Command::Devices { actor } => {
            let ent = resolve(conn, actor)?;
            for device in devices::list_devices(conn, &ent).map_err(|e| e.to_string())? {
                let kind = device.kind().map_err(|e| format!("device {}: {}", device.public_id, e))?;
                writeln!(out, "{}\t{}\t{}\t{}", device.public_id, kind, device.owner(), device.name)
                    .map_err(|e| format!("writing output failed: {}", e))?;
            }
            Ok(())
        }
        Command::Ingest {
            actor,
            public_id,
            legacy,
        } => {
            let ent = resolve(conn, actor)?;
            let mut appended = 0;
            for (index, line) in std::io::stdin().lock().lines().enumerate() {
                let line = line.map_err(|e| format!("reading stdin failed: {}", e))?;
                if line.trim().is_empty() {
                    continue;
                }
                let at = |e: serde_json::Error| format!("stdin line {}: {}", index + 1, e);
                let result = if legacy {
                    let row: ingest::LegacyLine = serde_json::from_str(&line).map_err(at)?;
                    row.checked().and_then(|(time, values)| {
                        ingest::append_legacy_reading(conn, &ent, &public_id, time, values)
                    })
                } else {
                    let row: ingest::ReadingLine = serde_json::from_str(&line).map_err(at)?;
                    row.checked()
                        .and_then(|(time, values)| ingest::append_reading(conn, &ent, &public_id, time, values))
                };
                appended += result.map_err(|e| format!("stdin line {}: {}", index + 1, e))?;
            }
            info!("Ingested {} row(s) into {}", appended, public_id);
            Ok(())
        }
        Command::Readings { actor, query, legacy } => {
            let ent = resolve(conn, actor)?;
            let query = query.to_query();
            if legacy {
                let rows = readings::legacy_readings(conn, &ent, &query, cfg.readings_max_limit)
                    .map_err(|e| e.to_string())?;
                rows.iter().try_for_each(|r| print_json(&mut out, r))
            } else {
                let rows = readings::masked_readings(conn, &ent, &query, cfg.readings_max_limit)
                    .map_err(|e| e.to_string())?;
                rows.iter().try_for_each(|r| print_json(&mut out, r))
            }
        }
        Command::SeedDemo { days } => {
            let days = days.unwrap_or(cfg.demo_seed_days);
            let summary = demo::seed(conn, days).map_err(|e| format!("demo seeding failed: {}", e))?;
            info!(
                "Demo device {} owned by {} has {} new reading(s) covering {} day(s)",
                demo::DEMO_DEVICE,
                demo::DEMO_OWNER,
                summary.inserted,
                summary.days
            );
            Ok(())
        }
    }
}

fn main() {
    let invocation = match cli::parse(std::env::args().skip(1).collect()) {
        Ok(inv) => inv,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(2);
        }
    };

    let loaded_env = match envfile::load(invocation.env_file.clone()) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "sensor-tiers {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(invocation) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
