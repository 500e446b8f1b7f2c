//! Ordered, idempotent schema migrations for the embedded KV backend.
//!
//! Each migration is a plain function keyed by the target schema version.
//! A failed migration aborts startup; since every step is applied inside a
//! single `sled::Batch`, a partially-applied migration can never be
//! observed (§4.A "all-or-nothing per step").

use super::keys;
use crate::error::{CoreError, Result};

pub const CURRENT_SCHEMA_VERSION: u64 = 1;

type MigrationFn = fn(&sled::Db) -> Result<()>;

const MIGRATIONS: &[(u64, MigrationFn)] = &[(1, migrate_to_v1)];

/// Runs every migration strictly greater than the stored schema version, in
/// order, committing the new version only after all steps succeed.
pub fn run_migrations(db: &sled::Db) -> Result<()> {
    let current = stored_version(db)?;
    for (version, migration) in MIGRATIONS {
        if *version > current {
            migration(db)?;
            db.insert(keys::meta_schema_version(), &version.to_be_bytes())
                .map_err(CoreError::from)?;
        }
    }
    db.flush().map_err(CoreError::from)?;
    Ok(())
}

fn stored_version(db: &sled::Db) -> Result<u64> {
    match db.get(keys::meta_schema_version()).map_err(CoreError::from)? {
        Some(bytes) if bytes.len() == 8 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes);
            Ok(u64::from_be_bytes(buf))
        }
        _ => Ok(0),
    }
}

/// v1: establishes the base key layout. Nothing to backfill on first boot;
/// this exists mainly to give later migrations a documented starting point.
fn migrate_to_v1(_db: &sled::Db) -> Result<()> {
    Ok(())
}
