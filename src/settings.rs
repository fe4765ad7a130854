//! Key-value settings store (`app_settings`).
//!
//! Values are read on every call; nothing here is cached in process memory,
//! so an admin change takes effect on the next request.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::permissions::PermissionSet;

/// Setting holding the comma separated guest permission strings.
pub const GUEST_PERMISSIONS_KEY: &str = "guest_permissions";

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM app_settings WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(value)
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO app_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// Guest permission set: the stored override when present, otherwise
/// `defaults` from configuration. Malformed stored entries are skipped with
/// a warning so one bad value cannot lock guests out of everything.
pub fn guest_permissions(conn: &Connection, defaults: &PermissionSet) -> Result<PermissionSet> {
    let Some(raw) = get_setting(conn, GUEST_PERMISSIONS_KEY)? else {
        return Ok(defaults.clone());
    };

    let mut set = PermissionSet::empty();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        if let Err(e) = set.insert_str(entry) {
            log::warn!("Ignoring guest permission '{}': {}", entry, e);
        }
    }
    Ok(set)
}
