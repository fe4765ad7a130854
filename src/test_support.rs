//! Shared fixtures for unit tests.

use std::path::Path;

use rusqlite::{params, Connection};

use crate::db::migrate;
use crate::entities::{repo, Entity, EntityType, FieldValues, NewEntity};

/// In-memory database with every migration applied.
pub fn migrated_connection() -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
    migrate::run_migrations(&mut conn, &migrations_dir).unwrap();
    conn
}

/// User `id` with a private role `role-{id}` holding `permissions`.
pub fn seed_user(conn: &Connection, id: &str, permissions: &[&str]) {
    let role_id = format!("role-{}", id);
    conn.execute(
        "INSERT INTO users (id, email, name) VALUES (?1, ?2, ?1)",
        params![id, format!("{}@example.test", id)],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO roles (id, name) VALUES (?1, ?1)",
        params![role_id],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO user_roles (user_id, role_id) VALUES (?1, ?2)",
        params![id, role_id],
    )
    .unwrap();
    for permission in permissions {
        conn.execute(
            "INSERT INTO role_permissions (role_id, permission) VALUES (?1, ?2)",
            params![role_id, permission],
        )
        .unwrap();
    }
}

pub fn insert_entity(
    conn: &Connection,
    entity_type: EntityType,
    fields: &[(&str, &str)],
    status: Option<&str>,
    created_by: Option<&str>,
) -> Entity {
    let fields: FieldValues = fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    repo::create(
        conn,
        entity_type,
        NewEntity {
            fields,
            status: status.map(str::to_string),
            created_by: created_by.map(str::to_string),
        },
    )
    .unwrap()
}

/// Insert an entity row with a fixed id (for readable scenario tests).
pub fn insert_entity_with_id(
    conn: &Connection,
    entity_type: EntityType,
    id: &str,
    status: Option<&str>,
    created_by: Option<&str>,
) {
    let table = entity_type.schema().table;
    conn.execute(
        &format!(
            "INSERT INTO {} (id, status, created_by, created_at, updated_at) \
             VALUES (?1, ?2, ?3, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
            table
        ),
        params![id, status, created_by],
    )
    .unwrap();
}
