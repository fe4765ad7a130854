use rusqlite::{params, Connection, OptionalExtension};

use super::{Actor, PermissionSet};
use crate::error::{PortalError, Result};
use crate::settings;

/// Resolve who is acting for this request.
///
/// `None` yields the guest tier (stored override or `guest_defaults`). A user
/// id yields the union of that user's role permissions; an id with no user
/// row is rejected. Called once per request and never cached, so role
/// changes apply to the very next request.
pub fn resolve_actor(conn: &Connection, user_id: Option<&str>, guest_defaults: &PermissionSet) -> Result<Actor> {
    let Some(user_id) = user_id.map(str::trim).filter(|id| !id.is_empty()) else {
        return Ok(Actor::guest(settings::guest_permissions(conn, guest_defaults)?));
    };

    let known = conn
        .query_row("SELECT 1 FROM users WHERE id = ?1", params![user_id], |_| Ok(()))
        .optional()?
        .is_some();
    if !known {
        return Err(PortalError::Forbidden(format!("unknown user {}", user_id)));
    }

    let mut stmt = conn.prepare(
        "SELECT DISTINCT rp.permission
         FROM user_roles ur
         JOIN role_permissions rp ON rp.role_id = ur.role_id
         WHERE ur.user_id = ?1",
    )?;
    let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;

    let mut permissions = PermissionSet::empty();
    for row in rows {
        let raw = row?;
        if let Err(e) = permissions.insert_str(&raw) {
            log::warn!("Skipping malformed permission '{}' for user {}: {}", raw, user_id, e);
        }
    }

    Ok(Actor::user(user_id, permissions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{migrated_connection, seed_user};

    #[test]
    fn test_guest_gets_default_set() {
        let conn = migrated_connection();
        let defaults = PermissionSet::parse_all(&["news:read"]).unwrap();
        let actor = resolve_actor(&conn, None, &defaults).unwrap();
        assert!(actor.is_guest());
        assert!(actor.can(&"news:read".parse().unwrap()));

        let blank = resolve_actor(&conn, Some("  "), &defaults).unwrap();
        assert!(blank.is_guest());
    }

    #[test]
    fn test_user_permissions_from_roles() {
        let conn = migrated_connection();
        seed_user(&conn, "u1", &["treasury:budgets:update-self", "news:read", "not a permission"]);
        let actor = resolve_actor(&conn, Some("u1"), &PermissionSet::empty()).unwrap();
        assert_eq!(actor.id(), Some("u1"));
        assert!(actor.can(&"treasury:budgets:update-self".parse().unwrap()));
        assert!(!actor.can(&"treasury:budgets:update".parse().unwrap()));
    }

    #[test]
    fn test_admin_verbs_resolve_without_granting_reads() {
        let conn = migrated_connection();
        seed_user(&conn, "u1", &["treasury:transactions:export", "committee:email:manage"]);
        let actor = resolve_actor(&conn, Some("u1"), &PermissionSet::empty()).unwrap();
        assert_eq!(actor.permissions().to_strings().len(), 2);
        assert!(!actor.can(&"treasury:transactions:read".parse().unwrap()));
        assert!(!actor.can(&"committee:email:update".parse().unwrap()));
    }

    #[test]
    fn test_unknown_user_forbidden() {
        let conn = migrated_connection();
        let err = resolve_actor(&conn, Some("ghost"), &PermissionSet::empty()).unwrap_err();
        assert!(matches!(err, PortalError::Forbidden(_)));
    }

    #[test]
    fn test_role_change_visible_on_next_resolve() {
        let conn = migrated_connection();
        seed_user(&conn, "u1", &[]);
        let before = resolve_actor(&conn, Some("u1"), &PermissionSet::empty()).unwrap();
        assert!(before.permissions().is_empty());

        conn.execute(
            "INSERT INTO role_permissions (role_id, permission) VALUES ('role-u1', '*')",
            [],
        )
        .unwrap();
        let after = resolve_actor(&conn, Some("u1"), &PermissionSet::empty()).unwrap();
        assert!(after.permissions().is_wildcard());
    }
}
