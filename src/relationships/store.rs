//! Persistence of `entity_relationships` rows.
//!
//! Callers never write their own orientation logic: [`exists`],
//! [`find_between`] and [`find_by_entity`] all match either slot order.
//! Database errors propagate as-is; nothing here retries.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{EntityRelationship, NewRelationship};
use crate::entities::{EntityRef, EntityType};
use crate::error::{PortalError, Result};

const SELECT_EDGES: &str = "SELECT id, relation_a_type, relation_a_id, relation_b_type, relation_b_id, \
     metadata_json, created_by, created_at FROM entity_relationships";

/// Edge between `?1:?2` and `?3:?4`, in either slot order.
const BETWEEN: &str = "((relation_a_type = ?1 AND relation_a_id = ?2 AND relation_b_type = ?3 AND relation_b_id = ?4) \
     OR (relation_a_type = ?3 AND relation_a_id = ?4 AND relation_b_type = ?1 AND relation_b_id = ?2))";

/// Edge with `?1:?2` on either side.
const TOUCHING: &str = "((relation_a_type = ?1 AND relation_a_id = ?2) \
     OR (relation_b_type = ?1 AND relation_b_id = ?2))";

/// Row as stored, before the type tags are checked against the registry.
struct StoredEdge {
    id: String,
    a_type: String,
    a_id: String,
    b_type: String,
    b_id: String,
    metadata_json: Option<String>,
    created_by: Option<String>,
    created_at: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<StoredEdge> {
    Ok(StoredEdge {
        id: row.get(0)?,
        a_type: row.get(1)?,
        a_id: row.get(2)?,
        b_type: row.get(3)?,
        b_id: row.get(4)?,
        metadata_json: row.get(5)?,
        created_by: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn decode_type(edge_id: &str, tag: &str) -> Result<EntityType> {
    tag.parse().map_err(|_| {
        PortalError::Integrity(format!(
            "relationship {} references unregistered entity type '{}'",
            edge_id, tag
        ))
    })
}

fn decode(stored: StoredEdge) -> Result<EntityRelationship> {
    let relation_a = EntityRef::new(decode_type(&stored.id, &stored.a_type)?, stored.a_id);
    let relation_b = EntityRef::new(decode_type(&stored.id, &stored.b_type)?, stored.b_id);
    let metadata = match stored.metadata_json {
        Some(raw) => Some(serde_json::from_str(&raw).map_err(|e| {
            PortalError::Integrity(format!("relationship {} has invalid metadata: {}", stored.id, e))
        })?),
        None => None,
    };
    Ok(EntityRelationship {
        id: stored.id,
        relation_a,
        relation_b,
        metadata,
        created_by: stored.created_by,
        created_at: stored.created_at,
    })
}

fn query_edges<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<EntityRelationship>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, read_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(decode(row?)?);
    }
    Ok(out)
}

/// True when any edge links `a` and `b`. Symmetric in its arguments.
pub fn exists(conn: &Connection, a: &EntityRef, b: &EntityRef) -> Result<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM entity_relationships WHERE {})", BETWEEN);
    let found: bool = conn.query_row(
        &sql,
        params![a.entity_type.as_str(), a.id, b.entity_type.as_str(), b.id],
        |row| row.get(0),
    )?;
    Ok(found)
}

/// Insert an edge unconditionally. Duplicate prevention is the caller's job.
pub fn create(conn: &Connection, new: NewRelationship) -> Result<EntityRelationship> {
    let id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    let metadata_json = new.metadata.as_ref().map(serde_json::to_string).transpose()?;

    conn.execute(
        "INSERT INTO entity_relationships (
            id, relation_a_type, relation_a_id, relation_b_type, relation_b_id,
            metadata_json, created_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            new.a.entity_type.as_str(),
            new.a.id,
            new.b.entity_type.as_str(),
            new.b.id,
            metadata_json,
            new.created_by,
            created_at,
        ],
    )?;

    log::debug!("Linked {} <-> {} ({})", new.a, new.b, id);

    Ok(EntityRelationship {
        id,
        relation_a: new.a,
        relation_b: new.b,
        metadata: new.metadata,
        created_by: new.created_by,
        created_at,
    })
}

/// All edges with `entity` on either side, newest first.
pub fn find_by_entity(conn: &Connection, entity: &EntityRef) -> Result<Vec<EntityRelationship>> {
    let sql = format!("{} WHERE {} ORDER BY created_at DESC, id", SELECT_EDGES, TOUCHING);
    query_edges(conn, &sql, params![entity.entity_type.as_str(), entity.id])
}

/// All edges linking `a` and `b` (more than one only if duplicates slipped in).
pub fn find_between(conn: &Connection, a: &EntityRef, b: &EntityRef) -> Result<Vec<EntityRelationship>> {
    let sql = format!("{} WHERE {} ORDER BY created_at, id", SELECT_EDGES, BETWEEN);
    query_edges(
        conn,
        &sql,
        params![a.entity_type.as_str(), a.id, b.entity_type.as_str(), b.id],
    )
}

pub fn get(conn: &Connection, edge_id: &str) -> Result<Option<EntityRelationship>> {
    let sql = format!("{} WHERE id = ?1", SELECT_EDGES);
    let stored = conn
        .query_row(&sql, params![edge_id], read_row)
        .optional()?;
    stored.map(decode).transpose()
}

/// Every edge, oldest first. Used by maintenance tooling.
pub fn all(conn: &Connection) -> Result<Vec<EntityRelationship>> {
    let sql = format!("{} ORDER BY created_at, id", SELECT_EDGES);
    query_edges(conn, &sql, [])
}

/// Hard delete. Returns whether a row was removed.
pub fn delete(conn: &Connection, edge_id: &str) -> Result<bool> {
    let rows = conn.execute("DELETE FROM entity_relationships WHERE id = ?1", params![edge_id])?;
    if rows > 0 {
        log::debug!("Unlinked relationship {}", edge_id);
    }
    Ok(rows > 0)
}

/// Edge counts per unordered type pair, e.g. `(receipt, transaction) -> 12`.
pub fn count_by_type_pair(conn: &Connection) -> Result<Vec<(String, String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT MIN(relation_a_type, relation_b_type) AS t1,
                MAX(relation_a_type, relation_b_type) AS t2,
                COUNT(*) AS n
         FROM entity_relationships
         GROUP BY t1, t2
         ORDER BY n DESC, t1, t2",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::migrated_connection;
    use serde_json::json;

    fn r(t: EntityType, id: &str) -> EntityRef {
        EntityRef::new(t, id)
    }

    #[test]
    fn test_exists_is_orientation_symmetric() {
        let conn = migrated_connection();
        let receipt = r(EntityType::Receipt, "R1");
        let tx = r(EntityType::Transaction, "T1");
        assert!(!exists(&conn, &receipt, &tx).unwrap());

        create(&conn, NewRelationship::by_user(receipt.clone(), tx.clone(), Some("u1"))).unwrap();

        assert!(exists(&conn, &receipt, &tx).unwrap());
        assert!(exists(&conn, &tx, &receipt).unwrap());
        assert!(!exists(&conn, &receipt, &r(EntityType::Transaction, "T2")).unwrap());
    }

    #[test]
    fn test_exists_symmetric_over_many_pairs() {
        let conn = migrated_connection();
        let refs = [
            r(EntityType::Budget, "B1"),
            r(EntityType::Transaction, "T1"),
            r(EntityType::News, "N1"),
            r(EntityType::Event, "E1"),
        ];
        create(&conn, NewRelationship::by_user(refs[0].clone(), refs[1].clone(), None)).unwrap();
        create(&conn, NewRelationship::by_user(refs[3].clone(), refs[2].clone(), None)).unwrap();

        for a in &refs {
            for b in &refs {
                assert_eq!(exists(&conn, a, b).unwrap(), exists(&conn, b, a).unwrap(), "{} / {}", a, b);
            }
        }
    }

    #[test]
    fn test_create_does_not_deduplicate() {
        let conn = migrated_connection();
        let a = r(EntityType::Budget, "B1");
        let b = r(EntityType::Transaction, "T1");
        create(&conn, NewRelationship::by_user(a.clone(), b.clone(), None)).unwrap();
        create(&conn, NewRelationship::by_user(b.clone(), a.clone(), None)).unwrap();
        assert_eq!(find_between(&conn, &a, &b).unwrap().len(), 2);
    }

    #[test]
    fn test_find_by_entity_matches_both_slots() {
        let conn = migrated_connection();
        let budget = r(EntityType::Budget, "B1");
        create(&conn, NewRelationship::by_user(budget.clone(), r(EntityType::Transaction, "T1"), None)).unwrap();
        create(&conn, NewRelationship::by_user(r(EntityType::Receipt, "R1"), budget.clone(), None)).unwrap();
        create(&conn, NewRelationship::by_user(r(EntityType::Receipt, "R2"), r(EntityType::Transaction, "T2"), None)).unwrap();

        let edges = find_by_entity(&conn, &budget).unwrap();
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e.touches(&budget)));
    }

    #[test]
    fn test_metadata_and_creator_round_trip() {
        let conn = migrated_connection();
        let created = create(
            &conn,
            NewRelationship {
                a: r(EntityType::Receipt, "R1"),
                b: r(EntityType::Reimbursement, "M1"),
                metadata: Some(json!({"aiCreated": true, "confidence": 0.8})),
                created_by: None,
            },
        )
        .unwrap();
        let loaded = get(&conn, &created.id).unwrap().unwrap();
        assert_eq!(loaded, created);
        assert!(loaded.is_ai_created());
        assert!(loaded.created_by.is_none());
    }

    #[test]
    fn test_delete_is_hard() {
        let conn = migrated_connection();
        let a = r(EntityType::Poll, "P1");
        let b = r(EntityType::News, "N1");
        let edge = create(&conn, NewRelationship::by_user(a.clone(), b.clone(), None)).unwrap();
        assert!(delete(&conn, &edge.id).unwrap());
        assert!(!delete(&conn, &edge.id).unwrap());
        assert!(!exists(&conn, &a, &b).unwrap());
        assert!(get(&conn, &edge.id).unwrap().is_none());
    }

    #[test]
    fn test_unknown_type_tag_is_integrity_error() {
        let conn = migrated_connection();
        let budget = r(EntityType::Budget, "B1");
        conn.execute(
            "INSERT INTO entity_relationships (id, relation_a_type, relation_a_id, relation_b_type, relation_b_id, created_at)
             VALUES ('bad', 'budget', 'B1', 'invoice', 'I1', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let err = find_by_entity(&conn, &budget).unwrap_err();
        assert!(matches!(err, PortalError::Integrity(ref m) if m.contains("invoice")));
    }

    #[test]
    fn test_count_by_type_pair_is_unordered() {
        let conn = migrated_connection();
        create(&conn, NewRelationship::by_user(r(EntityType::Receipt, "R1"), r(EntityType::Transaction, "T1"), None)).unwrap();
        create(&conn, NewRelationship::by_user(r(EntityType::Transaction, "T2"), r(EntityType::Receipt, "R2"), None)).unwrap();
        create(&conn, NewRelationship::by_user(r(EntityType::Event, "E1"), r(EntityType::News, "N1"), None)).unwrap();

        let counts = count_by_type_pair(&conn).unwrap();
        assert_eq!(counts[0], ("receipt".to_string(), "transaction".to_string(), 2));
        assert_eq!(counts.len(), 2);
    }
}
