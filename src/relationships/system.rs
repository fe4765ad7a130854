//! Links created by the system rather than by a user.

use rusqlite::Connection;
use serde_json::json;

use super::{store, EntityRelationship, NewRelationship, AI_CREATED_KEY};
use crate::entities::{repo, EntityRef};
use crate::error::{PortalError, Result};

/// Record a link suggested by the analyzer.
///
/// The edge has no creator and carries `{aiCreated, confidence, reasoning}`
/// as metadata. Returns `None` when the two entities are already linked.
pub fn record_suggestion(
    conn: &Connection,
    a: &EntityRef,
    b: &EntityRef,
    confidence: f64,
    reasoning: &str,
) -> Result<Option<EntityRelationship>> {
    if !(0.0..=1.0).contains(&confidence) {
        return Err(PortalError::InvalidInput(format!(
            "confidence must be between 0 and 1, got {}",
            confidence
        )));
    }
    if a == b {
        return Err(PortalError::InvalidInput(format!("cannot link {} to itself", a)));
    }
    for side in [a, b] {
        repo::require(conn, side.entity_type, &side.id)?;
    }

    if store::exists(conn, a, b)? {
        log::debug!("Suggestion {} <-> {} already linked", a, b);
        return Ok(None);
    }

    let edge = store::create(
        conn,
        NewRelationship {
            a: a.clone(),
            b: b.clone(),
            metadata: Some(json!({
                AI_CREATED_KEY: true,
                "confidence": confidence,
                "reasoning": reasoning,
            })),
            created_by: None,
        },
    )?;
    log::info!("Recorded suggested link {} <-> {} (confidence {:.2})", a, b, confidence);
    Ok(Some(edge))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::EntityType;
    use crate::test_support::{insert_entity_with_id, migrated_connection};

    fn setup() -> (Connection, EntityRef, EntityRef) {
        let conn = migrated_connection();
        insert_entity_with_id(&conn, EntityType::Receipt, "R1", Some("active"), None);
        insert_entity_with_id(&conn, EntityType::Transaction, "T1", Some("complete"), None);
        (
            conn,
            EntityRef::new(EntityType::Receipt, "R1"),
            EntityRef::new(EntityType::Transaction, "T1"),
        )
    }

    #[test]
    fn test_suggestion_is_system_edge() {
        let (conn, receipt, tx) = setup();
        let edge = record_suggestion(&conn, &receipt, &tx, 0.92, "same amount and date")
            .unwrap()
            .unwrap();
        assert!(edge.created_by.is_none());
        assert!(edge.is_ai_created());
        let metadata = edge.metadata.unwrap();
        assert_eq!(metadata["reasoning"], "same amount and date");
    }

    #[test]
    fn test_existing_link_is_not_duplicated() {
        let (conn, receipt, tx) = setup();
        record_suggestion(&conn, &receipt, &tx, 0.5, "first").unwrap();
        assert!(record_suggestion(&conn, &tx, &receipt, 0.9, "second").unwrap().is_none());
        assert_eq!(store::find_between(&conn, &receipt, &tx).unwrap().len(), 1);
    }

    #[test]
    fn test_rejects_bad_input() {
        let (conn, receipt, tx) = setup();
        assert!(matches!(
            record_suggestion(&conn, &receipt, &tx, 1.5, ""),
            Err(PortalError::InvalidInput(_))
        ));
        assert!(matches!(
            record_suggestion(&conn, &receipt, &receipt, 0.5, ""),
            Err(PortalError::InvalidInput(_))
        ));
        let missing = EntityRef::new(EntityType::Transaction, "T404");
        assert!(matches!(
            record_suggestion(&conn, &receipt, &missing, 0.5, ""),
            Err(PortalError::NotFound(_))
        ));
    }
}
