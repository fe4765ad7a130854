//! Entity relationship graph: edge storage, the picker loader, the save/diff
//! engine and the post-update pipeline that ties them to entity writes.
//!
//! Edges are undirected in meaning but stored with a fixed A/B slot order.
//! Every lookup that touches an entity goes through [`store`], which is the
//! only place that knows an edge can match from either side.

pub mod auto_publish;
pub mod context;
pub mod diff;
pub mod loader;
pub mod pipeline;
pub mod save;
pub mod store;
pub mod system;

pub use context::RelationshipContext;
pub use diff::{diff, parse_slots, RelationshipDiff, SlotSubmission};
pub use loader::{load, load_for_actor, DanglingEdge, LoadedRelationships, RelationshipGroup};
pub use pipeline::{create_draft, update_entity, DraftOutcome, UpdateOutcome, UpdateStage};
pub use save::{save, SaveOutcome};
pub use system::record_suggestion;

use serde::Serialize;
use serde_json::Value;

use crate::entities::EntityRef;

/// Metadata key marking an edge created by the automated analyzer.
pub const AI_CREATED_KEY: &str = "aiCreated";

/// A stored link between two entities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRelationship {
    pub id: String,
    pub relation_a: EntityRef,
    pub relation_b: EntityRef,
    /// Opaque to the store.
    pub metadata: Option<Value>,
    /// `None` for system-created edges.
    pub created_by: Option<String>,
    pub created_at: String,
}

impl EntityRelationship {
    pub fn touches(&self, entity: &EntityRef) -> bool {
        &self.relation_a == entity || &self.relation_b == entity
    }

    /// The side that is not `entity`, or `None` when the edge does not touch it.
    pub fn other_side(&self, entity: &EntityRef) -> Option<&EntityRef> {
        if &self.relation_a == entity {
            Some(&self.relation_b)
        } else if &self.relation_b == entity {
            Some(&self.relation_a)
        } else {
            None
        }
    }

    pub fn is_ai_created(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(AI_CREATED_KEY))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Input for [`store::create`].
#[derive(Debug, Clone)]
pub struct NewRelationship {
    pub a: EntityRef,
    pub b: EntityRef,
    pub metadata: Option<Value>,
    pub created_by: Option<String>,
}

impl NewRelationship {
    /// Link created by a user action.
    pub fn by_user(a: EntityRef, b: EntityRef, created_by: Option<&str>) -> Self {
        Self {
            a,
            b,
            metadata: None,
            created_by: created_by.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::EntityType;
    use serde_json::json;

    fn edge(metadata: Option<Value>) -> EntityRelationship {
        EntityRelationship {
            id: "e1".into(),
            relation_a: EntityRef::new(EntityType::Receipt, "R1"),
            relation_b: EntityRef::new(EntityType::Transaction, "T1"),
            metadata,
            created_by: None,
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn test_other_side_from_either_slot() {
        let e = edge(None);
        let receipt = EntityRef::new(EntityType::Receipt, "R1");
        let tx = EntityRef::new(EntityType::Transaction, "T1");
        assert_eq!(e.other_side(&receipt), Some(&tx));
        assert_eq!(e.other_side(&tx), Some(&receipt));
        assert_eq!(e.other_side(&EntityRef::new(EntityType::Budget, "B1")), None);
    }

    #[test]
    fn test_ai_created_flag() {
        assert!(edge(Some(json!({"aiCreated": true, "confidence": 0.9}))).is_ai_created());
        assert!(!edge(Some(json!({"note": "manual"}))).is_ai_created());
        assert!(!edge(None).is_ai_created());
    }
}
