//! Picker data: for each requested counterpart type, what is already linked to
//! an entity and what could still be linked.

use std::collections::{BTreeMap, HashMap, HashSet};

use rusqlite::Connection;
use serde::Serialize;

use super::store;
use crate::entities::{repo, Entity, EntityRef, EntityType};
use crate::error::Result;
use crate::permissions::{self, Action, Actor};

/// Caller-filtered candidate entities per counterpart type.
pub type CandidatePools = HashMap<EntityType, Vec<Entity>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RelationshipGroup {
    pub linked: Vec<Entity>,
    pub available: Vec<Entity>,
    /// Linked counterparts left out because the actor may not read them.
    pub hidden: usize,
}

/// An edge whose counterpart row no longer exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingEdge {
    pub edge_id: String,
    pub missing: EntityRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadedRelationships {
    /// One entry for every requested counterpart type.
    pub groups: BTreeMap<EntityType, RelationshipGroup>,
    pub dangling: Vec<DanglingEdge>,
    /// Whether the actor may change these links. Always `false` from [`load`].
    pub editable: bool,
}

impl LoadedRelationships {
    pub fn group(&self, entity_type: EntityType) -> Option<&RelationshipGroup> {
        self.groups.get(&entity_type)
    }

    pub fn linked_ids(&self, entity_type: EntityType) -> Vec<&str> {
        self.group(entity_type)
            .map(|g| g.linked.iter().map(|e| e.id.as_str()).collect())
            .unwrap_or_default()
    }
}

/// Group the links of `subject` by counterpart type.
///
/// Edges pointing at rows that no longer exist are left out of `linked`,
/// logged and listed in `dangling`; deleting an entity does not cascade to its
/// edges, so they are expected rather than an error.
pub fn load(
    conn: &Connection,
    subject: &EntityRef,
    counterparts: &[EntityType],
    pools: &CandidatePools,
) -> Result<LoadedRelationships> {
    let wanted: HashSet<EntityType> = counterparts.iter().copied().collect();
    let mut loaded = LoadedRelationships::default();
    for t in counterparts {
        loaded.groups.entry(*t).or_default();
    }

    let mut seen: HashSet<EntityRef> = HashSet::new();
    for edge in store::find_by_entity(conn, subject)? {
        let Some(other) = edge.other_side(subject) else {
            continue;
        };
        if !wanted.contains(&other.entity_type) || !seen.insert(other.clone()) {
            continue;
        }
        match repo::get_by_id(conn, other.entity_type, &other.id)? {
            Some(entity) => {
                if let Some(group) = loaded.groups.get_mut(&other.entity_type) {
                    group.linked.push(entity);
                }
            }
            None => {
                log::warn!("Relationship {} of {} points at missing {}", edge.id, subject, other);
                loaded.dangling.push(DanglingEdge {
                    edge_id: edge.id.clone(),
                    missing: other.clone(),
                });
            }
        }
    }

    for (entity_type, group) in loaded.groups.iter_mut() {
        let linked: HashSet<&str> = group.linked.iter().map(|e| e.id.as_str()).collect();
        group.available = pools
            .get(entity_type)
            .map(|pool| {
                pool.iter()
                    .filter(|e| !linked.contains(e.id.as_str()))
                    .filter(|e| !(e.entity_type == subject.entity_type && e.id == subject.id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
    }

    Ok(loaded)
}

/// Candidates of `entity_type` the actor may pick: every row with the general
/// `read` permission, the actor's own rows with `read-self`, otherwise none.
pub fn candidate_pool(conn: &Connection, actor: &Actor, entity_type: EntityType) -> Result<Vec<Entity>> {
    let schema = entity_type.schema();
    if actor.can(&schema.permission(Action::Read)) {
        return repo::list(conn, entity_type);
    }
    match actor.id() {
        Some(id) if schema.supports_self_ownership() && actor.can(&schema.self_permission(Action::Read)) => {
            repo::list_created_by(conn, entity_type, id)
        }
        _ => Ok(Vec::new()),
    }
}

/// Whether `actor` may read `entity` (general `read`, or `read-self` on an
/// entity the actor owns).
pub fn is_visible(actor: &Actor, entity: &Entity) -> bool {
    permissions::can_access(actor, entity.schema(), Action::Read, entity.owner_id())
}

/// [`load`] with pools computed for `actor`, after checking the actor may see
/// the subject at all. Linked counterparts the actor may not read are
/// dropped and only counted in [`RelationshipGroup::hidden`].
pub fn load_for_actor(
    conn: &Connection,
    actor: &Actor,
    subject: &EntityRef,
    counterparts: &[EntityType],
) -> Result<LoadedRelationships> {
    let entity = repo::require(conn, subject.entity_type, &subject.id)?;
    permissions::require_entity_action(actor, &entity, Action::Read)?;

    let mut pools = CandidatePools::new();
    for t in counterparts {
        pools.insert(*t, candidate_pool(conn, actor, *t)?);
    }

    let mut loaded = load(conn, subject, counterparts, &pools)?;
    for group in loaded.groups.values_mut() {
        let before = group.linked.len();
        group.linked.retain(|e| is_visible(actor, e));
        group.hidden = before - group.linked.len();
    }
    loaded.editable = permissions::can_access(actor, entity.schema(), Action::Update, entity.owner_id());
    Ok(loaded)
}

/// Every edge with a side that no longer resolves.
pub fn find_dangling(conn: &Connection) -> Result<Vec<DanglingEdge>> {
    let mut dangling = Vec::new();
    let mut known: HashMap<EntityRef, bool> = HashMap::new();
    for edge in store::all(conn)? {
        for side in [&edge.relation_a, &edge.relation_b] {
            let present = match known.get(side) {
                Some(present) => *present,
                None => {
                    let present = repo::get_by_id(conn, side.entity_type, &side.id)?.is_some();
                    known.insert(side.clone(), present);
                    present
                }
            };
            if !present {
                dangling.push(DanglingEdge {
                    edge_id: edge.id.clone(),
                    missing: side.clone(),
                });
            }
        }
    }
    Ok(dangling)
}
