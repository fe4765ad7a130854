//! Turning a submitted form into the set of links it asks for, and comparing
//! that against what is stored.

use std::collections::HashSet;

use super::EntityRelationship;
use crate::entities::{EntityRef, EntityType};
use crate::error::{PortalError, Result};
use crate::forms::{FormData, RELATION_KEY_PREFIX, RELATION_SLOT_KEY, SOURCE_ID_KEY, SOURCE_TYPE_KEY};

/// One picker section as submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSubmission {
    pub counterpart: EntityType,
    /// `Some(1)` for single-select pickers.
    pub max_items: Option<usize>,
    /// Selected ids, deduplicated, in submission order. Empty clears the slot.
    pub ids: Vec<String>,
}

impl SlotSubmission {
    pub fn desired(&self) -> impl Iterator<Item = EntityRef> + '_ {
        self.ids.iter().map(move |id| EntityRef::new(self.counterpart, id.clone()))
    }
}

fn parse_declaration(raw: &str) -> Result<(EntityType, Option<usize>)> {
    let raw = raw.trim();
    let (tag, max) = match raw.split_once(':') {
        Some((tag, max)) => {
            let max: usize = max
                .trim()
                .parse()
                .ok()
                .filter(|m| *m > 0)
                .ok_or_else(|| PortalError::InvalidInput(format!("invalid slot size in '{}'", raw)))?;
            (tag, Some(max))
        }
        None => (raw, None),
    };
    Ok((tag.trim().parse()?, max))
}

/// Read every relationship slot out of a form.
///
/// A slot exists when it is declared through `_relations` or when any
/// `relation:<type>` key is present. Declared slots with no ids are returned
/// with an empty list so the caller can clear them.
pub fn parse_slots(form: &FormData) -> Result<Vec<SlotSubmission>> {
    let mut slots: Vec<SlotSubmission> = Vec::new();

    let mut declare = |counterpart: EntityType, max_items: Option<usize>| {
        if !slots.iter().any(|s| s.counterpart == counterpart) {
            slots.push(SlotSubmission {
                counterpart,
                max_items,
                ids: Vec::new(),
            });
        }
    };

    for raw in form.get_all(RELATION_SLOT_KEY) {
        let (counterpart, max_items) = parse_declaration(raw)?;
        declare(counterpart, max_items);
    }
    for (key, _) in form.iter() {
        if let Some(tag) = key.strip_prefix(RELATION_KEY_PREFIX) {
            declare(tag.parse()?, None);
        }
    }

    for slot in &mut slots {
        let key = format!("{}{}", RELATION_KEY_PREFIX, slot.counterpart);
        let mut seen = HashSet::new();
        slot.ids = form
            .get_all(&key)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .filter(|id| seen.insert(id.to_string()))
            .map(str::to_string)
            .collect();

        if let Some(max) = slot.max_items {
            if slot.ids.len() > max {
                return Err(PortalError::validation(
                    "relationships",
                    key,
                    format!("at most {} item(s) allowed, got {}", max, slot.ids.len()),
                ));
            }
        }
    }

    Ok(slots)
}

/// The `_sourceType` / `_sourceId` pair, if the form carries one.
pub fn source_context(form: &FormData) -> Result<Option<EntityRef>> {
    let source_type = form.get(SOURCE_TYPE_KEY).map(str::trim).filter(|v| !v.is_empty());
    let source_id = form.get(SOURCE_ID_KEY).map(str::trim).filter(|v| !v.is_empty());
    match (source_type, source_id) {
        (Some(t), Some(id)) => Ok(Some(EntityRef::parse(t, id)?)),
        (None, None) => Ok(None),
        _ => Err(PortalError::InvalidInput(format!(
            "{} and {} must be submitted together",
            SOURCE_TYPE_KEY, SOURCE_ID_KEY
        ))),
    }
}

/// Links to create and edges to delete for one save.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationshipDiff {
    pub to_add: Vec<EntityRef>,
    pub to_remove: Vec<EntityRelationship>,
}

impl RelationshipDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Compare the desired links of `slots` with the `current` edges of `subject`.
///
/// Only counterpart types that were submitted are considered; edges to other
/// types are left alone. A link from the subject to itself is never desired.
pub fn diff(subject: &EntityRef, slots: &[SlotSubmission], current: &[EntityRelationship]) -> RelationshipDiff {
    let slot_types: HashSet<EntityType> = slots.iter().map(|s| s.counterpart).collect();
    let desired: Vec<EntityRef> = slots
        .iter()
        .flat_map(SlotSubmission::desired)
        .filter(|r| r != subject)
        .collect();
    let desired_set: HashSet<&EntityRef> = desired.iter().collect();

    let mut linked: HashSet<&EntityRef> = HashSet::new();
    let mut to_remove = Vec::new();
    for edge in current {
        let Some(other) = edge.other_side(subject) else {
            continue;
        };
        if !slot_types.contains(&other.entity_type) {
            continue;
        }
        if desired_set.contains(other) {
            linked.insert(other);
        } else {
            to_remove.push(edge.clone());
        }
    }

    let to_add = desired.iter().filter(|r| !linked.contains(r)).cloned().collect();

    RelationshipDiff { to_add, to_remove }
}
