//! Draft auto-publish: a draft flips to its published status as soon as all
//! required fields are filled. The transition only ever goes one way.

use crate::entities::{Entity, EntitySchema};

/// Required fields of `schema` that are still blank on `entity`.
pub fn missing_required<'s>(schema: &'s EntitySchema, entity: &Entity) -> Vec<&'s str> {
    schema
        .required_fields
        .iter()
        .copied()
        .filter(|name| entity.field(name).is_none())
        .collect()
}

/// Status `entity` should move to, if any. `None` for non-drafts, for types
/// without a lifecycle, and for drafts with blank required fields.
pub fn evaluate(schema: &EntitySchema, entity: &Entity) -> Option<&'static str> {
    let lifecycle = schema.lifecycle?;
    if entity.status.as_deref() != Some(lifecycle.draft) {
        return None;
    }
    if missing_required(schema, entity).is_empty() {
        Some(lifecycle.published)
    } else {
        None
    }
}
