use rusqlite::Connection;
use serde::Serialize;

use super::diff::{self, RelationshipDiff, SlotSubmission};
use super::{store, EntityRelationship, NewRelationship};
use crate::entities::{repo, EntityRef};
use crate::error::{PortalError, Result};
use crate::forms::FormData;

/// What a save actually changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SaveOutcome {
    pub added: Vec<EntityRelationship>,
    /// Ids of deleted edges.
    pub removed: Vec<String>,
    /// Links that already existed when the insert was attempted.
    pub skipped: usize,
}

impl SaveOutcome {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Apply a computed diff. Inserts are exists-guarded, so replaying the same
/// diff never creates a duplicate edge.
pub fn apply(
    conn: &Connection,
    subject: &EntityRef,
    diff: &RelationshipDiff,
    actor_id: Option<&str>,
) -> Result<SaveOutcome> {
    let mut outcome = SaveOutcome::default();

    for counterpart in &diff.to_add {
        if repo::get_by_id(conn, counterpart.entity_type, &counterpart.id)?.is_none() {
            return Err(PortalError::NotFound(counterpart.to_string()));
        }
        if store::exists(conn, subject, counterpart)? {
            outcome.skipped += 1;
            continue;
        }
        let edge = store::create(
            conn,
            NewRelationship::by_user(subject.clone(), counterpart.clone(), actor_id),
        )?;
        outcome.added.push(edge);
    }

    for edge in &diff.to_remove {
        if store::delete(conn, &edge.id)? {
            outcome.removed.push(edge.id.clone());
        }
    }

    Ok(outcome)
}

/// Diff and apply already-parsed slots against the stored edges of `subject`.
/// Runs on whatever connection or transaction the caller passes in.
pub fn save_slots(
    conn: &Connection,
    subject: &EntityRef,
    slots: &[SlotSubmission],
    actor_id: Option<&str>,
) -> Result<SaveOutcome> {
    save_slots_where(conn, subject, slots, actor_id, |_| Ok(true))
}

/// [`save_slots`], considering only the stored edges `managed` accepts.
/// Edges it rejects are neither removed nor counted as present.
pub fn save_slots_where<F>(
    conn: &Connection,
    subject: &EntityRef,
    slots: &[SlotSubmission],
    actor_id: Option<&str>,
    mut managed: F,
) -> Result<SaveOutcome>
where
    F: FnMut(&EntityRelationship) -> Result<bool>,
{
    if slots.is_empty() {
        return Ok(SaveOutcome::default());
    }
    let mut current = Vec::new();
    for edge in store::find_by_entity(conn, subject)? {
        if managed(&edge)? {
            current.push(edge);
        }
    }
    let diff = diff::diff(subject, slots, &current);
    let outcome = apply(conn, subject, &diff, actor_id)?;

    if !outcome.is_noop() {
        log::info!(
            "Saved links of {}: +{} -{} ({} already present)",
            subject,
            outcome.added.len(),
            outcome.removed.len(),
            outcome.skipped
        );
    }
    Ok(outcome)
}

/// Parse the form's relationship slots and bring the stored edges of
/// `subject` in line with them, all in one transaction.
pub fn save(conn: &mut Connection, subject: &EntityRef, form: &FormData, actor_id: Option<&str>) -> Result<SaveOutcome> {
    let slots = diff::parse_slots(form)?;
    repo::require(conn, subject.entity_type, &subject.id)?;

    let tx = conn.transaction()?;
    let outcome = save_slots(&tx, subject, &slots, actor_id)?;
    tx.commit()?;
    Ok(outcome)
}
