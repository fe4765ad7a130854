//! Entity update and draft creation with their relationship side effects.
//!
//! An update runs a fixed sequence of stages; see [`UpdateStage`]. Every
//! permission check happens before the first write, and all writes share one
//! transaction, so a failing stage leaves nothing behind.

use rusqlite::{Connection, Transaction};
use serde::Serialize;

use super::context::RelationshipContext;
use super::diff::{self, SlotSubmission};
use super::loader::is_visible;
use super::save::{self, SaveOutcome};
use super::{auto_publish, store, EntityRelationship, NewRelationship};
use crate::entities::{repo, Entity, EntityRef, EntityType, NewEntity};
use crate::error::{PortalError, Result};
use crate::forms::FormData;
use crate::permissions::{self, Action, Actor};

/// Stages of [`update_entity`], in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStage {
    Validate,
    PersistFields,
    RelationshipDiff,
    AutoPublish,
    AutoLink,
}

impl UpdateStage {
    pub const ORDER: [UpdateStage; 5] = [
        UpdateStage::Validate,
        UpdateStage::PersistFields,
        UpdateStage::RelationshipDiff,
        UpdateStage::AutoPublish,
        UpdateStage::AutoLink,
    ];
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    pub entity: Entity,
    pub relationships: SaveOutcome,
    /// Status the entity was auto-published to, if it was.
    pub published: Option<&'static str>,
    pub auto_link: Option<EntityRelationship>,
    pub redirect: String,
    pub stages: Vec<UpdateStage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DraftOutcome {
    pub entity: Entity,
    pub context: Option<RelationshipContext>,
    pub auto_link: Option<EntityRelationship>,
}

/// Slot types are only linkable by actors who can see that type at all.
fn require_slot_access(actor: &Actor, slot: &SlotSubmission) -> Result<()> {
    let schema = slot.counterpart.schema();
    let read = schema.permission(Action::Read);
    if actor.can(&read) {
        return Ok(());
    }
    if schema.supports_self_ownership() && !actor.is_guest() && actor.can(&schema.self_permission(Action::Read)) {
        return Ok(());
    }
    permissions::require_permission(actor, &read).map(|_| ())
}

/// Every submitted counterpart must exist and be readable by the actor.
fn require_linkable(conn: &Connection, actor: &Actor, subject: &EntityRef, slot: &SlotSubmission) -> Result<()> {
    for counterpart in slot.desired().filter(|c| c != subject) {
        let entity = repo::get_by_id(conn, counterpart.entity_type, &counterpart.id)?
            .ok_or_else(|| PortalError::NotFound(counterpart.to_string()))?;
        if !is_visible(actor, &entity) {
            return Err(PortalError::Forbidden(format!("{} may not link {}", actor.label(), counterpart)));
        }
    }
    Ok(())
}

/// Whether a stored edge of `subject` is the actor's to keep or drop. Links to
/// entities the actor cannot read are left alone; links whose counterpart is
/// gone stay removable.
fn manages_edge(conn: &Connection, actor: &Actor, subject: &EntityRef, edge: &EntityRelationship) -> Result<bool> {
    let Some(other) = edge.other_side(subject) else {
        return Ok(false);
    };
    Ok(match repo::get_by_id(conn, other.entity_type, &other.id)? {
        Some(entity) => is_visible(actor, &entity),
        None => true,
    })
}

/// The source context must exist and be readable by the actor.
fn require_source(conn: &Connection, actor: &Actor, source: &EntityRef) -> Result<Entity> {
    let entity = repo::require(conn, source.entity_type, &source.id)?;
    permissions::require_entity_action(actor, &entity, Action::Read)?;
    Ok(entity)
}

/// Link `source` to `target` unless they are already linked (or the same).
fn link_source(
    tx: &Transaction<'_>,
    source: &EntityRef,
    target: &EntityRef,
    actor_id: Option<&str>,
) -> Result<Option<EntityRelationship>> {
    if source == target || store::exists(tx, source, target)? {
        return Ok(None);
    }
    let edge = store::create(tx, NewRelationship::by_user(source.clone(), target.clone(), actor_id))?;
    log::info!("Auto-linked {} to source {}", target, source);
    Ok(Some(edge))
}

/// Update an entity from a submitted form.
///
/// Fails with `NotFound` for a missing subject or counterpart, `Forbidden` when
/// the actor may not update the subject or may not read a submitted slot type
/// or counterpart, and `ValidationFailed` before any write when the fields are
/// invalid. Existing links to counterparts the actor cannot read are kept.
pub fn update_entity(
    conn: &mut Connection,
    actor: &Actor,
    subject: &EntityRef,
    form: &FormData,
) -> Result<UpdateOutcome> {
    let existing = repo::require(conn, subject.entity_type, &subject.id)?;
    permissions::require_entity_action(actor, &existing, Action::Update)?;

    let slots = diff::parse_slots(form)?;
    for slot in &slots {
        require_slot_access(actor, slot)?;
        require_linkable(conn, actor, subject, slot)?;
    }
    let source = diff::source_context(form)?;
    if let Some(source) = &source {
        require_source(conn, actor, source)?;
    }

    let schema = subject.schema();
    let mut stages = Vec::with_capacity(UpdateStage::ORDER.len());

    let fields = repo::extract_fields(schema, form);
    stages.push(UpdateStage::Validate);
    repo::validate(schema, Some(&existing), &fields)?;

    let tx = conn.transaction()?;

    stages.push(UpdateStage::PersistFields);
    let mut entity = if fields.is_empty() {
        existing
    } else {
        repo::update_fields(&tx, subject.entity_type, &subject.id, &fields)?
    };

    stages.push(UpdateStage::RelationshipDiff);
    let relationships = save::save_slots_where(&tx, subject, &slots, actor.id(), |edge| {
        manages_edge(&tx, actor, subject, edge)
    })?;

    // Links-only saves never change the status.
    stages.push(UpdateStage::AutoPublish);
    let published = if fields.is_empty() {
        None
    } else {
        auto_publish::evaluate(schema, &entity)
    };
    if let Some(status) = published {
        repo::set_status(&tx, subject.entity_type, &subject.id, status)?;
        entity.status = Some(status.to_string());
        log::info!("Auto-published {} as '{}'", subject, status);
    }

    stages.push(UpdateStage::AutoLink);
    let auto_link = match &source {
        Some(source) => link_source(&tx, source, subject, actor.id())?,
        None => None,
    };

    tx.commit()?;

    let redirect = form
        .return_url()
        .map(str::to_string)
        .unwrap_or_else(|| schema.redirect_for(&subject.id));

    Ok(UpdateOutcome {
        entity,
        relationships,
        published,
        auto_link,
        redirect,
        stages,
    })
}

/// Create a draft of `entity_type` owned by the actor.
///
/// With a source context in the form, the draft is prefilled from the source
/// and linked to it once. Explicitly submitted fields override the prefill.
pub fn create_draft(
    conn: &mut Connection,
    actor: &Actor,
    entity_type: EntityType,
    form: &FormData,
) -> Result<DraftOutcome> {
    let schema = entity_type.schema();
    let create = schema.permission(Action::Create);
    if !actor.can(&create) && !actor.can(&schema.permission(Action::Write)) {
        permissions::require_permission(actor, &create)?;
    }
    let lifecycle = schema
        .lifecycle
        .ok_or_else(|| PortalError::InvalidInput(format!("{} has no draft status", entity_type)))?;

    let context = match diff::source_context(form)? {
        Some(source) => {
            let source = require_source(conn, actor, &source)?;
            Some(RelationshipContext::derive(&source, entity_type))
        }
        None => None,
    };

    let submitted = repo::extract_fields(schema, form);
    let fields = match &context {
        Some(context) => context.merged_with(&submitted),
        None => submitted,
    };
    repo::validate_draft(schema, &fields)?;

    let tx = conn.transaction()?;
    let entity = repo::create(
        &tx,
        entity_type,
        NewEntity {
            fields,
            status: Some(lifecycle.draft.to_string()),
            created_by: actor.id().map(str::to_string),
        },
    )?;
    let auto_link = match &context {
        Some(context) => link_source(&tx, &context.source, &entity.entity_ref(), actor.id())?,
        None => None,
    };
    tx.commit()?;

    log::info!("Created draft {} for {}", entity.entity_ref(), actor.label());
    Ok(DraftOutcome {
        entity,
        context,
        auto_link,
    })
}
