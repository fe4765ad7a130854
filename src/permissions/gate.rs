use super::{Action, Actor, Permission};
use crate::entities::{Entity, EntitySchema};
use crate::error::{PortalError, Result};

/// Pass when the actor holds `permission`.
pub fn require_permission<'a>(actor: &'a Actor, permission: &Permission) -> Result<&'a Actor> {
    if actor.can(permission) {
        Ok(actor)
    } else {
        log::debug!("Gate: {} lacks {}", actor.label(), permission);
        Err(PortalError::Forbidden(format!("missing permission {}", permission)))
    }
}

/// Pass when the actor holds `general`, or holds `self_permission` and owns
/// the resource. Evaluated on every call; nothing is cached.
pub fn require_permission_or_self<'a>(
    actor: &'a Actor,
    general: &Permission,
    self_permission: &Permission,
    resource_owner_id: Option<&str>,
) -> Result<&'a Actor> {
    if actor.can(general) {
        return Ok(actor);
    }

    let owns = matches!((actor.id(), resource_owner_id), (Some(a), Some(o)) if a == o);
    if owns && actor.can(self_permission) {
        return Ok(actor);
    }

    log::debug!(
        "Gate: {} lacks {} (self variant {}, owner match: {})",
        actor.label(),
        general,
        self_permission,
        owns
    );
    Err(PortalError::Forbidden(format!("missing permission {}", general)))
}

/// Non-raising form used to filter lists: general permission, or the self
/// variant on a type that supports ownership and a resource the actor owns.
pub fn can_access(actor: &Actor, schema: &EntitySchema, action: Action, owner_id: Option<&str>) -> bool {
    if actor.can(&schema.permission(action)) {
        return true;
    }
    schema.supports_self_ownership()
        && matches!((actor.id(), owner_id), (Some(a), Some(o)) if a == o)
        && actor.can(&schema.self_permission(action))
}

/// `require_permission_or_self` for an entity, using its schema's prefix.
pub fn require_entity_action<'a>(actor: &'a Actor, entity: &Entity, action: Action) -> Result<&'a Actor> {
    let schema = entity.schema();
    require_permission_or_self(
        actor,
        &schema.permission(action),
        &schema.self_permission(action),
        entity.owner_id(),
    )
}
