//! Entities that can take part in relationships.
//!
//! The set of entity types is closed: [`EntityType`] is the only way to name
//! one, and every variant maps to a static [`EntitySchema`] describing how to
//! fetch, update, validate and authorize it.

mod registry;
pub mod repo;

pub use registry::{lookup, verify_registry, DefaultRedirect, EntitySchema, StatusLifecycle};
pub use repo::NewEntity;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PortalError;

/// Submitted field values keyed by column name. An empty string clears the field.
pub type FieldValues = BTreeMap<String, String>;

/// Entity type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Receipt,
    Transaction,
    Reimbursement,
    Budget,
    Inventory,
    Minute,
    News,
    Faq,
    Poll,
    Social,
    Event,
    MailThread,
    Submission,
    Message,
}

impl EntityType {
    pub const ALL: [EntityType; 14] = [
        EntityType::Receipt,
        EntityType::Transaction,
        EntityType::Reimbursement,
        EntityType::Budget,
        EntityType::Inventory,
        EntityType::Minute,
        EntityType::News,
        EntityType::Faq,
        EntityType::Poll,
        EntityType::Social,
        EntityType::Event,
        EntityType::MailThread,
        EntityType::Submission,
        EntityType::Message,
    ];

    /// Tag used in the database and in forms.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Receipt => "receipt",
            EntityType::Transaction => "transaction",
            EntityType::Reimbursement => "reimbursement",
            EntityType::Budget => "budget",
            EntityType::Inventory => "inventory",
            EntityType::Minute => "minute",
            EntityType::News => "news",
            EntityType::Faq => "faq",
            EntityType::Poll => "poll",
            EntityType::Social => "social",
            EntityType::Event => "event",
            EntityType::MailThread => "mail_thread",
            EntityType::Submission => "submission",
            EntityType::Message => "message",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| PortalError::UnknownEntityType(s.to_string()))
    }
}

/// Pointer to one entity: its type and id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub id: String,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            entity_type,
            id: id.into(),
        }
    }

    /// Parse a `(type tag, id)` pair as submitted by a form or URL.
    pub fn parse(entity_type: &str, id: &str) -> crate::Result<Self> {
        let id = id.trim();
        if id.is_empty() {
            return Err(PortalError::InvalidInput(format!("empty id for {}", entity_type)));
        }
        Ok(Self::new(entity_type.parse()?, id))
    }

    pub fn schema(&self) -> &'static EntitySchema {
        self.entity_type.schema()
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

/// One row of an entity table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub entity_type: EntityType,
    pub id: String,
    pub status: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub fields: BTreeMap<String, Option<String>>,
}

impl Entity {
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.entity_type, self.id.clone())
    }

    pub fn schema(&self) -> &'static EntitySchema {
        self.entity_type.schema()
    }

    /// Field value, treating blank text as absent.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|v| v.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Display title from the schema's title field, falling back to the id.
    pub fn title(&self) -> &str {
        self.field(self.schema().title_field).unwrap_or(&self.id)
    }

    /// Owner for self-permission checks; `None` for types without self-ownership.
    pub fn owner_id(&self) -> Option<&str> {
        self.schema().owner_field.and(self.created_by.as_deref())
    }

    pub fn is_draft(&self) -> bool {
        match (self.schema().lifecycle, self.status.as_deref()) {
            (Some(lifecycle), Some(status)) => status == lifecycle.draft,
            _ => false,
        }
    }
}
