//! Source context for drafts opened from inside a picker.
//!
//! Creating a reimbursement while editing a receipt should not make the user
//! retype the amount. Each rule maps fields of a source type onto the new
//! draft's fields.

use serde::Serialize;

use crate::entities::{Entity, EntityRef, EntityType, FieldValues};

enum Prefill {
    /// Copy a field from the source.
    Field(&'static str),
    /// Fixed value.
    Value(&'static str),
}

struct PrefillRule {
    source: EntityType,
    target: EntityType,
    fields: &'static [(&'static str, Prefill)],
}

static PREFILL_RULES: &[PrefillRule] = &[
    PrefillRule {
        source: EntityType::Receipt,
        target: EntityType::Transaction,
        fields: &[
            ("description", Prefill::Field("name")),
            ("amount", Prefill::Field("amount")),
            ("date", Prefill::Field("purchase_date")),
            ("kind", Prefill::Value("expense")),
        ],
    },
    PrefillRule {
        source: EntityType::Receipt,
        target: EntityType::Reimbursement,
        fields: &[
            ("description", Prefill::Field("name")),
            ("amount", Prefill::Field("amount")),
        ],
    },
    PrefillRule {
        source: EntityType::Transaction,
        target: EntityType::Reimbursement,
        fields: &[
            ("description", Prefill::Field("description")),
            ("amount", Prefill::Field("amount")),
        ],
    },
    PrefillRule {
        source: EntityType::Reimbursement,
        target: EntityType::Transaction,
        fields: &[
            ("description", Prefill::Field("description")),
            ("amount", Prefill::Field("amount")),
            ("kind", Prefill::Value("expense")),
        ],
    },
    PrefillRule {
        source: EntityType::Budget,
        target: EntityType::Transaction,
        fields: &[("category", Prefill::Field("name"))],
    },
    PrefillRule {
        source: EntityType::Event,
        target: EntityType::News,
        fields: &[
            ("title", Prefill::Field("title")),
            ("summary", Prefill::Field("description")),
        ],
    },
    PrefillRule {
        source: EntityType::Minute,
        target: EntityType::News,
        fields: &[
            ("title", Prefill::Field("title")),
            ("summary", Prefill::Field("description")),
        ],
    },
    PrefillRule {
        source: EntityType::Submission,
        target: EntityType::Message,
        fields: &[("content", Prefill::Field("message"))],
    },
];

/// Where a draft came from and the values it starts with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipContext {
    pub source: EntityRef,
    pub target: EntityType,
    pub prefill: FieldValues,
}

impl RelationshipContext {
    /// Derive the prefill for a new `target` draft opened from `source`.
    /// Pairs without a rule get an empty prefill; the link is still made.
    pub fn derive(source: &Entity, target: EntityType) -> Self {
        let mut prefill = FieldValues::new();
        if let Some(rule) = PREFILL_RULES
            .iter()
            .find(|r| r.source == source.entity_type && r.target == target)
        {
            for (field, value) in rule.fields {
                let value = match value {
                    Prefill::Field(name) => source.field(name),
                    Prefill::Value(v) => Some(*v),
                };
                if let Some(value) = value {
                    prefill.insert(field.to_string(), value.to_string());
                }
            }
        }
        Self {
            source: source.entity_ref(),
            target,
            prefill,
        }
    }

    /// Prefill overlaid with explicitly submitted values.
    pub fn merged_with(&self, submitted: &FieldValues) -> FieldValues {
        let mut fields = self.prefill.clone();
        for (name, value) in submitted {
            fields.insert(name.clone(), value.clone());
        }
        fields
    }
}
