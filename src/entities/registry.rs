//! Static schema registry, one entry per [`EntityType`].

use std::collections::HashSet;

use rusqlite::Connection;

use super::EntityType;
use crate::error::{PortalError, Result};
use crate::permissions::{Action, Permission};

/// Two-state status machine: `draft` flips to `published` once every
/// required field is filled, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLifecycle {
    pub draft: &'static str,
    pub published: &'static str,
}

/// Where to send the user after a successful update.
#[derive(Debug, Clone, Copy)]
pub enum DefaultRedirect {
    Fixed(&'static str),
    ForId(fn(&str) -> String),
}

/// How one entity type is stored, validated and authorized.
#[derive(Debug)]
pub struct EntitySchema {
    pub entity_type: EntityType,
    pub table: &'static str,
    /// Editable columns, in form order.
    pub fields: &'static [&'static str],
    pub required_fields: &'static [&'static str],
    pub decimal_fields: &'static [&'static str],
    pub title_field: &'static str,
    /// Domain of `${prefix}:read`, `${prefix}:update-self`, ...
    pub permission_prefix: &'static str,
    /// Column naming the owner when the type supports self-permissions.
    pub owner_field: Option<&'static str>,
    pub lifecycle: Option<StatusLifecycle>,
    pub redirect: DefaultRedirect,
}

impl EntitySchema {
    pub fn permission(&self, action: Action) -> Permission {
        Permission::new(self.permission_prefix, action)
    }

    pub fn self_permission(&self, action: Action) -> Permission {
        self.permission(action).own()
    }

    pub fn supports_self_ownership(&self) -> bool {
        self.owner_field.is_some()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains(&name)
    }

    pub fn redirect_for(&self, id: &str) -> String {
        match self.redirect {
            DefaultRedirect::Fixed(path) => path.to_string(),
            DefaultRedirect::ForId(f) => f(id),
        }
    }
}

const CREATED_BY: Option<&str> = Some("created_by");

const fn lifecycle(published: &'static str) -> Option<StatusLifecycle> {
    Some(StatusLifecycle {
        draft: "draft",
        published,
    })
}

fn transaction_page(id: &str) -> String {
    format!("/treasury/transactions/{}", id)
}

fn budget_page(id: &str) -> String {
    format!("/treasury/budgets/{}", id)
}

fn news_page(id: &str) -> String {
    format!("/news/{}", id)
}

fn event_page(id: &str) -> String {
    format!("/events/{}", id)
}

fn mail_thread_page(id: &str) -> String {
    format!("/mail/thread/{}", id)
}

static RECEIPT: EntitySchema = EntitySchema {
    entity_type: EntityType::Receipt,
    table: "receipts",
    fields: &["name", "description", "amount", "purchase_date", "store_name", "url"],
    required_fields: &["name", "amount", "purchase_date"],
    decimal_fields: &["amount"],
    title_field: "name",
    permission_prefix: "treasury:receipts",
    owner_field: CREATED_BY,
    lifecycle: lifecycle("active"),
    redirect: DefaultRedirect::Fixed("/treasury/receipts"),
};

static TRANSACTION: EntitySchema = EntitySchema {
    entity_type: EntityType::Transaction,
    table: "transactions",
    fields: &["description", "amount", "date", "category", "kind"],
    required_fields: &["description", "amount", "date"],
    decimal_fields: &["amount"],
    title_field: "description",
    permission_prefix: "treasury:transactions",
    owner_field: CREATED_BY,
    lifecycle: lifecycle("complete"),
    redirect: DefaultRedirect::ForId(transaction_page),
};

static REIMBURSEMENT: EntitySchema = EntitySchema {
    entity_type: EntityType::Reimbursement,
    table: "reimbursements",
    fields: &["description", "amount", "purchaser_name", "bank_account", "notes"],
    required_fields: &["description", "amount", "purchaser_name", "bank_account"],
    decimal_fields: &["amount"],
    title_field: "description",
    permission_prefix: "treasury:reimbursements",
    owner_field: CREATED_BY,
    lifecycle: lifecycle("requested"),
    redirect: DefaultRedirect::Fixed("/treasury/reimbursements"),
};

static BUDGET: EntitySchema = EntitySchema {
    entity_type: EntityType::Budget,
    table: "budgets",
    fields: &["name", "description", "amount", "year"],
    required_fields: &["name", "amount"],
    decimal_fields: &["amount"],
    title_field: "name",
    permission_prefix: "treasury:budgets",
    owner_field: CREATED_BY,
    lifecycle: lifecycle("open"),
    redirect: DefaultRedirect::ForId(budget_page),
};

static INVENTORY: EntitySchema = EntitySchema {
    entity_type: EntityType::Inventory,
    table: "inventory_items",
    fields: &["name", "location", "category", "quantity", "value", "description"],
    required_fields: &["name", "location"],
    decimal_fields: &["quantity", "value"],
    title_field: "name",
    permission_prefix: "inventory",
    owner_field: CREATED_BY,
    lifecycle: lifecycle("active"),
    redirect: DefaultRedirect::Fixed("/inventory"),
};

static MINUTE: EntitySchema = EntitySchema {
    entity_type: EntityType::Minute,
    table: "minutes",
    fields: &["title", "meeting_date", "description", "file_url"],
    required_fields: &["title", "meeting_date"],
    decimal_fields: &[],
    title_field: "title",
    permission_prefix: "minutes",
    owner_field: CREATED_BY,
    lifecycle: lifecycle("active"),
    redirect: DefaultRedirect::Fixed("/minutes"),
};

static NEWS: EntitySchema = EntitySchema {
    entity_type: EntityType::News,
    table: "news",
    fields: &["title", "summary", "content"],
    required_fields: &["title", "content"],
    decimal_fields: &[],
    title_field: "title",
    permission_prefix: "news",
    owner_field: CREATED_BY,
    lifecycle: lifecycle("published"),
    redirect: DefaultRedirect::ForId(news_page),
};

static FAQ: EntitySchema = EntitySchema {
    entity_type: EntityType::Faq,
    table: "faqs",
    fields: &["question", "answer", "sort_order"],
    required_fields: &["question", "answer"],
    decimal_fields: &["sort_order"],
    title_field: "question",
    permission_prefix: "faq",
    owner_field: None,
    lifecycle: None,
    redirect: DefaultRedirect::Fixed("/faq"),
};

static POLL: EntitySchema = EntitySchema {
    entity_type: EntityType::Poll,
    table: "polls",
    fields: &["name", "description", "external_url", "deadline"],
    required_fields: &["name", "external_url"],
    decimal_fields: &[],
    title_field: "name",
    permission_prefix: "polls",
    owner_field: CREATED_BY,
    lifecycle: lifecycle("active"),
    redirect: DefaultRedirect::Fixed("/polls"),
};

static SOCIAL: EntitySchema = EntitySchema {
    entity_type: EntityType::Social,
    table: "social_links",
    fields: &["name", "icon", "url"],
    required_fields: &["name", "url"],
    decimal_fields: &[],
    title_field: "name",
    permission_prefix: "social",
    owner_field: None,
    lifecycle: None,
    redirect: DefaultRedirect::Fixed("/social"),
};

static EVENT: EntitySchema = EntitySchema {
    entity_type: EntityType::Event,
    table: "events",
    fields: &["title", "description", "location", "start_date", "end_date"],
    required_fields: &["title", "start_date"],
    decimal_fields: &[],
    title_field: "title",
    permission_prefix: "events",
    owner_field: CREATED_BY,
    lifecycle: lifecycle("active"),
    redirect: DefaultRedirect::ForId(event_page),
};

static MAIL_THREAD: EntitySchema = EntitySchema {
    entity_type: EntityType::MailThread,
    table: "mail_threads",
    fields: &["subject", "participants"],
    required_fields: &["subject"],
    decimal_fields: &[],
    title_field: "subject",
    permission_prefix: "committee:email",
    owner_field: None,
    lifecycle: None,
    redirect: DefaultRedirect::ForId(mail_thread_page),
};

static SUBMISSION: EntitySchema = EntitySchema {
    entity_type: EntityType::Submission,
    table: "submissions",
    fields: &["name", "email", "apartment_number", "submission_type", "message"],
    required_fields: &["name", "email", "message"],
    decimal_fields: &[],
    title_field: "name",
    permission_prefix: "submissions",
    owner_field: None,
    lifecycle: None,
    redirect: DefaultRedirect::Fixed("/submissions"),
};

static MESSAGE: EntitySchema = EntitySchema {
    entity_type: EntityType::Message,
    table: "messages",
    fields: &["title", "content"],
    required_fields: &["content"],
    decimal_fields: &[],
    title_field: "title",
    permission_prefix: "messages",
    owner_field: CREATED_BY,
    lifecycle: None,
    redirect: DefaultRedirect::Fixed("/messages"),
};

impl EntityType {
    /// Registry entry for this type.
    pub fn schema(&self) -> &'static EntitySchema {
        match self {
            EntityType::Receipt => &RECEIPT,
            EntityType::Transaction => &TRANSACTION,
            EntityType::Reimbursement => &REIMBURSEMENT,
            EntityType::Budget => &BUDGET,
            EntityType::Inventory => &INVENTORY,
            EntityType::Minute => &MINUTE,
            EntityType::News => &NEWS,
            EntityType::Faq => &FAQ,
            EntityType::Poll => &POLL,
            EntityType::Social => &SOCIAL,
            EntityType::Event => &EVENT,
            EntityType::MailThread => &MAIL_THREAD,
            EntityType::Submission => &SUBMISSION,
            EntityType::Message => &MESSAGE,
        }
    }
}

/// Look up a schema by type tag; unknown tags are an error, never a no-op.
pub fn lookup(tag: &str) -> Result<&'static EntitySchema> {
    Ok(tag.parse::<EntityType>()?.schema())
}

static BASE_COLUMNS: [&str; 5] = ["id", "status", "created_by", "created_at", "updated_at"];

/// Check at startup that every registered table carries the columns its
/// schema names, so a registry/migration mismatch fails before serving.
pub fn verify_registry(conn: &Connection) -> Result<()> {
    for entity_type in EntityType::ALL {
        let schema = entity_type.schema();
        if schema.entity_type != entity_type {
            return Err(PortalError::Config(format!(
                "registry entry for {} is registered as {}",
                entity_type, schema.entity_type
            )));
        }

        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", schema.table))?;
        let columns: HashSet<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<_, rusqlite::Error>>()?;

        if columns.is_empty() {
            return Err(PortalError::Config(format!(
                "table {} for entity type {} does not exist",
                schema.table, entity_type
            )));
        }

        let referenced = BASE_COLUMNS
            .iter()
            .chain(schema.fields)
            .chain(schema.required_fields)
            .chain(schema.decimal_fields)
            .chain(std::iter::once(&schema.title_field));
        for column in referenced {
            if !columns.contains(*column) {
                return Err(PortalError::Config(format!(
                    "table {} is missing column {} required by the {} schema",
                    schema.table, column, entity_type
                )));
            }
        }

        log::debug!("Registry entry verified: {} -> {}", entity_type, schema.table);
    }
    Ok(())
}
