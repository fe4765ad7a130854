//! Generic SQLite adapter over the registry: every entity type is read and
//! written through its [`EntitySchema`], so table and column names only ever
//! come from static registry data, never from submitted input.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{Entity, EntitySchema, EntityType, FieldValues};
use crate::error::{PortalError, Result};
use crate::forms::FormData;

/// Values for a new row.
#[derive(Debug, Clone, Default)]
pub struct NewEntity {
    pub fields: FieldValues,
    pub status: Option<String>,
    pub created_by: Option<String>,
}

fn select_sql(schema: &EntitySchema) -> String {
    format!(
        "SELECT id, status, created_by, created_at, updated_at, {} FROM {}",
        schema.fields.join(", "),
        schema.table
    )
}

fn row_to_entity(schema: &EntitySchema, row: &Row<'_>) -> rusqlite::Result<Entity> {
    let mut fields = BTreeMap::new();
    for (idx, name) in schema.fields.iter().enumerate() {
        fields.insert(name.to_string(), row.get::<_, Option<String>>(5 + idx)?);
    }
    Ok(Entity {
        entity_type: schema.entity_type,
        id: row.get(0)?,
        status: row.get(1)?,
        created_by: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        fields,
    })
}

fn blank_to_null(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Fetch one entity; `None` when the row does not exist.
pub fn get_by_id(conn: &Connection, entity_type: EntityType, id: &str) -> Result<Option<Entity>> {
    let schema = entity_type.schema();
    let sql = format!("{} WHERE id = ?1", select_sql(schema));
    let entity = conn
        .query_row(&sql, params![id], |row| row_to_entity(schema, row))
        .optional()?;
    Ok(entity)
}

/// Fetch one entity or fail with `NotFound`.
pub fn require(conn: &Connection, entity_type: EntityType, id: &str) -> Result<Entity> {
    get_by_id(conn, entity_type, id)?
        .ok_or_else(|| PortalError::NotFound(format!("{}:{}", entity_type, id)))
}

/// All rows of a type, most recent first.
pub fn list(conn: &Connection, entity_type: EntityType) -> Result<Vec<Entity>> {
    let schema = entity_type.schema();
    let sql = format!("{} ORDER BY created_at DESC, id", select_sql(schema));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| row_to_entity(schema, row))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Rows created by `user_id`, most recent first.
pub fn list_created_by(conn: &Connection, entity_type: EntityType, user_id: &str) -> Result<Vec<Entity>> {
    let schema = entity_type.schema();
    let sql = format!(
        "{} WHERE created_by = ?1 ORDER BY created_at DESC, id",
        select_sql(schema)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id], |row| row_to_entity(schema, row))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Insert a row with a fresh UUID. Unknown field names are rejected.
pub fn create(conn: &Connection, entity_type: EntityType, new: NewEntity) -> Result<Entity> {
    let schema = entity_type.schema();
    reject_unknown_fields(schema, &new.fields)?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    let mut columns = vec!["id", "status", "created_by", "created_at", "updated_at"];
    let mut values: Vec<Option<String>> = vec![
        Some(id.clone()),
        new.status,
        new.created_by,
        Some(now.clone()),
        Some(now),
    ];
    for (name, value) in &new.fields {
        if let Some(column) = schema.fields.iter().find(|f| **f == name.as_str()) {
            columns.push(*column);
            values.push(blank_to_null(value).map(str::to_string));
        }
    }

    let placeholders = (1..=columns.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        schema.table,
        columns.join(", "),
        placeholders
    );
    conn.execute(&sql, params_from_iter(values.iter()))?;

    log::debug!("Created {}:{}", entity_type, id);
    require(conn, entity_type, &id)
}

/// Overwrite the submitted fields of an existing row.
pub fn update_fields(
    conn: &Connection,
    entity_type: EntityType,
    id: &str,
    fields: &FieldValues,
) -> Result<Entity> {
    let schema = entity_type.schema();
    reject_unknown_fields(schema, fields)?;

    let mut assignments = vec!["updated_at = ?1".to_string()];
    let mut values: Vec<Option<String>> = vec![Some(Utc::now().to_rfc3339())];
    for (name, value) in fields {
        assignments.push(format!("{} = ?{}", name, values.len() + 1));
        values.push(blank_to_null(value).map(str::to_string));
    }
    values.push(Some(id.to_string()));

    let sql = format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        schema.table,
        assignments.join(", "),
        values.len()
    );
    let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
    if changed == 0 {
        return Err(PortalError::NotFound(format!("{}:{}", entity_type, id)));
    }

    require(conn, entity_type, id)
}

pub fn set_status(conn: &Connection, entity_type: EntityType, id: &str, status: &str) -> Result<()> {
    let schema = entity_type.schema();
    let sql = format!(
        "UPDATE {} SET status = ?1, updated_at = ?2 WHERE id = ?3",
        schema.table
    );
    let changed = conn.execute(&sql, params![status, Utc::now().to_rfc3339(), id])?;
    if changed == 0 {
        return Err(PortalError::NotFound(format!("{}:{}", entity_type, id)));
    }
    Ok(())
}

fn reject_unknown_fields(schema: &EntitySchema, fields: &FieldValues) -> Result<()> {
    match fields.keys().find(|name| !schema.has_field(name)) {
        Some(name) => Err(PortalError::InvalidInput(format!(
            "{} has no field '{}'",
            schema.entity_type, name
        ))),
        None => Ok(()),
    }
}

/// Pick the schema's editable fields out of a submitted form. Keys that are
/// not schema fields (relationship slots, `_returnUrl`, ...) are ignored.
pub fn extract_fields(schema: &EntitySchema, form: &FormData) -> FieldValues {
    schema
        .fields
        .iter()
        .filter_map(|name| form.get(name).map(|v| (name.to_string(), v.trim().to_string())))
        .collect()
}

/// Parse a money/quantity value; accepts a decimal comma (`12,50`).
pub fn parse_decimal(value: &str) -> Option<f64> {
    value
        .trim()
        .replace(' ', "")
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Validate submitted fields against the schema.
///
/// Drafts may be saved half-filled; any other entity must keep its required
/// fields non-empty. Decimal fields must parse whenever they are non-empty.
pub fn validate(schema: &EntitySchema, existing: Option<&Entity>, fields: &FieldValues) -> Result<()> {
    let is_draft = existing.map(Entity::is_draft).unwrap_or(false);
    let label = match existing {
        Some(entity) => entity.entity_ref().to_string(),
        None => schema.entity_type.to_string(),
    };
    check_fields(schema, label, fields, !is_draft)
}

/// Validation for a row about to be created in draft status.
pub fn validate_draft(schema: &EntitySchema, fields: &FieldValues) -> Result<()> {
    check_fields(schema, schema.entity_type.to_string(), fields, false)
}

fn check_fields(schema: &EntitySchema, label: String, fields: &FieldValues, enforce_required: bool) -> Result<()> {
    let mut errors = BTreeMap::new();
    for (name, value) in fields {
        let blank = value.trim().is_empty();
        if blank && enforce_required && schema.required_fields.contains(&name.as_str()) {
            errors.insert(name.clone(), "is required".to_string());
        }
        if !blank && schema.decimal_fields.contains(&name.as_str()) && parse_decimal(value).is_none() {
            errors.insert(name.clone(), "must be a decimal number".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(PortalError::ValidationFailed { entity: label, errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_entity, migrated_connection};

    #[test]
    fn test_create_and_get() {
        let conn = migrated_connection();
        let mut fields = FieldValues::new();
        fields.insert("name".into(), "Repairs".into());
        fields.insert("amount".into(), " 500.00 ".into());
        fields.insert("description".into(), "".into());

        let created = create(
            &conn,
            EntityType::Budget,
            NewEntity {
                fields,
                status: Some("draft".into()),
                created_by: Some("u1".into()),
            },
        )
        .unwrap();

        let fetched = get_by_id(&conn, EntityType::Budget, &created.id).unwrap().unwrap();
        assert_eq!(fetched.field("name"), Some("Repairs"));
        assert_eq!(fetched.field("amount"), Some("500.00"));
        assert_eq!(fetched.fields.get("description"), Some(&None));
        assert_eq!(fetched.owner_id(), Some("u1"));
        assert!(fetched.is_draft());
        assert_eq!(fetched.title(), "Repairs");
    }

    #[test]
    fn test_missing_entity() {
        let conn = migrated_connection();
        assert!(get_by_id(&conn, EntityType::News, "nope").unwrap().is_none());
        assert!(matches!(
            require(&conn, EntityType::News, "nope"),
            Err(PortalError::NotFound(_))
        ));
        let fields = FieldValues::from([("title".to_string(), "x".to_string())]);
        assert!(matches!(
            update_fields(&conn, EntityType::News, "nope", &fields),
            Err(PortalError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_rejects_unknown_field() {
        let conn = migrated_connection();
        let news = insert_entity(&conn, EntityType::News, &[("title", "Hello")], None, None);
        let fields = FieldValues::from([("title; DROP TABLE news".to_string(), "x".to_string())]);
        let err = update_fields(&conn, EntityType::News, &news.id, &fields).unwrap_err();
        assert!(matches!(err, PortalError::InvalidInput(_)));
    }

    #[test]
    fn test_update_and_set_status() {
        let conn = migrated_connection();
        let news = insert_entity(&conn, EntityType::News, &[("title", "Hello")], Some("draft"), None);
        let fields = FieldValues::from([("content".to_string(), "Body".to_string())]);
        let updated = update_fields(&conn, EntityType::News, &news.id, &fields).unwrap();
        assert_eq!(updated.field("content"), Some("Body"));
        assert_eq!(updated.field("title"), Some("Hello"));

        set_status(&conn, EntityType::News, &news.id, "published").unwrap();
        let reloaded = require(&conn, EntityType::News, &news.id).unwrap();
        assert_eq!(reloaded.status.as_deref(), Some("published"));
    }

    #[test]
    fn test_list_and_list_created_by() {
        let conn = migrated_connection();
        insert_entity(&conn, EntityType::Event, &[("title", "Sauna night")], None, Some("u1"));
        insert_entity(&conn, EntityType::Event, &[("title", "Yard cleanup")], None, Some("u2"));
        assert_eq!(list(&conn, EntityType::Event).unwrap().len(), 2);
        let own = list_created_by(&conn, EntityType::Event, "u2").unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].title(), "Yard cleanup");
    }

    #[test]
    fn test_extract_fields_ignores_non_schema_keys() {
        let form = FormData::new()
            .with("name", " Repairs ")
            .with("amount", "500.00")
            .with("relation:transaction", "T1")
            .with("_returnUrl", "/treasury");
        let fields = extract_fields(EntityType::Budget.schema(), &form);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("name").map(String::as_str), Some("Repairs"));
    }

    #[test]
    fn test_validate_draft_allows_blank_required() {
        let conn = migrated_connection();
        let draft = insert_entity(&conn, EntityType::Budget, &[], Some("draft"), None);
        let fields = FieldValues::from([("name".to_string(), "".to_string())]);
        assert!(validate(EntityType::Budget.schema(), Some(&draft), &fields).is_ok());
    }

    #[test]
    fn test_validate_published_requires_fields_and_decimals() {
        let conn = migrated_connection();
        let open = insert_entity(
            &conn,
            EntityType::Budget,
            &[("name", "Repairs"), ("amount", "10")],
            Some("open"),
            None,
        );
        let fields = FieldValues::from([
            ("name".to_string(), " ".to_string()),
            ("amount".to_string(), "ten euros".to_string()),
        ]);
        let err = validate(EntityType::Budget.schema(), Some(&open), &fields).unwrap_err();
        match err {
            PortalError::ValidationFailed { errors, .. } => {
                assert_eq!(errors.get("name").map(String::as_str), Some("is required"));
                assert!(errors.contains_key("amount"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_validate_draft_only_checks_decimals() {
        let fields = FieldValues::from([
            ("name".to_string(), "".to_string()),
            ("amount".to_string(), "12,5".to_string()),
        ]);
        assert!(validate_draft(EntityType::Budget.schema(), &fields).is_ok());
        let bad = FieldValues::from([("amount".to_string(), "lots".to_string())]);
        assert!(validate_draft(EntityType::Budget.schema(), &bad).is_err());
    }

    #[test]
    fn test_parse_decimal_accepts_comma() {
        assert_eq!(parse_decimal("12,50"), Some(12.5));
        assert_eq!(parse_decimal("1 200.00"), Some(1200.0));
        assert_eq!(parse_decimal("NaN"), None);
        assert_eq!(parse_decimal("abc"), None);
    }
}
