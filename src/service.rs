//! Async entry points for request handlers and binaries.
//!
//! Each call resolves the actor and runs its core operation inside one
//! `Db::with_connection` task, so role changes are seen by the next request.

use std::path::Path;

use crate::db::{migrate, Db};
use crate::entities::{self, EntityRef, EntityType};
use crate::error::Result;
use crate::forms::FormData;
use crate::permissions::{resolve_actor, PermissionSet};
use crate::relationships::{
    self, loader, store, DanglingEdge, DraftOutcome, EntityRelationship, LoadedRelationships, UpdateOutcome,
};

/// Edge count for one unordered pair of entity types.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TypePairCount {
    pub first: String,
    pub second: String,
    pub count: i64,
}

#[derive(Debug, Clone)]
pub struct Portal {
    db: Db,
    guest_defaults: PermissionSet,
}

impl Portal {
    pub fn new(db: Db, guest_defaults: PermissionSet) -> Self {
        Self { db, guest_defaults }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Apply pending migrations and check every schema against its table.
    pub async fn init(&self, migrations_dir: &Path) -> Result<()> {
        let migrations_dir = migrations_dir.to_path_buf();
        self.db
            .with_connection(move |conn| {
                migrate::run_migrations(conn, &migrations_dir)?;
                entities::verify_registry(conn)
            })
            .await?;
        log::info!("Database ready at {}", self.db.path().display());
        Ok(())
    }

    pub async fn load_relationships(
        &self,
        user_id: Option<String>,
        subject: EntityRef,
        counterparts: Vec<EntityType>,
    ) -> Result<LoadedRelationships> {
        let guest_defaults = self.guest_defaults.clone();
        self.db
            .with_connection(move |conn| {
                let actor = resolve_actor(conn, user_id.as_deref(), &guest_defaults)?;
                loader::load_for_actor(conn, &actor, &subject, &counterparts)
            })
            .await
    }

    pub async fn update_entity(
        &self,
        user_id: Option<String>,
        subject: EntityRef,
        form: FormData,
    ) -> Result<UpdateOutcome> {
        let guest_defaults = self.guest_defaults.clone();
        self.db
            .with_connection(move |conn| {
                let actor = resolve_actor(conn, user_id.as_deref(), &guest_defaults)?;
                relationships::update_entity(conn, &actor, &subject, &form)
            })
            .await
    }

    pub async fn create_draft(
        &self,
        user_id: Option<String>,
        entity_type: EntityType,
        form: FormData,
    ) -> Result<DraftOutcome> {
        let guest_defaults = self.guest_defaults.clone();
        self.db
            .with_connection(move |conn| {
                let actor = resolve_actor(conn, user_id.as_deref(), &guest_defaults)?;
                relationships::create_draft(conn, &actor, entity_type, &form)
            })
            .await
    }

    /// Store a link proposed by the analyzer. This is a system path: there is
    /// no actor, and callers must not expose it to end users directly.
    pub async fn record_suggestion(
        &self,
        a: EntityRef,
        b: EntityRef,
        confidence: f64,
        reasoning: String,
    ) -> Result<Option<EntityRelationship>> {
        self.db
            .with_connection(move |conn| relationships::record_suggestion(conn, &a, &b, confidence, &reasoning))
            .await
    }

    pub async fn edge_counts(&self) -> Result<Vec<TypePairCount>> {
        let rows = self.db.with_connection(|conn| store::count_by_type_pair(conn)).await?;
        Ok(rows
            .into_iter()
            .map(|(first, second, count)| TypePairCount { first, second, count })
            .collect())
    }

    pub async fn dangling_edges(&self) -> Result<Vec<DanglingEdge>> {
        self.db.with_connection(|conn| loader::find_dangling(conn)).await
    }
}
