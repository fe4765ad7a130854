use crate::config::HttpServerConfig;
use crate::entities::{EntityRef, EntityType};
use crate::error::{PortalError, Result};
use crate::forms::FormData;
use crate::service::Portal;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// HTTP front for the relationship loader and the update/draft pipeline
pub struct HttpServer {
    portal: Arc<Portal>,
    config: HttpServerConfig,
}

impl HttpServer {
    pub fn new(portal: Portal, config: HttpServerConfig) -> Self {
        Self {
            portal: Arc::new(portal),
            config,
        }
    }

    /// Bind and serve until the process is stopped
    pub async fn run(&self) -> Result<()> {
        let addr = format!("127.0.0.1:{}", self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            PortalError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", addr, e),
            ))
        })?;

        log::info!("Serving portal links on http://{}", addr);

        axum::serve(listener, self.router())
            .await
            .map_err(|e| PortalError::Io(std::io::Error::other(format!("HTTP server error: {}", e))))?;

        Ok(())
    }

    /// Build the axum router
    pub fn router(&self) -> Router {
        // No configured origins means local development: allow any
        let cors = if self.config.allowed_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<axum::http::HeaderValue> = self
                .config
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .route("/health", get(handle_health))
            .route("/api/:entity_type/drafts", post(handle_create_draft))
            .route("/api/:entity_type/:id", post(handle_update))
            .route("/api/:entity_type/:id/relationships", get(handle_relationships))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors),
            )
            .with_state(AppState {
                portal: Arc::clone(&self.portal),
                actor_header: self.config.actor_header.to_ascii_lowercase(),
            })
    }
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    portal: Arc<Portal>,
    actor_header: String,
}

impl AppState {
    /// User id from the trusted actor header; absent or blank means guest
    fn actor_id(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get(self.actor_header.as_str())
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Deserialize)]
struct RelationshipsQuery {
    /// Comma separated counterpart types; every registered type when absent
    types: Option<String>,
}

fn parse_types(raw: Option<&str>) -> Result<Vec<EntityType>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(EntityType::ALL.to_vec()),
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::parse)
            .collect(),
    }
}

/// Map a core error onto a JSON response with the matching status code
fn error_response(err: PortalError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        log::error!("Request failed: {}", err);
        return (
            status,
            Json(serde_json::json!({ "error": "Internal server error" })),
        )
            .into_response();
    }

    log::debug!("Request rejected ({}): {}", status, err);
    let body = match &err {
        PortalError::ValidationFailed { entity, errors } => serde_json::json!({
            "error": "Validation failed",
            "entity": entity,
            "fields": errors,
        }),
        other => serde_json::json!({ "error": other.to_string() }),
    };
    (status, Json(body)).into_response()
}

fn json_result<T: serde::Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "portal-links",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

async fn handle_relationships(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((entity_type, id)): Path<(String, String)>,
    Query(query): Query<RelationshipsQuery>,
) -> Response {
    let request = EntityRef::parse(&entity_type, &id)
        .and_then(|subject| Ok((subject, parse_types(query.types.as_deref())?)));
    let (subject, counterparts) = match request {
        Ok(parts) => parts,
        Err(e) => return error_response(e),
    };

    json_result(
        state
            .portal
            .load_relationships(state.actor_id(&headers), subject, counterparts)
            .await,
    )
}

async fn handle_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((entity_type, id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let subject = match EntityRef::parse(&entity_type, &id) {
        Ok(subject) => subject,
        Err(e) => return error_response(e),
    };
    let form = FormData::parse_urlencoded(&body);

    json_result(
        state
            .portal
            .update_entity(state.actor_id(&headers), subject, form)
            .await,
    )
}

async fn handle_create_draft(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(entity_type): Path<String>,
    body: Bytes,
) -> Response {
    let entity_type: EntityType = match entity_type.parse() {
        Ok(t) => t,
        Err(e) => return error_response(e),
    };
    let form = FormData::parse_urlencoded(&body);

    match state
        .portal
        .create_draft(state.actor_id(&headers), entity_type, form)
        .await
    {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::permissions::PermissionSet;
    use crate::test_support::seed_user;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn test_router() -> (TempDir, Router) {
        let temp_dir = TempDir::new().unwrap();
        let portal = Portal::new(
            Db::new(temp_dir.path().join("portal.db")),
            PermissionSet::parse_all(&["news:read"]).unwrap(),
        );
        let migrations = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        portal.init(&migrations).await.unwrap();
        portal
            .db()
            .with_connection(|conn| {
                seed_user(
                    conn,
                    "u1",
                    &[
                        "treasury:budgets:read",
                        "treasury:budgets:update",
                        "treasury:transactions:read",
                        "treasury:receipts:read",
                        "treasury:reimbursements:create",
                    ],
                );
                conn.execute_batch(
                    "INSERT INTO budgets (id, status, created_by, created_at, updated_at)
                         VALUES ('B1', 'draft', 'u1', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z');
                     INSERT INTO transactions (id, description, created_at, updated_at)
                         VALUES ('T1', 'Plumber', '2026-01-02T00:00:00Z', '2026-01-02T00:00:00Z');
                     INSERT INTO receipts (id, name, amount, status, created_at, updated_at)
                         VALUES ('R1', 'Paint', '42.50', 'active', '2026-01-03T00:00:00Z', '2026-01-03T00:00:00Z');
                     INSERT INTO news (id, title, status, created_at, updated_at)
                         VALUES ('N1', 'Stairwell repainted', 'published', '2026-01-04T00:00:00Z', '2026-01-04T00:00:00Z');
                     INSERT INTO reimbursements (id, description, bank_account, status, created_by, created_at, updated_at)
                         VALUES ('M1', 'Paint', 'FI12 3456 7890', 'requested', 'u2', '2026-01-04T00:00:00Z', '2026-01-04T00:00:00Z');
                     INSERT INTO entity_relationships (id, relation_a_type, relation_a_id, relation_b_type, relation_b_id, created_at)
                         VALUES ('E1', 'news', 'N1', 'reimbursement', 'M1', '2026-01-04T00:00:00Z');",
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let server = HttpServer::new(portal, HttpServerConfig::default());
        (temp_dir, server.router())
    }

    fn form_post(uri: &str, actor: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded");
        if let Some(actor) = actor {
            builder = builder.header("x-actor-id", actor);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, app) = test_router().await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_update_links_and_publishes() {
        let (_dir, app) = test_router().await;
        let response = app
            .clone()
            .oneshot(form_post(
                "/api/budget/B1",
                Some("u1"),
                "name=Repairs&amount=500.00&_relations=transaction&relation%3Atransaction=T1",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["entity"]["status"], "open");
        assert_eq!(json["redirect"], "/treasury/budgets/B1");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/budget/B1/relationships?types=transaction")
                    .header("x-actor-id", "u1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["groups"]["transaction"]["linked"][0]["id"], "T1");
        assert_eq!(json["editable"], true);
    }

    #[tokio::test]
    async fn test_guest_is_forbidden() {
        let (_dir, app) = test_router().await;
        let response = app
            .oneshot(form_post("/api/budget/B1", None, "name=Hijacked"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_guest_sees_no_unreadable_links() {
        let (_dir, app) = test_router().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/news/N1/relationships")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let group = &json["groups"]["reimbursement"];
        assert_eq!(group["linked"], serde_json::json!([]));
        assert_eq!(group["available"], serde_json::json!([]));
        assert_eq!(group["hidden"], 1);
        assert_eq!(json["editable"], false);
        assert!(!json.to_string().contains("FI12"));
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let (_dir, app) = test_router().await;

        let unknown = app
            .clone()
            .oneshot(form_post("/api/invoice/I1", Some("u1"), ""))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

        let missing = app
            .clone()
            .oneshot(form_post("/api/budget/B404", Some("u1"), ""))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let invalid = app
            .oneshot(form_post("/api/budget/B1", Some("u1"), "amount=lots"))
            .await
            .unwrap();
        assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(invalid).await;
        assert_eq!(json["fields"]["amount"], "must be a decimal number");
    }

    #[tokio::test]
    async fn test_create_draft_from_source() {
        let (_dir, app) = test_router().await;
        let response = app
            .oneshot(form_post(
                "/api/reimbursement/drafts",
                Some("u1"),
                "_sourceType=receipt&_sourceId=R1",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert_eq!(json["entity"]["status"], "draft");
        assert_eq!(json["entity"]["fields"]["amount"], "42.50");
        assert!(json["auto_link"]["id"].is_string());
    }

    #[test]
    fn test_parse_types() {
        assert_eq!(parse_types(None).unwrap().len(), EntityType::ALL.len());
        assert_eq!(
            parse_types(Some("transaction, receipt")).unwrap(),
            vec![EntityType::Transaction, EntityType::Receipt]
        );
        assert!(parse_types(Some("transaction,invoice")).is_err());
    }
}
