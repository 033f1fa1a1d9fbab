//! docdex API Module
//! REST driver over the repository with OpenAPI documentation

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;
use utoipa::{IntoParams, OpenApi};

use crate::engine::document::Document;
use crate::engine::error::{EngineError, ValidationError};
use crate::engine::geo::{Distance, GeoPoint};
use crate::engine::maintainer::Upserted;
use crate::engine::people;
use crate::engine::query::PredicateTree;
use crate::engine::repository::Repository;
use crate::engine::schema::EntityType;

/// Ids that `/api/v1/entities/{entity}/{id}` could never reach
pub const RESERVED_IDS: [&str; 2] = ["all", "query"];

#[derive(Clone)]
pub struct ApiState {
    pub repo: Arc<Repository>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        list_entities,
        upsert_document,
        find_all,
        delete_all,
        find_by_id,
        delete_by_id,
        query_documents,
        people_init_data,
        people_all,
        people_delete_all,
        people_by_id,
        people_delete_by_id,
        people_age_between,
        people_by_name,
        people_by_home_loc,
        people_by_statement,
        people_by_city,
        people_by_skills,
        people_update_age,
    ),
    tags(
        (name = "entities", description = "Generic document operations"),
        (name = "people", description = "People demo"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/openapi.json", get(openapi_json))
        .route("/api/v1/entities", get(list_entities))
        .route("/api/v1/entities/{entity}", post(upsert_document))
        .route("/api/v1/entities/{entity}/all", get(find_all).delete(delete_all))
        .route("/api/v1/entities/{entity}/query", post(query_documents))
        // Static segments win over {id}; upserts reject RESERVED_IDS
        .route("/api/v1/entities/{entity}/{id}", get(find_by_id).delete(delete_by_id))
        .route("/api/v1/people/init-data", post(people_init_data))
        .route("/api/v1/people/all", get(people_all).delete(people_delete_all))
        .route("/api/v1/people/age_between", get(people_age_between))
        .route("/api/v1/people/name", get(people_by_name))
        .route("/api/v1/people/homeloc", get(people_by_home_loc))
        .route("/api/v1/people/statement", get(people_by_statement))
        .route("/api/v1/people/city", get(people_by_city))
        .route("/api/v1/people/skills", get(people_by_skills))
        .route("/api/v1/people/{id}", get(people_by_id).delete(people_delete_by_id))
        .route("/api/v1/people/{id}/{age}", post(people_update_age))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Engine error rendered as a JSON body with a matching status
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self.0 {
            EngineError::Schema(_) | EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::Validation(_) | EngineError::Compile(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub backend: String,
}

async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.repo.backend().to_string(),
    })
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

fn render(entity: &EntityType, docs: &[Document]) -> Value {
    Value::Array(docs.iter().map(|d| d.to_json(entity)).collect())
}

fn render_upserted(entity: &EntityType, saved: &Upserted) -> Value {
    let mut body = json!({ "document": saved.document.to_json(entity) });
    if let Some(warning) = &saved.warning {
        body["warning"] = json!(warning);
    }
    body
}

fn run_query(repo: &Repository, entity: &str, tree: &PredicateTree) -> ApiResult<Json<Value>> {
    let docs = repo.query(entity, tree)?;
    let entity = repo.entity(entity)?;
    Ok(Json(render(&entity, &docs)))
}

#[utoipa::path(
    get,
    path = "/api/v1/entities",
    responses(
        (status = 200, description = "Registered entity types with document counts", body = Value)
    ),
    tag = "entities"
)]
async fn list_entities(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let status = state.repo.status()?;
    Ok(Json(json!(status)))
}

#[utoipa::path(
    post,
    path = "/api/v1/entities/{entity}",
    params(
        ("entity" = String, Path, description = "Entity type name"),
    ),
    request_body = Value,
    responses(
        (status = 201, description = "Document created", body = Value),
        (status = 200, description = "Document replaced", body = Value),
        (status = 400, description = "Document failed validation or uses a reserved id (all, query)")
    ),
    tag = "entities"
)]
async fn upsert_document(
    State(state): State<ApiState>,
    Path(entity): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let entity_type = state.repo.entity(&entity)?;
    if let Some(id) = body.get(entity_type.identifier_name()).and_then(Value::as_str) {
        if RESERVED_IDS.contains(&id) {
            return Err(EngineError::from(ValidationError::ReservedId(id.to_string())).into());
        }
    }
    let saved = state.repo.upsert_json(&entity, body)?;
    let status = if saved.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(render_upserted(&entity_type, &saved))))
}

#[utoipa::path(
    get,
    path = "/api/v1/entities/{entity}/all",
    params(
        ("entity" = String, Path, description = "Entity type name"),
    ),
    responses(
        (status = 200, description = "Every document", body = Value)
    ),
    tag = "entities"
)]
async fn find_all(State(state): State<ApiState>, Path(entity): Path<String>) -> ApiResult<Json<Value>> {
    run_query(&state.repo, &entity, &PredicateTree::new())
}

#[utoipa::path(
    delete,
    path = "/api/v1/entities/{entity}/all",
    params(
        ("entity" = String, Path, description = "Entity type name"),
    ),
    responses(
        (status = 200, description = "Documents deleted", body = Value)
    ),
    tag = "entities"
)]
async fn delete_all(State(state): State<ApiState>, Path(entity): Path<String>) -> ApiResult<Json<Value>> {
    let deleted = state.repo.delete_all(&entity)?;
    Ok(Json(json!({ "deleted": deleted })))
}

#[utoipa::path(
    get,
    path = "/api/v1/entities/{entity}/{id}",
    params(
        ("entity" = String, Path, description = "Entity type name"),
        ("id" = String, Path, description = "Document id"),
    ),
    responses(
        (status = 200, description = "The document", body = Value),
        (status = 404, description = "No such document")
    ),
    tag = "entities"
)]
async fn find_by_id(
    State(state): State<ApiState>,
    Path((entity, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let doc = state.repo.find_by_id(&entity, &id)?;
    let entity = state.repo.entity(&entity)?;
    Ok(Json(doc.to_json(&entity)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/entities/{entity}/{id}",
    params(
        ("entity" = String, Path, description = "Entity type name"),
        ("id" = String, Path, description = "Document id"),
    ),
    responses(
        (status = 200, description = "Document deleted", body = Value),
        (status = 404, description = "No such document")
    ),
    tag = "entities"
)]
async fn delete_by_id(
    State(state): State<ApiState>,
    Path((entity, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    state.repo.delete_by_id(&entity, &id)?;
    Ok(Json(json!({ "deleted": id })))
}

#[utoipa::path(
    post,
    path = "/api/v1/entities/{entity}/query",
    params(
        ("entity" = String, Path, description = "Entity type name"),
    ),
    request_body = Value,
    responses(
        (status = 200, description = "Matching documents", body = Value),
        (status = 400, description = "Predicate does not compile")
    ),
    tag = "entities"
)]
async fn query_documents(
    State(state): State<ApiState>,
    Path(entity): Path<String>,
    Json(tree): Json<PredicateTree>,
) -> ApiResult<Json<Value>> {
    run_query(&state.repo, &entity, &tree)
}

#[utoipa::path(
    post,
    path = "/api/v1/people/init-data",
    responses(
        (status = 200, description = "People replaced by the seed set", body = Value)
    ),
    tag = "people"
)]
async fn people_init_data(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let saved = people::init_data(&state.repo)?;
    let entity = state.repo.entity(people::ENTITY)?;
    Ok(Json(render(&entity, &saved)))
}

#[utoipa::path(
    get,
    path = "/api/v1/people/all",
    responses(
        (status = 200, description = "Every person", body = Value)
    ),
    tag = "people"
)]
async fn people_all(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    run_query(&state.repo, people::ENTITY, &PredicateTree::new())
}

#[utoipa::path(
    delete,
    path = "/api/v1/people/all",
    responses(
        (status = 200, description = "People deleted", body = Value)
    ),
    tag = "people"
)]
async fn people_delete_all(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let deleted = state.repo.delete_all(people::ENTITY)?;
    Ok(Json(json!({ "deleted": deleted })))
}

#[utoipa::path(
    get,
    path = "/api/v1/people/{id}",
    params(
        ("id" = String, Path, description = "Person id"),
    ),
    responses(
        (status = 200, description = "The person", body = Value),
        (status = 404, description = "No such person")
    ),
    tag = "people"
)]
async fn people_by_id(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let doc = state.repo.find_by_id(people::ENTITY, &id)?;
    let entity = state.repo.entity(people::ENTITY)?;
    Ok(Json(doc.to_json(&entity)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/people/{id}",
    params(
        ("id" = String, Path, description = "Person id"),
    ),
    responses(
        (status = 200, description = "Person deleted", body = Value),
        (status = 404, description = "No such person")
    ),
    tag = "people"
)]
async fn people_delete_by_id(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    state.repo.delete_by_id(people::ENTITY, &id)?;
    Ok(Json(json!({ "deleted": id })))
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AgeParams {
    /// min age
    min: i64,
    /// max age
    max: i64,
}

#[utoipa::path(
    get,
    path = "/api/v1/people/age_between",
    params(AgeParams),
    responses(
        (status = 200, description = "People aged min..=max", body = Value)
    ),
    tag = "people"
)]
async fn people_age_between(
    State(state): State<ApiState>,
    Query(params): Query<AgeParams>,
) -> ApiResult<Json<Value>> {
    run_query(&state.repo, people::ENTITY, &people::age_between(params.min, params.max))
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NameParams {
    /// first name
    first: String,
    /// last name
    last: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/people/name",
    params(NameParams),
    responses(
        (status = 200, description = "People with this first and last name", body = Value)
    ),
    tag = "people"
)]
async fn people_by_name(
    State(state): State<ApiState>,
    Query(params): Query<NameParams>,
) -> ApiResult<Json<Value>> {
    run_query(&state.repo, people::ENTITY, &people::by_name(&params.first, &params.last))
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HomeLocParams {
    /// latitude
    lat: f64,
    /// longitude
    lon: f64,
    /// Distance in miles
    d: f64,
}

#[utoipa::path(
    get,
    path = "/api/v1/people/homeloc",
    params(HomeLocParams),
    responses(
        (status = 200, description = "People living within the distance", body = Value),
        (status = 400, description = "Point or distance out of range")
    ),
    tag = "people"
)]
async fn people_by_home_loc(
    State(state): State<ApiState>,
    Query(params): Query<HomeLocParams>,
) -> ApiResult<Json<Value>> {
    let tree = people::home_loc_near(GeoPoint::new(params.lon, params.lat), Distance::miles(params.d));
    run_query(&state.repo, people::ENTITY, &tree)
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatementParams {
    /// words to look for in the personal statement
    q: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/people/statement",
    params(StatementParams),
    responses(
        (status = 200, description = "People whose statement shares a word with q", body = Value)
    ),
    tag = "people"
)]
async fn people_by_statement(
    State(state): State<ApiState>,
    Query(params): Query<StatementParams>,
) -> ApiResult<Json<Value>> {
    run_query(&state.repo, people::ENTITY, &people::statement_search(&params.q))
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CityParams {
    /// city
    city: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/people/city",
    params(CityParams),
    responses(
        (status = 200, description = "People living in the city", body = Value)
    ),
    tag = "people"
)]
async fn people_by_city(
    State(state): State<ApiState>,
    Query(params): Query<CityParams>,
) -> ApiResult<Json<Value>> {
    run_query(&state.repo, people::ENTITY, &people::by_city(&params.city))
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SkillsParams {
    /// Comma separated
    skills: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/people/skills",
    params(SkillsParams),
    responses(
        (status = 200, description = "People holding any of the skills", body = Value)
    ),
    tag = "people"
)]
async fn people_by_skills(
    State(state): State<ApiState>,
    Query(params): Query<SkillsParams>,
) -> ApiResult<Json<Value>> {
    let skills = params
        .skills
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty());
    run_query(&state.repo, people::ENTITY, &people::any_skills(skills))
}

#[utoipa::path(
    post,
    path = "/api/v1/people/{id}/{age}",
    params(
        ("id" = String, Path, description = "Person id"),
        ("age" = i64, Path, description = "New age"),
    ),
    responses(
        (status = 200, description = "Updated person, with a warning if its indexes need repair", body = Value),
        (status = 404, description = "No such person")
    ),
    tag = "people"
)]
async fn people_update_age(
    State(state): State<ApiState>,
    Path((id, age)): Path<(String, i64)>,
) -> ApiResult<Json<Value>> {
    let saved = people::update_age(&state.repo, &id, age)?;
    let entity = state.repo.entity(people::ENTITY)?;
    Ok(Json(render_upserted(&entity, &saved)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::{CompileError, ValidationError};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (EngineError::not_found("people", "x"), StatusCode::NOT_FOUND),
            (
                ValidationError::MissingField("age".into()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                CompileError::InvalidOperand {
                    path: "age".into(),
                    reason: "min > max".into(),
                }
                .into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                EngineError::IndexInconsistency {
                    entity: "people".into(),
                    id: "x".into(),
                    detail: "drift".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn app() -> Router {
        let repo = Repository::in_memory();
        people::ensure_registered(&repo).unwrap();
        create_router(ApiState {
            repo: Arc::new(repo),
        })
    }

    #[tokio::test]
    async fn test_people_routes() {
        let app = app();

        let (status, seeded) = call(&app, "POST", "/api/v1/people/init-data", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(seeded.as_array().unwrap().len(), 6);

        let (status, found) = call(&app, "GET", "/api/v1/people/age_between?min=30&max=40", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found.as_array().unwrap().len(), 3);

        let (_, found) = call(&app, "GET", "/api/v1/people/skills?skills=magic,%20planning", None).await;
        assert_eq!(found.as_array().unwrap().len(), 2);

        let (_, found) = call(&app, "GET", "/api/v1/people/name?first=Zoe&last=Saldana", None).await;
        let id = found[0]["id"].as_str().unwrap().to_string();

        let (status, updated) = call(&app, "POST", &format!("/api/v1/people/{}/44", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["document"]["age"], json!(44));
        assert!(updated.get("warning").is_none());

        let (status, _) = call(&app, "GET", "/api/v1/people/nobody", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_generic_entity_routes() {
        let app = app();
        call(&app, "POST", "/api/v1/people/init-data", None).await;

        let tree = json!({"all": [
            {"op": "equals", "field": "address.state", "value": "CA"},
            {"op": "range", "field": "age", "min": 40, "max": 100}
        ]});
        let (status, found) = call(&app, "POST", "/api/v1/entities/people/query", Some(tree)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found.as_array().unwrap().len(), 2);

        let bad = json!({"all": [{"op": "range", "field": "firstName", "min": 1, "max": 2}]});
        let (status, body) = call(&app, "POST", "/api/v1/entities/people/query", Some(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("firstName"));

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/entities/people/query",
            Some(json!({"all": [{"op": "text_matches", "field": "personalStatement", "text": "rabbit donut"}]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        let mut reserved = people::seed_documents()
            .remove(0)
            .to_json(&people::entity_type());
        reserved["id"] = json!("query");
        let (status, body) = call(&app, "POST", "/api/v1/entities/people", Some(reserved)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("reserved"));

        let (status, _) = call(&app, "GET", "/api/v1/entities/robots/all", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&app, "DELETE", "/api/v1/entities/people/all", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], json!(6));
    }

    #[test]
    fn test_openapi_lists_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/people/age_between"));
        assert!(doc.paths.paths.contains_key("/api/v1/entities/{entity}/query"));
        assert!(doc.paths.paths.contains_key("/api/v1/people/{id}"));
        assert!(doc.paths.paths.contains_key("/api/v1/people/all"));

        let age = doc.paths.paths["/api/v1/people/age_between"].get.as_ref().unwrap();
        let names: Vec<&str> = age
            .parameters
            .as_ref()
            .unwrap()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert!(names.contains(&"min") && names.contains(&"max"));
    }
}
