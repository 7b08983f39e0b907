use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Deserialize;
use vrcface_shared::{ApiResponse, CreateModel, Model, ModelPage, ModelSort, Pagination, User};

use crate::{
    auth, db,
    error::{parse_id, ApiError},
    AppState,
};

const MAX_TITLE_CHARS: usize = 100;
const MAX_DESCRIPTION_CHARS: usize = 2000;

const MODEL_SELECT: &str = "
    SELECT m.id, m.title, m.description, m.is_public, m.created_at, m.updated_at,
           u.id, u.username, u.avatar_url,
           (SELECT COUNT(*) FROM comments c WHERE c.model_id = m.id) AS comment_count
    FROM models m
    JOIN users u ON m.author_id = u.id";

fn model_from_row(row: &Row<'_>) -> rusqlite::Result<Model> {
    Ok(Model {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        is_public: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        author: User {
            id: row.get(6)?,
            username: row.get(7)?,
            avatar_url: row.get(8)?,
        },
        comment_count: row.get(9)?,
    })
}

// ── Queries ──

pub fn find_model(conn: &Connection, id: i64) -> Result<Option<Model>, ApiError> {
    let model = conn
        .query_row(
            &format!("{MODEL_SELECT} WHERE m.id = ?1"),
            [id],
            model_from_row,
        )
        .optional()?;
    Ok(model)
}

/// Fails unless the model exists and is public.
pub fn require_public(conn: &Connection, model_id: i64) -> Result<(), ApiError> {
    let is_public: Option<bool> = conn
        .query_row(
            "SELECT is_public FROM models WHERE id = ?1",
            [model_id],
            |row| row.get(0),
        )
        .optional()?;

    match is_public {
        None => Err(ApiError::NotFound("Model not found".into())),
        Some(false) => Err(ApiError::Forbidden("This model is not public".into())),
        Some(true) => Ok(()),
    }
}

pub fn list_public(
    conn: &Connection,
    page: u32,
    limit: u32,
    sort: ModelSort,
) -> Result<ModelPage, ApiError> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM models WHERE is_public = 1",
        [],
        |row| row.get(0),
    )?;
    let pagination = Pagination::new(page, limit, total);

    let order = match sort {
        ModelSort::Latest => "m.created_at DESC, m.id DESC",
        ModelSort::Popular => "comment_count DESC, m.created_at DESC, m.id DESC",
    };
    let mut stmt = conn.prepare(&format!(
        "{MODEL_SELECT} WHERE m.is_public = 1 ORDER BY {order} LIMIT ?1 OFFSET ?2"
    ))?;
    let models = stmt
        .query_map(params![limit, pagination.offset()], model_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ModelPage { models, pagination })
}

pub fn insert_model(conn: &Connection, author_id: i64, payload: &CreateModel) -> Result<Model, ApiError> {
    let title = payload.title.trim().to_string();
    let description = payload.description.trim().to_string();

    if title.is_empty() || title.chars().count() > MAX_TITLE_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Title must be 1-{MAX_TITLE_CHARS} characters"
        )));
    }
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Description must be at most {MAX_DESCRIPTION_CHARS} characters"
        )));
    }

    conn.execute(
        "INSERT INTO models (author_id, title, description, is_public) VALUES (?1, ?2, ?3, ?4)",
        params![author_id, title, description, payload.is_public],
    )?;
    let id = conn.last_insert_rowid();

    find_model(conn, id)?.ok_or_else(|| ApiError::Internal(format!("model {id} vanished after insert")))
}

// ── Handlers ──

#[derive(Deserialize)]
pub struct ListParams {
    page: Option<u32>,
    limit: Option<u32>,
    #[serde(default)]
    sort: ModelSort,
}

/// GET /api/models?page=1&limit=10&sort=latest
pub async fn list_models(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<ModelPage>>, ApiError> {
    let (page, limit) = db::PageParams {
        page: params.page,
        limit: params.limit,
    }
    .resolve();
    let sort = params.sort;

    let result = db::with_conn(&state.db, move |conn| list_public(conn, page, limit, sort)).await?;
    tracing::debug!(page, limit, count = result.models.len(), "listed models");
    Ok(Json(ApiResponse::ok("Models retrieved", result)))
}

/// GET /api/models/:id
pub async fn get_model(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse<Model>>, ApiError> {
    let id = parse_id(&raw_id, "model")?;
    let viewer = auth::authenticate(&state, &headers).await.ok();

    let model = db::with_conn(&state.db, move |conn| find_model(conn, id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Model not found".into()))?;

    let is_owner = viewer.is_some_and(|u| u.id == model.author.id);
    if !model.is_public && !is_owner {
        return Err(ApiError::Forbidden("This model is not public".into()));
    }
    Ok(Json(ApiResponse::ok("Model retrieved", model)))
}

/// POST /api/models
pub async fn create_model(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateModel>,
) -> Result<Json<ApiResponse<Model>>, ApiError> {
    let user = auth::authenticate(&state, &headers).await?;

    let model = db::with_conn(&state.db, move |conn| insert_model(conn, user.id, &payload)).await?;
    tracing::info!(model_id = model.id, author_id = model.author.id, "model created");
    Ok(Json(ApiResponse::ok("Model created", model)))
}
