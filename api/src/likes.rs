use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use rusqlite::{params, Connection, OptionalExtension};
use vrcface_shared::{ApiResponse, LikeResponse};

use crate::{
    auth, db,
    error::{parse_id, ApiError},
    models, AppState,
};

/// The comment must exist and belong to a public model.
fn ensure_comment(conn: &Connection, comment_id: i64) -> Result<(), ApiError> {
    let model_id: i64 = conn
        .query_row(
            "SELECT model_id FROM comments WHERE id = ?1",
            [comment_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| ApiError::NotFound("Comment not found".into()))?;
    models::require_public(conn, model_id)
}

fn like_count(conn: &Connection, comment_id: i64) -> Result<i64, ApiError> {
    let likes = conn.query_row(
        "SELECT COUNT(*) FROM comment_likes WHERE comment_id = ?1",
        [comment_id],
        |row| row.get(0),
    )?;
    Ok(likes)
}

fn has_liked(conn: &Connection, user_id: i64, comment_id: i64) -> Result<bool, ApiError> {
    let liked = conn
        .query_row(
            "SELECT 1 FROM comment_likes WHERE user_id = ?1 AND comment_id = ?2",
            params![user_id, comment_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    Ok(liked)
}

pub fn like_status(
    conn: &Connection,
    comment_id: i64,
    user_id: Option<i64>,
) -> Result<LikeResponse, ApiError> {
    ensure_comment(conn, comment_id)?;
    let liked = match user_id {
        Some(uid) => has_liked(conn, uid, comment_id)?,
        None => false,
    };
    Ok(LikeResponse {
        likes: like_count(conn, comment_id)?,
        liked,
    })
}

/// Likes the comment, or removes the like when already present.
pub fn toggle_like(conn: &Connection, comment_id: i64, user_id: i64) -> Result<LikeResponse, ApiError> {
    ensure_comment(conn, comment_id)?;

    let liked = if has_liked(conn, user_id, comment_id)? {
        conn.execute(
            "DELETE FROM comment_likes WHERE user_id = ?1 AND comment_id = ?2",
            params![user_id, comment_id],
        )?;
        false
    } else {
        conn.execute(
            "INSERT INTO comment_likes (user_id, comment_id) VALUES (?1, ?2)",
            params![user_id, comment_id],
        )?;
        true
    };

    Ok(LikeResponse {
        likes: like_count(conn, comment_id)?,
        liked,
    })
}

/// GET /api/comments/:id/like
pub async fn get_like(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse<LikeResponse>>, ApiError> {
    let comment_id = parse_id(&raw_id, "comment")?;
    let user_id = auth::authenticate(&state, &headers).await.ok().map(|u| u.id);

    let resp = db::with_conn(&state.db, move |conn| like_status(conn, comment_id, user_id)).await?;
    Ok(Json(ApiResponse::ok("Like status", resp)))
}

/// POST /api/comments/:id/like: toggle
pub async fn toggle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse<LikeResponse>>, ApiError> {
    let comment_id = parse_id(&raw_id, "comment")?;
    let user = auth::authenticate(&state, &headers).await?;

    let resp = db::with_conn(&state.db, move |conn| toggle_like(conn, comment_id, user.id)).await?;
    tracing::info!(comment_id, user_id = user.id, liked = resp.liked, "like toggled");
    Ok(Json(ApiResponse::ok(
        if resp.liked { "Comment liked" } else { "Like removed" },
        resp,
    )))
}
