use std::collections::{HashMap, VecDeque};

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use vrcface_shared::{
    ApiResponse, Comment, CommentPage, CreateComment, Pagination, RepliesPage, UpdateComment,
    User, MAX_COMMENT_CHARS,
};

use crate::{
    auth, db,
    error::{parse_id, ApiError},
    models, AppState,
};

const COMMENT_SELECT: &str = "
    SELECT c.id, c.content, c.model_id, c.parent_id, c.is_edited, c.created_at, c.updated_at,
           u.id, u.username, u.avatar_url,
           (SELECT COUNT(*) FROM comment_likes l WHERE l.comment_id = c.id),
           (SELECT COUNT(*) FROM comments r WHERE r.parent_id = c.id)
    FROM comments c
    JOIN users u ON c.author_id = u.id";

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        content: row.get(1)?,
        model_id: row.get(2)?,
        parent_id: row.get(3)?,
        is_edited: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        author: User {
            id: row.get(7)?,
            username: row.get(8)?,
            avatar_url: row.get(9)?,
        },
        likes: row.get(10)?,
        reply_count: row.get(11)?,
        replies: Vec::new(),
    })
}

/// Trims and length-checks comment text. It is stored as plain text and
/// escaped once by the client when rendered.
pub fn validate_content(raw: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > MAX_COMMENT_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Comment must be 1-{MAX_COMMENT_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

// ── Queries ──

pub fn find_comment(conn: &Connection, id: i64) -> Result<Option<Comment>, ApiError> {
    let comment = conn
        .query_row(
            &format!("{COMMENT_SELECT} WHERE c.id = ?1"),
            [id],
            comment_from_row,
        )
        .optional()?;
    Ok(comment)
}

fn author_and_content(conn: &Connection, id: i64) -> Result<(i64, String), ApiError> {
    conn.query_row(
        "SELECT author_id, content FROM comments WHERE id = ?1",
        [id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()?
    .ok_or_else(|| ApiError::NotFound("Comment not found".into()))
}

/// Top-level comments of a public model, oldest first.
pub fn list_top_level(
    conn: &Connection,
    model_id: i64,
    page: u32,
    limit: u32,
) -> Result<CommentPage, ApiError> {
    models::require_public(conn, model_id)?;

    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM comments WHERE model_id = ?1 AND parent_id IS NULL",
        [model_id],
        |row| row.get(0),
    )?;
    let pagination = Pagination::new(page, limit, total);

    let mut stmt = conn.prepare(&format!(
        "{COMMENT_SELECT}
         WHERE c.model_id = ?1 AND c.parent_id IS NULL
         ORDER BY c.created_at ASC, c.id ASC
         LIMIT ?2 OFFSET ?3"
    ))?;
    let comments = stmt
        .query_map(params![model_id, limit, pagination.offset()], comment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CommentPage {
        comments,
        pagination,
    })
}

/// Direct replies of `comment_id`, paginated, each carrying its subtree.
///
/// `total` counts direct replies only. Subtrees stop at `max_depth` levels
/// below `comment_id`; nodes at the bound keep their `reply_count` so the
/// client can expand them on demand.
pub fn fetch_replies(
    conn: &Connection,
    comment_id: i64,
    page: u32,
    limit: u32,
    max_depth: usize,
) -> Result<RepliesPage, ApiError> {
    let model_id: i64 = conn
        .query_row(
            "SELECT model_id FROM comments WHERE id = ?1",
            [comment_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| ApiError::NotFound("Comment not found".into()))?;
    models::require_public(conn, model_id)?;

    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM comments WHERE parent_id = ?1",
        [comment_id],
        |row| row.get(0),
    )?;
    let pagination = Pagination::new(page, limit, total);

    let mut stmt = conn.prepare(&format!(
        "{COMMENT_SELECT}
         WHERE c.parent_id = ?1
         ORDER BY c.created_at ASC, c.id ASC
         LIMIT ?2 OFFSET ?3"
    ))?;
    let direct = stmt
        .query_map(params![comment_id, limit, pagination.offset()], comment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let replies = materialize(conn, comment_id, direct, max_depth.max(1))?;
    Ok(RepliesPage {
        replies,
        pagination,
    })
}

/// Breadth-first walk below `direct`, then assembly from the deepest level up.
fn materialize(
    conn: &Connection,
    root_id: i64,
    direct: Vec<Comment>,
    max_depth: usize,
) -> Result<Vec<Comment>, ApiError> {
    let mut children_stmt = conn.prepare(&format!(
        "{COMMENT_SELECT} WHERE c.parent_id = ?1 ORDER BY c.created_at ASC, c.id ASC"
    ))?;

    let mut visited = Vec::new();
    let mut queue: VecDeque<(Comment, usize)> = direct.into_iter().map(|c| (c, 1)).collect();
    while let Some((node, depth)) = queue.pop_front() {
        if depth < max_depth && node.reply_count > 0 {
            let children = children_stmt
                .query_map([node.id], comment_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            queue.extend(children.into_iter().map(|c| (c, depth + 1)));
        }
        visited.push(node);
    }

    // reverse BFS order sees every child before its parent
    let mut children_of: HashMap<i64, Vec<Comment>> = HashMap::new();
    for mut node in visited.into_iter().rev() {
        if let Some(mut kids) = children_of.remove(&node.id) {
            kids.reverse();
            node.replies = kids;
        }
        let parent = node.parent_id.unwrap_or(root_id);
        children_of.entry(parent).or_default().push(node);
    }

    let mut top = children_of.remove(&root_id).unwrap_or_default();
    top.reverse();
    Ok(top)
}

pub fn insert_comment(
    conn: &Connection,
    model_id: i64,
    author_id: i64,
    payload: &CreateComment,
) -> Result<Comment, ApiError> {
    models::require_public(conn, model_id)?;
    let content = validate_content(&payload.content)?;

    if let Some(parent_id) = payload.parent_id {
        let parent_model: i64 = conn
            .query_row(
                "SELECT model_id FROM comments WHERE id = ?1",
                [parent_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| ApiError::NotFound("Parent comment not found".into()))?;
        if parent_model != model_id {
            return Err(ApiError::BadRequest(
                "Parent comment belongs to a different model".into(),
            ));
        }
    }

    conn.execute(
        "INSERT INTO comments (model_id, author_id, parent_id, content) VALUES (?1, ?2, ?3, ?4)",
        params![model_id, author_id, payload.parent_id, content],
    )?;
    let id = conn.last_insert_rowid();

    find_comment(conn, id)?
        .ok_or_else(|| ApiError::Internal(format!("comment {id} vanished after insert")))
}

pub fn edit_comment(
    conn: &Connection,
    id: i64,
    user_id: i64,
    payload: &UpdateComment,
) -> Result<Comment, ApiError> {
    let (author_id, current) = author_and_content(conn, id)?;
    if author_id != user_id {
        return Err(ApiError::Forbidden("You can only edit your own comments".into()));
    }

    let content = validate_content(&payload.content)?;
    if content == current {
        return Err(ApiError::BadRequest("Comment content is unchanged".into()));
    }

    conn.execute(
        "UPDATE comments
         SET content = ?1, is_edited = 1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE id = ?2",
        params![content, id],
    )?;

    find_comment(conn, id)?.ok_or_else(|| ApiError::NotFound("Comment not found".into()))
}

/// Deletes a comment; descendants go with it through the foreign-key cascade.
/// Returns how many comments were removed in total.
pub fn remove_comment(conn: &Connection, id: i64, user_id: i64) -> Result<i64, ApiError> {
    let (author_id, _) = author_and_content(conn, id)?;
    if author_id != user_id {
        return Err(ApiError::Forbidden("You can only delete your own comments".into()));
    }

    let subtree: i64 = conn.query_row(
        "WITH RECURSIVE subtree(id) AS (
             SELECT ?1
             UNION ALL
             SELECT c.id FROM comments c JOIN subtree s ON c.parent_id = s.id
         )
         SELECT COUNT(*) FROM subtree",
        [id],
        |row| row.get(0),
    )?;

    conn.execute("DELETE FROM comments WHERE id = ?1", [id])?;
    Ok(subtree)
}

// ── Handlers ──

/// GET /api/models/:id/comments?page=1&limit=10
pub async fn list_comments(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Query(params): Query<db::PageParams>,
) -> Result<Json<ApiResponse<CommentPage>>, ApiError> {
    let model_id = parse_id(&raw_id, "model")?;
    let (page, limit) = params.resolve();

    let result =
        db::with_conn(&state.db, move |conn| list_top_level(conn, model_id, page, limit)).await?;
    tracing::debug!(model_id, page, count = result.comments.len(), "listed comments");
    Ok(Json(ApiResponse::ok("Comments retrieved", result)))
}

/// POST /api/models/:id/comments
pub async fn create_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
    Json(payload): Json<CreateComment>,
) -> Result<Json<ApiResponse<Comment>>, ApiError> {
    let model_id = parse_id(&raw_id, "model")?;
    let user = auth::authenticate(&state, &headers).await?;

    let comment = db::with_conn(&state.db, move |conn| {
        insert_comment(conn, model_id, user.id, &payload)
    })
    .await?;
    tracing::info!(
        comment_id = comment.id,
        model_id,
        parent_id = ?comment.parent_id,
        "comment created"
    );
    Ok(Json(ApiResponse::ok("Comment created", comment)))
}

/// GET /api/comments/:id?page=1&limit=10: replies with nested subtrees
pub async fn get_replies(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Query(params): Query<db::PageParams>,
) -> Result<Json<ApiResponse<RepliesPage>>, ApiError> {
    let comment_id = parse_id(&raw_id, "comment")?;
    let (page, limit) = params.resolve();
    let max_depth = state.config.max_reply_depth;

    let result = db::with_conn(&state.db, move |conn| {
        fetch_replies(conn, comment_id, page, limit, max_depth)
    })
    .await?;
    tracing::debug!(comment_id, page, total = result.pagination.total, "fetched replies");
    Ok(Json(ApiResponse::ok("Replies retrieved", result)))
}

/// PUT /api/comments/:id
pub async fn update_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
    Json(payload): Json<UpdateComment>,
) -> Result<Json<ApiResponse<Comment>>, ApiError> {
    let id = parse_id(&raw_id, "comment")?;
    let user = auth::authenticate(&state, &headers).await?;

    let comment = db::with_conn(&state.db, move |conn| edit_comment(conn, id, user.id, &payload))
        .await?;
    tracing::info!(comment_id = id, "comment edited");
    Ok(Json(ApiResponse::ok("Comment updated", comment)))
}

/// DELETE /api/comments/:id
pub async fn delete_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let id = parse_id(&raw_id, "comment")?;
    let user = auth::authenticate(&state, &headers).await?;

    let removed = db::with_conn(&state.db, move |conn| remove_comment(conn, id, user.id)).await?;
    tracing::info!(comment_id = id, removed, "comment deleted");
    Ok(Json(ApiResponse::ok(
        "Comment deleted",
        serde_json::json!({ "id": id, "removed": removed }),
    )))
}
