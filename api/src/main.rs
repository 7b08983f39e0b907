mod auth;
mod comments;
mod config;
mod db;
mod error;
mod likes;
mod models;

use anyhow::Context;
use axum::{routing::get, Router};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

pub type DbPool = r2d2::Pool<r2d2_sqlite::SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
}

fn app(state: AppState) -> anyhow::Result<Router> {
    let origin = state
        .config
        .cors_origin
        .parse::<axum::http::HeaderValue>()
        .with_context(|| format!("Invalid CORS_ORIGIN {:?}", state.config.cors_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(AllowMethods::any())
        .allow_headers(AllowHeaders::any());

    let router = Router::new()
        .route("/api/health", get(|| async { "ok" }))
        // Auth
        .route("/api/auth/me", get(auth::me))
        // Models
        .route(
            "/api/models",
            get(models::list_models).post(models::create_model),
        )
        .route("/api/models/{id}", get(models::get_model))
        .route(
            "/api/models/{id}/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
        // Comments
        .route(
            "/api/comments/{id}",
            get(comments::get_replies)
                .put(comments::update_comment)
                .delete(comments::delete_comment),
        )
        .route(
            "/api/comments/{id}/like",
            get(likes::get_like).post(likes::toggle),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(router)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;

    let manager = r2d2_sqlite::SqliteConnectionManager::file(&config.database_url)
        .with_init(db::configure);
    let pool = r2d2::Pool::new(manager).context("Failed to create DB pool")?;

    db::run_migrations(&pool)
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {e}"))?;

    let addr = config.bind_addr.clone();
    let app = app(AppState { db: pool, config })?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("API server listening on {addr}");
    axum::serve(listener, app).await.context("API server crashed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::{token_for, SECRET};
    use crate::db::testing::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let manager = r2d2_sqlite::SqliteConnectionManager::memory().with_init(db::configure);
        // one connection, so every request sees the same in-memory database
        let pool = r2d2::Pool::builder().max_size(1).build(manager).unwrap();
        db::run_migrations(&pool).unwrap();
        AppState {
            db: pool,
            config: Config {
                database_url: ":memory:".into(),
                bind_addr: "127.0.0.1:0".into(),
                jwt_secret: SECRET.into(),
                cors_origin: "http://localhost:1313".into(),
                max_reply_depth: 64,
            },
        }
    }

    async fn send(state: &AppState, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app(state.clone()).unwrap().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn with_json(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    /// Public model with one root comment that has `replies` direct replies.
    fn seed_thread(state: &AppState, replies: usize) -> (i64, i64) {
        let conn = state.db.get().unwrap();
        let author = seed_user(&conn, "idp|author");
        let model = seed_model(&conn, author, true);
        let root = seed_comment(&conn, model, author, None, "root");
        for i in 0..replies {
            seed_comment(&conn, model, author, Some(root), &format!("reply {i}"));
        }
        (model, root)
    }

    #[tokio::test]
    async fn reply_pages_are_wrapped_in_envelope() {
        let state = test_state();
        let (_, root) = seed_thread(&state, 15);

        let (status, body) = send(&state, get(&format!("/api/comments/{root}?page=1&limit=10"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["replies"].as_array().unwrap().len(), 10);
        assert_eq!(body["data"]["pagination"]["hasNext"], true);
        assert_eq!(body["data"]["pagination"]["totalPages"], 2);

        let (_, body) = send(&state, get(&format!("/api/comments/{root}?page=2&limit=10"))).await;
        assert_eq!(body["data"]["replies"].as_array().unwrap().len(), 5);
        assert_eq!(body["data"]["pagination"]["hasNext"], false);
    }

    #[tokio::test]
    async fn malformed_id_is_bad_request() {
        let state = test_state();
        let (status, body) = send(&state, get("/api/comments/not-a-number")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn private_model_replies_are_forbidden() {
        let state = test_state();
        let root = {
            let conn = state.db.get().unwrap();
            let author = seed_user(&conn, "idp|author");
            let model = seed_model(&conn, author, false);
            seed_comment(&conn, model, author, None, "secret")
        };

        let (status, body) = send(&state, get(&format!("/api/comments/{root}"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn editing_requires_a_token() {
        let state = test_state();
        let (_, root) = seed_thread(&state, 0);

        let req = with_json("PUT", &format!("/api/comments/{root}"), None, serde_json::json!({"content": "new"}));
        let (status, _) = send(&state, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unchanged_edit_is_bad_request() {
        let state = test_state();
        let (_, root) = seed_thread(&state, 0);
        let token = token_for("idp|author", "Author");

        let req = with_json("PUT", &format!("/api/comments/{root}"), Some(&token), serde_json::json!({"content": "root"}));
        let (status, _) = send(&state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let req = with_json("PUT", &format!("/api/comments/{root}"), Some(&token), serde_json::json!({"content": "rooted"}));
        let (status, body) = send(&state, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["isEdited"], true);
    }

    #[tokio::test]
    async fn strangers_cannot_delete() {
        let state = test_state();
        let (_, root) = seed_thread(&state, 1);
        let token = token_for("idp|stranger", "Stranger");

        let req = with_json("DELETE", &format!("/api/comments/{root}"), Some(&token), Value::Null);
        let (status, _) = send(&state, req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn author_delete_cascades_to_replies() {
        let state = test_state();
        let (_, root) = seed_thread(&state, 3);
        let token = token_for("idp|author", "Author");

        let req = with_json("DELETE", &format!("/api/comments/{root}"), Some(&token), Value::Null);
        let (status, body) = send(&state, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["removed"], 4);

        let (status, _) = send(&state, get(&format!("/api/comments/{root}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let conn = state.db.get().unwrap();
        let left: i64 = conn
            .query_row("SELECT COUNT(*) FROM comments", [], |row| row.get(0))
            .unwrap();
        assert_eq!(left, 0);
    }

    #[tokio::test]
    async fn posting_a_reply_then_listing_top_level() {
        let state = test_state();
        let (model, root) = seed_thread(&state, 0);
        let token = token_for("idp|fan", "Fan");

        let req = with_json(
            "POST",
            &format!("/api/models/{model}/comments"),
            Some(&token),
            serde_json::json!({"content": "great set", "parentId": root}),
        );
        let (status, body) = send(&state, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["parentId"], root);
        assert_eq!(body["data"]["author"]["username"], "Fan");

        let (_, body) = send(&state, get(&format!("/api/models/{model}/comments"))).await;
        let comments = body["data"]["comments"].as_array().unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0]["replyCount"], 1);
    }
}
