use axum::{extract::State, http::HeaderMap, Json};
use jsonwebtoken::{decode, DecodingKey, Validation};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use vrcface_shared::{ApiResponse, User};

use crate::{db, error::ApiError, AppState};

// ── JWT Claims ──

/// Claims of a token issued by the hosted identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // provider subject
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    pub exp: usize,
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn verify_token(token: &str, jwt_secret: &str) -> Result<Claims, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "rejected bearer token");
        ApiError::Unauthorized
    })?;

    if data.claims.sub.trim().is_empty() {
        return Err(ApiError::Unauthorized);
    }
    Ok(data.claims)
}

/// Maps a provider subject onto the local users table.
pub fn upsert_user(conn: &Connection, claims: &Claims) -> Result<User, ApiError> {
    let username = claims
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("user-{}", claims.sub.chars().take(8).collect::<String>()));
    let avatar = claims.picture.clone().unwrap_or_default();

    conn.execute(
        "INSERT INTO users (subject, username, avatar_url)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(subject) DO UPDATE SET username = ?2, avatar_url = ?3",
        params![claims.sub, username, avatar],
    )?;

    let user = conn.query_row(
        "SELECT id, username, avatar_url FROM users WHERE subject = ?1",
        [&claims.sub],
        |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
                avatar_url: row.get(2)?,
            })
        },
    )?;
    Ok(user)
}

/// Resolves the caller from the `Authorization: Bearer` header.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = bearer_token(headers).ok_or(ApiError::Unauthorized)?;
    let claims = verify_token(token, &state.config.jwt_secret)?;
    db::with_conn(&state.db, move |conn| upsert_user(conn, &claims)).await
}

// ── Handlers ──

/// GET /api/auth/me: return current user
pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let user = authenticate(&state, &headers).await?;
    Ok(Json(ApiResponse::ok("Current user", user)))
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::db::testing::setup_conn;
    use jsonwebtoken::{encode, EncodingKey, Header};

    pub const SECRET: &str = "test-secret";

    pub fn token_for(subject: &str, name: &str) -> String {
        let exp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as usize
            + 3600;
        let claims = Claims {
            sub: subject.to_string(),
            name: Some(name.to_string()),
            picture: None,
            exp,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert("Authorization", "Basic abc".parse().unwrap());
        assert!(bearer_token(&headers).is_none());

        headers.insert("Authorization", "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));
    }

    #[test]
    fn valid_token_round_trips_claims() {
        let claims = verify_token(&token_for("idp|123", "Mika"), SECRET).unwrap();
        assert_eq!(claims.sub, "idp|123");
        assert_eq!(claims.name.as_deref(), Some("Mika"));
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let result = verify_token(&token_for("idp|123", "Mika"), "other-secret");
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[test]
    fn expired_token_is_unauthorized() {
        let claims = Claims {
            sub: "idp|1".into(),
            name: None,
            picture: None,
            exp: 1_000,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(matches!(verify_token(&token, SECRET), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn upsert_keeps_id_and_refreshes_profile() {
        let conn = setup_conn();
        let mut claims = Claims {
            sub: "idp|abcdefghijk".into(),
            name: None,
            picture: None,
            exp: 0,
        };
        let first = upsert_user(&conn, &claims).unwrap();
        assert_eq!(first.username, "user-idp|abcd");

        claims.name = Some("Kana".into());
        claims.picture = Some("https://cdn.example/kana.png".into());
        let second = upsert_user(&conn, &claims).unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.username, "Kana");
        assert_eq!(second.avatar_url, "https://cdn.example/kana.png");
    }
}
