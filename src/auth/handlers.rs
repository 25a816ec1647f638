use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::{codes, tokens};
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::{extract_bearer_token, CurrentUser};
use crate::state::AppState;

const BCRYPT_COST: u32 = 10;
const MIN_PASSWORD_LEN: usize = 8;

// -- Request / response types --

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
    pub avatar: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Deserialize)]
pub struct CodeRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct CodeVerifyRequest {
    pub email: String,
    pub code: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

// -- Handlers --

/// POST /api/auth/register — password signup.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Response> {
    let email = normalize_email(&req.email)?;
    check_domain(&state, &email)?;

    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(
            "Password must be at least 8 characters".into(),
        ));
    }

    let conn = state.db.get()?;
    if find_user_by_email(&conn, &email)?.is_some() {
        return Err(AppError::BadRequest("Email already registered".into()));
    }

    let password_hash = bcrypt::hash(&req.password, BCRYPT_COST)?;
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO users (id, email, name, password_hash, avatar) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, email, name, password_hash, req.avatar],
    )?;
    let user = find_user_by_email(&conn, &email)?
        .ok_or_else(|| AppError::Internal("user vanished after insert".into()))?;
    drop(conn);

    let token = tokens::create_token(&state.db, &user.id, state.config.auth.token_hours)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })).into_response())
}

/// POST /api/auth/login — password login. Name/avatar in the body refresh
/// the stored profile on success.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Response> {
    let email = normalize_email(&req.email)?;

    let conn = state.db.get()?;
    let user = find_user_by_email(&conn, &email)?.ok_or(AppError::Unauthorized)?;
    let hash = user.password_hash.as_deref().ok_or(AppError::Unauthorized)?;
    if !bcrypt::verify(&req.password, hash)? {
        return Err(AppError::Unauthorized);
    }

    refresh_profile(&conn, &user.id, req.name.as_deref(), req.avatar.as_deref())?;
    let user = find_user_by_email(&conn, &email)?.ok_or(AppError::Unauthorized)?;
    drop(conn);

    let token = tokens::create_token(&state.db, &user.id, state.config.auth.token_hours)?;
    Ok(Json(AuthResponse { token, user }).into_response())
}

/// POST /api/auth/code/request — issue a one-time login code and hand it
/// to the mailer. The response does not reveal whether the address is known.
pub async fn request_code(
    State(state): State<AppState>,
    Json(req): Json<CodeRequest>,
) -> AppResult<Response> {
    let email = normalize_email(&req.email)?;
    check_domain(&state, &email)?;

    let code = codes::generate_code();
    codes::issue_code(&state.db, &email, &code, state.config.auth.code_ttl_minutes)?;
    state.mailer.send_login_code(&email, &code);

    Ok(Json(json!({ "ok": true })).into_response())
}

/// POST /api/auth/code/verify — exchange a one-time code for a token.
/// Creates the user on first login; refreshes name/avatar otherwise.
pub async fn verify_code(
    State(state): State<AppState>,
    Json(req): Json<CodeVerifyRequest>,
) -> AppResult<Response> {
    let email = normalize_email(&req.email)?;
    check_domain(&state, &email)?;

    codes::verify_and_consume(&state.db, &email, &req.code)?;

    let conn = state.db.get()?;
    let user = upsert_code_user(&conn, &email, req.name.as_deref(), req.avatar.as_deref())?;
    drop(conn);

    let token = tokens::create_token(&state.db, &user.id, state.config.auth.token_hours)?;
    Ok(Json(AuthResponse { token, user }).into_response())
}

/// GET /api/auth/me — the caller's profile.
pub async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<User>> {
    let conn = state.db.get()?;
    let user = find_user_by_id(&conn, &user.id)?.ok_or(AppError::Unauthorized)?;
    Ok(Json(user))
}

/// POST /api/auth/logout — invalidate the presented token.
pub async fn logout(
    State(state): State<AppState>,
    _user: CurrentUser,
    headers: HeaderMap,
) -> AppResult<Response> {
    if let Some(token) = extract_bearer_token(&headers) {
        tokens::delete_token(&state.db, token)?;
    }
    Ok(Json(json!({ "ok": true })).into_response())
}

// -- Helpers --

/// Lowercase the address and require a user@domain shape.
pub fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::BadRequest("Email required".into())),
    }
}

fn check_domain(state: &AppState, email: &str) -> AppResult<()> {
    let domain = email.split_once('@').map(|(_, d)| d).unwrap_or("");
    if state.config.domain_allowed(domain) {
        Ok(())
    } else {
        Err(AppError::Forbidden("Domain not allowed".into()))
    }
}

pub fn find_user_by_email(conn: &rusqlite::Connection, email: &str) -> AppResult<Option<User>> {
    conn.query_row(
        "SELECT id, email, name, password_hash, avatar, created_at FROM users WHERE email = ?1",
        params![email],
        user_from_row,
    )
    .optional()
    .map_err(AppError::from)
}

pub fn find_user_by_id(conn: &rusqlite::Connection, id: &str) -> AppResult<Option<User>> {
    conn.query_row(
        "SELECT id, email, name, password_hash, avatar, created_at FROM users WHERE id = ?1",
        params![id],
        user_from_row,
    )
    .optional()
    .map_err(AppError::from)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        password_hash: row.get(3)?,
        avatar: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn refresh_profile(
    conn: &rusqlite::Connection,
    user_id: &str,
    name: Option<&str>,
    avatar: Option<&str>,
) -> AppResult<()> {
    if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
        conn.execute(
            "UPDATE users SET name = ?1 WHERE id = ?2",
            params![name, user_id],
        )?;
    }
    if let Some(avatar) = avatar.filter(|a| !a.is_empty()) {
        conn.execute(
            "UPDATE users SET avatar = ?1 WHERE id = ?2",
            params![avatar, user_id],
        )?;
    }
    Ok(())
}

/// Create the user on first code login, or refresh name/avatar on a repeat
/// one. The default display name is the address's local part.
pub fn upsert_code_user(
    conn: &rusqlite::Connection,
    email: &str,
    name: Option<&str>,
    avatar: Option<&str>,
) -> AppResult<User> {
    match find_user_by_email(conn, email)? {
        Some(user) => {
            refresh_profile(conn, &user.id, name, avatar)?;
            find_user_by_email(conn, email)?
                .ok_or_else(|| AppError::Internal("user vanished during refresh".into()))
        }
        None => {
            let default_name = email.split('@').next().unwrap_or("User");
            let name = name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or(default_name);
            let id = uuid::Uuid::now_v7().to_string();
            conn.execute(
                "INSERT INTO users (id, email, name, avatar) VALUES (?1, ?2, ?3, ?4)",
                params![id, email, name, avatar],
            )?;
            find_user_by_email(conn, email)?
                .ok_or_else(|| AppError::Internal("user vanished after insert".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn normalize_email_lowercases_and_trims() {
        assert_eq!(
            normalize_email("  Riya@Example.EDU ").unwrap(),
            "riya@example.edu"
        );
    }

    #[test]
    fn normalize_email_rejects_malformed_addresses() {
        for bad in ["", "nodomain", "@example.edu", "user@nodot"] {
            assert!(normalize_email(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn upsert_creates_user_with_local_part_name() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        let user = upsert_code_user(&conn, "riya@example.edu", None, None).unwrap();
        assert_eq!(user.name, "riya");
        assert_eq!(user.email, "riya@example.edu");
        assert!(user.password_hash.is_none());
    }

    #[test]
    fn upsert_refreshes_profile_on_repeat_login() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        let first = upsert_code_user(&conn, "riya@example.edu", None, None).unwrap();
        let second = upsert_code_user(
            &conn,
            "riya@example.edu",
            Some("Riya Sen"),
            Some("https://pics.example/riya.png"),
        )
        .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Riya Sen");
        assert_eq!(second.avatar.as_deref(), Some("https://pics.example/riya.png"));
    }

    #[test]
    fn upsert_keeps_existing_profile_when_fields_absent() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        upsert_code_user(&conn, "riya@example.edu", Some("Riya Sen"), None).unwrap();
        let again = upsert_code_user(&conn, "riya@example.edu", None, None).unwrap();
        assert_eq!(again.name, "Riya Sen");
    }
}
