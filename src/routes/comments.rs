use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::state::AppState;

const MAX_COMMENT_CHARS: usize = 5000;

/// A comment with its author denormalized in and the caller's upvote state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub parent_id: Option<String>,
    pub text: String,
    pub upvotes: i64,
    pub created_at: String,
    pub user: User,
    pub upvoted: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub post_id: String,
    pub parent_id: Option<String>,
    pub text: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/comments", post(create))
        .route("/comments/post/{post_id}", get(list))
        .route("/comments/{id}/upvote", post(upvote))
}

// -- Handlers --

/// GET /api/comments/post/{post_id} — oldest first; parents always sort at
/// or before their replies, so clients can rebuild the tree in one pass.
async fn list(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(post_id): Path<String>,
) -> AppResult<Json<Vec<CommentView>>> {
    let conn = state.db.get()?;
    let viewer = user.as_ref().map(|u| u.id.as_str());
    Ok(Json(list_comments(&conn, &post_id, viewer)?))
}

/// POST /api/comments
async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<CommentView>)> {
    let conn = state.db.get()?;
    let comment = create_comment(
        &conn,
        &req.post_id,
        &user.id,
        req.parent_id.as_deref(),
        &req.text,
    )?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// POST /api/comments/{id}/upvote
async fn upvote(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<CommentView>> {
    let mut conn = state.db.get()?;
    Ok(Json(toggle_upvote(&mut conn, &id, &user.id)?))
}

// -- Engine --

/// Validate and persist a new comment. The parent, when given, must exist
/// and belong to the same post; the referenced post must exist. The storage
/// layer's foreign keys are a backstop, not the primary check.
pub fn create_comment(
    conn: &rusqlite::Connection,
    post_id: &str,
    user_id: &str,
    parent_id: Option<&str>,
    text: &str,
) -> Result<CommentView, AppError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::BadRequest("Comment text cannot be empty".into()));
    }
    if text.chars().count() > MAX_COMMENT_CHARS {
        return Err(AppError::BadRequest(
            "Comment text must be 5000 characters or less".into(),
        ));
    }

    let post_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![post_id],
        |row| row.get(0),
    )?;
    if !post_exists {
        return Err(AppError::NotFound);
    }

    if let Some(parent_id) = parent_id {
        let parent_post: Option<String> = conn
            .query_row(
                "SELECT post_id FROM comments WHERE id = ?1",
                params![parent_id],
                |row| row.get(0),
            )
            .optional()?;
        match parent_post {
            None => return Err(AppError::NotFound),
            Some(p) if p != post_id => {
                return Err(AppError::BadRequest(
                    "Parent comment belongs to a different post".into(),
                ))
            }
            Some(_) => {}
        }
    }

    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO comments (id, post_id, user_id, parent_id, text) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, post_id, user_id, parent_id, text],
    )?;

    query_comment(conn, &id, None)?.ok_or(AppError::NotFound)
}

/// All comments of a post, creation order, each annotated with whether
/// `viewer` has upvoted it. Anonymous readers skip the per-user lookup
/// entirely and always see `upvoted: false`.
pub fn list_comments(
    conn: &rusqlite::Connection,
    post_id: &str,
    viewer: Option<&str>,
) -> Result<Vec<CommentView>, AppError> {
    let comments = match viewer {
        Some(viewer_id) => {
            let sql = format!(
                "SELECT {COMMENT_COLUMNS},
                        EXISTS(SELECT 1 FROM upvotes v
                               WHERE v.comment_id = c.id AND v.user_id = ?2)
                 FROM comments c
                 JOIN users u ON u.id = c.user_id
                 WHERE c.post_id = ?1
                 ORDER BY c.created_at ASC, c.id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![post_id, viewer_id], |row| {
                    let upvoted: bool = row.get(12)?;
                    comment_from_row(row, upvoted)
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let sql = format!(
                "SELECT {COMMENT_COLUMNS}
                 FROM comments c
                 JOIN users u ON u.id = c.user_id
                 WHERE c.post_id = ?1
                 ORDER BY c.created_at ASC, c.id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![post_id], |row| comment_from_row(row, false))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(comments)
}

/// Flip `user_id`'s upvote on a comment inside one immediate transaction:
/// delete-if-present else insert, with the matching counter delta. The
/// UNIQUE(user_id, comment_id) constraint backstops the pairing; the
/// transaction keeps the denormalized counter equal to the live pair count
/// under concurrent callers.
pub fn toggle_upvote(
    conn: &mut rusqlite::Connection,
    comment_id: &str,
    user_id: &str,
) -> Result<CommentView, AppError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let exists: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM comments WHERE id = ?1",
        params![comment_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(AppError::NotFound);
    }

    let removed = tx.execute(
        "DELETE FROM upvotes WHERE comment_id = ?1 AND user_id = ?2",
        params![comment_id, user_id],
    )?;

    let upvoted = if removed > 0 {
        tx.execute(
            "UPDATE comments SET upvotes = upvotes - 1 WHERE id = ?1",
            params![comment_id],
        )?;
        false
    } else {
        let id = uuid::Uuid::now_v7().to_string();
        tx.execute(
            "INSERT INTO upvotes (id, comment_id, user_id) VALUES (?1, ?2, ?3)",
            params![id, comment_id, user_id],
        )?;
        tx.execute(
            "UPDATE comments SET upvotes = upvotes + 1 WHERE id = ?1",
            params![comment_id],
        )?;
        true
    };

    let comment = query_comment(&tx, comment_id, Some(upvoted))?.ok_or(AppError::NotFound)?;
    tx.commit()?;
    Ok(comment)
}

// -- Query helpers --

const COMMENT_COLUMNS: &str = "c.id, c.post_id, c.user_id, c.parent_id, c.text, c.upvotes, c.created_at,
     u.id, u.email, u.name, u.avatar, u.created_at";

fn query_comment(
    conn: &rusqlite::Connection,
    id: &str,
    upvoted: Option<bool>,
) -> Result<Option<CommentView>, AppError> {
    let sql = format!(
        "SELECT {COMMENT_COLUMNS}
         FROM comments c
         JOIN users u ON u.id = c.user_id
         WHERE c.id = ?1"
    );
    conn.query_row(&sql, params![id], |row| {
        comment_from_row(row, upvoted.unwrap_or(false))
    })
    .optional()
    .map_err(AppError::from)
}

fn comment_from_row(row: &rusqlite::Row<'_>, upvoted: bool) -> rusqlite::Result<CommentView> {
    Ok(CommentView {
        id: row.get(0)?,
        post_id: row.get(1)?,
        user_id: row.get(2)?,
        parent_id: row.get(3)?,
        text: row.get(4)?,
        upvotes: row.get(5)?,
        created_at: row.get(6)?,
        user: User {
            id: row.get(7)?,
            email: row.get(8)?,
            name: row.get(9)?,
            password_hash: None,
            avatar: row.get(10)?,
            created_at: row.get(11)?,
        },
        upvoted,
    })
}
