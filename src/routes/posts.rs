use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// A post with its author denormalized in, matching the read API shape.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub title: String,
    pub body: String,
    pub image: Option<String>,
    pub author_id: String,
    pub created_at: String,
    pub author: User,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts))
        .route("/posts/{id}", get(get_post))
}

/// GET /api/posts — newest first, author included.
async fn list_posts(State(state): State<AppState>) -> AppResult<Json<Vec<PostView>>> {
    let conn = state.db.get()?;
    Ok(Json(query_posts(&conn)?))
}

/// GET /api/posts/{id}
async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PostView>> {
    let conn = state.db.get()?;
    let post = query_post(&conn, &id)?.ok_or(AppError::NotFound)?;
    Ok(Json(post))
}

// -- Query helpers --

const POST_COLUMNS: &str = "p.id, p.title, p.body, p.image, p.author_id, p.created_at,
     u.id, u.email, u.name, u.avatar, u.created_at";

pub fn query_posts(conn: &rusqlite::Connection) -> Result<Vec<PostView>, AppError> {
    let sql = format!(
        "SELECT {POST_COLUMNS}
         FROM posts p
         JOIN users u ON u.id = p.author_id
         ORDER BY p.created_at DESC, p.id DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let posts = stmt
        .query_map([], post_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

pub fn query_post(conn: &rusqlite::Connection, id: &str) -> Result<Option<PostView>, AppError> {
    let sql = format!(
        "SELECT {POST_COLUMNS}
         FROM posts p
         JOIN users u ON u.id = p.author_id
         WHERE p.id = ?1"
    );
    conn.query_row(&sql, params![id], post_from_row)
        .optional()
        .map_err(AppError::from)
}

fn post_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PostView> {
    Ok(PostView {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        image: row.get(3)?,
        author_id: row.get(4)?,
        created_at: row.get(5)?,
        author: User {
            id: row.get(6)?,
            email: row.get(7)?,
            name: row.get(8)?,
            password_hash: None,
            avatar: row.get(9)?,
            created_at: row.get(10)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn setup() -> crate::state::DbPool {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO users (id, email, name) VALUES ('u1', 'a@x.y', 'Author')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO posts (id, title, body, author_id, created_at)
             VALUES ('p1', 'First', 'body one', 'u1', '2026-01-01 10:00:00'),
                    ('p2', 'Second', 'body two', 'u1', '2026-01-02 10:00:00')",
            [],
        )
        .unwrap();
        pool
    }

    #[test]
    fn list_is_newest_first_with_author() {
        let pool = setup();
        let conn = pool.get().unwrap();
        let posts = query_posts(&conn).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, "p2");
        assert_eq!(posts[1].id, "p1");
        assert_eq!(posts[0].author.name, "Author");
    }

    #[test]
    fn get_by_id_finds_post() {
        let pool = setup();
        let conn = pool.get().unwrap();
        let post = query_post(&conn, "p1").unwrap().unwrap();
        assert_eq!(post.title, "First");
        assert_eq!(post.author.email, "a@x.y");
    }

    #[test]
    fn get_missing_post_is_none() {
        let pool = setup();
        let conn = pool.get().unwrap();
        assert!(query_post(&conn, "nope").unwrap().is_none());
    }
}
