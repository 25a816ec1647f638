pub mod models;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

use crate::state::DbPool;

const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial",
    include_str!("../../migrations/001_initial.sql"),
)];

// Pragmas run per pooled connection: busy_timeout and foreign_keys are
// connection-local, so setting them once on a single connection is not enough.
const CONN_PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA foreign_keys = ON;
    PRAGMA busy_timeout = 5000;
";

pub fn create_pool(db_path: &Path) -> anyhow::Result<DbPool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(db_path)
        .with_init(|conn| conn.execute_batch(CONN_PRAGMAS));
    let pool = Pool::builder().max_size(8).build(manager)?;

    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get()?;

    // Create migrations tracking table
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_version WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        if !already_applied {
            tracing::info!("Applying migration: {}", name);
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_version (name) VALUES (?1)",
                params![name],
            )?;
        }
    }

    tracing::info!("Database migrations complete");
    Ok(())
}

/// Insert demo users, one post, and a small comment thread. Counters start
/// at zero so they stay equal to the (empty) upvote join table.
pub fn seed_demo(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get()?;

    let already_seeded: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE email = 'admin@banter.local'",
        [],
        |row| row.get(0),
    )?;
    if already_seeded {
        tracing::info!("Demo data already present, skipping seed");
        return Ok(());
    }

    let password_hash = bcrypt::hash("password123", bcrypt::DEFAULT_COST)?;

    let mut user_ids = Vec::new();
    for (name, email) in [
        ("Admin", "admin@banter.local"),
        ("Riya Sen", "riya@banter.local"),
        ("Ava Rao", "ava@banter.local"),
        ("Arjun Mehta", "arjun@banter.local"),
    ] {
        let id = uuid::Uuid::now_v7().to_string();
        conn.execute(
            "INSERT INTO users (id, email, name, password_hash) VALUES (?1, ?2, ?3, ?4)",
            params![id, email, name, password_hash],
        )?;
        user_ids.push(id);
    }

    let post_id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO posts (id, title, body, author_id) VALUES (?1, ?2, ?3, ?4)",
        params![
            post_id,
            "Nested commenting, done right",
            "Designing a clean, scalable API for threaded discussions.",
            user_ids[0]
        ],
    )?;

    let insert_comment = |user: &str, parent: Option<&str>, text: &str| -> anyhow::Result<String> {
        let id = uuid::Uuid::now_v7().to_string();
        conn.execute(
            "INSERT INTO comments (id, post_id, user_id, parent_id, text) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, post_id, user, parent, text],
        )?;
        Ok(id)
    };

    let c1 = insert_comment(&user_ids[3], None, "Brilliant explanation!")?;
    let c2 = insert_comment(&user_ids[2], Some(&c1), "I completely agree with your point here.")?;
    insert_comment(&user_ids[1], Some(&c1), "Could you share references?")?;
    insert_comment(&user_ids[1], Some(&c2), "Adding a counter-example might help readers.")?;
    insert_comment(&user_ids[2], None, "Hot take: we should benchmark this against a baseline.")?;

    tracing::info!("Demo data seeded (all users have password: password123)");
    Ok(())
}

#[cfg(test)]
pub fn test_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory()
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    run_migrations(&pool).unwrap();
    pool
}
