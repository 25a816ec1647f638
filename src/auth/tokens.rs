use rand::Rng;
use rusqlite::params;

use crate::state::DbPool;

/// Create a new bearer token for a user. Returns the token value.
pub fn create_token(pool: &DbPool, user_id: &str, hours: u64) -> Result<String, rusqlite::Error> {
    let conn = pool.get().map_err(|e| {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some(e.to_string()),
        )
    })?;

    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at) VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, user_id, token, format!("+{} hours", hours)],
    )?;

    Ok(token)
}

/// Delete a session by token.
pub fn delete_token(pool: &DbPool, token: &str) -> Result<(), rusqlite::Error> {
    let conn = pool.get().map_err(|e| {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some(e.to_string()),
        )
    })?;

    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        let t1 = generate_token();
        let t2 = generate_token();
        assert_ne!(t1, t2);
    }

    #[test]
    fn created_token_resolves_until_deleted() {
        let pool = db::test_pool();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO users (id, email, name) VALUES ('u1', 'u1@x.y', 'U1')",
            [],
        )
        .unwrap();
        drop(conn);

        let token = create_token(&pool, "u1", 1).unwrap();

        let conn = pool.get().unwrap();
        let user_id: String = conn
            .query_row(
                "SELECT user_id FROM sessions WHERE token = ?1 AND expires_at > datetime('now')",
                params![token],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(user_id, "u1");
        drop(conn);

        delete_token(&pool, &token).unwrap();
        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sessions WHERE token = ?1",
                params![token],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }
}
