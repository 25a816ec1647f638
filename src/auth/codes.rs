use rand::Rng;
use rusqlite::params;

use crate::error::{AppError, AppResult};
use crate::state::DbPool;

// Matches the bcrypt work factor used for passwords.
const BCRYPT_COST: u32 = 10;

/// Generate a 6-digit zero-padded one-time code.
pub fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:06}", n)
}

/// Store a bcrypt hash of `code` for `email`, replacing any earlier code
/// for the same address. The plaintext never touches the database.
pub fn issue_code(pool: &DbPool, email: &str, code: &str, ttl_minutes: u64) -> AppResult<()> {
    let conn = pool.get()?;
    let code_hash = bcrypt::hash(code, BCRYPT_COST)?;
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute("DELETE FROM login_codes WHERE email = ?1", params![email])?;
    conn.execute(
        "INSERT INTO login_codes (id, email, code_hash, expires_at) VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, email, code_hash, format!("+{} minutes", ttl_minutes)],
    )?;

    Ok(())
}

/// Check `code` against the live code for `email` and consume it on success.
/// Returns Unauthorized for unknown, expired, or mismatched codes.
pub fn verify_and_consume(pool: &DbPool, email: &str, code: &str) -> AppResult<()> {
    let conn = pool.get()?;

    // Expired codes are dead weight; clear them while we are here.
    conn.execute(
        "DELETE FROM login_codes WHERE expires_at <= datetime('now')",
        [],
    )?;

    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT id, code_hash FROM login_codes \
             WHERE email = ?1 AND expires_at > datetime('now')",
            params![email],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .ok();

    let (id, code_hash) = row.ok_or(AppError::Unauthorized)?;

    if !bcrypt::verify(code, &code_hash)? {
        return Err(AppError::Unauthorized);
    }

    // Single use: consume on success.
    conn.execute("DELETE FROM login_codes WHERE id = ?1", params![id])?;
    Ok(())
}
