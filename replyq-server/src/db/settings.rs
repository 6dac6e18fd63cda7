//! Settings table accessors
//!
//! Operational tunables live in the database so they can be changed without
//! a restart; callers pass a compiled default for the not-yet-seeded case.

use replyq_common::Result;
use sqlx::SqlitePool;

/// Read an integer setting, falling back to the given default
pub async fn get_i64(pool: &SqlitePool, key: &str, default: i64) -> Result<i64> {
    let value: Option<i64> =
        sqlx::query_scalar("SELECT CAST(value AS INTEGER) FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    Ok(value.unwrap_or(default))
}

/// Read a string setting, falling back to the given default
pub async fn get_string(pool: &SqlitePool, key: &str, default: &str) -> Result<String> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(value.unwrap_or_else(|| default.to_string()))
}
