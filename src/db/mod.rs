use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

// 建表语句按依赖顺序执行，全部幂等
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        user_id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        date_of_birth TEXT,
        photo_url TEXT,
        city TEXT,
        gender TEXT NOT NULL,
        interested_in TEXT NOT NULL DEFAULT '[]',
        verification_status TEXT NOT NULL DEFAULT 'unverified',
        is_active INTEGER NOT NULL DEFAULT 1,
        hide_distance INTEGER NOT NULL DEFAULT 0,
        latitude REAL,
        longitude REAL,
        last_location_updated_at TEXT,
        published_lat REAL,
        published_lng REAL,
        published_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_blocks (
        blocker_id TEXT NOT NULL,
        blocked_id TEXT NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (blocker_id, blocked_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS crossed_pairs (
        pair_id TEXT PRIMARY KEY,
        user_a TEXT NOT NULL,
        user_b TEXT NOT NULL,
        count INTEGER NOT NULL DEFAULT 0,
        last_crossed_at TEXT NOT NULL,
        unlock_expires_at TEXT,
        UNIQUE (user_a, user_b)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS encounter_history (
        entry_id TEXT PRIMARY KEY,
        user_a TEXT NOT NULL,
        user_b TEXT NOT NULL,
        area_name TEXT NOT NULL,
        created_at TEXT NOT NULL,
        expires_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS alert_events (
        event_id TEXT PRIMARY KEY,
        subject_user_id TEXT NOT NULL,
        candidate_user_id TEXT NOT NULL,
        created_at TEXT NOT NULL,
        expires_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_users_latitude ON users (latitude)",
    "CREATE INDEX IF NOT EXISTS idx_users_published_lat ON users (published_lat)",
    "CREATE INDEX IF NOT EXISTS idx_crossed_pairs_user_a ON crossed_pairs (user_a)",
    "CREATE INDEX IF NOT EXISTS idx_crossed_pairs_user_b ON crossed_pairs (user_b)",
    "CREATE INDEX IF NOT EXISTS idx_history_user_a ON encounter_history (user_a)",
    "CREATE INDEX IF NOT EXISTS idx_history_user_b ON encounter_history (user_b)",
    "CREATE INDEX IF NOT EXISTS idx_history_expires ON encounter_history (expires_at)",
    "CREATE INDEX IF NOT EXISTS idx_alerts_subject ON alert_events (subject_user_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_alerts_expires ON alert_events (expires_at)",
];

pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    // 内存库每个连接都是一个独立的空库，只能用单连接
    let max_connections = if database_url.contains(":memory:") {
        1
    } else {
        10
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;

    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_creates_schema_idempotently() {
        let pool = connect("sqlite::memory:").await.unwrap();
        // 重复初始化不报错
        init_schema(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
