//! Database module - PostgreSQL connection and schema
//!
//! The store holds one table: immutable labeled typing sessions, raw
//! events serialized as JSONB. Identify never touches it; submit
//! appends one row, training reads them all.

use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use uuid::Uuid;

use crate::logic::events::KeystrokeEvent;
use crate::logic::features::UNKNOWN_LABEL;
use crate::logic::training::LabeledSession;

/// Create database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;
    tracing::info!("Database schema applied successfully");
    Ok(())
}

/// Database schema SQL
const SCHEMA_SQL: &str = r#"
-- Labeled typing sessions (immutable after creation)
CREATE TABLE IF NOT EXISTS training_sessions (
    id UUID PRIMARY KEY,
    user_id VARCHAR(100) NOT NULL,
    raw_data_json JSONB NOT NULL,
    platform VARCHAR(50),
    created_at TIMESTAMPTZ DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_training_sessions_user ON training_sessions(user_id);
"#;

/// Append one labeled session. Rows are never updated afterwards.
pub async fn insert_session(
    pool: &PgPool,
    user_id: &str,
    platform: &str,
    events: &[KeystrokeEvent],
) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();
    let raw = serde_json::to_value(events).unwrap_or(serde_json::Value::Null);
    // Column is VARCHAR(50); clients occasionally send long UA strings
    let platform: String = platform.chars().take(50).collect();

    sqlx::query(
        "INSERT INTO training_sessions (id, user_id, raw_data_json, platform) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(id)
    .bind(user_id)
    .bind(raw)
    .bind(platform)
    .execute(pool)
    .await?;

    Ok(id)
}

/// Total persisted labeled sessions; drives the auto-train trigger.
pub async fn count_labeled_sessions(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS n FROM training_sessions WHERE user_id <> '' AND user_id <> $1",
    )
    .bind(UNKNOWN_LABEL)
    .fetch_one(pool)
    .await?;
    row.try_get("n")
}

/// Load every usable labeled session. Rows whose stored events fail to
/// deserialize are skipped with a warning rather than failing the run.
pub async fn load_labeled_sessions(pool: &PgPool) -> Result<Vec<LabeledSession>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, user_id, raw_data_json FROM training_sessions \
         WHERE user_id <> '' AND user_id <> $1 ORDER BY created_at",
    )
    .bind(UNKNOWN_LABEL)
    .fetch_all(pool)
    .await?;

    let mut sessions = Vec::with_capacity(rows.len());
    for row in rows {
        let id: Uuid = row.try_get("id")?;
        let label: String = row.try_get("user_id")?;
        let raw: serde_json::Value = row.try_get("raw_data_json")?;

        match serde_json::from_value::<Vec<KeystrokeEvent>>(raw) {
            Ok(events) => sessions.push(LabeledSession { id, label, events }),
            Err(e) => {
                tracing::warn!(session_id = %id, "skipping undecodable session: {}", e);
            }
        }
    }

    Ok(sessions)
}
