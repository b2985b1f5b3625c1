use crate::config::StoreConfig;
use crate::error::EchoHireError;
use sqlx::{postgres::PgPoolOptions, PgPool};

/// Documents are stored as jsonb next to the few columns that need indexes.
/// The partial unique index enforces one live AI feedback artifact per interview.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS interviews (
        id          TEXT PRIMARY KEY,
        owner_id    TEXT NOT NULL,
        call_id     TEXT,
        doc         JSONB NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS interviews_call_id_idx ON interviews (call_id)",
    "CREATE INDEX IF NOT EXISTS interviews_owner_idx ON interviews (owner_id)",
    r#"
    CREATE TABLE IF NOT EXISTS transcripts (
        interview_id TEXT PRIMARY KEY,
        doc          JSONB NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS feedback (
        id           TEXT PRIMARY KEY,
        interview_id TEXT NOT NULL,
        is_ai        BOOLEAN NOT NULL,
        superseded   BOOLEAN NOT NULL DEFAULT false,
        created_at   TIMESTAMPTZ NOT NULL,
        doc          JSONB NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS feedback_interview_idx ON feedback (interview_id)",
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS feedback_one_ai_per_interview
        ON feedback (interview_id) WHERE is_ai AND NOT superseded
    "#,
];

pub async fn create_pool(config: &StoreConfig) -> Result<PgPool, EchoHireError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;
    Ok(pool)
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

pub async fn ensure_schema(pool: &PgPool) -> Result<(), EchoHireError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
