use anyhow::Result;
use sqlx::SqlitePool;

/// Create the lexrag schema. Safe to run repeatedly.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Create documents table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            source_ref TEXT NOT NULL,
            uploaded_at INTEGER NOT NULL,
            status TEXT NOT NULL,
            status_changed_at INTEGER NOT NULL,
            error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Databases created before status_changed_at existed
    let has_status_changed_at: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM pragma_table_info('documents') WHERE name = 'status_changed_at'",
    )
    .fetch_one(pool)
    .await?;
    if !has_status_changed_at {
        sqlx::query(
            "ALTER TABLE documents ADD COLUMN status_changed_at INTEGER NOT NULL DEFAULT 0",
        )
        .execute(pool)
        .await?;
        sqlx::query("UPDATE documents SET status_changed_at = uploaded_at")
            .execute(pool)
            .await?;
    }

    // Create chunks table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB,
            UNIQUE(document_id, position),
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create vectors table; seq keeps first-insertion order for tie-breaks
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vectors (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_uploaded_at ON documents(uploaded_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
