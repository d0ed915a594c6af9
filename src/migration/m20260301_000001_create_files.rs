//! Migration: Create files table.
//!
//! One row per uploaded file. `object_key` points at the bytes in the bucket.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE OR REPLACE FUNCTION update_updated_at_column()
                RETURNS TRIGGER AS $$
                BEGIN
                    NEW.updated_at = NOW();
                    RETURN NEW;
                END;
                $$ LANGUAGE plpgsql;

                CREATE TABLE files (
                    id BIGSERIAL PRIMARY KEY,

                    -- File info
                    name TEXT NOT NULL,                    -- filename as supplied by the uploader
                    size BIGINT NOT NULL CHECK (size >= 0),
                    mime_type VARCHAR(255) NOT NULL DEFAULT 'application/octet-stream',
                    object_key VARCHAR(2048) NOT NULL,     -- full S3 object key

                    -- AI summary, NULL until analyzed
                    resume TEXT,

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE UNIQUE INDEX idx_files_object_key ON files(object_key);

                -- Listing is newest first
                CREATE INDEX idx_files_created_at ON files(created_at DESC);

                CREATE TRIGGER update_files_updated_at
                    BEFORE UPDATE ON files
                    FOR EACH ROW
                    EXECUTE FUNCTION update_updated_at_column();
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                DROP TRIGGER IF EXISTS update_files_updated_at ON files;
                DROP TABLE IF EXISTS files;
                "#,
            )
            .await?;

        Ok(())
    }
}
