//! Metadata repository for uploaded files.
//!
//! Rows are keyed by a surrogate BIGSERIAL id; timestamps are assigned by
//! PostgreSQL (`updated_at` is also refreshed by trigger).

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, DbErr, EntityTrait, NotSet, QueryOrder, Set, Unchanged,
};

use crate::entity::file::{self, ActiveModel, Entity as File};
use crate::error::{AppError, AppResult};
use crate::models::{FileRecord, NewFile};

use super::DbPool;

/// CRUD over file records.
#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Insert a row and return it with the store-assigned id and timestamps.
    async fn create(&self, new_file: NewFile) -> AppResult<FileRecord>;

    /// All records, most recent first. Empty when there are none.
    async fn list(&self) -> AppResult<Vec<FileRecord>>;

    /// Fetch one record; `RecordNotFound` if absent.
    async fn get_by_id(&self, id: i64) -> AppResult<FileRecord>;

    /// Replace the summary and refresh `updated_at`.
    async fn update_resume(&self, id: i64, resume: &str) -> AppResult<FileRecord>;

    /// Remove a row; `RecordNotFound` if no row was affected.
    async fn delete(&self, id: i64) -> AppResult<()>;
}

#[async_trait]
impl FileRepository for DbPool {
    async fn create(&self, new_file: NewFile) -> AppResult<FileRecord> {
        let model = ActiveModel {
            id: NotSet,
            name: Set(new_file.name),
            size: Set(new_file.size),
            mime_type: Set(new_file.mime_type),
            object_key: Set(new_file.object_key),
            resume: Set(new_file.resume),
            created_at: NotSet,
            updated_at: NotSet,
        };

        let inserted = model.insert(self.connection()).await.map_err(|e| {
            AppError::PersistenceWriteFailed(format!("Failed to insert file record: {}", e))
        })?;

        Ok(inserted.into())
    }

    async fn list(&self) -> AppResult<Vec<FileRecord>> {
        let rows = File::find()
            .order_by_desc(file::Column::CreatedAt)
            .order_by_desc(file::Column::Id)
            .all(self.connection())
            .await
            .map_err(|e| AppError::PersistenceReadFailed(format!("Failed to list files: {}", e)))?;

        Ok(rows.into_iter().map(FileRecord::from).collect())
    }

    async fn get_by_id(&self, id: i64) -> AppResult<FileRecord> {
        File::find_by_id(id)
            .one(self.connection())
            .await?
            .map(FileRecord::from)
            .ok_or(AppError::RecordNotFound(id))
    }

    async fn update_resume(&self, id: i64, resume: &str) -> AppResult<FileRecord> {
        let model = ActiveModel {
            id: Unchanged(id),
            name: NotSet,
            size: NotSet,
            mime_type: NotSet,
            object_key: NotSet,
            resume: Set(Some(resume.to_string())),
            created_at: NotSet,
            updated_at: Set(Utc::now()),
        };

        match model.update(self.connection()).await {
            Ok(updated) => Ok(updated.into()),
            Err(DbErr::RecordNotUpdated) => Err(AppError::RecordNotFound(id)),
            Err(e) => Err(AppError::PersistenceWriteFailed(format!(
                "Failed to update resume for file {}: {}",
                id, e
            ))),
        }
    }

    async fn delete(&self, id: i64) -> AppResult<()> {
        let result = File::delete_by_id(id)
            .exec(self.connection())
            .await
            .map_err(|e| {
                AppError::PersistenceWriteFailed(format!("Failed to delete file {}: {}", id, e))
            })?;

        if result.rows_affected == 0 {
            return Err(AppError::RecordNotFound(id));
        }

        Ok(())
    }
}
