use chrono::Utc;
use sqlx::Row;

use procura_core::{DirectoryEntry, Role, UserId};

use super::{DirectoryRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDirectoryRepository {
    pool: DbPool,
}

impl SqlDirectoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<DirectoryEntry, RepositoryError> {
    let user_id: String =
        row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role: String = row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let department: String =
        row.try_get("department").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let manager_id: Option<String> =
        row.try_get("manager_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(DirectoryEntry {
        user_id: UserId::new(user_id),
        name,
        role: Role::new(role),
        department,
        manager_id: manager_id.map(UserId::new),
    })
}

#[async_trait::async_trait]
impl DirectoryRepository for SqlDirectoryRepository {
    async fn upsert(&self, entry: &DirectoryEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO directory_user (user_id, name, role, department, manager_id, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 name = excluded.name,
                 role = excluded.role,
                 department = excluded.department,
                 manager_id = excluded.manager_id,
                 updated_at = excluded.updated_at",
        )
        .bind(entry.user_id.as_str())
        .bind(&entry.name)
        .bind(entry.role.as_str())
        .bind(&entry.department)
        .bind(entry.manager_id.as_ref().map(UserId::to_string))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, user_id: &UserId) -> Result<Option<DirectoryEntry>, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_id, name, role, department, manager_id
             FROM directory_user WHERE user_id = ?",
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_entry(r)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<DirectoryEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT user_id, name, role, department, manager_id
             FROM directory_user ORDER BY user_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }
}
