use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};

use crate::models::*;
use super::row_helpers::map_plan_row;

const SELECT_PLAN: &str = r#"
    SELECT p.*,
           COALESCE((SELECT COUNT(*) FROM plan_layouts l WHERE l.plan_id = p.id), 0) as layout_count
    FROM plans p
"#;

/// Error for a plan whose prefix is already registered
#[derive(Debug)]
pub struct DuplicatePlanError {
    pub prefix: String,
    pub id: i64,
}

impl std::fmt::Display for DuplicatePlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Duplicate plan: {} already exists (id={})", self.prefix, self.id)
    }
}

impl std::error::Error for DuplicatePlanError {}

pub struct PlanRepo;

impl PlanRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<Plan>> {
        let rows = sqlx::query(&format!("{} ORDER BY p.prefix", SELECT_PLAN))
            .fetch_all(pool).await?;
        Ok(rows.iter().map(map_plan_row).collect())
    }

    pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Option<Plan>> {
        let row = sqlx::query(&format!("{} WHERE p.id = ?", SELECT_PLAN))
            .bind(id).fetch_optional(conn).await?;
        Ok(row.as_ref().map(map_plan_row))
    }

    /// Insert a validated plan; the prefix must not be registered yet
    pub async fn create(pool: &Pool<Sqlite>, req: &CreatePlanRequest) -> Result<Plan> {
        let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM plans WHERE prefix = ?")
            .bind(&req.prefix)
            .fetch_optional(pool).await?;
        if let Some((id,)) = existing {
            return Err(DuplicatePlanError { prefix: req.prefix.clone(), id }.into());
        }

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO plans (prefix, mask_len, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)"
        )
        .bind(&req.prefix)
        .bind(req.mask_len as i64)
        .bind(req.description.as_deref().unwrap_or(""))
        .bind(now)
        .bind(now)
        .execute(pool).await?;

        let mut conn = pool.acquire().await?;
        Self::get(&mut conn, result.last_insert_rowid()).await?
            .context("Plan not found after creation")
    }

    /// Remove a plan; its layouts and their nodes cascade
    pub async fn delete(pool: &Pool<Sqlite>, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM plans WHERE id = ?").bind(id).execute(pool).await?;
        if result.rows_affected() == 0 {
            return Err(crate::db::NotFoundError::new("Plan", &id.to_string()).into());
        }
        Ok(())
    }
}
