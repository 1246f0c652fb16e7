mod layouts;
mod plans;
pub(crate) mod row_helpers;
mod store_tx;

pub use plans::DuplicatePlanError;
pub use store_tx::StoreTx;

use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

use crate::models::*;
use layouts::LayoutRepo;
use plans::PlanRepo;

/// Typed error for a missing row, downcast by the API error handler
#[derive(Debug)]
pub struct NotFoundError {
    pub resource: String,
    pub id: String,
}

impl NotFoundError {
    pub fn new(resource: &str, id: &str) -> Self {
        Self {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} not found: {}", self.resource, self.id)
    }
}

impl std::error::Error for NotFoundError {}

/// Store handles all database operations, delegating to per-entity repo modules.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// Create a new database store with the default pool size
    pub async fn new(db_path: &str) -> Result<Self> {
        Self::with_pool_size(db_path, 5).await
    }

    /// Create a new database store with a specific pool size
    pub async fn with_pool_size(db_path: &str, max_connections: u32) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&db_url)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Open a transaction for one layout operation
    pub async fn begin(&self) -> Result<StoreTx> {
        let tx = self.pool.begin().await.context("Failed to begin transaction")?;
        Ok(StoreTx::new(tx))
    }

    // ========== Plan Operations ==========

    pub async fn list_plans(&self) -> Result<Vec<Plan>> {
        PlanRepo::list(&self.pool).await
    }

    pub async fn get_plan(&self, id: i64) -> Result<Option<Plan>> {
        let mut conn = self.pool.acquire().await?;
        PlanRepo::get(&mut conn, id).await
    }

    pub async fn create_plan(&self, req: &CreatePlanRequest) -> Result<Plan> {
        PlanRepo::create(&self.pool, req).await
    }

    pub async fn delete_plan(&self, id: i64) -> Result<()> {
        PlanRepo::delete(&self.pool, id).await
    }

    // ========== Layout Operations ==========

    pub async fn list_layouts(&self, plan_id: i64) -> Result<Vec<Layout>> {
        LayoutRepo::list_by_plan(&self.pool, plan_id).await
    }
}
