use anyhow::Context;
use async_trait::async_trait;
use sqlx::{Sqlite, Transaction};

use crate::models::*;
use crate::planning::{self, PlanStore};
use super::layouts::{LayoutRepo, NodeRepo};
use super::plans::PlanRepo;

/// One open transaction, handed to the planning engine as its store.
/// Dropping it without [`StoreTx::commit`] rolls everything back.
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTx {
    pub(super) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    pub async fn commit(self) -> anyhow::Result<()> {
        self.tx.commit().await.context("Failed to commit transaction")
    }
}

#[async_trait]
impl PlanStore for StoreTx {
    async fn create_layout(&mut self, layout: &Layout) -> planning::Result<i64> {
        Ok(LayoutRepo::create(&mut self.tx, layout).await?)
    }

    async fn update_layout_header(&mut self, layout: &Layout) -> planning::Result<()> {
        Ok(LayoutRepo::update_header(&mut self.tx, layout).await?)
    }

    async fn delete_layout(&mut self, id: i64) -> planning::Result<()> {
        Ok(LayoutRepo::delete(&mut self.tx, id).await?)
    }

    async fn fetch_layout_header(&mut self, id: i64) -> planning::Result<Option<Layout>> {
        Ok(LayoutRepo::get(&mut self.tx, id).await?)
    }

    async fn fetch_nodes(&mut self, layout_id: i64) -> planning::Result<Vec<PlanNode>> {
        Ok(NodeRepo::list_by_layout(&mut self.tx, layout_id).await?)
    }

    async fn insert_node(&mut self, node: &PlanNode) -> planning::Result<i64> {
        Ok(NodeRepo::create(&mut self.tx, node).await?)
    }

    async fn delete_node_subtree(&mut self, node_id: i64) -> planning::Result<Vec<i64>> {
        let removed = NodeRepo::delete_subtree(&mut self.tx, node_id).await?;
        tracing::debug!("Removed subtree {} ({} nodes)", node_id, removed.len());
        Ok(removed)
    }

    async fn fetch_plan(&mut self, id: i64) -> planning::Result<Option<Plan>> {
        Ok(PlanRepo::get(&mut self.tx, id).await?)
    }
}
