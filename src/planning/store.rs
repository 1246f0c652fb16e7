use async_trait::async_trait;

use super::error::Result;
use crate::models::{Layout, Plan, PlanNode};

/// Persistence collaborator for layouts.
///
/// Calls are issued one at a time. Callers run each save, update or delete
/// inside a single transaction; nothing here rolls back partial work.
#[async_trait]
pub trait PlanStore: Send {
    /// Insert the layout header and return its id
    async fn create_layout(&mut self, layout: &Layout) -> Result<i64>;

    /// Persist `name`, `auto_fill` and `first_finished`
    async fn update_layout_header(&mut self, layout: &Layout) -> Result<()>;

    /// Remove a layout; its nodes go with it
    async fn delete_layout(&mut self, id: i64) -> Result<()>;

    /// Header only, `nodes` left empty
    async fn fetch_layout_header(&mut self, id: i64) -> Result<Option<Layout>>;

    /// All nodes of a layout ordered by sequence
    async fn fetch_nodes(&mut self, layout_id: i64) -> Result<Vec<PlanNode>>;

    /// Insert a node and return its id. A positive `node.id` is kept,
    /// zero asks the store for a fresh one.
    async fn insert_node(&mut self, node: &PlanNode) -> Result<i64>;

    /// Remove a node and everything below it by parent reference,
    /// returning the ids of the removed rows
    async fn delete_node_subtree(&mut self, node_id: i64) -> Result<Vec<i64>>;

    async fn fetch_plan(&mut self, id: i64) -> Result<Option<Plan>>;
}
