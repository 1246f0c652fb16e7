//! Recording in-memory store for planning tests

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;

use super::error::{PlanError, Result};
use super::store::PlanStore;
use crate::models::{Layout, LayoutRequest, Plan, PlanNode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateLayout(i64),
    UpdateLayoutHeader(i64),
    DeleteLayout(i64),
    FetchLayoutHeader(i64),
    FetchNodes(i64),
    InsertNode(i64),
    DeleteSubtree(i64),
    FetchPlan(i64),
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    pub plans: HashMap<i64, Plan>,
    pub layouts: HashMap<i64, Layout>,
    pub nodes: Vec<PlanNode>,
    pub calls: Vec<Call>,
    /// Fail once this many inserts have succeeded
    pub fail_after_inserts: Option<usize>,
    last_id: i64,
    inserts: usize,
}

impl MemoryStore {
    pub fn with_plan(plan: Plan) -> Self {
        let mut store = Self::default();
        store.plans.insert(plan.id, plan);
        store
    }

    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }
}

#[async_trait]
impl PlanStore for MemoryStore {
    async fn create_layout(&mut self, layout: &Layout) -> Result<i64> {
        let id = self.next_id();
        let mut header = layout.clone();
        header.id = id;
        header.nodes.clear();
        header.tree = None;
        self.layouts.insert(id, header);
        self.calls.push(Call::CreateLayout(id));
        Ok(id)
    }

    async fn update_layout_header(&mut self, layout: &Layout) -> Result<()> {
        self.calls.push(Call::UpdateLayoutHeader(layout.id));
        let header = self
            .layouts
            .get_mut(&layout.id)
            .ok_or(PlanError::NotFound { resource: "Layout", id: layout.id })?;
        header.name = layout.name.clone();
        header.auto_fill = layout.auto_fill;
        header.first_finished = layout.first_finished;
        Ok(())
    }

    async fn delete_layout(&mut self, id: i64) -> Result<()> {
        self.calls.push(Call::DeleteLayout(id));
        self.layouts.remove(&id);
        self.nodes.retain(|n| n.layout_id != id);
        Ok(())
    }

    async fn fetch_layout_header(&mut self, id: i64) -> Result<Option<Layout>> {
        self.calls.push(Call::FetchLayoutHeader(id));
        Ok(self.layouts.get(&id).cloned())
    }

    async fn fetch_nodes(&mut self, layout_id: i64) -> Result<Vec<PlanNode>> {
        self.calls.push(Call::FetchNodes(layout_id));
        let mut nodes: Vec<_> = self.nodes.iter().filter(|n| n.layout_id == layout_id).cloned().collect();
        nodes.sort_by_key(|n| (n.sequence, n.id));
        Ok(nodes)
    }

    async fn insert_node(&mut self, node: &PlanNode) -> Result<i64> {
        if self.fail_after_inserts == Some(self.inserts) {
            return Err(PlanError::StoreFailure("disk I/O error".to_string()));
        }
        let id = if node.id > 0 {
            if self.nodes.iter().any(|n| n.id == node.id) {
                return Err(PlanError::StoreFailure(format!("UNIQUE constraint failed: {}", node.id)));
            }
            self.last_id = self.last_id.max(node.id);
            node.id
        } else {
            self.next_id()
        };
        let mut row = node.clone();
        row.id = id;
        self.nodes.push(row);
        self.inserts += 1;
        self.calls.push(Call::InsertNode(id));
        Ok(id)
    }

    async fn delete_node_subtree(&mut self, node_id: i64) -> Result<Vec<i64>> {
        self.calls.push(Call::DeleteSubtree(node_id));
        let mut doomed = vec![node_id];
        let mut i = 0;
        while i < doomed.len() {
            let parent = doomed[i];
            let children: Vec<i64> = self
                .nodes
                .iter()
                .filter(|n| n.pid == parent && !doomed.contains(&n.id))
                .map(|n| n.id)
                .collect();
            doomed.extend(children);
            i += 1;
        }
        doomed.retain(|id| self.nodes.iter().any(|n| n.id == *id));
        self.nodes.retain(|n| !doomed.contains(&n.id));
        Ok(doomed)
    }

    async fn fetch_plan(&mut self, id: i64) -> Result<Option<Plan>> {
        self.calls.push(Call::FetchPlan(id));
        Ok(self.plans.get(&id).cloned())
    }
}

pub fn plan(id: i64, prefix: &str, mask_len: u8) -> Plan {
    let now = Utc::now();
    Plan {
        id,
        prefix: prefix.to_string(),
        mask_len,
        description: None,
        layout_count: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn layout(plan_id: i64, name: &str, auto_fill: bool, nodes: Vec<PlanNode>) -> Layout {
    Layout::new(
        plan_id,
        LayoutRequest {
            name: name.to_string(),
            auto_fill,
            first_finished: false,
            nodes,
        },
    )
}

/// Bit-allocated node
pub fn node(id: i64, pid: i64, name: &str, sequence: i32, bit_width: i32) -> PlanNode {
    PlanNode {
        id,
        pid,
        name: name.to_string(),
        sequence,
        bit_width,
        ..Default::default()
    }
}

/// Literal-mode node
pub fn literal_node(id: i64, pid: i64, name: &str, sequence: i32, ipv4: &str) -> PlanNode {
    PlanNode {
        id,
        pid,
        name: name.to_string(),
        sequence,
        ipv4: ipv4.to_string(),
        ..Default::default()
    }
}
