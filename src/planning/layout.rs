//! Layout lifecycle: validate, save, update, load and delete.

use std::collections::HashSet;

use chrono::Utc;

use super::error::{PlanError, Result};
use super::store::PlanStore;
use super::tree::NodeTree;
use crate::models::{AddressFamily, Layout, LayoutRequest, Plan};

async fn fetch_plan<S: PlanStore + ?Sized>(store: &mut S, id: i64) -> Result<Plan> {
    store
        .fetch_plan(id)
        .await?
        .ok_or(PlanError::NotFound { resource: "Plan", id })
}

impl Layout {
    pub fn new(plan_id: i64, req: LayoutRequest) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            plan_id,
            name: req.name,
            auto_fill: req.auto_fill,
            first_finished: req.first_finished,
            nodes: req.nodes,
            created_at: now,
            updated_at: now,
            tree: None,
        }
    }

    /// Replace the mutable header fields and the node set
    pub fn apply(&mut self, req: LayoutRequest) {
        self.name = req.name;
        self.auto_fill = req.auto_fill;
        self.first_finished = req.first_finished;
        self.nodes = req.nodes;
        self.tree = None;
    }

    /// Tree of `nodes`, built on first access and cached afterwards
    pub fn node_tree(&mut self) -> &NodeTree {
        self.tree.get_or_insert_with(|| NodeTree::build(&self.nodes))
    }

    /// Check the node set against `plan`'s bit budget and literal rules
    pub fn validate(&mut self, plan: &Plan) -> Result<()> {
        plan.validate()?;
        if self.nodes.is_empty() {
            return Ok(());
        }

        let roots = self.nodes.iter().filter(|n| n.is_root()).count();
        if roots != 1 {
            return Err(PlanError::malformed(format!(
                "layout '{}' must have exactly one root node, found {}",
                self.name, roots
            )));
        }

        let allowed_bits = plan.allowed_bits()?;
        let tree = self.tree.get_or_insert_with(|| NodeTree::build(&self.nodes));
        if tree.len() != self.nodes.len() {
            return Err(PlanError::malformed(format!(
                "{} of {} nodes in layout '{}' are not connected to the root",
                self.nodes.len() - tree.len(),
                self.nodes.len(),
                self.name
            )));
        }

        tree.validate(allowed_bits, false)
    }

    /// Derive IPv6 prefixes when auto-fill is on. IPv4 plans use literal
    /// blocks, so the flag is ignored for them.
    fn auto_fill_addresses(&mut self, plan: &Plan) -> Result<()> {
        if !self.auto_fill || self.nodes.is_empty() {
            return Ok(());
        }
        let network = plan.network()?;
        if AddressFamily::of(&network) != AddressFamily::V6 {
            tracing::debug!("Layout '{}' is on IPv4 plan {}, skipping auto-fill", self.name, plan.prefix);
            return Ok(());
        }

        let tree = self.tree.get_or_insert_with(|| NodeTree::build(&self.nodes));
        tree.fill_addresses(&network, plan.mask_len)
    }

    /// Validate, fill and persist a new layout with all of its nodes
    pub async fn save<S: PlanStore + ?Sized>(&mut self, store: &mut S) -> Result<()> {
        let plan = fetch_plan(store, self.plan_id).await?;
        self.validate(&plan)?;
        self.auto_fill_addresses(&plan)?;

        self.id = store.create_layout(self).await?;
        let tree = self.tree.get_or_insert_with(|| NodeTree::build(&self.nodes));
        let stats = tree.persist_all(store, self.id).await?;
        self.nodes = tree.flatten();

        tracing::info!(
            "Saved layout '{}' ({}) for plan {} with {} nodes",
            self.name, self.id, plan.prefix, stats.nodes_inserted
        );
        Ok(())
    }

    /// Revalidate the current node set and persist what changed.
    ///
    /// Header fields are always written. Nodes go through
    /// [`NodeTree::reconcile`], so only flagged (or new) subtrees are
    /// rewritten. A persisted root that is no longer the layout's root is
    /// removed with everything below it.
    ///
    /// Auto-fill runs over the whole tree, but unflagged nodes keep their
    /// stored rows. `nodes` is reloaded from the store afterwards, so it
    /// shows what was persisted rather than the in-memory fill.
    pub async fn update<S: PlanStore + ?Sized>(&mut self, store: &mut S) -> Result<()> {
        let plan = fetch_plan(store, self.plan_id).await?;
        self.tree = None;
        self.validate(&plan)?;
        self.auto_fill_addresses(&plan)?;

        self.updated_at = Utc::now();
        store.update_layout_header(self).await?;

        let stored = store.fetch_nodes(self.id).await?;
        let tree = self.tree.get_or_insert_with(|| NodeTree::build(&self.nodes));
        let root_id = tree.root().map(|r| r.id);
        let mut persisted: HashSet<i64> = stored.iter().map(|n| n.id).collect();
        for stale in stored.iter().filter(|n| n.is_root() && Some(n.id) != root_id) {
            tracing::debug!("Removing replaced root {} of layout {}", stale.id, self.id);
            for removed in store.delete_node_subtree(stale.id).await? {
                persisted.remove(&removed);
            }
        }

        let stats = tree.reconcile(store, self.id, &persisted).await?;
        self.nodes = store.fetch_nodes(self.id).await?;
        self.tree = None;

        tracing::info!("Updated layout '{}' ({})", self.name, self.id);
        tracing::debug!(
            "Layout {} reconcile: {} subtrees replaced, {} nodes inserted",
            self.id, stats.subtrees_replaced, stats.nodes_inserted
        );
        Ok(())
    }

    /// Fetch a layout and its nodes; the tree is built on first use
    pub async fn load<S: PlanStore + ?Sized>(store: &mut S, id: i64) -> Result<Self> {
        let mut layout = store
            .fetch_layout_header(id)
            .await?
            .ok_or(PlanError::NotFound { resource: "Layout", id })?;
        layout.nodes = store.fetch_nodes(id).await?;
        layout.tree = None;
        Ok(layout)
    }

    pub async fn delete<S: PlanStore + ?Sized>(&self, store: &mut S) -> Result<()> {
        store.delete_layout(self.id).await?;
        tracing::info!("Deleted layout '{}' ({})", self.name, self.id);
        Ok(())
    }
}
