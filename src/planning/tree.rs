//! Layout trees.
//!
//! Layouts are stored as flat parent-pointer rows. [`NodeTree`] rebuilds
//! them into an index arena (index 0 is the root) and runs validation,
//! IPv6 auto-fill and subtree-granular persistence on top of it.

use std::collections::{HashMap, HashSet, VecDeque};

use ipnet::{IpNet, Ipv4Net};

use super::error::{PlanError, Result};
use super::prefix::{parse_canonical_v4, NetPrefix};
use super::store::PlanStore;
use crate::models::{PlanNode, ROOT_PID};

#[derive(Debug, Clone)]
struct TreeNode {
    node: PlanNode,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// A layout's nodes arranged as a tree
#[derive(Debug, Clone, Default)]
pub struct NodeTree {
    nodes: Vec<TreeNode>,
}

/// Store work done by a reconcile pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub subtrees_replaced: usize,
    pub nodes_inserted: usize,
}

impl NodeTree {
    /// Rebuild the tree hanging off the first root-sentinel node.
    ///
    /// Siblings are ordered by `sequence`. Nodes that cannot be reached from
    /// the root (orphans, cycles, repeated ids) are left out; an input
    /// without a root yields an empty tree.
    pub fn build(flat: &[PlanNode]) -> Self {
        let Some(root) = flat.iter().find(|n| n.is_root()) else {
            return Self::default();
        };

        let mut by_parent: HashMap<i64, Vec<&PlanNode>> = HashMap::new();
        for node in flat.iter().filter(|n| !n.is_root()) {
            by_parent.entry(node.pid).or_default().push(node);
        }
        for siblings in by_parent.values_mut() {
            siblings.sort_by_key(|n| n.sequence);
        }

        let mut tree = Self {
            nodes: vec![TreeNode {
                node: root.clone(),
                parent: None,
                children: vec![],
            }],
        };
        let mut seen = HashSet::from([root.id]);
        let mut queue = VecDeque::from([0usize]);

        while let Some(idx) = queue.pop_front() {
            let Some(children) = by_parent.get(&tree.nodes[idx].node.id) else {
                continue;
            };
            for child in children {
                if !seen.insert(child.id) {
                    continue;
                }
                let child_idx = tree.nodes.len();
                tree.nodes.push(TreeNode {
                    node: (*child).clone(),
                    parent: Some(idx),
                    children: vec![],
                });
                tree.nodes[idx].children.push(child_idx);
                queue.push_back(child_idx);
            }
        }

        tree
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn root(&self) -> Option<&PlanNode> {
        self.nodes.first().map(|t| &t.node)
    }

    pub fn node(&self, idx: usize) -> &PlanNode {
        &self.nodes[idx].node
    }

    pub fn children(&self, idx: usize) -> &[usize] {
        &self.nodes[idx].children
    }

    /// Root's bit width plus the widest root-to-leaf path below it
    pub fn max_committed_bit_width(&self) -> Result<u32> {
        let Some(root) = self.root() else {
            return Ok(0);
        };
        if root.bit_width < 0 {
            return Err(PlanError::malformed(format!(
                "root '{}' has negative bit width {}",
                root.name, root.bit_width
            )));
        }
        Ok(root.bit_width as u32 + self.deepest_below(0)?)
    }

    fn deepest_below(&self, idx: usize) -> Result<u32> {
        let mut deepest = 0;
        for &child in &self.nodes[idx].children {
            let node = &self.nodes[child].node;
            if node.bit_width <= 0 {
                return Err(PlanError::malformed(format!(
                    "node '{}' has no bit width and cannot be filled",
                    node.name
                )));
            }
            deepest = deepest.max(node.bit_width as u32 + self.deepest_below(child)?);
        }
        Ok(deepest)
    }

    /// Check bit budgets and IPv4 literals.
    ///
    /// Every leaf's cumulative bit width must be at most `allowed_bits`, or
    /// exactly `allowed_bits` when `strict`.
    pub fn validate(&self, allowed_bits: u32, strict: bool) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        let allowed = i64::from(allowed_bits);
        let mut stack = vec![(0usize, 0i64)];
        while let Some((idx, above)) = stack.pop() {
            let node = &self.nodes[idx].node;
            if node.bit_width < 0 {
                return Err(PlanError::malformed(format!(
                    "node '{}' has negative bit width {}",
                    node.name, node.bit_width
                )));
            }

            let total = above + i64::from(node.bit_width);
            if total > allowed {
                return Err(PlanError::capacity(format!(
                    "node '{}' needs {} bits but the plan only allows {}",
                    node.name, total, allowed
                )));
            }

            let children = &self.nodes[idx].children;
            if strict && children.is_empty() && total != allowed {
                return Err(PlanError::malformed(format!(
                    "leaf '{}' uses {} of {} bits",
                    node.name, total, allowed
                )));
            }
            stack.extend(children.iter().rev().map(|&c| (c, total)));
        }

        self.validate_literals().map(|_| ())
    }

    /// Parse every IPv4 literal in breadth-first node order.
    ///
    /// Literals must be canonical and unique across the whole tree.
    pub fn validate_literals(&self) -> Result<Vec<(usize, Ipv4Net)>> {
        let mut blocks = Vec::new();
        let mut owners: HashMap<Ipv4Net, usize> = HashMap::new();

        for idx in self.bfs_order() {
            let node = &self.nodes[idx].node;
            for literal in node.literals() {
                let net = parse_canonical_v4(literal).map_err(|e| match e {
                    PlanError::MalformedInput(msg) => {
                        PlanError::malformed(format!("node '{}': {}", node.name, msg))
                    }
                    other => other,
                })?;
                if let Some(&owner) = owners.get(&net) {
                    return Err(PlanError::DuplicateAllocation {
                        prefix: net.to_string(),
                        first: self.nodes[owner].node.name.clone(),
                        second: node.name.clone(),
                    });
                }
                owners.insert(net, idx);
                blocks.push((idx, net));
            }
        }

        Ok(blocks)
    }

    /// Derive every node's prefix from `base` by bit allocation.
    ///
    /// Unused bits are reserved right after `base` so the widest paths end
    /// exactly at `max_mask_len`. Children are numbered from 1 in sibling
    /// order; the all-zero segment stays with the parent.
    pub fn fill_addresses(&mut self, base: &IpNet, max_mask_len: u8) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        let total = self.max_committed_bit_width()?;
        let base_len = base.prefix_len();
        let headroom = max_mask_len.checked_sub(base_len).ok_or_else(|| {
            PlanError::capacity(format!("{} is already deeper than /{}", base, max_mask_len))
        })?;
        if total > u32::from(headroom) {
            return Err(PlanError::capacity(format!(
                "layout needs {} bits but {} only has {} down to /{}",
                total, base, headroom, max_mask_len
            )));
        }

        let gap = headroom - total as u8;
        let root_end = base_len + gap + self.nodes[0].node.bit_width as u8;
        let root = NetPrefix::from_network(base, max_mask_len)?.with_mask_len(root_end);
        self.nodes[0].node.prefix = root.to_network()?.to_string();

        self.fill_children(0, root)
    }

    fn fill_children(&mut self, idx: usize, parent: NetPrefix) -> Result<()> {
        let offset = parent.mask_len();
        let children = self.nodes[idx].children.clone();

        for (i, &child) in children.iter().enumerate() {
            // bounded by the headroom check in fill_addresses
            let width = self.nodes[child].node.bit_width as u8;
            let value = i as u64 + 1;
            let numbers = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
            if value > numbers {
                return Err(PlanError::capacity(format!(
                    "'{}' has {} children but {}-bit segments can only number {}",
                    self.nodes[idx].node.name,
                    children.len(),
                    width,
                    numbers
                )));
            }

            let mut prefix = parent;
            prefix.set_segment(offset, width, value)?;
            let prefix = prefix.with_mask_len(offset + width);

            let node = &mut self.nodes[child].node;
            node.value = value as i64;
            node.prefix = prefix.to_network()?.to_string();

            self.fill_children(child, prefix)?;
        }

        Ok(())
    }

    /// Persist structural changes.
    ///
    /// A modified node (or one the store has never seen) has its persisted
    /// subtree deleted and the in-memory subtree inserted in its place: the
    /// node keeps its id if it was persisted, descendants get fresh ids.
    /// Unmodified nodes are left alone and their children visited.
    ///
    /// All deletes run before any insert. An unmodified node whose row went
    /// away with a deleted subtree (it was moved out of a flagged branch) is
    /// reinserted with its id the same way.
    pub async fn reconcile<S: PlanStore + ?Sized>(
        &mut self,
        store: &mut S,
        layout_id: i64,
        persisted: &HashSet<i64>,
    ) -> Result<ReconcileStats> {
        let mut stats = ReconcileStats::default();
        if self.is_empty() {
            return Ok(stats);
        }

        let mut live = persisted.clone();
        for idx in self.dirty_tops(persisted) {
            let id = self.nodes[idx].node.id;
            if persisted.contains(&id) {
                for removed in store.delete_node_subtree(id).await? {
                    live.remove(&removed);
                }
            }
        }

        for idx in self.dirty_tops(&live) {
            let keep_id = persisted.contains(&self.nodes[idx].node.id);
            self.replace_subtree(store, layout_id, idx, keep_id, &mut stats).await?;
        }

        Ok(stats)
    }

    /// Pre-order tops of the subtrees that are modified or missing from `stored`
    fn dirty_tops(&self, stored: &HashSet<i64>) -> Vec<usize> {
        let mut tops = Vec::new();
        let mut stack = vec![0usize];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx].node;
            if node.modified || !stored.contains(&node.id) {
                tops.push(idx);
            } else {
                stack.extend(self.nodes[idx].children.iter().rev());
            }
        }
        tops
    }

    /// Insert every node breadth-first with fresh ids
    pub async fn persist_all<S: PlanStore + ?Sized>(
        &mut self,
        store: &mut S,
        layout_id: i64,
    ) -> Result<ReconcileStats> {
        let mut stats = ReconcileStats::default();
        if !self.is_empty() {
            self.replace_subtree(store, layout_id, 0, false, &mut stats).await?;
        }
        Ok(stats)
    }

    async fn replace_subtree<S: PlanStore + ?Sized>(
        &mut self,
        store: &mut S,
        layout_id: i64,
        top: usize,
        keep_id: bool,
        stats: &mut ReconcileStats,
    ) -> Result<()> {
        stats.subtrees_replaced += 1;

        let parent_id = match self.nodes[top].parent {
            Some(parent) => self.nodes[parent].node.id,
            None => ROOT_PID,
        };

        let mut queue = VecDeque::from([(top, parent_id, keep_id)]);
        while let Some((idx, pid, keep)) = queue.pop_front() {
            let node = &mut self.nodes[idx].node;
            node.layout_id = layout_id;
            node.pid = pid;
            node.modified = false;
            if !keep {
                node.id = 0;
            }
            let id = store.insert_node(node).await?;
            node.id = id;
            stats.nodes_inserted += 1;

            queue.extend(self.nodes[idx].children.iter().map(|&c| (c, id, false)));
        }

        Ok(())
    }

    fn bfs_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.len());
        if self.is_empty() {
            return order;
        }
        let mut queue = VecDeque::from([0usize]);
        while let Some(idx) = queue.pop_front() {
            order.push(idx);
            queue.extend(self.nodes[idx].children.iter().copied());
        }
        order
    }

    /// Root-first, breadth-first copy of every node
    pub fn flatten(&self) -> Vec<PlanNode> {
        self.bfs_order()
            .into_iter()
            .map(|idx| self.nodes[idx].node.clone())
            .collect()
    }
}
