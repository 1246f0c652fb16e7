//! Usage reports over a layout.
//!
//! IPv6 layouts are reported along the node tree itself. IPv4 layouts are
//! reported along a containment forest built from their literal blocks, so
//! nesting follows the addresses rather than the node structure.

use ipnet::{IpNet, Ipv4Net};

use super::error::Result;
use super::tree::NodeTree;
use crate::models::{AddressFamily, Layout, NetItem, NetNode, Plan};

/// Flattened usage report of `layout`, pre-order with the root left out
pub fn get_net_nodes_list(plan: &Plan, layout: &mut Layout, family: AddressFamily) -> Result<Vec<NetNode>> {
    let tree = layout.node_tree();
    match family {
        AddressFamily::V6 => Ok(tree_report(tree, plan.mask_len)),
        AddressFamily::V4 => containment_report(tree),
    }
}

fn join_level(parent: &str, position: usize) -> String {
    if parent.is_empty() {
        position.to_string()
    } else {
        format!("{}.{}", parent, position)
    }
}

/// `Σ 2^(max - child) * 100 / 2^(max - this)` rounded down, as "N%".
/// None when a length is deeper than `max_len`.
fn usage_percent(max_len: u8, this_len: u8, child_lens: &[u8]) -> Option<String> {
    let capacity = 1u128.checked_shl(u32::from(max_len.checked_sub(this_len)?))?;
    let mut claimed = 0u128;
    for &len in child_lens {
        let size = 1u128.checked_shl(u32::from(max_len.checked_sub(len)?))?;
        claimed = claimed.checked_add(size)?;
    }
    Some(format!("{}%", claimed.checked_mul(100)? / capacity))
}

fn concrete_len(prefix: &str) -> Option<u8> {
    prefix.parse::<IpNet>().ok().map(|net| net.prefix_len())
}

// ========== Tree strategy ==========

fn tree_report(tree: &NodeTree, max_len: u8) -> Vec<NetNode> {
    let mut out = Vec::new();
    if !tree.is_empty() {
        walk_tree(tree, 0, "", &mut Vec::new(), 0, max_len, &mut out);
    }
    out
}

fn walk_tree(
    tree: &NodeTree,
    parent: usize,
    parent_level: &str,
    ancestors: &mut Vec<String>,
    depth: usize,
    max_len: u8,
    out: &mut Vec<NetNode>,
) {
    for (i, &idx) in tree.children(parent).iter().enumerate() {
        let node = tree.node(idx);
        let level = join_level(parent_level, i + 1);
        out.push(NetNode {
            item: NetItem {
                name: node.name.clone(),
                prefix: node.prefix.clone(),
                tags: ancestors.join(","),
                level: level.clone(),
                usage: tree_usage(tree, idx, max_len),
            },
            depth,
        });

        ancestors.push(node.name.clone());
        walk_tree(tree, idx, &level, ancestors, depth + 1, max_len, out);
        ancestors.pop();
    }
}

/// Blank until this node and all of its children have concrete prefixes
fn tree_usage(tree: &NodeTree, idx: usize, max_len: u8) -> String {
    let children = tree.children(idx);
    if children.is_empty() {
        return "0%".to_string();
    }
    let Some(this_len) = concrete_len(&tree.node(idx).prefix) else {
        return String::new();
    };
    let child_lens: Option<Vec<u8>> = children
        .iter()
        .map(|&c| concrete_len(&tree.node(c).prefix))
        .collect();

    child_lens
        .and_then(|lens| usage_percent(max_len, this_len, &lens))
        .unwrap_or_default()
}

// ========== Containment strategy ==========

#[derive(Debug)]
struct Block {
    /// None only for the virtual root
    net: Option<Ipv4Net>,
    owner: String,
    children: Vec<usize>,
}

/// Literal blocks nested by containment under a virtual root (index 0)
#[derive(Debug)]
struct Forest {
    blocks: Vec<Block>,
}

fn sort_key(net: &Ipv4Net) -> (u32, u8) {
    (u32::from(net.network()), net.prefix_len())
}

impl Forest {
    fn new() -> Self {
        Self {
            blocks: vec![Block {
                net: None,
                owner: String::new(),
                children: vec![],
            }],
        }
    }

    fn net(&self, idx: usize) -> Option<Ipv4Net> {
        self.blocks[idx].net
    }

    fn insert(&mut self, net: Ipv4Net, owner: String) {
        // descend while some child strictly contains the new block
        let mut current = 0;
        while let Some(&inner) = self.blocks[current].children.iter().find(|&&c| {
            self.net(c).is_some_and(|existing| existing != net && existing.contains(&net))
        }) {
            current = inner;
        }

        // adopt the siblings the new block contains
        let (adopted, kept): (Vec<usize>, Vec<usize>) = self.blocks[current]
            .children
            .iter()
            .copied()
            .partition(|&c| self.net(c).is_some_and(|existing| net.contains(&existing)));

        let idx = self.blocks.len();
        self.blocks.push(Block {
            net: Some(net),
            owner,
            children: adopted,
        });

        let key = sort_key(&net);
        let mut siblings = kept;
        let pos = siblings.partition_point(|&c| self.net(c).is_some_and(|n| sort_key(&n) < key));
        siblings.insert(pos, idx);
        self.blocks[current].children = siblings;
    }
}

fn containment_report(tree: &NodeTree) -> Result<Vec<NetNode>> {
    let mut forest = Forest::new();
    for (idx, net) in tree.validate_literals()? {
        forest.insert(net, tree.node(idx).name.clone());
    }

    let mut out = Vec::new();
    walk_forest(&forest, 0, "", &mut Vec::new(), 0, &mut out);
    Ok(out)
}

fn walk_forest(
    forest: &Forest,
    parent: usize,
    parent_level: &str,
    ancestors: &mut Vec<String>,
    depth: usize,
    out: &mut Vec<NetNode>,
) {
    for (i, &idx) in forest.blocks[parent].children.iter().enumerate() {
        let block = &forest.blocks[idx];
        let Some(net) = block.net else {
            continue;
        };
        let level = join_level(parent_level, i + 1);
        let usage = if block.children.is_empty() {
            "0%".to_string()
        } else {
            let lens: Vec<u8> = block
                .children
                .iter()
                .filter_map(|&c| forest.net(c).map(|n| n.prefix_len()))
                .collect();
            usage_percent(32, net.prefix_len(), &lens).unwrap_or_default()
        };

        out.push(NetNode {
            item: NetItem {
                name: block.owner.clone(),
                prefix: net.to_string(),
                tags: ancestors.join(","),
                level: level.clone(),
                usage,
            },
            depth,
        });

        ancestors.push(block.owner.clone());
        walk_forest(forest, idx, &level, ancestors, depth + 1, out);
        ancestors.pop();
    }
}
