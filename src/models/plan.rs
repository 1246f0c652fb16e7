use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::planning::NodeTree;

/// Parent id carried by the single root node of a layout
pub const ROOT_PID: i64 = 0;

/// Address family of a plan or report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    V4,
    V6,
}

/// Plan is a top-level address block and the deepest mask length
/// its layouts may allocate down to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: i64,
    pub prefix: String,
    pub mask_len: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_count: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// CreatePlanRequest for registering a new plan
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePlanRequest {
    pub prefix: String,
    pub mask_len: u8,
    #[serde(default)]
    pub description: Option<String>,
}

/// PlanNode is one node of a layout tree.
///
/// IPv6 nodes are sized by `bit_width` and get `value`/`prefix` from
/// auto-fill; IPv4 nodes list literal blocks in `ipv4`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub layout_id: i64,
    #[serde(default)]
    pub pid: i64,
    pub name: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub sequence: i32,
    #[serde(default)]
    pub bit_width: i32,
    #[serde(default)]
    pub value: i64,
    #[serde(default)]
    pub ipv4: String,
    /// Set by the client when this node's subtree must be rewritten on update
    #[serde(default)]
    pub modified: bool,
}

impl PlanNode {
    pub fn is_root(&self) -> bool {
        self.pid == ROOT_PID
    }

    /// Literal blocks listed in `ipv4`, split on `,` and taken as written
    pub fn literals(&self) -> Vec<&str> {
        if self.ipv4.is_empty() {
            return vec![];
        }
        self.ipv4.split(',').collect()
    }
}

/// Layout is one named partition scheme of a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layout {
    pub id: i64,
    pub plan_id: i64,
    pub name: String,
    pub auto_fill: bool,
    pub first_finished: bool,
    #[serde(default)]
    pub nodes: Vec<PlanNode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Tree built from `nodes` on first access
    #[serde(skip)]
    pub(crate) tree: Option<NodeTree>,
}

/// LayoutRequest for creating or updating a layout
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutRequest {
    pub name: String,
    #[serde(default)]
    pub auto_fill: bool,
    #[serde(default)]
    pub first_finished: bool,
    #[serde(default)]
    pub nodes: Vec<PlanNode>,
}

/// NetItem is one row of a usage report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetItem {
    pub name: String,
    pub prefix: String,
    /// Comma-joined names of the enclosing nodes, outermost first
    pub tags: String,
    /// Dotted 1-based sibling path, e.g. "2.1"
    pub level: String,
    /// Share of this block claimed by its children, e.g. "25%"; empty when unknown
    pub usage: String,
}

/// NetNode is a report row together with its display depth
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetNode {
    #[serde(flatten)]
    pub item: NetItem,
    pub depth: usize,
}

/// Query parameters for the usage report
#[derive(Debug, Clone, Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub family: Option<AddressFamily>,
}
