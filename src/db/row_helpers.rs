use sqlx::{Row, sqlite::SqliteRow};

use crate::models::*;

/// Filter empty strings to None; the DB stores '' instead of NULL
pub fn none_if_empty(opt: Option<String>) -> Option<String> {
    opt.filter(|s| !s.is_empty())
}

/// Map a SQLite row to a Plan struct
pub fn map_plan_row(row: &SqliteRow) -> Plan {
    Plan {
        id: row.get("id"),
        prefix: row.get("prefix"),
        mask_len: row.get::<i64, _>("mask_len") as u8,
        description: none_if_empty(row.get("description")),
        layout_count: row.try_get::<i32, _>("layout_count").ok(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a Layout header; nodes are fetched separately
pub fn map_layout_row(row: &SqliteRow) -> Layout {
    let auto_fill: i32 = row.get("auto_fill");
    let first_finished: i32 = row.get("first_finished");
    Layout {
        id: row.get("id"),
        plan_id: row.get("plan_id"),
        name: row.get("name"),
        auto_fill: auto_fill != 0,
        first_finished: first_finished != 0,
        nodes: vec![],
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        tree: None,
    }
}

/// Map a SQLite row to a PlanNode struct
pub fn map_node_row(row: &SqliteRow) -> PlanNode {
    let modified: i32 = row.get("modified");
    PlanNode {
        id: row.get("id"),
        layout_id: row.get("layout_id"),
        pid: row.get("pid"),
        name: row.get("name"),
        prefix: row.get("prefix"),
        sequence: row.get("sequence"),
        bit_width: row.get("bit_width"),
        value: row.get("value"),
        ipv4: row.get("ipv4"),
        modified: modified != 0,
    }
}
