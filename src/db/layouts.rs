use anyhow::Result;
use sqlx::{Pool, Sqlite, SqliteConnection};

use crate::models::*;
use super::row_helpers::{map_layout_row, map_node_row};

const SUBTREE_CTE: &str = r#"
    WITH RECURSIVE subtree(id) AS (
        SELECT ?
        UNION
        SELECT n.id FROM plan_nodes n JOIN subtree s ON n.pid = s.id
    )
"#;

pub struct LayoutRepo;

impl LayoutRepo {
    /// Layout headers of a plan, without nodes
    pub async fn list_by_plan(pool: &Pool<Sqlite>, plan_id: i64) -> Result<Vec<Layout>> {
        let rows = sqlx::query("SELECT * FROM plan_layouts WHERE plan_id = ? ORDER BY id")
            .bind(plan_id).fetch_all(pool).await?;
        Ok(rows.iter().map(map_layout_row).collect())
    }

    pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Option<Layout>> {
        let row = sqlx::query("SELECT * FROM plan_layouts WHERE id = ?")
            .bind(id).fetch_optional(conn).await?;
        Ok(row.as_ref().map(map_layout_row))
    }

    pub async fn create(conn: &mut SqliteConnection, layout: &Layout) -> Result<i64> {
        let result = sqlx::query(
            r#"INSERT INTO plan_layouts (plan_id, name, auto_fill, first_finished, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)"#
        )
        .bind(layout.plan_id)
        .bind(&layout.name)
        .bind(if layout.auto_fill { 1i32 } else { 0i32 })
        .bind(if layout.first_finished { 1i32 } else { 0i32 })
        .bind(layout.created_at)
        .bind(layout.updated_at)
        .execute(conn).await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_header(conn: &mut SqliteConnection, layout: &Layout) -> Result<()> {
        let result = sqlx::query(
            "UPDATE plan_layouts SET name = ?, auto_fill = ?, first_finished = ?, updated_at = ? WHERE id = ?"
        )
        .bind(&layout.name)
        .bind(if layout.auto_fill { 1i32 } else { 0i32 })
        .bind(if layout.first_finished { 1i32 } else { 0i32 })
        .bind(layout.updated_at)
        .bind(layout.id)
        .execute(conn).await?;
        if result.rows_affected() == 0 {
            return Err(crate::db::NotFoundError::new("Layout", &layout.id.to_string()).into());
        }
        Ok(())
    }

    pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM plan_layouts WHERE id = ?").bind(id).execute(conn).await?;
        if result.rows_affected() == 0 {
            return Err(crate::db::NotFoundError::new("Layout", &id.to_string()).into());
        }
        Ok(())
    }
}

pub struct NodeRepo;

impl NodeRepo {
    pub async fn list_by_layout(conn: &mut SqliteConnection, layout_id: i64) -> Result<Vec<PlanNode>> {
        let rows = sqlx::query("SELECT * FROM plan_nodes WHERE layout_id = ? ORDER BY sequence, id")
            .bind(layout_id).fetch_all(conn).await?;
        Ok(rows.iter().map(map_node_row).collect())
    }

    /// Insert a node, keeping a positive `node.id` and assigning one otherwise
    pub async fn create(conn: &mut SqliteConnection, node: &PlanNode) -> Result<i64> {
        let result = sqlx::query(
            r#"INSERT INTO plan_nodes (id, layout_id, pid, name, prefix, sequence, bit_width, value, ipv4, modified)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        )
        .bind(if node.id > 0 { Some(node.id) } else { None })
        .bind(node.layout_id)
        .bind(node.pid)
        .bind(&node.name)
        .bind(&node.prefix)
        .bind(node.sequence)
        .bind(node.bit_width)
        .bind(node.value)
        .bind(&node.ipv4)
        .bind(if node.modified { 1i32 } else { 0i32 })
        .execute(conn).await?;
        Ok(result.last_insert_rowid())
    }

    /// Delete a node and all of its descendants, returning the removed ids
    pub async fn delete_subtree(conn: &mut SqliteConnection, node_id: i64) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(&format!(
            "{} SELECT n.id FROM plan_nodes n WHERE n.id IN (SELECT id FROM subtree) ORDER BY n.id",
            SUBTREE_CTE
        ))
        .bind(node_id)
        .fetch_all(&mut *conn).await?;

        sqlx::query(&format!(
            "{} DELETE FROM plan_nodes WHERE id IN (SELECT id FROM subtree)",
            SUBTREE_CTE
        ))
        .bind(node_id)
        .execute(&mut *conn).await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
