use crate::Database;
use crate::models::NodeRow;
use anyhow::{Context, Result, anyhow, bail};
use campfire_types::paths::NodePath;
use rusqlite::Connection;
use serde_json::{Map, Value};

impl Database {
    // -- Reads --

    /// Assemble the value stored at `path`, or `None` if nothing is there.
    pub fn get(&self, path: &NodePath) -> Result<Option<Value>> {
        self.with_conn(|conn| {
            let rows = query_subtree(conn, path)?;
            assemble(path, rows)
        })
    }

    pub fn exists(&self, path: &NodePath) -> Result<bool> {
        self.with_conn(|conn| subtree_exists(conn, path))
    }

    // -- Writes --

    /// Replace the subtree at `path`. Writing `null` or an empty object
    /// deletes it.
    pub fn set(&self, path: &NodePath, value: &Value) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            replace_subtree(&tx, path, value)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Append `value` under a freshly generated push key. Returns the key.
    pub fn push(&self, path: &NodePath, value: &Value) -> Result<String> {
        let key = self.push_ids.next();
        let child = path.child(&key)?;
        self.set(&child, value)?;
        Ok(key)
    }

    pub fn remove(&self, path: &NodePath) -> Result<()> {
        self.with_conn_mut(|conn| {
            delete_subtree(conn, path)?;
            Ok(())
        })
    }

    /// Write `value` at `path` only if nothing exists there yet. The check
    /// and the write happen in one transaction. Returns whether it wrote.
    pub fn set_if_absent(&self, path: &NodePath, value: &Value) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if subtree_exists(&tx, path)? || leaf_ancestor_exists(&tx, path)? {
                return Ok(false);
            }
            replace_subtree(&tx, path, value)?;
            tx.commit()?;
            Ok(true)
        })
    }
}

/// Bounds of the primary-key range holding every strict descendant of
/// `path`: `[path + "/", path + "0")`, since '0' follows '/' in ASCII.
fn descendant_range(path: &NodePath) -> (String, String) {
    (format!("{}/", path.as_str()), format!("{}0", path.as_str()))
}

fn query_subtree(conn: &Connection, path: &NodePath) -> Result<Vec<NodeRow>> {
    let rows = if path.is_root() {
        let mut stmt = conn.prepare("SELECT path, value FROM nodes ORDER BY path")?;
        let rows = stmt
            .query_map([], map_node_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows
    } else {
        let (lo, hi) = descendant_range(path);
        let mut stmt = conn.prepare(
            "SELECT path, value FROM nodes
             WHERE path = ?1 OR (path >= ?2 AND path < ?3)
             ORDER BY path",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![path.as_str(), lo, hi], map_node_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows
    };

    Ok(rows)
}

fn map_node_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NodeRow> {
    Ok(NodeRow {
        path: row.get(0)?,
        value: row.get(1)?,
    })
}

fn subtree_exists(conn: &Connection, path: &NodePath) -> Result<bool> {
    let found: i64 = if path.is_root() {
        conn.query_row("SELECT EXISTS(SELECT 1 FROM nodes)", [], |r| r.get(0))?
    } else {
        let (lo, hi) = descendant_range(path);
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM nodes WHERE path = ?1 OR (path >= ?2 AND path < ?3))",
            rusqlite::params![path.as_str(), lo, hi],
            |r| r.get(0),
        )?
    };
    Ok(found != 0)
}

fn leaf_ancestor_exists(conn: &Connection, path: &NodePath) -> Result<bool> {
    for ancestor in path.ancestors() {
        if ancestor.is_root() {
            continue;
        }
        let found: i64 = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM nodes WHERE path = ?1)",
            [ancestor.as_str()],
            |r| r.get(0),
        )?;
        if found != 0 {
            return Ok(true);
        }
    }
    Ok(false)
}

fn delete_subtree(conn: &Connection, path: &NodePath) -> Result<usize> {
    let n = if path.is_root() {
        conn.execute("DELETE FROM nodes", [])?
    } else {
        let (lo, hi) = descendant_range(path);
        conn.execute(
            "DELETE FROM nodes WHERE path = ?1 OR (path >= ?2 AND path < ?3)",
            rusqlite::params![path.as_str(), lo, hi],
        )?
    };
    Ok(n)
}

fn replace_subtree(conn: &Connection, path: &NodePath, value: &Value) -> Result<()> {
    delete_subtree(conn, path)?;

    // A node is either a leaf or has children, never both: writing below a
    // leaf turns it into an interior node.
    if !is_empty_write(value) {
        for ancestor in path.ancestors() {
            if !ancestor.is_root() {
                conn.execute("DELETE FROM nodes WHERE path = ?1", [ancestor.as_str()])?;
            }
        }
    }

    insert_flattened(conn, path, value)
}

fn is_empty_write(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.values().all(is_empty_write),
        _ => false,
    }
}

fn insert_flattened(conn: &Connection, path: &NodePath, value: &Value) -> Result<()> {
    match value {
        Value::Null => Ok(()),
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = path
                    .child(key)
                    .with_context(|| format!("invalid key under {}", path))?;
                insert_flattened(conn, &child_path, child)?;
            }
            Ok(())
        }
        leaf => {
            if path.is_root() {
                bail!("Cannot store a bare value at the root");
            }
            conn.execute(
                "INSERT INTO nodes (path, value) VALUES (?1, ?2)",
                rusqlite::params![path.as_str(), serde_json::to_string(leaf)?],
            )?;
            Ok(())
        }
    }
}

/// Rebuild the nested value at `base` from its flattened leaves.
fn assemble(base: &NodePath, rows: Vec<NodeRow>) -> Result<Option<Value>> {
    let mut root: Option<Value> = None;

    for row in rows {
        let leaf: Value = serde_json::from_str(&row.value)
            .with_context(|| format!("corrupt value at {}", row.path))?;

        let row_path = NodePath::parse(&row.path)?;
        let rel = base
            .relative(&row_path)
            .ok_or_else(|| anyhow!("row {} is outside {}", row.path, base))?;

        let Some((last, parents)) = rel.split_last() else {
            return Ok(Some(leaf));
        };

        let mut node = root.get_or_insert_with(|| Value::Object(Map::new()));
        for segment in parents {
            node = node
                .as_object_mut()
                .ok_or_else(|| anyhow!("leaf and children both stored under {}", base))?
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        node.as_object_mut()
            .ok_or_else(|| anyhow!("leaf and children both stored under {}", base))?
            .insert(last.to_string(), leaf);
    }

    Ok(root)
}
