/// Database row types. These map directly to SQLite rows.
/// Distinct from campfire-types models to keep the DB layer independent.

/// One leaf of the flattened tree.
pub struct NodeRow {
    pub path: String,
    pub value: String,
}

pub struct KvRow {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}
