use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

/// Fan a `{key: record}` node out into `(key, record)` pairs in key order.
/// Push keys sort in insertion order, so this is oldest first. Children that
/// do not decode as `T` are skipped.
pub(crate) fn keyed_records<T: DeserializeOwned>(value: Option<Value>) -> Vec<(String, T)> {
    let Some(Value::Object(map)) = value else {
        return Vec::new();
    };

    let mut records: Vec<(String, T)> = map
        .into_iter()
        .filter_map(|(key, child)| match serde_json::from_value::<T>(child) {
            Ok(record) => Some((key, record)),
            Err(e) => {
                warn!("Skipping malformed record {}: {}", key, e);
                None
            }
        })
        .collect();
    records.sort_by(|a, b| a.0.cmp(&b.0));
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use campfire_types::models::ActivityRecord;
    use serde_json::json;

    #[test]
    fn absent_or_leaf_values_are_empty() {
        assert!(keyed_records::<ActivityRecord>(None).is_empty());
        assert!(keyed_records::<ActivityRecord>(Some(json!("x"))).is_empty());
    }

    #[test]
    fn records_come_back_in_key_order() {
        let value = json!({
            "-Nb": { "time": "10:00", "activity": "Swim" },
            "-Na": { "time": "09:00", "activity": "Hike" },
            "-Nc": 42,
        });
        let records = keyed_records::<ActivityRecord>(Some(value));
        let keys: Vec<&str> = records.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["-Na", "-Nb"]);
        assert_eq!(records[0].1.activity, "Hike");
    }
}
