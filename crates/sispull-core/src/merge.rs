//! Recursive accumulator merge.
//!
//! Conflict policy: nested maps merge key-wise, everything else overwrites.
//! This deliberately lets a structured per-entity record be replaced by a
//! plain string (the degenerate shape an entity takes when the classifier
//! rejects a response).

use serde_json::Value;

/// Deep-merge `src` into `dest`.
pub fn merge_value(dest: &mut Value, src: Value) {
    match (dest, src) {
        (Value::Object(dest_map), Value::Object(src_map)) => {
            for (key, src_val) in src_map {
                match dest_map.get_mut(&key) {
                    Some(dest_val) if dest_val.is_object() && src_val.is_object() => {
                        merge_value(dest_val, src_val);
                    }
                    _ => {
                        dest_map.insert(key, src_val);
                    }
                }
            }
        }
        (dest, src) => *dest = src,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn disjoint_keys_merge() {
        let mut dest = json!({ "a": 1 });
        merge_value(&mut dest, json!({ "b": 2 }));
        assert_eq!(dest, json!({ "a": 1, "b": 2 }));
    }

    #[test]
    fn nested_maps_merge_keywise() {
        let mut dest = json!({ "student": { "count": 5 } });
        merge_value(&mut dest, json!({ "student": { "pages": 2 } }));
        assert_eq!(dest, json!({ "student": { "count": 5, "pages": 2 } }));
    }

    #[test]
    fn scalars_overwrite() {
        let mut dest = json!({ "student": { "records": 1 } });
        merge_value(&mut dest, json!({ "student": { "records": 7 } }));
        assert_eq!(dest, json!({ "student": { "records": 7 } }));
    }

    #[test]
    fn string_replaces_map() {
        // Degenerate shape after a rejected response
        let mut dest = json!({ "student": { "count": 5 } });
        merge_value(&mut dest, json!({ "student": "rate limited" }));
        assert_eq!(dest, json!({ "student": "rate limited" }));
    }

    #[test]
    fn map_replaces_string() {
        let mut dest = json!({ "student": "rate limited" });
        merge_value(&mut dest, json!({ "student": { "count": 5 } }));
        assert_eq!(dest, json!({ "student": { "count": 5 } }));
    }
}
