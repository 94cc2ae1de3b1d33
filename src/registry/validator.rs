// Record validation - pure checks on decoded values and raw snapshot bytes

use crate::registry::record::ServerRecord;
use serde_json::Value;

const REQUIRED_STRING_FIELDS: [&str; 5] = ["id", "name", "serverPath", "framework", "version"];

/// True when `value` has every mandatory field with the right primitive type.
///
/// `id` and `serverPath` must also be non-empty, since both are used as keys.
pub fn is_valid_record(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };

    REQUIRED_STRING_FIELDS.iter().all(|field| {
        match object.get(*field).and_then(Value::as_str) {
            Some(text) => !(text.is_empty() && (*field == "id" || *field == "serverPath")),
            None => false,
        }
    })
}

/// Keeps the entries that pass the shape check and decode into a record.
///
/// Returns the valid records in input order and how many were dropped.
pub fn filter_valid(values: Vec<Value>) -> (Vec<ServerRecord>, usize) {
    let mut rejected = 0;
    let mut records = Vec::with_capacity(values.len());

    for value in values {
        if !is_valid_record(&value) {
            rejected += 1;
            continue;
        }
        match serde_json::from_value::<ServerRecord>(value) {
            Ok(record) => records.push(record),
            Err(_) => rejected += 1,
        }
    }

    (records, rejected)
}

/// Syntax-only check: the bytes parse as JSON at all.
pub fn is_well_formed_snapshot(raw: &[u8]) -> bool {
    serde_json::from_slice::<serde::de::IgnoredAny>(raw).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn good() -> Value {
        json!({
            "id": "s1",
            "name": "Creative",
            "framework": "Purpur",
            "version": "1.20.1",
            "serverPath": "/srv/creative"
        })
    }

    #[test]
    fn accepts_well_formed_record() {
        assert!(is_valid_record(&good()));
    }

    #[test]
    fn rejects_missing_or_mistyped_fields() {
        for field in REQUIRED_STRING_FIELDS {
            let mut missing = good();
            missing.as_object_mut().unwrap().remove(field);
            assert!(!is_valid_record(&missing), "missing {field}");

            let mut mistyped = good();
            mistyped[field] = json!(42);
            assert!(!is_valid_record(&mistyped), "mistyped {field}");
        }
        assert!(!is_valid_record(&json!([1, 2, 3])));
        assert!(!is_valid_record(&Value::Null));
    }

    #[test]
    fn rejects_empty_keys() {
        let mut empty_id = good();
        empty_id["id"] = json!("");
        assert!(!is_valid_record(&empty_id));

        let mut empty_name = good();
        empty_name["name"] = json!("");
        assert!(is_valid_record(&empty_name));
    }

    #[test]
    fn filter_counts_rejections() {
        let mut no_path = good();
        no_path.as_object_mut().unwrap().remove("serverPath");
        let mut bad_ram = good();
        bad_ram["id"] = json!("s2");
        bad_ram["ramMB"] = json!("lots");

        let (records, rejected) = filter_valid(vec![good(), no_path, bad_ram]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "s1");
        assert_eq!(rejected, 2);
    }

    #[test]
    fn syntax_check_ignores_schema() {
        assert!(is_well_formed_snapshot(b"[]"));
        assert!(is_well_formed_snapshot(br#"{"not": "a list"}"#));
        assert!(!is_well_formed_snapshot(b"[{\"id\": \"s1\""));
        assert!(!is_well_formed_snapshot(b""));
    }
}
