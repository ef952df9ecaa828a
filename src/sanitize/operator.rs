//! Operator-key rejection.
//!
//! Document stores treat `$`-prefixed keys as query operators and dotted keys
//! as paths into nested documents. Any such key, at any depth, rejects the
//! whole payload; scanning stops at the first hit.

use serde_json::Value;
use thiserror::Error;

/// Keys starting with this character are query operators.
pub const OPERATOR_MARKER: char = '$';

/// Keys containing this character address nested fields.
pub const PATH_SEPARATOR: char = '.';

/// The first offending key found in a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("operator key {key:?} at {location:?}")]
pub struct InjectionDetected {
    pub key: String,
    /// Dotted location of the mapping that holds the key; empty for the root.
    pub location: String,
}

/// Returns true for keys that could be interpreted as an operator or a path.
pub fn is_operator_key(key: &str) -> bool {
    key.starts_with(OPERATOR_MARKER) || key.contains(PATH_SEPARATOR)
}

/// Walk `value`, failing on the first operator key.
pub fn check(value: &Value) -> Result<(), InjectionDetected> {
    walk(value, &mut String::new())
}

fn walk(value: &Value, location: &mut String) -> Result<(), InjectionDetected> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if is_operator_key(key) {
                    return Err(InjectionDetected {
                        key: key.clone(),
                        location: location.clone(),
                    });
                }
                let restore = location.len();
                if !location.is_empty() {
                    location.push('.');
                }
                location.push_str(key);
                walk(child, location)?;
                location.truncate(restore);
            }
            Ok(())
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                let restore = location.len();
                location.push_str(&format!("[{index}]"));
                walk(item, location)?;
                location.truncate(restore);
            }
            Ok(())
        }
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_keys() {
        assert!(is_operator_key("$where"));
        assert!(is_operator_key("$"));
        assert!(is_operator_key("profile.name"));
        assert!(is_operator_key("."));
        assert!(!is_operator_key("price$"));
        assert!(!is_operator_key("name"));
        assert!(!is_operator_key(""));
    }

    #[test]
    fn test_root_operator() {
        let err = check(&json!({ "$where": "1==1" })).unwrap_err();
        assert_eq!(err.key, "$where");
        assert_eq!(err.location, "");
    }

    #[test]
    fn test_nested_operator_in_sequence() {
        let payload = json!({
            "filters": [
                { "status": "open" },
                { "owner": { "$ne": null } }
            ]
        });
        let err = check(&payload).unwrap_err();
        assert_eq!(err.key, "$ne");
        assert_eq!(err.location, "filters[1].owner");
    }

    #[test]
    fn test_dotted_key() {
        let err = check(&json!({ "user": { "profile.admin": true } })).unwrap_err();
        assert_eq!(err.key, "profile.admin");
    }

    #[test]
    fn test_values_are_not_inspected() {
        assert_eq!(check(&json!({ "note": "$gt and a.b", "n": 1.5 })), Ok(()));
        assert_eq!(check(&json!(["$gt", { "ok": [] }])), Ok(()));
    }

    #[test]
    fn test_deeply_nested() {
        let mut payload = json!({ "$gt": 1 });
        for _ in 0..50 {
            payload = json!({ "level": [payload] });
        }
        assert!(check(&payload).is_err());
    }
}
