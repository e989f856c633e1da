//! Provider defaults and merging them into requests.

use serde_json::Value;

use crate::schema::Data;

/// Fallback values for optional fields, keyed by field name.
pub type Defaults = Data;

/// Fill every key of `defaults` that `request` leaves unset.
///
/// Values the caller supplied always win, including `false`, `0`, `""` and
/// `null`.
pub fn merge(defaults: &Defaults, mut request: Data) -> Data {
    for (key, value) in defaults {
        if !request.contains_key(key) {
            request.insert(key.clone(), value.clone());
        }
    }
    request
}

/// Convenience for building a [`Defaults`] map from pairs.
pub fn defaults<I, K>(pairs: I) -> Defaults
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fills_missing_keys() {
        let defaults = defaults([("port", json!(25)), ("tls", json!(false))]);
        let merged = merge(&defaults, Data::new());
        assert_eq!(merged.get("port"), Some(&json!(25)));
        assert_eq!(merged.get("tls"), Some(&json!(false)));
    }

    #[test]
    fn test_caller_values_win() {
        let defaults = defaults([("subject", json!("Default")), ("port", json!(25))]);
        let mut request = Data::new();
        request.insert("subject".into(), json!(""));
        request.insert("port".into(), json!(587));

        let merged = merge(&defaults, request);
        assert_eq!(merged.get("subject"), Some(&json!("")));
        assert_eq!(merged.get("port"), Some(&json!(587)));
    }

    #[test]
    fn test_explicit_default_value_is_unchanged() {
        let defaults = defaults([("tls", json!(false))]);
        let mut request = Data::new();
        request.insert("tls".into(), json!(false));

        assert_eq!(merge(&defaults, request), merge(&defaults, Data::new()));
    }
}
