use serde_json::{Map, Value};

/// Whether a lifecycle change with `attributes` satisfies `filter`.
///
/// A filter is a JSON object of attribute names to expected values. Every
/// key must be present with an equal value; strings compare
/// case-insensitively (hashes and addresses arrive in mixed case) and an
/// array means "any of". `null` and `{}` match everything; any other
/// non-object filter matches nothing.
pub fn matches(filter: &Value, attributes: &Map<String, Value>) -> bool {
    match filter {
        Value::Null => true,
        Value::Object(expected_attributes) => expected_attributes.iter().all(|(name, expected)| {
            attributes.get(name).is_some_and(|actual| matches_value(expected, actual))
        }),
        _ => false,
    }
}

fn matches_value(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Array(candidates), actual) if !actual.is_array() => {
            candidates.iter().any(|candidate| matches_value(candidate, actual))
        }
        (Value::String(expected), Value::String(actual)) => expected.eq_ignore_ascii_case(actual),
        (Value::Number(expected), Value::String(actual)) => expected.to_string() == *actual,
        (expected, actual) => expected == actual,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn attributes() -> Map<String, Value> {
        match json!({
            "relayHash": "0xAbC",
            "originChainId": 1,
            "destinationChainId": 10,
            "depositId": "42",
            "status": "filled",
            "previousStatus": "pending",
            "fillTxHash": null
        }) {
            Value::Object(attributes) => attributes,
            _ => unreachable!(),
        }
    }

    #[test]
    fn empty_filters_match_everything() {
        assert!(matches(&json!({}), &attributes()));
        assert!(matches(&Value::Null, &attributes()));
    }

    #[test]
    fn every_key_must_match() {
        assert!(matches(&json!({"originChainId": 1, "status": "filled"}), &attributes()));
        assert!(!matches(&json!({"originChainId": 1, "status": "pending"}), &attributes()));
        assert!(!matches(&json!({"unknownAttribute": 1}), &attributes()));
    }

    #[test]
    fn strings_compare_case_insensitively() {
        assert!(matches(&json!({"relayHash": "0xabc"}), &attributes()));
        assert!(matches(&json!({"status": "FILLED"}), &attributes()));
    }

    #[test]
    fn arrays_match_any_candidate() {
        assert!(matches(&json!({"destinationChainId": [10, 137]}), &attributes()));
        assert!(!matches(&json!({"destinationChainId": [1, 137]}), &attributes()));
    }

    #[test]
    fn numbers_match_numeric_strings() {
        assert!(matches(&json!({"depositId": 42}), &attributes()));
    }

    #[test]
    fn non_object_filters_match_nothing() {
        assert!(!matches(&json!("filled"), &attributes()));
        assert!(!matches(&json!([1, 2]), &attributes()));
    }
}
