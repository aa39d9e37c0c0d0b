//! Line-oriented key/value parsing and rewriting for issue description text.
//!
//! Lines matching `^key: value$` are metadata; everything else is free
//! prose. The writer rewrites only the addressed keys in place, preserving
//! line order and all unrelated content.

use std::collections::HashMap;

/// An explicit `null` is distinguished from "field absent" so that
/// round-tripping through [`rewrite_fields`] keeps the slot rather than
/// dropping the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Value(String),
    Null,
}

impl FieldValue {
    pub fn as_deref(&self) -> Option<&str> {
        match self {
            Self::Value(v) => Some(v.as_str()),
            Self::Null => None,
        }
    }

    fn render(&self) -> &str {
        match self {
            Self::Value(v) => v.as_str(),
            Self::Null => "null",
        }
    }
}

fn parse_metadata_line(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some((key.to_string(), value.trim().to_string()))
}

/// Parse all `key: value` lines into a flat map. Later duplicate keys win.
pub fn parse_description_fields(description: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for line in description.lines() {
        if let Some((key, value)) = parse_metadata_line(line) {
            fields.insert(key, value);
        }
    }
    fields
}

/// Read a single field, treating empty string and the literal `null` as
/// absent.
pub fn normalized_field(fields: &HashMap<String, String>, key: &str) -> Option<String> {
    let raw = fields.get(key)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Rewrite the given keys within `description`, preserving all other lines.
/// A key not already present is appended as a new metadata line. `Null`
/// values are written as the literal `null` so the slot survives.
pub fn rewrite_fields(description: &str, updates: &[(&str, FieldValue)]) -> String {
    let mut remaining: HashMap<&str, &FieldValue> =
        updates.iter().map(|(k, v)| (*k, v)).collect();
    let mut lines: Vec<String> = Vec::new();

    for line in description.lines() {
        if let Some((key, _)) = parse_metadata_line(line) {
            if let Some(value) = remaining.remove(key.as_str()) {
                lines.push(format!("{key}: {}", value.render()));
                continue;
            }
        }
        lines.push(line.to_string());
    }

    // Append any keys that were not already present, in the caller's order.
    for (key, value) in updates {
        if remaining.contains_key(key) {
            continue;
        }
        // already written above if it existed; only append brand-new keys
        if !description.lines().any(|l| {
            parse_metadata_line(l)
                .map(|(k, _)| k == *key)
                .unwrap_or(false)
        }) {
            lines.push(format!("{key}: {}", value.render()));
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_metadata_and_ignores_prose() {
        let description = "Some free text.\nchangeset.work_branch: agent1/42-fix\npr_url: null\nmore prose here";
        let fields = parse_description_fields(description);
        assert_eq!(
            fields.get("changeset.work_branch").map(String::as_str),
            Some("agent1/42-fix")
        );
        assert_eq!(fields.get("pr_url").map(String::as_str), Some("null"));
        assert_eq!(normalized_field(&fields, "pr_url"), None);
    }

    #[test]
    fn rewrite_preserves_unrelated_lines_and_updates_in_place() {
        let description = "prose\npr_url: old\npr_state: draft-pr\nmore prose";
        let updated = rewrite_fields(
            &description,
            &[
                ("pr_url", FieldValue::Value("https://example/pr/1".into())),
                ("review_owner", FieldValue::Null),
            ],
        );
        assert!(updated.contains("prose\npr_url: https://example/pr/1"));
        assert!(updated.contains("pr_state: draft-pr"));
        assert!(updated.contains("review_owner: null"));
        assert!(updated.ends_with("more prose"));
    }

    #[test]
    fn rewrite_appends_missing_keys() {
        let out = rewrite_fields("prose only", &[("pr_number", FieldValue::Value("7".into()))]);
        assert_eq!(out, "prose only\npr_number: 7");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_key() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_.]{0,20}"
    }

    fn arb_value() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9/_-]{1,30}"
    }

    proptest! {
        #[test]
        fn rewrite_then_parse_round_trips(key in arb_key(), value in arb_value()) {
            let updated = rewrite_fields(
                "prose line one\nprose line two",
                &[(key.as_str(), FieldValue::Value(value.clone()))],
            );
            let fields = parse_description_fields(&updated);
            prop_assert_eq!(fields.get(key.as_str()).map(String::as_str), Some(value.as_str()));
            prop_assert!(updated.contains("prose line one"));
            prop_assert!(updated.contains("prose line two"));
        }

        #[test]
        fn rewrite_is_idempotent(key in arb_key(), value in arb_value()) {
            let once = rewrite_fields("prose", &[(key.as_str(), FieldValue::Value(value.clone()))]);
            let twice = rewrite_fields(&once, &[(key.as_str(), FieldValue::Value(value))]);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn null_value_round_trips_as_absent(key in arb_key()) {
            let updated = rewrite_fields("prose", &[(key.as_str(), FieldValue::Null)]);
            let fields = parse_description_fields(&updated);
            prop_assert_eq!(normalized_field(&fields, key.as_str()), None);
        }
    }
}
