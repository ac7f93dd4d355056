use chrono::{DateTime, NaiveDate};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use super::tree::Information;

/// Which variant of an Information value a field reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// `StringWithMarkup[0].String`
    String,
    /// `Number[0]`
    Number,
    /// `DateISO8601[0]`
    Date,
}

/// First value of `kind` (or `fallback`) from the first entry matching `name`.
///
/// Only the first matching entry is consulted; the fallback is read from that
/// same entry. `None` means the caller should use the field default.
pub fn extract(
    entries: &[Information],
    name: Option<&str>,
    kind: ValueKind,
    fallback: Option<ValueKind>,
) -> Option<Value> {
    let entry = entries.iter().find(|e| name_matches(e, name))?;
    read_first(entry, kind).or_else(|| fallback.and_then(|k| read_first(entry, k)))
}

/// Every non-empty markup string across the matching entries, deduplicated by
/// exact match in first-seen order.
pub fn extract_list(entries: &[Information], name: Option<&str>) -> Vec<String> {
    entries
        .iter()
        .filter(|e| name_matches(e, name))
        .flat_map(|e| e.value.strings.iter().flatten())
        .filter(|s| !s.is_empty())
        .unique()
        .cloned()
        .collect()
}

/// Read a scalar wrapper attribute as `kind`. Numbers and strings convert
/// into each other when the text parses; anything else does not match.
pub fn coerce(value: &Value, kind: ValueKind) -> Option<Value> {
    match (kind, value) {
        (ValueKind::String, Value::String(_)) | (ValueKind::Number, Value::Number(_)) => {
            Some(value.clone())
        }
        (ValueKind::String, Value::Number(n)) => Some(Value::String(n.to_string())),
        (ValueKind::Number, Value::String(s)) => s.trim().parse::<Number>().ok().map(Value::Number),
        (ValueKind::Date, Value::String(s)) => Some(Value::String(normalize_date(s))),
        _ => None,
    }
}

fn name_matches(entry: &Information, name: Option<&str>) -> bool {
    match name {
        Some(n) => entry.name.as_deref() == Some(n),
        None => true,
    }
}

fn read_first(entry: &Information, kind: ValueKind) -> Option<Value> {
    let v = &entry.value;
    match kind {
        ValueKind::String => v.strings.first()?.clone().map(Value::String),
        ValueKind::Number => v.numbers.first()?.clone().map(Value::Number),
        ValueKind::Date => v
            .dates
            .first()?
            .as_deref()
            .map(|d| Value::String(normalize_date(d))),
    }
}

/// `YYYY-MM-DD` for anything chrono recognizes as a date or RFC 3339
/// timestamp; other strings are kept as-is.
fn normalize_date(raw: &str) -> String {
    let s = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.format("%Y-%m-%d").to_string();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.date_naive().format("%Y-%m-%d").to_string();
    }
    raw.to_string()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tree::InfoValue;
    use serde_json::{json, Number};

    fn markup(name: Option<&str>, strings: &[&str]) -> Information {
        Information {
            name: name.map(str::to_string),
            value: InfoValue {
                strings: strings.iter().map(|s| Some(s.to_string())).collect(),
                ..Default::default()
            },
        }
    }

    fn number(name: Option<&str>, n: f64) -> Information {
        Information {
            name: name.map(str::to_string),
            value: InfoValue {
                numbers: vec![Number::from_f64(n)],
                ..Default::default()
            },
        }
    }

    #[test]
    fn number_falls_back_to_markup() {
        let entries = vec![markup(None, &["46.07"])];
        assert_eq!(
            extract(&entries, None, ValueKind::Number, Some(ValueKind::String)),
            Some(json!("46.07"))
        );
    }

    #[test]
    fn number_without_fallback_is_absent() {
        let entries = vec![markup(None, &["46.07"])];
        assert_eq!(extract(&entries, None, ValueKind::Number, None), None);
    }

    #[test]
    fn empty_entries_always_absent() {
        for kind in [ValueKind::String, ValueKind::Number, ValueKind::Date] {
            assert_eq!(extract(&[], None, kind, Some(ValueKind::String)), None);
            assert_eq!(extract(&[], Some("Absorption"), kind, None), None);
        }
        assert!(extract_list(&[], None).is_empty());
    }

    #[test]
    fn primary_kind_wins_over_fallback() {
        let mut entry = number(None, -0.1);
        entry.value.strings = vec![Some("-0.1 (est)".into())];
        assert_eq!(
            extract(&[entry], None, ValueKind::Number, Some(ValueKind::String)),
            Some(json!(-0.1))
        );
    }

    #[test]
    fn name_filter_selects_entry() {
        let entries = vec![
            markup(Some("Absorption"), &["Rapidly absorbed."]),
            markup(Some("Route of Elimination"), &["Mostly hepatic."]),
        ];
        assert_eq!(
            extract(&entries, Some("Route of Elimination"), ValueKind::String, None),
            Some(json!("Mostly hepatic."))
        );
        assert_eq!(extract(&entries, Some("Clearance"), ValueKind::String, None), None);
        assert_eq!(
            extract(&entries, None, ValueKind::String, None),
            Some(json!("Rapidly absorbed."))
        );
    }

    #[test]
    fn only_first_element_counts() {
        let entry = Information {
            name: None,
            value: InfoValue {
                strings: vec![None, Some("second".into())],
                ..Default::default()
            },
        };
        assert_eq!(extract(&[entry], None, ValueKind::String, None), None);
    }

    #[test]
    fn integers_stay_integers() {
        let entry = Information {
            name: None,
            value: InfoValue {
                numbers: vec![Some(Number::from(3))],
                ..Default::default()
            },
        };
        let v = extract(&[entry], None, ValueKind::Number, None).unwrap();
        assert_eq!(v.to_string(), "3");
    }

    #[test]
    fn dates_normalized_when_recognized() {
        let entry = |d: &str| Information {
            name: None,
            value: InfoValue {
                dates: vec![Some(d.to_string())],
                ..Default::default()
            },
        };
        assert_eq!(extract(&[entry("2004-09-16")], None, ValueKind::Date, None), Some(json!("2004-09-16")));
        assert_eq!(
            extract(&[entry("2023-05-01T12:30:00Z")], None, ValueKind::Date, None),
            Some(json!("2023-05-01"))
        );
        assert_eq!(extract(&[entry("Spring 2004")], None, ValueKind::Date, None), Some(json!("Spring 2004")));
    }

    #[test]
    fn list_dedups_and_skips_empty() {
        let entries = vec![markup(None, &["A", "", "B", "A", "C"])];
        assert_eq!(extract_list(&entries, None), vec!["A", "B", "C"]);
    }

    #[test]
    fn list_spans_matching_entries() {
        let entries = vec![
            markup(Some("Synonyms"), &["ethanol", "alcohol"]),
            markup(Some("Other"), &["ignored"]),
            markup(Some("Synonyms"), &["alcohol", "ethyl alcohol"]),
        ];
        assert_eq!(
            extract_list(&entries, Some("Synonyms")),
            vec!["ethanol", "alcohol", "ethyl alcohol"]
        );
    }

    #[test]
    fn attributes_coerced_to_kind() {
        assert_eq!(coerce(&json!(702), ValueKind::Number), Some(json!(702)));
        assert_eq!(coerce(&json!(702), ValueKind::String), Some(json!("702")));
        assert_eq!(coerce(&json!(" 46.07 "), ValueKind::Number), Some(json!(46.07)));
        assert_eq!(coerce(&json!("n/a"), ValueKind::Number), None);
        assert_eq!(coerce(&json!("2023-05-01T12:30:00Z"), ValueKind::Date), Some(json!("2023-05-01")));
        assert_eq!(coerce(&json!(true), ValueKind::String), None);
    }
}
