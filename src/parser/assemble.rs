use std::sync::LazyLock;

use itertools::Itertools;
use regex::Regex;
use serde_json::{Map, Value};

use super::extract::{coerce, extract, extract_list};
use super::tree::RecordDoc;
use crate::schema::{DerivedRule, FieldDescriptor, FieldSchema, FieldSource, Mode};

/// Lower-cased name fragments marking a racemic mixture.
const RACEMIC_MARKERS: &[&str] = &["(+/-)", "(+-)", "(±)", "rac-", "(rs)", "(r,s)", "dl-"];

static ORGANISM_CLAUSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:found in|reported in|isolated from)\s+(.+?)(?:,?\s+(?:and\s+)?other organisms|\s+with data available|\.\s|\.$|$)",
    )
    .unwrap()
});
static ORGANISM_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][a-z]+(?: [a-z][a-z.-]+){1,3}$").unwrap());
static LIST_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s*(?:and\s+)?|\s+and\s+").unwrap());

/// One normalized output record. Fields keep schema order; a field that was
/// never extracted holds `None` and renders as its default.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Vec<Slot>,
}

#[derive(Debug, Clone, PartialEq)]
struct Slot {
    path: String,
    value: Option<Value>,
    default: Value,
}

impl Record {
    /// Extracted value at `path`; `None` when the field fell back to its default.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.slot(path).and_then(|s| s.value.as_ref())
    }

    /// Value at `path` as it will be written, default included.
    #[cfg(test)]
    pub fn rendered(&self, path: &str) -> Option<&Value> {
        self.slot(path).map(|s| s.value.as_ref().unwrap_or(&s.default))
    }

    /// Nested JSON object; absent fields become their sentinel default.
    pub fn to_json(&self) -> Value {
        let mut root = Map::new();
        for slot in &self.fields {
            let value = slot.value.clone().unwrap_or_else(|| slot.default.clone());
            insert_path(&mut root, &slot.path, value);
        }
        Value::Object(root)
    }

    fn slot(&self, path: &str) -> Option<&Slot> {
        self.fields.iter().find(|s| s.path == path)
    }
}

/// Fold the schema over one document. Never fails: every field degrades to
/// its default on its own.
pub fn assemble(schema: &FieldSchema, doc: &RecordDoc) -> Record {
    let mut record = Record {
        fields: schema
            .fields
            .iter()
            .map(|f| Slot {
                path: f.output.clone(),
                value: None,
                default: f.default_value(),
            })
            .collect(),
    };

    for (slot, field) in record.fields.iter_mut().zip(&schema.fields) {
        slot.value = resolve(field, doc);
    }

    for derived in &schema.derived {
        let value = derive(&derived.rule, &record);
        record.fields.push(Slot {
            path: derived.output.clone(),
            value,
            default: derived.default_value(),
        });
    }

    record
}

fn resolve(field: &FieldDescriptor, doc: &RecordDoc) -> Option<Value> {
    match &field.source {
        FieldSource::Section { path, name } => {
            let node = doc.root.locate(path)?;
            match field.mode {
                Mode::First => extract(&node.information, name.as_deref(), field.kind, field.fallback),
                Mode::List => Some(Value::Array(
                    extract_list(&node.information, name.as_deref())
                        .into_iter()
                        .map(Value::String)
                        .collect(),
                )),
            }
        }
        FieldSource::Record { key } => {
            let raw = doc.attribute(key)?;
            coerce(raw, field.kind).or_else(|| field.fallback.and_then(|k| coerce(raw, k)))
        }
        FieldSource::Constant { value } => Some(value.clone()),
    }
}

fn derive(rule: &DerivedRule, record: &Record) -> Option<Value> {
    match rule {
        DerivedRule::Racemic { name, count } => {
            let by_name = record
                .get(name)
                .and_then(Value::as_str)
                .is_some_and(has_racemic_marker);
            let by_count = record.get(count).and_then(as_number).is_some_and(|n| n > 0.0);
            Some(Value::Bool(by_name || by_count))
        }
        DerivedRule::Organisms { from } => {
            let text = record.get(from).and_then(Value::as_str)?;
            Some(Value::Array(
                organisms(text).into_iter().map(Value::String).collect(),
            ))
        }
        DerivedRule::Alias { from } => record.get(from).cloned(),
        DerivedRule::FirstSentence { from } => record
            .get(from)
            .and_then(Value::as_str)
            .and_then(|s| s.split('.').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Value::String(s.to_string())),
    }
}

fn has_racemic_marker(name: &str) -> bool {
    let lower = name.to_lowercase();
    RACEMIC_MARKERS.iter().any(|m| lower.contains(m))
}

/// Counts may arrive as numbers or as formatted strings.
fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Organism names listed after "found in" / "reported in" / "isolated from".
fn organisms(text: &str) -> Vec<String> {
    ORGANISM_CLAUSE_RE
        .captures_iter(text)
        .flat_map(|caps| {
            LIST_SPLIT_RE
                .split(caps.get(1).map_or("", |m| m.as_str()))
                .map(|s| s.trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|s| ORGANISM_NAME_RE.is_match(s))
        .unique()
        .collect()
}

fn insert_path(root: &mut Map<String, Value>, path: &str, value: Value) {
    let (parents, leaf) = match path.rsplit_once('.') {
        Some((p, l)) => (Some(p), l),
        None => (None, path),
    };

    let mut map = root;
    for segment in parents.into_iter().flat_map(|p| p.split('.')) {
        let entry = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        map = next;
    }
    map.insert(leaf.to_string(), value);
}

// ── Tests ──
