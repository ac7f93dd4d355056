use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::error::SchemaError;
use crate::parser::extract::ValueKind;
use crate::source::RecordKind;

/// Placeholder written for any scalar field that could not be extracted.
pub const SENTINEL: &str = "Unknown";

const COMPOUND_SCHEMA: &str = include_str!("../schemas/compound.json");
const SUBSTANCE_SCHEMA: &str = include_str!("../schemas/substance.json");

/// Declarative description of one output record: which fields exist, where
/// each is found in the section tree, and which fields are derived afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSchema {
    pub record_type: String,
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub derived: Vec<DerivedField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDescriptor {
    /// Dotted path into the output record, e.g. `structure.smilesStructure`.
    pub output: String,
    #[serde(flatten)]
    pub source: FieldSource,
    #[serde(default = "default_kind")]
    pub kind: ValueKind,
    #[serde(default)]
    pub fallback: Option<ValueKind>,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum FieldSource {
    /// Heading path from the record root, with an optional Information `Name`.
    Section {
        path: Vec<String>,
        #[serde(default)]
        name: Option<String>,
    },
    /// A scalar attribute of the `Record` wrapper (`RecordTitle`, ...).
    Record { key: String },
    Constant { value: Value },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    First,
    List,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DerivedField {
    pub output: String,
    #[serde(flatten)]
    pub rule: DerivedRule,
}

/// Computed after every descriptor has been applied. Inputs are output paths
/// of other fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum DerivedRule {
    /// Name carries a racemic marker, or undefined stereocenter count > 0.
    Racemic { name: String, count: String },
    /// Organism names mentioned in a free-text field.
    Organisms { from: String },
    Alias { from: String },
    FirstSentence { from: String },
}

impl DerivedRule {
    /// Output paths this rule reads.
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            DerivedRule::Racemic { name, count } => vec![name.as_str(), count.as_str()],
            DerivedRule::Organisms { from }
            | DerivedRule::Alias { from }
            | DerivedRule::FirstSentence { from } => vec![from.as_str()],
        }
    }
}

fn default_kind() -> ValueKind {
    ValueKind::String
}

impl FieldDescriptor {
    pub fn default_value(&self) -> Value {
        match (&self.default, self.mode) {
            (Some(v), _) => v.clone(),
            (None, Mode::First) => Value::String(SENTINEL.to_string()),
            (None, Mode::List) => Value::Array(Vec::new()),
        }
    }
}

impl DerivedField {
    pub fn default_value(&self) -> Value {
        match self.rule {
            DerivedRule::Racemic { .. } => Value::Bool(false),
            DerivedRule::Organisms { .. } => Value::Array(Vec::new()),
            DerivedRule::Alias { .. } | DerivedRule::FirstSentence { .. } => {
                Value::String(SENTINEL.to_string())
            }
        }
    }
}

impl FieldSchema {
    pub fn builtin(kind: RecordKind) -> Result<Self, SchemaError> {
        match kind {
            RecordKind::Compound => Self::from_json(COMPOUND_SCHEMA),
            RecordKind::Substance => Self::from_json(SUBSTANCE_SCHEMA),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Invalid schema {}", path.display()))
    }

    /// Built-in schema for `kind`, or the file at `path` when given.
    pub fn resolve(kind: RecordKind, path: Option<&Path>) -> Result<Self> {
        let schema = match path {
            Some(p) => Self::load(p)?,
            None => Self::builtin(kind)?,
        };
        info!(
            record_type = %schema.record_type,
            fields = schema.fields.len(),
            derived = schema.derived.len(),
            "Schema loaded"
        );
        Ok(schema)
    }

    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        let schema: Self = serde_json::from_str(text)?;
        schema.validate()?;
        Ok(schema)
    }

    fn validate(&self) -> Result<(), SchemaError> {
        if self.fields.is_empty() {
            return Err(SchemaError::Empty);
        }

        for f in &self.fields {
            if let FieldSource::Section { path, .. } = &f.source {
                if path.is_empty() {
                    return Err(SchemaError::EmptyHeadingPath(f.output.clone()));
                }
            }
        }

        let outputs: Vec<&str> = self
            .fields
            .iter()
            .map(|f| f.output.as_str())
            .chain(self.derived.iter().map(|d| d.output.as_str()))
            .collect();

        let mut seen = HashSet::new();
        for (index, out) in outputs.iter().enumerate() {
            if out.is_empty() || out.split('.').any(str::is_empty) {
                return Err(SchemaError::EmptyOutput { index });
            }
            if !seen.insert(*out) {
                return Err(SchemaError::Duplicate(out.to_string()));
            }
        }

        for parent in &outputs {
            let prefix = format!("{parent}.");
            if let Some(child) = outputs.iter().find(|o| o.starts_with(&prefix)) {
                return Err(SchemaError::Conflict {
                    parent: parent.to_string(),
                    child: child.to_string(),
                });
            }
        }

        // derived rules run in order, so each may only read fields and
        // earlier derived outputs
        let mut known: HashSet<&str> = self.fields.iter().map(|f| f.output.as_str()).collect();
        for d in &self.derived {
            if let Some(input) = d.rule.inputs().into_iter().find(|i| !known.contains(i)) {
                return Err(SchemaError::UnknownInput {
                    output: d.output.clone(),
                    input: input.to_string(),
                });
            }
            known.insert(&d.output);
        }

        Ok(())
    }
}

// ── Tests ──
