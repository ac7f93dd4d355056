use serde_json::{Map, Number, Value};

/// The value union of one Information entry. Each list keeps its source
/// positions; an element with the wrong shape is stored as `None` so that
/// "first element" still means the first element of the source list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfoValue {
    pub strings: Vec<Option<String>>,
    pub numbers: Vec<Option<Number>>,
    pub dates: Vec<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Information {
    pub name: Option<String>,
    pub value: InfoValue,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionNode {
    pub heading: String,
    pub information: Vec<Information>,
    pub children: Vec<SectionNode>,
}

/// A document's `Record` wrapper: its scalar attributes plus the section tree.
#[derive(Debug, Clone)]
pub struct RecordDoc {
    pub attributes: Map<String, Value>,
    pub root: SectionNode,
}

impl RecordDoc {
    /// Returns `None` when the document has no `Record` object at all.
    pub fn from_document(doc: Value) -> Option<Self> {
        let Value::Object(mut top) = doc else {
            return None;
        };
        let Some(Value::Object(mut record)) = top.remove("Record") else {
            return None;
        };

        let sections = record.remove("Section");
        let heading = record
            .get("RecordTitle")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let root = SectionNode {
            heading,
            information: Vec::new(),
            children: sections.map(parse_children).unwrap_or_default(),
        };

        Some(Self {
            attributes: record,
            root,
        })
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key).filter(|v| !v.is_null())
    }
}

impl SectionNode {
    /// Build a node from raw JSON. Anything that does not fit the expected
    /// shape is dropped rather than reported.
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return Self::default();
        };

        let heading = match map.remove("TOCHeading") {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        let information = match map.remove("Information") {
            Some(Value::Array(items)) => items.into_iter().filter_map(Information::from_value).collect(),
            _ => Vec::new(),
        };
        let children = map.remove("Section").map(parse_children).unwrap_or_default();

        Self {
            heading,
            information,
            children,
        }
    }

    /// Descend one heading per path segment, taking the first child whose
    /// heading matches. `None` as soon as a segment has no match.
    pub fn locate<S: AsRef<str>>(&self, path: &[S]) -> Option<&SectionNode> {
        let mut node = self;
        for segment in path {
            let segment = segment.as_ref();
            node = node.children.iter().find(|c| c.heading == segment)?;
        }
        Some(node)
    }
}

impl Information {
    fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut map) = value else {
            return None;
        };

        let name = match map.remove("Name") {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };

        let mut out = InfoValue::default();
        if let Some(Value::Object(mut v)) = map.remove("Value") {
            if let Some(Value::Array(items)) = v.remove("StringWithMarkup") {
                out.strings = items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(mut m) => match m.remove("String") {
                            Some(Value::String(s)) => Some(s),
                            _ => None,
                        },
                        _ => None,
                    })
                    .collect();
            }
            if let Some(Value::Array(items)) = v.remove("Number") {
                out.numbers = items
                    .into_iter()
                    .map(|item| match item {
                        Value::Number(n) => Some(n),
                        _ => None,
                    })
                    .collect();
            }
            if let Some(Value::Array(items)) = v.remove("DateISO8601") {
                out.dates = items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect();
            }
        }

        Some(Self { name, value: out })
    }
}

fn parse_children(value: Value) -> Vec<SectionNode> {
    match value {
        Value::Array(items) => items.into_iter().map(SectionNode::from_value).collect(),
        _ => Vec::new(),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(heading: &str, children: Vec<SectionNode>) -> SectionNode {
        SectionNode {
            heading: heading.to_string(),
            information: Vec::new(),
            children,
        }
    }

    fn sample() -> SectionNode {
        node(
            "root",
            vec![
                node("Names and Identifiers", vec![node("Computed Descriptors", vec![node("SMILES", vec![])])]),
                node("Chemical and Physical Properties", vec![]),
            ],
        )
    }

    #[test]
    fn empty_path_is_root() {
        let root = sample();
        let empty: [&str; 0] = [];
        assert_eq!(root.locate(&empty), Some(&root));
    }

    #[test]
    fn missing_heading_is_absent() {
        assert!(sample().locate(&["Toxicity"]).is_none());
    }

    #[test]
    fn path_longer_than_branch_is_absent() {
        let root = sample();
        assert!(root
            .locate(&["Names and Identifiers", "Computed Descriptors", "SMILES", "Deeper"])
            .is_none());
        assert_eq!(
            root.locate(&["Names and Identifiers", "Computed Descriptors", "SMILES"])
                .map(|n| n.heading.as_str()),
            Some("SMILES")
        );
    }

    #[test]
    fn first_sibling_wins() {
        let mut first = node("Dup", vec![]);
        first.information.push(Information {
            name: Some("first".into()),
            value: InfoValue::default(),
        });
        let root = node("root", vec![first.clone(), node("Dup", vec![node("Only here", vec![])])]);
        assert_eq!(root.locate(&["Dup"]), Some(&first));
        // the second sibling is never consulted
        assert!(root.locate(&["Dup", "Only here"]).is_none());
    }

    #[test]
    fn malformed_shapes_are_absorbed() {
        let n = SectionNode::from_value(json!({
            "TOCHeading": 7,
            "Information": [
                "not an object",
                {"Name": 3, "Value": {"StringWithMarkup": [{"String": 1}, {"String": "ok"}], "Number": ["x", 2]}},
                {"Value": "scalar"}
            ],
            "Section": {"not": "a list"}
        }));
        assert_eq!(n.heading, "");
        assert!(n.children.is_empty());
        assert_eq!(n.information.len(), 2);
        assert_eq!(n.information[0].name, None);
        assert_eq!(n.information[0].value.strings, vec![None, Some("ok".to_string())]);
        assert_eq!(n.information[0].value.numbers, vec![None, Some(Number::from(2))]);
        assert_eq!(n.information[1].value, InfoValue::default());
    }

    #[test]
    fn record_wrapper_required() {
        assert!(RecordDoc::from_document(json!({"Fault": {"Code": "PUGREST.NotFound"}})).is_none());
        assert!(RecordDoc::from_document(json!({"Record": "flat"})).is_none());
        assert!(RecordDoc::from_document(json!([1, 2])).is_none());

        let doc = RecordDoc::from_document(json!({
            "Record": {"RecordType": "CID", "RecordNumber": 702, "RecordTitle": "Ethanol"}
        }))
        .unwrap();
        assert_eq!(doc.root.heading, "Ethanol");
        assert!(doc.root.children.is_empty());
        assert_eq!(doc.attribute("RecordNumber"), Some(&json!(702)));
        assert_eq!(doc.attribute("Missing"), None);
    }
}
