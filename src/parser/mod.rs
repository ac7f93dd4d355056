pub mod assemble;
pub mod extract;
pub mod sanitize;
pub mod tree;

use serde_json::Value;
use tracing::debug;

use crate::schema::FieldSchema;
use assemble::Record;
use tree::RecordDoc;

/// Raw document → sanitized tree → record. `None` when the document has no
/// `Record` wrapper.
pub fn process_document(schema: &FieldSchema, raw: Value) -> Option<Record> {
    assemble_document(schema, sanitize::sanitize(raw))
}

/// Same as [`process_document`] for a document that is already sanitized.
pub fn assemble_document(schema: &FieldSchema, clean: Value) -> Option<Record> {
    let Some(doc) = RecordDoc::from_document(clean) else {
        debug!("No Record wrapper, skipping");
        return None;
    };
    let record = assemble::assemble(schema, &doc);
    debug!(title = ?doc.attribute("RecordTitle"), "Assembled record");
    Some(record)
}

// ── Tests ──
