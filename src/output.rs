use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;

/// Write records as a JSON array, four-space indented.
pub fn write_records(path: &Path, records: &[Value]) -> Result<()> {
    write_pretty(path, records)
}

/// Write the per-identifier batch map, error placeholders included.
pub fn write_batch(path: &Path, batch: &Value) -> Result<()> {
    write_pretty(path, batch)
}

fn write_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    to_writer_indented(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

fn to_writer_indented<W: Write, T: Serialize + ?Sized>(writer: W, value: &T) -> Result<()> {
    let mut ser = serde_json::Serializer::with_formatter(writer, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser)?;
    Ok(())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn four_space_indent_and_lossless() {
        let records = vec![json!({"basicInfo": {"recordNumber": 702, "moleculeName": "Ethanol"}, "synonyms": {"depositorSupplied": ["a", "b"]}})];
        let mut buf = Vec::new();
        to_writer_indented(&mut buf, &records).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("\n    {\n        \"basicInfo\""));
        let back: Vec<Value> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn writes_file_and_creates_dirs() {
        let dir = std::env::temp_dir().join(format!("pubchem_out_{}", std::process::id()));
        let path = dir.join("nested").join("batch.json");
        let batch = json!({"1": {"a": 1}, "2": {"error": "HTTP status 404"}, "3": null});
        write_batch(&path, &batch).unwrap();
        let back: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, batch);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
