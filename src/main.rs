mod batch;
mod db;
mod error;
mod output;
mod parser;
mod schema;
mod settings;
mod source;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{info, warn};

use schema::FieldSchema;
use settings::Settings;
use batch::FetchedDocument;
use source::{ChemblClient, PubChemClient, RecordKind};

#[derive(Parser)]
#[command(name = "pubchem_scraper", about = "PubChem PUG View record extractor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch + extract an id range in one pass and write the records
    Run {
        #[arg(short, long, value_enum)]
        kind: RecordKind,
        #[arg(long, default_value = "1")]
        start: u64,
        #[arg(long)]
        end: u64,
        /// Output file (default: final_pubchem_<kind>_data.json)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Field schema file replacing the built-in one
        #[arg(long)]
        schema: Option<PathBuf>,
        /// Write the per-id map, including error placeholders
        #[arg(long)]
        with_errors: bool,
    },
    /// Fetch an id range and store sanitized documents in the database
    Fetch {
        #[arg(short, long, value_enum)]
        kind: RecordKind,
        #[arg(long, default_value = "1")]
        start: u64,
        #[arg(long)]
        end: u64,
    },
    /// Extract records from stored documents
    Process {
        #[arg(short, long, value_enum)]
        kind: RecordKind,
        #[arg(long)]
        schema: Option<PathBuf>,
        /// Max documents to process (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Write stored records to a JSON file
    Export {
        #[arg(short, long, value_enum)]
        kind: RecordKind,
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[arg(long)]
        with_errors: bool,
    },
    /// Show fetch/extract statistics
    Stats,
    /// Dump raw ChEMBL molecule documents (CHEMBL<id>) as JSON
    Chembl {
        /// Numeric part of the ChEMBL id
        #[arg(long)]
        start: u64,
        /// Last id (default: start)
        #[arg(long)]
        end: Option<u64>,
        /// Output file (default: chembl_data.json)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    info!(settings_loaded = ?settings, "Starting");

    let result = match cli.command {
        Commands::Run {
            kind,
            start,
            end,
            out,
            schema,
            with_errors,
        } => {
            let ids = id_range(start, end)?;
            let schema = FieldSchema::resolve(kind, schema.as_deref())?;
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let client = Arc::new(PubChemClient::new(&settings, kind)?);

            println!("Fetching {} {} documents...", ids.len(), kind.as_str());
            let result = batch::run(client, ids, &schema, settings.concurrency, |doc| {
                store_document(&conn, kind, doc)
            })
            .await?;

            for (id, e) in result.failures() {
                println!("  {} {}: {}", kind.as_str(), id, e);
            }

            let out = out.unwrap_or_else(|| default_output(kind));
            let rows: Vec<(u64, Value)> = result.records().map(|(id, r)| (id, r.to_json())).collect();
            if with_errors {
                output::write_batch(&out, &result.to_json())?;
            } else {
                let records: Vec<Value> = rows.iter().map(|(_, v)| v.clone()).collect();
                output::write_records(&out, &records)?;
            }

            let stale: Vec<u64> = result
                .iter()
                .filter(|(_, o)| !matches!(o, batch::Outcome::Record(_)))
                .map(|(id, _)| id)
                .collect();
            db::save_records(&conn, kind.as_str(), &serialize_rows(&rows)?, &stale)?;

            println!(
                "Saved {} records ({} empty, {} errors) to {}",
                rows.len(),
                result.empty_count(),
                result.failures().count(),
                out.display()
            );
            Ok(())
        }
        Commands::Fetch { kind, start, end } => {
            let ids = id_range(start, end)?;
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let client = Arc::new(PubChemClient::new(&settings, kind)?);

            println!("Fetching {} {} documents (streaming to DB)...", ids.len(), kind.as_str());
            let stats = batch::fetch_documents(client, ids, settings.concurrency, |doc| {
                store_document(&conn, kind, &doc)
            })
            .await?;
            println!(
                "Done: {} fetched ({} ok, {} errors).",
                stats.total, stats.ok, stats.errors
            );
            Ok(())
        }
        Commands::Process { kind, schema, limit } => {
            let schema = FieldSchema::resolve(kind, schema.as_deref())?;
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let pruned = db::prune_failed_records(&conn, kind.as_str())?;
            if pruned > 0 {
                info!("Dropped {} records whose document now fails to fetch", pruned);
            }
            let docs = db::load_documents(&conn, kind.as_str(), limit)?;
            if docs.is_empty() {
                println!("No stored {} documents. Run 'fetch' first.", kind.as_str());
                return Ok(());
            }
            println!("Processing {} documents...", docs.len());
            let counts = process_documents(&conn, kind, &schema, docs)?;
            println!("Saved {} records ({} without a record wrapper).", counts.records, counts.empty);
            Ok(())
        }
        Commands::Export {
            kind,
            out,
            with_errors,
        } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let out = out.unwrap_or_else(|| default_output(kind));
            let records = db::load_records(&conn, kind.as_str())?;
            if records.is_empty() {
                println!("No {} records. Run 'process' or 'run' first.", kind.as_str());
                return Ok(());
            }

            let mut by_id: BTreeMap<u64, Value> = BTreeMap::new();
            for (id, body) in records {
                let value = serde_json::from_str(&body)
                    .with_context(|| format!("Corrupt stored record {}", id))?;
                by_id.insert(id, value);
            }
            let count = by_id.len();

            if with_errors {
                for (id, e) in db::load_failures(&conn, kind.as_str())? {
                    by_id.entry(id).or_insert_with(|| json!({ "error": e }));
                }
                let map: serde_json::Map<String, Value> =
                    by_id.into_iter().map(|(id, v)| (id.to_string(), v)).collect();
                output::write_batch(&out, &Value::Object(map))?;
            } else {
                let values: Vec<Value> = by_id.into_values().collect();
                output::write_records(&out, &values)?;
            }
            println!("Exported {} records to {}", count, out.display());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let stats = db::get_stats(&conn)?;
            if stats.is_empty() {
                println!("Nothing fetched yet.");
            }
            for s in stats {
                println!("{}:", s.kind);
                println!("  Documents: {}", s.documents);
                println!("  Errors:    {}", s.errors);
                println!("  Records:   {}", s.records);
            }
            Ok(())
        }
        Commands::Chembl { start, end, out } => {
            let ids = id_range(start, end.unwrap_or(start))?;
            let client = Arc::new(ChemblClient::new(&settings)?);
            let out = out.unwrap_or_else(|| PathBuf::from("chembl_data.json"));

            let mut docs: BTreeMap<u64, Value> = BTreeMap::new();
            let stats = batch::fetch_documents(client, ids, settings.concurrency, |doc| {
                let value = match doc.result {
                    Ok(v) => v,
                    Err(e) => json!({ "error": e }),
                };
                docs.insert(doc.id, value);
                Ok(())
            })
            .await?;

            if stats.total == 1 && stats.ok == 1 {
                // a single molecule is written as the document itself
                let doc = docs.into_values().next().unwrap_or(Value::Null);
                output::write_batch(&out, &doc)?;
            } else {
                let map: serde_json::Map<String, Value> = docs
                    .into_iter()
                    .map(|(id, v)| (format!("CHEMBL{}", id), v))
                    .collect();
                output::write_batch(&out, &Value::Object(map))?;
            }
            println!(
                "Saved {} ChEMBL documents ({} errors) to {}",
                stats.ok,
                stats.errors,
                out.display()
            );
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

struct ProcessCounts {
    records: usize,
    empty: usize,
}

fn process_documents(
    conn: &rusqlite::Connection,
    kind: RecordKind,
    schema: &FieldSchema,
    docs: Vec<(u64, String)>,
) -> anyhow::Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(docs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = ProcessCounts { records: 0, empty: 0 };

    for chunk in docs.chunks(500) {
        let chunk_ids: Vec<u64> = chunk.iter().map(|(id, _)| *id).collect();
        let parsed: Vec<(u64, Value)> = chunk
            .iter()
            .filter_map(|(id, body)| match serde_json::from_str(body) {
                Ok(v) => Some((*id, v)),
                Err(e) => {
                    warn!("Skipping unreadable stored document {}: {}", id, e);
                    None
                }
            })
            .collect();

        let result = batch::assemble_documents(schema, parsed);
        let rows: Vec<(u64, Value)> = result.records().map(|(id, r)| (id, r.to_json())).collect();
        counts.records += rows.len();
        counts.empty += result.empty_count();

        // empty or unreadable now: drop whatever an earlier pass stored
        let stale: Vec<u64> = chunk_ids
            .into_iter()
            .filter(|id| !rows.iter().any(|(r, _)| r == id))
            .collect();
        db::save_records(conn, kind.as_str(), &serialize_rows(&rows)?, &stale)?;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

/// Persist one fetch outcome; a refetch replaces the earlier row.
fn store_document(conn: &rusqlite::Connection, kind: RecordKind, doc: &FetchedDocument) -> anyhow::Result<()> {
    let (body, error) = match &doc.result {
        Ok(v) => (Some(serde_json::to_string(v)?), None),
        Err(e) => (None, Some(e.clone())),
    };
    db::save_document(
        conn,
        kind.as_str(),
        &db::DocumentRow {
            id: doc.id,
            body,
            error,
            latency_ms: Some(doc.latency_ms),
        },
    )
}

fn serialize_rows(rows: &[(u64, Value)]) -> anyhow::Result<Vec<(u64, String)>> {
    rows.iter()
        .map(|(id, v)| Ok((*id, serde_json::to_string(v)?)))
        .collect()
}

/// Inclusive id range; an empty range is a usage error.
fn id_range(start: u64, end: u64) -> anyhow::Result<Vec<u64>> {
    if start > end {
        bail!("Empty id range: start {} is after end {}", start, end);
    }
    Ok((start..=end).collect())
}

fn default_output(kind: RecordKind) -> PathBuf {
    PathBuf::from(format!("final_pubchem_{}_data.json", kind.as_str()))
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_range_inclusive() {
        assert_eq!(id_range(1, 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(id_range(5, 5).unwrap(), vec![5]);
        assert!(id_range(4, 3).is_err());
    }

    #[test]
    fn default_output_names() {
        assert_eq!(default_output(RecordKind::Compound), PathBuf::from("final_pubchem_compound_data.json"));
        assert_eq!(default_output(RecordKind::Substance), PathBuf::from("final_pubchem_substance_data.json"));
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(std::time::Duration::from_secs(75)), "1m 15s");
        assert_eq!(format_duration(std::time::Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn cli_parses_run() {
        let cli = Cli::try_parse_from(["pubchem_scraper", "run", "--kind", "compound", "--end", "100"]).unwrap();
        match cli.command {
            Commands::Run { kind, start, end, with_errors, .. } => {
                assert_eq!(kind, RecordKind::Compound);
                assert_eq!((start, end), (1, 100));
                assert!(!with_errors);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn stored_outcomes_feed_stats_and_export() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let fetched = [
            FetchedDocument { id: 1, result: Ok(json!({"Record": {}})), latency_ms: 10 },
            FetchedDocument { id: 2, result: Err("HTTP status 503".to_string()), latency_ms: 20 },
        ];
        for doc in &fetched {
            store_document(&conn, RecordKind::Compound, doc).unwrap();
        }
        db::save_records(&conn, "compound", &[(1, "{}".to_string())], &[2]).unwrap();

        let stats = db::get_stats(&conn).unwrap();
        assert_eq!((stats[0].documents, stats[0].errors, stats[0].records), (2, 1, 1));
        assert_eq!(
            db::load_failures(&conn, "compound").unwrap(),
            vec![(2, "HTTP status 503".to_string())]
        );
    }

    #[test]
    fn cli_parses_chembl() {
        let cli = Cli::try_parse_from(["pubchem_scraper", "chembl", "--start", "4443036"]).unwrap();
        match cli.command {
            Commands::Chembl { start, end, out } => {
                assert_eq!(start, 4443036);
                assert_eq!(end, None);
                assert_eq!(out, None);
            }
            _ => panic!("expected chembl"),
        }
    }
}
