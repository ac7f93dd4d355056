use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde_json::{json, Map, Value};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::parser::assemble::Record;
use crate::parser::{self, sanitize};
use crate::schema::FieldSchema;
use crate::source::DocumentSource;

/// One fetch attempt, already sanitized on success.
pub struct FetchedDocument {
    pub id: u64,
    pub result: Result<Value, String>,
    pub latency_ms: i64,
}

/// Fetch counts returned after completion.
pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Record(Record),
    /// The document had no `Record` wrapper.
    Empty,
    Failed(String),
}

impl Outcome {
    pub fn to_json(&self) -> Value {
        match self {
            Outcome::Record(r) => r.to_json(),
            Outcome::Empty => Value::Null,
            Outcome::Failed(e) => json!({ "error": e }),
        }
    }
}

/// Per-identifier results in ascending identifier order.
#[derive(Debug, Default)]
pub struct BatchResult {
    entries: BTreeMap<u64, Outcome>,
}

impl BatchResult {
    #[cfg(test)]
    pub fn get(&self, id: u64) -> Option<&Outcome> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &Outcome)> {
        self.entries.iter().map(|(id, o)| (*id, o))
    }

    pub fn records(&self) -> impl Iterator<Item = (u64, &Record)> {
        self.iter().filter_map(|(id, o)| match o {
            Outcome::Record(r) => Some((id, r)),
            _ => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (u64, &str)> {
        self.iter().filter_map(|(id, o)| match o {
            Outcome::Failed(e) => Some((id, e.as_str())),
            _ => None,
        })
    }

    pub fn empty_count(&self) -> usize {
        self.entries.values().filter(|o| matches!(o, Outcome::Empty)).count()
    }

    /// `{"<id>": record | null | {"error": ...}}`
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .iter()
            .map(|(id, o)| (id.to_string(), o.to_json()))
            .collect();
        Value::Object(map)
    }
}

/// Fetch `ids` with at most `concurrency` requests in flight, handing each
/// sanitized document to `on_each` as it arrives. Fetch failures are passed
/// on, never returned; only an `on_each` error stops the loop, and dropping
/// the task set then cancels the remaining fetches.
pub async fn fetch_documents<S, F>(
    source: Arc<S>,
    ids: Vec<u64>,
    concurrency: usize,
    mut on_each: F,
) -> Result<FetchStats>
where
    S: DocumentSource,
    F: FnMut(FetchedDocument) -> Result<()>,
{
    let concurrency = concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let total = ids.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let (tx, mut rx) = mpsc::channel::<FetchedDocument>(concurrency * 2);
    let mut tasks = JoinSet::new();

    for id in ids {
        let source = Arc::clone(&source);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tasks.spawn(async move {
            let Ok(_permit) = sem.acquire_owned().await else {
                return;
            };
            let start = Instant::now();
            let result = source
                .fetch(id)
                .await
                .map(|doc| {
                    if source.strips_references() {
                        sanitize::sanitize(doc)
                    } else {
                        doc
                    }
                })
                .map_err(|e| e.to_string());
            let latency_ms = start.elapsed().as_millis() as i64;
            let _ = tx
                .send(FetchedDocument {
                    id,
                    result,
                    latency_ms,
                })
                .await;
        });
    }

    // rx closes once every task has sent or died
    drop(tx);

    let mut ok = 0usize;
    let mut errors = 0usize;

    while let Some(doc) = rx.recv().await {
        match &doc.result {
            Ok(_) => ok += 1,
            Err(e) => {
                errors += 1;
                warn!("Fetch failed for {}: {}", doc.id, e);
            }
        }
        on_each(doc)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} documents ({} ok, {} errors)", total, ok, errors);

    Ok(FetchStats { total, ok, errors })
}

/// Fetch, sanitize and assemble every identifier. A failed fetch becomes an
/// error placeholder for that identifier; the batch always covers every id.
/// `on_fetched` sees each document (or failure) before it is assembled.
pub async fn run<S, F>(
    source: Arc<S>,
    ids: Vec<u64>,
    schema: &FieldSchema,
    concurrency: usize,
    mut on_fetched: F,
) -> Result<BatchResult>
where
    S: DocumentSource,
    F: FnMut(&FetchedDocument) -> Result<()>,
{
    let mut entries = BTreeMap::new();

    fetch_documents(source, ids.clone(), concurrency, |doc| {
        on_fetched(&doc)?;
        let outcome = match doc.result {
            Ok(clean) => to_outcome(parser::assemble_document(schema, clean)),
            Err(e) => Outcome::Failed(e),
        };
        entries.insert(doc.id, outcome);
        Ok(())
    })
    .await?;

    for id in ids {
        entries
            .entry(id)
            .or_insert_with(|| Outcome::Failed("fetch task did not complete".to_string()));
    }

    let result = BatchResult { entries };
    info!(
        "Batch done: {} ids, {} records, {} empty, {} errors",
        result.len(),
        result.records().count(),
        result.empty_count(),
        result.failures().count()
    );
    Ok(result)
}

/// Sanitize and assemble stored documents in parallel.
pub fn assemble_documents(schema: &FieldSchema, docs: Vec<(u64, Value)>) -> BatchResult {
    let entries = docs
        .into_par_iter()
        .map(|(id, raw)| (id, to_outcome(parser::process_document(schema, raw))))
        .collect();
    BatchResult { entries }
}

fn to_outcome(record: Option<Record>) -> Outcome {
    match record {
        Some(r) => Outcome::Record(r),
        None => Outcome::Empty,
    }
}

// ── Tests ──
