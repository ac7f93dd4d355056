use thiserror::Error;

/// Failure to obtain a document for one identifier.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP status {status}")]
    Status { status: u16 },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid JSON body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A field schema file that cannot be interpreted.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("schema has no fields")]
    Empty,

    #[error("empty output path in field #{index}")]
    EmptyOutput { index: usize },

    #[error("duplicate output path `{0}`")]
    Duplicate(String),

    #[error("output path `{parent}` conflicts with nested path `{child}`")]
    Conflict { parent: String, child: String },

    #[error("field `{0}` has an empty heading path")]
    EmptyHeadingPath(String),

    #[error("derived field `{output}` reads `{input}`, which no earlier field produces")]
    UnknownInput { output: String, input: String },
}
