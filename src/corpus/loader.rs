//! Corpus files: a JSON array of records, JSON Lines, or CSV with a header row
use super::{deduplicate_documents, Document};
use crate::error::{HyrankError, Result};
use crate::store::Metadata;
use serde_json::Value;
use std::path::Path;

/// Load and deduplicate a corpus file.
///
/// The record id is read from `id` or, for catalog exports, `idea_id`; numeric
/// ids are accepted and stored as strings. A numeric `embedding` array is kept
/// as the precomputed embedding; every other key becomes a document field.
/// Files ending in `.csv` are read by header; their cells stay strings.
pub fn load_corpus(path: &Path) -> Result<Vec<Document>> {
    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    let records = if is_csv {
        read_csv_records(path)?
    } else {
        read_json_records(path)?
    };

    let documents = records
        .into_iter()
        .enumerate()
        .map(|(idx, record)| to_document(record).map_err(|message| HyrankError::InvalidCorpus {
            path: path.to_path_buf(),
            message: format!("record {}: {}", idx, message),
        }))
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!("Loaded {} corpus records from {}", documents.len(), path.display());

    Ok(deduplicate_documents(documents))
}

fn read_json_records(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path).map_err(|e| HyrankError::Io {
        source: e,
        context: format!("Failed to read corpus file: {}", path.display()),
    })?;

    let records: Vec<Value> = if content.trim_start().starts_with('[') {
        serde_json::from_str(&content).map_err(|e| HyrankError::Json {
            source: e,
            context: format!("Failed to parse corpus array: {}", path.display()),
        })?
    } else {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line).map_err(|e| HyrankError::Json {
                    source: e,
                    context: format!("Failed to parse line {} of {}", n + 1, path.display()),
                })
            })
            .collect::<Result<_>>()?
    };

    Ok(records)
}

/// One JSON object per row, keyed by the header. An `embedding` cell holds a
/// JSON array; an empty one means no precomputed embedding.
fn read_csv_records(path: &Path) -> Result<Vec<Value>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| HyrankError::Csv {
        source: e,
        context: format!("Failed to open corpus file: {}", path.display()),
    })?;

    let headers = reader
        .headers()
        .map_err(|e| HyrankError::Csv {
            source: e,
            context: format!("Failed to read header of {}", path.display()),
        })?
        .clone();

    let mut records = Vec::new();
    for (n, row) in reader.records().enumerate() {
        let row = row.map_err(|e| HyrankError::Csv {
            source: e,
            context: format!("Failed to read row {} of {}", n + 1, path.display()),
        })?;

        let mut record = serde_json::Map::new();
        for (key, cell) in headers.iter().zip(row.iter()) {
            let value = if key == "embedding" {
                if cell.trim().is_empty() {
                    Value::Null
                } else {
                    serde_json::from_str(cell).map_err(|e| HyrankError::Json {
                        source: e,
                        context: format!("Invalid embedding in row {} of {}", n + 1, path.display()),
                    })?
                }
            } else {
                Value::from(cell)
            };
            record.insert(key.to_string(), value);
        }
        records.push(Value::Object(record));
    }

    Ok(records)
}

fn to_document(record: Value) -> std::result::Result<Document, String> {
    let Value::Object(map) = record else {
        return Err("expected a JSON object".to_string());
    };

    let mut fields: Metadata = map.into_iter().collect();

    let id = fields
        .remove("id")
        .or_else(|| fields.get("idea_id").cloned())
        .ok_or_else(|| "missing 'id' or 'idea_id'".to_string())?;
    let id = match id {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        other => return Err(format!("unsupported id value: {}", other)),
    };

    let embedding = match fields.remove("embedding") {
        None | Some(Value::Null) => None,
        Some(Value::Array(values)) => Some(
            values
                .iter()
                .map(|v| v.as_f64().map(|x| x as f32))
                .collect::<Option<Vec<f32>>>()
                .ok_or_else(|| "embedding must be an array of numbers".to_string())?,
        ),
        Some(_) => return Err("embedding must be an array of numbers".to_string()),
    };

    Ok(Document {
        id,
        embedding,
        fields,
    })
}
