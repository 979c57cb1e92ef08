use crate::chunk::Chunk;
use crate::error::{BundleError, BundleResult};
use crate::service_context::ServiceContext;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

const BATCH_PREFIX: &str = "current_transcript_";
const BATCH_SUFFIX: &str = ".json";

pub const SERVICE_CONTEXT_FILE: &str = "service_context.json";

/// Keys starting with this are pipeline-internal and never persisted.
pub const META_MARKER: char = '_';

/// `current_transcript_001.json` for index 1.
pub fn batch_file_name(index: usize) -> String {
    format!("{BATCH_PREFIX}{index:03}{BATCH_SUFFIX}")
}

/// Does `name` follow the batch-file naming pattern?
pub fn is_batch_file(name: &str) -> bool {
    name.strip_prefix(BATCH_PREFIX)
        .and_then(|rest| rest.strip_suffix(BATCH_SUFFIX))
        .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
}

/// Remove every key starting with the metadata marker, at any depth.
pub fn strip_metadata(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| !key.starts_with(META_MARKER));
            map.values_mut().for_each(strip_metadata);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_metadata),
        _ => {}
    }
}

/// Create `dir` and any missing parents.
pub fn ensure_dir(dir: &Path) -> BundleResult<()> {
    fs::create_dir_all(dir).map_err(|e| BundleError::persist(dir, e))
}

/// Delete batch files left by a previous run. Returns how many went.
pub fn clear_batches(dir: &Path) -> BundleResult<usize> {
    let listing = match fs::read_dir(dir) {
        Ok(listing) => listing,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(BundleError::persist(dir, e)),
    };
    let mut removed = 0;
    for entry in listing {
        let entry = entry.map_err(|e| BundleError::persist(dir, e))?;
        let name = entry.file_name();
        if !name.to_str().is_some_and(is_batch_file) {
            continue;
        }
        let path = entry.path();
        fs::remove_file(&path).map_err(|e| BundleError::persist(&path, e))?;
        removed += 1;
    }
    Ok(removed)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T, strip: bool) -> BundleResult<()> {
    let mut value = serde_json::to_value(value)?;
    if strip {
        strip_metadata(&mut value);
    }
    let json = serde_json::to_string_pretty(&value)?;
    fs::write(path, json).map_err(|e| BundleError::persist(path, e))
}

/// Write each chunk as a numbered batch file, in chunk order, with
/// metadata stripped. Returns the file names written.
pub fn write_chunks(dir: &Path, chunks: &[Chunk]) -> BundleResult<Vec<String>> {
    let mut names = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        let name = batch_file_name(i + 1);
        write_json(&dir.join(&name), &chunk.entries, true)?;
        names.push(name);
    }
    Ok(names)
}

pub fn write_service_context(dir: &Path, context: &ServiceContext) -> BundleResult<()> {
    write_json(&dir.join(SERVICE_CONTEXT_FILE), context, false)
}
