//! `lumi ingest`: chunk text files into the document index.

use lumi_config::AppConfig;
use lumi_store::SqliteStore;
use std::path::{Path, PathBuf};

pub async fn run(
    source: Option<String>,
    files: Vec<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let store = SqliteStore::new(&config.store.path).await?;

    println!("📚 Ingesting into {}", config.store.path);
    let total = ingest_files(&store, source.as_deref(), &files).await?;
    println!("   ✅ {total} chunk(s) from {} file(s)", files.len());

    Ok(())
}

/// Ingest every file, returning the total number of chunks stored.
pub async fn ingest_files(
    store: &SqliteStore,
    source: Option<&str>,
    files: &[PathBuf],
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut total = 0;
    for path in files {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        let source_id = match source {
            Some(id) => id.to_string(),
            None => source_id_for(path)?,
        };
        let chunks = store.ingest_document(&source_id, &text).await?;
        println!("   {} → {source_id} ({chunks} chunks)", path.display());
        total += chunks;
    }
    Ok(total)
}

/// The file stem, used when no `--source` is given.
fn source_id_for(path: &Path) -> Result<String, String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("Cannot derive a source id from {}", path.display()))
}
