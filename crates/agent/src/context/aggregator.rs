//! Two-pass document retrieval.
//!
//! # Flow
//!
//! 1. Broad search for the query (`k` chunks)
//! 2. Rank the sources seen by mean relevance score
//! 3. Re-query each of the best `top_sources` sources, filtered, `refine_depth` deep
//! 4. Join the refined chunks (or the broad ones, if refinement found nothing)

use lumi_config::RetrievalConfig;
use lumi_core::error::RetrievalError;
use lumi_core::retrieval::{DocumentChunk, SearchFilter, SimilaritySource};
use std::sync::Arc;
use tracing::{debug, info};

/// Separator between chunk texts in the combined context.
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// Builds a single block of document text for a query.
pub struct ContextAggregator {
    source: Arc<dyn SimilaritySource>,
    k: usize,
    top_sources: usize,
    refine_depth: usize,
}

impl ContextAggregator {
    pub fn new(source: Arc<dyn SimilaritySource>) -> Self {
        Self::from_config(source, &RetrievalConfig::default())
    }

    pub fn from_config(source: Arc<dyn SimilaritySource>, config: &RetrievalConfig) -> Self {
        Self {
            source,
            k: config.k,
            top_sources: config.top_sources,
            refine_depth: config.refine_depth,
        }
    }

    /// Run both passes and return the combined chunk text.
    ///
    /// No matches yields an empty string. Search failures propagate.
    pub async fn aggregate(&self, query: &str) -> Result<String, RetrievalError> {
        let broad = self.source.search(query, self.k, None).await?;
        if broad.is_empty() {
            debug!("No similarity matches for query");
            return Ok(String::new());
        }

        let best = rank_sources(&broad, self.top_sources);
        info!(sources = ?best, engine = self.source.name(), "Dominant documents selected");

        let mut refined: Vec<DocumentChunk> = Vec::new();
        for source_id in &best {
            let filter = SearchFilter::source(source_id.clone());
            match self
                .source
                .search(query, self.refine_depth, Some(&filter))
                .await
            {
                Ok(chunks) => refined.extend(chunks),
                Err(RetrievalError::FilterUnsupported(engine)) => {
                    debug!(%engine, "Source filtering unsupported, skipping refinement");
                }
                Err(e) => return Err(e),
            }
        }

        let chunks = if refined.is_empty() { broad } else { refined };
        Ok(chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(CHUNK_SEPARATOR))
    }
}

/// Pick the `top` best sources from a broad result set.
///
/// Each source scores the mean of its chunks' relevance scores; sources
/// without any scored chunk are left out. When no chunk carries a score,
/// every source scores its number of chunks instead. Ties keep
/// first-encountered order.
pub fn rank_sources(chunks: &[DocumentChunk], top: usize) -> Vec<String> {
    // (source, sum, count) in first-encountered order
    let mut scored: Vec<(&str, f64, usize)> = Vec::new();
    for chunk in chunks {
        if let Some(score) = chunk.relevance_score {
            accumulate(&mut scored, &chunk.source_id, f64::from(score));
        }
    }

    let mut ranked: Vec<(&str, f64)> = if scored.is_empty() {
        let mut counts: Vec<(&str, f64, usize)> = Vec::new();
        for chunk in chunks {
            accumulate(&mut counts, &chunk.source_id, 1.0);
        }
        counts
            .into_iter()
            .map(|(source, _, count)| (source, count as f64))
            .collect()
    } else {
        scored
            .into_iter()
            .map(|(source, sum, count)| (source, sum / count as f64))
            .collect()
    };

    // sort_by is stable
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked
        .into_iter()
        .take(top)
        .map(|(source, _)| source.to_string())
        .collect()
}

fn accumulate<'a>(acc: &mut Vec<(&'a str, f64, usize)>, source: &'a str, value: f64) {
    match acc.iter_mut().find(|(s, _, _)| *s == source) {
        Some(entry) => {
            entry.1 += value;
            entry.2 += 1;
        }
        None => acc.push((source, value, 1)),
    }
}
