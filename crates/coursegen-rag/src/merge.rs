use std::collections::HashMap;

use coursegen_types::RagChunk;

/// Merges chunks from every source query, de-duplicates by chunk id
/// (keeping the highest relevance seen for a given id), ranks by
/// `(relevance desc, chunk id asc)` — the explicit tie-break that bounds
/// vector-store nondeterminism — and trims to `expected_chunks`.
///
/// Pure and I/O-free so it can be exercised without a vector store: the
/// idempotence property ("identical inputs produce identical outputs
/// modulo vector-store nondeterminism, bounded by an explicit tie-break
/// on chunk id") lives entirely in this function.
pub fn merge_and_rank(chunks: Vec<RagChunk>, expected_chunks: usize) -> Vec<RagChunk> {
    let mut by_id: HashMap<String, RagChunk> = HashMap::new();
    for chunk in chunks {
        by_id
            .entry(chunk.id.clone())
            .and_modify(|existing| {
                if chunk.relevance > existing.relevance {
                    *existing = chunk.clone();
                }
            })
            .or_insert(chunk);
    }

    let mut merged: Vec<RagChunk> = by_id.into_values().collect();
    merged.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    merged.truncate(expected_chunks);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, relevance: f32) -> RagChunk {
        RagChunk::new(id, format!("content for {id}"), relevance)
    }

    #[test]
    fn dedupes_by_id_keeping_highest_relevance() {
        let chunks = vec![chunk("c1", 0.4), chunk("c1", 0.9), chunk("c2", 0.5)];
        let merged = merge_and_rank(chunks, 10);
        assert_eq!(merged.len(), 2);
        let c1 = merged.iter().find(|c| c.id == "c1").unwrap();
        assert_eq!(c1.relevance, 0.9);
    }

    #[test]
    fn ties_break_on_chunk_id_ascending() {
        let chunks = vec![chunk("b", 0.5), chunk("a", 0.5), chunk("c", 0.5)];
        let merged = merge_and_rank(chunks, 10);
        let ids: Vec<&str> = merged.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn trims_to_expected_chunks() {
        let chunks = vec![chunk("a", 0.9), chunk("b", 0.8), chunk("c", 0.7)];
        let merged = merge_and_rank(chunks, 2);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, "a");
        assert_eq!(merged[1].id, "b");
    }

    #[test]
    fn same_input_produces_same_output_order() {
        let chunks = vec![chunk("x", 0.3), chunk("y", 0.3), chunk("z", 0.9)];
        let first = merge_and_rank(chunks.clone(), 10);
        let second = merge_and_rank(chunks, 10);
        let first_ids: Vec<&str> = first.iter().map(|c| c.id.as_str()).collect();
        let second_ids: Vec<&str> = second.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
    }
}
