//! `lexrag search` and `lexrag chat` output.

use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;

use lexrag_core::{Chunk, RagPipeline, SearchHit, SearchQuery};

/// Interpret a `--filter key=value` value: integers become JSON numbers so
/// they match `position`, everything else is a string.
pub fn filter_value(raw: &str) -> Value {
    raw.parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub async fn run_search(
    pipeline: &RagPipeline,
    query: &str,
    top_k: usize,
    filters: Vec<(String, String)>,
) -> Result<()> {
    let mut search = SearchQuery::new(query).with_top_k(top_k);
    for (key, value) in filters {
        search = search.with_filter(key, filter_value(&value));
    }

    let hits = pipeline.search(&search).await?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    let mut chunk_cache: HashMap<String, Vec<Chunk>> = HashMap::new();
    for (i, hit) in hits.iter().enumerate() {
        let document_id = meta_str(hit, "document_id");
        let excerpt = match document_id {
            Some(doc) => {
                if !chunk_cache.contains_key(doc) {
                    chunk_cache.insert(doc.to_string(), pipeline.document_chunks(doc).await?);
                }
                let position = hit.metadata.get("position").and_then(|p| p.as_u64());
                chunk_cache
                    .get(doc)
                    .and_then(|chunks| {
                        chunks
                            .iter()
                            .find(|c| Some(c.position as u64) == position)
                    })
                    .map(|c| c.text.replace('\n', " ").trim().to_string())
                    .unwrap_or_default()
            }
            None => String::new(),
        };

        println!(
            "{}. [{:.2}] {}",
            i + 1,
            hit.score,
            meta_str(hit, "title").unwrap_or("(untitled)")
        );
        println!("    document: {}", document_id.unwrap_or("-"));
        if let Some(source) = meta_str(hit, "source_ref") {
            println!("    source: {}", source);
        }
        println!("    excerpt: \"{}\"", excerpt);
        println!("    id: {}", hit.id);
        println!();
    }

    Ok(())
}

fn meta_str<'a>(hit: &'a SearchHit, key: &str) -> Option<&'a str> {
    hit.metadata.get(key).and_then(|v| v.as_str())
}

pub async fn run_chat(pipeline: &RagPipeline, question: &str) -> Result<()> {
    let answer = pipeline.chat(question).await?;

    println!("{}", answer.text);
    println!();
    if answer.citations.is_empty() {
        println!("No citations.");
        return Ok(());
    }
    println!("--- Citations ({}) ---", answer.citations.len());
    for (i, citation) in answer.citations.iter().enumerate() {
        println!(
            "[{}] [{:.2}] document {} chunk {} ({})",
            i + 1,
            citation.score,
            citation.document_id,
            citation.chunk_id,
            citation.vector_id
        );
    }
    Ok(())
}
