//! Document inspection and maintenance commands: `documents`, `get`,
//! `delete`, and `sweep`.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use std::time::Duration;

use lexrag_core::RagPipeline;

pub async fn run_list(pipeline: &RagPipeline) -> Result<()> {
    let documents = pipeline.list_documents().await?;
    if documents.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    for doc in &documents {
        println!(
            "{}  {:<10}  {}  {}",
            doc.id.as_deref().unwrap_or("-"),
            doc.status.as_str(),
            format_ts_iso(&doc.uploaded_at),
            doc.title
        );
    }
    println!();
    println!("{} documents", documents.len());
    Ok(())
}

pub async fn run_get(pipeline: &RagPipeline, id: &str) -> Result<()> {
    let Some(doc) = pipeline.get_document(id).await? else {
        bail!("document not found: {}", id);
    };
    let chunks = pipeline.document_chunks(id).await?;

    println!("--- Document ---");
    println!("id:           {}", id);
    println!("title:        {}", doc.title);
    println!("source_ref:   {}", doc.source_ref);
    println!("uploaded_at:  {}", format_ts_iso(&doc.uploaded_at));
    println!("status:       {}", doc.status.as_str());
    if let Some(ref error) = doc.error {
        println!("error:        {}", error);
    }
    println!();

    println!("--- Chunks ({}) ---", chunks.len());
    for chunk in &chunks {
        println!("[chunk {}] {}", chunk.position, chunk.id.as_deref().unwrap_or("-"));
        println!("{}", chunk.text);
        println!();
    }

    Ok(())
}

pub async fn run_delete(pipeline: &RagPipeline, id: &str) -> Result<()> {
    if !pipeline.delete_document(id).await? {
        bail!("document not found: {}", id);
    }
    println!("deleted {}", id);
    Ok(())
}

/// Fail documents that have been `pending` or `processing` for longer
/// than `older_than_secs`.
pub async fn run_sweep(pipeline: &RagPipeline, older_than_secs: u64) -> Result<()> {
    let failed = pipeline
        .fail_stale_documents(Duration::from_secs(older_than_secs))
        .await?;

    println!("sweep (older than {}s)", older_than_secs);
    println!("  documents failed: {}", failed.len());
    for doc in &failed {
        println!("  {} {}", doc.id.as_deref().unwrap_or("-"), doc.title);
    }
    println!("ok");
    Ok(())
}

fn format_ts_iso(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
