//! File ingestion: `lexrag ingest` and `lexrag retry`.
//!
//! Paths may be files or directories. Directories are walked recursively
//! and only files whose extension is listed in `[ingest].extensions` are
//! picked up; explicitly named files are always ingested.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use lexrag_core::{DocumentStatus, RagPipeline};

use crate::config::Config;

/// Expand `paths` into a sorted, de-duplicated list of files to ingest.
pub fn collect_files(paths: &[PathBuf], extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            bail!("No such file or directory: {}", path.display());
        }

        for entry in WalkDir::new(path).follow_links(true) {
            let entry =
                entry.with_context(|| format!("Failed to walk {}", path.display()))?;
            if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
                files.push(entry.into_path());
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn title_for(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} as UTF-8 text", path.display()))
}

pub async fn run_ingest(
    pipeline: &RagPipeline,
    config: &Config,
    paths: &[PathBuf],
    title: Option<String>,
) -> Result<()> {
    let files = collect_files(paths, &config.ingest.extensions)?;
    if title.is_some() && files.len() > 1 {
        bail!("--title can only be used when ingesting a single file");
    }

    let mut complete = 0u64;
    let mut failed = 0u64;
    let mut chunks_written = 0usize;

    for file in &files {
        let text = read_text(file)?;
        let doc_title = title.clone().unwrap_or_else(|| title_for(file));
        let source_ref = file.display().to_string();

        match pipeline.ingest_document(&doc_title, &source_ref, &text).await {
            Ok(doc) => {
                let id = doc.id.unwrap_or_default();
                let chunks = pipeline.document_chunks(&id).await?.len();
                println!("  {} {} ({} chunks)", id, source_ref, chunks);
                chunks_written += chunks;
                complete += 1;
            }
            Err(e) => {
                warn!(file = %source_ref, error = %e, "ingestion failed");
                println!("  FAILED {}: {}", source_ref, e);
                failed += 1;
            }
        }
    }

    println!("ingest");
    println!("  files: {}", files.len());
    println!("  documents complete: {}", complete);
    println!("  documents failed: {}", failed);
    println!("  chunks written: {}", chunks_written);

    if failed > 0 {
        bail!("{} of {} files failed to ingest", failed, files.len());
    }
    println!("ok");
    Ok(())
}

/// Re-run a failed ingestion with the text read from `path`.
pub async fn run_retry(pipeline: &RagPipeline, id: &str, path: &Path) -> Result<()> {
    let text = read_text(path)?;
    let doc = pipeline
        .retry_ingestion(id, &text)
        .await
        .with_context(|| format!("Retry of document {} failed", id))?;
    let chunks = pipeline.document_chunks(id).await?.len();

    println!("retry {}", id);
    println!("  status: {}", doc.status.as_str());
    println!("  chunks written: {}", chunks);
    if doc.status == DocumentStatus::Complete {
        println!("ok");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exts() -> Vec<String> {
        vec!["txt".into(), "md".into()]
    }

    #[test]
    fn test_collect_files_filters_directories_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("nested/a.MD"), "a").unwrap();
        std::fs::write(dir.path().join("scan.pdf"), "%PDF").unwrap();

        let files = collect_files(&[dir.path().to_path_buf()], &exts()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["b.txt", "a.MD"]);
    }

    #[test]
    fn test_explicit_file_ignores_extension_filter() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("contract.rtf");
        std::fs::write(&file, "text").unwrap();
        let files = collect_files(&[file.clone(), file.clone()], &exts()).unwrap();
        assert_eq!(files, vec![file]);
    }

    #[test]
    fn test_missing_path_is_error() {
        let err = collect_files(&[PathBuf::from("/no/such/lexrag/path")], &exts()).unwrap_err();
        assert!(err.to_string().contains("No such file or directory"));
    }

    #[test]
    fn test_title_is_file_stem() {
        assert_eq!(title_for(Path::new("/tmp/lease-2024.txt")), "lease-2024");
    }
}
