//! Ingestion command: files and directories into the store.
//!
//! Each file becomes one document whose `ref_id` is its canonical path, so
//! re-running the command skips files that are already ingested instead of
//! duplicating them.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use trellis_core::{Error, NewDocument};

use crate::config::Config;
use crate::db;

const INGESTIBLE_EXTENSIONS: &[&str] = &["md", "txt", "text", "markdown"];

pub async fn run_ingest(
    config: &Config,
    cancel: &CancellationToken,
    path: &Path,
    origin: Option<String>,
    no_extract: bool,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("ingestion requires an embedding provider; set embedding.provider in the config");
    }

    let pool = db::connect(config).await?;
    let retriever = crate::build_retriever(config, pool, !no_extract)?;

    let files = collect_files(path)?;
    if files.is_empty() {
        bail!("no ingestible files under {}", path.display());
    }

    let origin = origin.unwrap_or_else(|| path.display().to_string());
    let mut documents = 0u64;
    let mut chunks = 0u64;
    let mut entities = 0u64;
    let mut edges = 0u64;
    let mut skipped = 0u64;

    for file in &files {
        let content = std::fs::read_to_string(file)?;
        let title = file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file.display().to_string());
        let ref_id = file
            .canonicalize()
            .unwrap_or_else(|_| file.clone())
            .display()
            .to_string();

        let doc = NewDocument::new(title, origin.clone()).with_ref_id(ref_id);
        match retriever.ingest_document(doc, &content, cancel).await {
            Ok(report) => {
                documents += 1;
                chunks += report.chunks as u64;
                entities += report.entities as u64;
                edges += report.edges as u64;
            }
            Err(err) if matches!(err.source, Error::InvalidInput(_)) && err.inserted == 0 => {
                // Already ingested (duplicate ref_id) or empty file.
                skipped += 1;
            }
            Err(err) => {
                bail!(
                    "ingest of {} failed after {} chunks: {}",
                    file.display(),
                    err.inserted,
                    err.source
                );
            }
        }
    }

    println!("ingest {}", path.display());
    println!("  files found: {}", files.len());
    println!("  documents: {documents}");
    println!("  chunks: {chunks}");
    println!("  entities: {entities}");
    println!("  edges: {edges}");
    if skipped > 0 {
        println!("  skipped: {skipped}");
    }
    println!("ok");

    Ok(())
}

fn collect_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        bail!("no such file or directory: {}", path.display());
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| INGESTIBLE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        })
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_collect_files_filters_extensions() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.md"), "alpha").unwrap();
        fs::write(tmp.path().join("b.txt"), "beta").unwrap();
        fs::write(tmp.path().join("c.rs"), "gamma").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/d.markdown"), "delta").unwrap();

        let files = collect_files(tmp.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.md", "b.txt", "d.markdown"]);
    }

    #[test]
    fn test_collect_files_single_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("only.rs");
        fs::write(&file, "content").unwrap();
        // A single explicit file is ingested regardless of extension.
        let files = collect_files(&file).unwrap();
        assert_eq!(files, vec![file]);
    }

    #[test]
    fn test_collect_files_missing_path() {
        assert!(collect_files(Path::new("/definitely/not/here")).is_err());
    }
}
